//! Data Transfer Objects for REST responses.

pub mod health_dto;

pub use health_dto::*;
