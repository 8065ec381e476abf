//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use crate::api::dto::{HealthResponse, WsHealthResponse};
use crate::api::handlers::system;

/// Generated OpenAPI document.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "pos-realtime",
        description = "Health surface of the point-of-sale real-time event bridge."
    ),
    paths(system::health_handler, system::ws_health_handler),
    components(schemas(HealthResponse, WsHealthResponse)),
    tags((name = "System", description = "Liveness and WebSocket status"))
)]
pub struct ApiDoc;

/// Swagger UI at `/swagger-ui`, serving `/api-docs/openapi.json`.
#[cfg(feature = "swagger-ui")]
pub fn swagger_ui() -> utoipa_swagger_ui::SwaggerUi {
    utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_both_health_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/health"));
        assert!(doc.paths.paths.contains_key("/api/v1/ws-health"));
    }
}
