//! Bridge configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Unset or unparsable values fall back
//! to the defaults of [`BridgeConfig::default`], except `LISTEN_ADDR`,
//! which must parse if it is set.

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::ExclusionSet;
use crate::error::BridgeError;
use crate::service::BridgeOptions;
use crate::ws::WsServerConfig;

/// Environment tag that forbids WebSocket debug logging.
pub const PRODUCTION: &str = "production";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Reads `LOG_FORMAT`. Call before installing the tracing subscriber,
    /// which in turn must happen before [`BridgeConfig::from_env`] so its
    /// warnings are not lost.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_value(std::env::var("LOG_FORMAT").ok().as_deref())
    }

    /// `json` (any case) selects [`LogFormat::Json`]; anything else,
    /// including unset, is [`LogFormat::Pretty`].
    #[must_use]
    pub fn from_value(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Top-level bridge configuration.
///
/// Loaded once at startup via [`BridgeConfig::from_env`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// WebSocket upgrade path.
    pub ws_path: String,

    /// Verbose per-message logging on the WebSocket path.
    pub ws_debug: bool,

    /// Patterns appended to the default exclusion set.
    pub excluded_events: Vec<String>,

    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,

    /// Milliseconds allowed for a single socket write.
    pub write_timeout_ms: u64,

    /// Milliseconds to wait after closing sockets during shutdown.
    pub shutdown_grace_ms: u64,

    /// Deployment environment tag.
    pub environment: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            ws_path: "/ws".to_string(),
            ws_debug: false,
            excluded_events: Vec::new(),
            send_queue_capacity: 256,
            write_timeout_ms: 5_000,
            shutdown_grace_ms: 1_000,
            environment: "development".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl BridgeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    /// Debug logging is forced off when `APP_ENV=production`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if `LISTEN_ADDR` is set but cannot
    /// be parsed, or if the resulting configuration fails
    /// [`BridgeConfig::validate`].
    pub fn from_env() -> Result<Self, BridgeError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = match std::env::var("LISTEN_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| BridgeError::Config(format!("LISTEN_ADDR {raw:?}: {e}")))?,
            Err(_) => defaults.listen_addr,
        };

        let ws_path = std::env::var("WS_PATH").unwrap_or(defaults.ws_path);
        let environment = std::env::var("APP_ENV").unwrap_or(defaults.environment);

        let ws_debug = debug_allowed(
            parse_env_bool("WS_DEBUG", defaults.ws_debug),
            &environment,
        );

        let excluded_events = std::env::var("WS_EXCLUDED_EVENTS")
            .map(|raw| parse_list(&raw))
            .unwrap_or_default();

        let log_format = LogFormat::from_env();

        let config = Self {
            listen_addr,
            ws_path,
            ws_debug,
            excluded_events,
            send_queue_capacity: parse_env("WS_SEND_QUEUE_CAPACITY", defaults.send_queue_capacity),
            write_timeout_ms: parse_env("WS_WRITE_TIMEOUT_MS", defaults.write_timeout_ms),
            shutdown_grace_ms: parse_env("SHUTDOWN_GRACE_MS", defaults.shutdown_grace_ms),
            environment,
            log_format,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants the rest of the crate relies on.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if the WebSocket path does not
    /// start with `/` or the send queue capacity is zero.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if !self.ws_path.starts_with('/') {
            return Err(BridgeError::Config(format!(
                "WS_PATH must start with '/': {:?}",
                self.ws_path
            )));
        }
        if self.send_queue_capacity == 0 {
            return Err(BridgeError::Config(
                "WS_SEND_QUEUE_CAPACITY must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Transport settings for the WebSocket server.
    #[must_use]
    pub fn ws_server(&self) -> WsServerConfig {
        WsServerConfig {
            path: self.ws_path.clone(),
            debug: self.ws_debug,
            send_queue_capacity: self.send_queue_capacity,
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }

    /// Options for the event bridge: default exclusions plus
    /// `excluded_events`.
    #[must_use]
    pub fn bridge(&self) -> BridgeOptions {
        BridgeOptions {
            exclusions: ExclusionSet::with_defaults(&self.excluded_events),
            debug: self.ws_debug,
        }
    }

    /// Grace period between closing sockets and process exit.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}

/// WebSocket debug logging is never allowed in production; a request
/// for it there is logged and refused.
fn debug_allowed(requested: bool, environment: &str) -> bool {
    if requested && environment == PRODUCTION {
        tracing::warn!(environment, "WS_DEBUG ignored in production");
        return false;
    }
    requested
}

/// Splits a comma-separated list, dropping empty entries.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
