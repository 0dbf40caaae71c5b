//! API server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use pushbridge_config::Config;

use crate::http::routes::create_router;
use crate::state::AppState;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; `None` allows any origin.
    pub cors_origins: Option<Vec<String>>,
}

impl ApiConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            cors_origins: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            cors_origins: config.server.cors_origin_list(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 8080)
    }
}

/// The API server.
pub struct ApiServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Get the server address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Router with tracing and CORS layers applied.
    pub fn app(&self) -> Router {
        create_router(self.state.clone())
            .layer(cors_layer(self.config.cors_origins.as_deref()))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until Ctrl-C, then close every WebSocket with 1001.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let addr: SocketAddr = self.addr().parse()?;
        let listener = TcpListener::bind(addr).await?;

        info!("pushbridge listening on {}", addr);
        axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown_signal(self.state.clone()))
            .await?;

        info!("pushbridge stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C after closing all peer connections.
///
/// Upgraded WebSocket connections count as in-flight for graceful shutdown,
/// so they are closed here, before the server starts draining.
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    state.bridge.shutdown().await;
}

fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let Some(origins) = origins else {
        return CorsLayer::permissive();
    };

    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if allowed.is_empty() {
        warn!("no valid CORS origins configured, falling back to permissive CORS");
        return CorsLayer::permissive();
    }
    info!(origins = ?allowed, "configured CORS with explicit allowed origins");
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn health_from(origin: &str) -> Request<Body> {
        Request::builder()
            .uri("/health")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_api_config_default() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert!(config.cors_origins.is_none());
    }

    #[test]
    fn test_api_config_from_config() {
        let mut config = Config::default();
        config.server.host = "0.0.0.0".to_string();
        config.server.port = 9000;
        config.server.cors_origins = "https://app.example".to_string();

        let api = ApiConfig::from_config(&config);

        assert_eq!(api.host, "0.0.0.0");
        assert_eq!(api.port, 9000);
        assert_eq!(api.cors_origins, Some(vec!["https://app.example".to_string()]));
    }

    #[test]
    fn test_server_addr_format() {
        let server = ApiServer::new(ApiConfig::new("192.168.1.1", 443), Arc::new(AppState::default()));
        assert_eq!(server.addr(), "192.168.1.1:443");
    }

    #[tokio::test]
    async fn test_permissive_cors() {
        let server = ApiServer::new(ApiConfig::default(), Arc::new(AppState::default()));

        let response = server.app().oneshot(health_from("https://any.example")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_origin_list_cors() {
        let config = ApiConfig {
            cors_origins: Some(vec!["https://app.example".to_string()]),
            ..ApiConfig::default()
        };
        let server = ApiServer::new(config, Arc::new(AppState::default()));

        let allowed = server
            .app()
            .oneshot(health_from("https://app.example"))
            .await
            .unwrap();
        let denied = server
            .app()
            .oneshot(health_from("https://evil.example"))
            .await
            .unwrap();

        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example"
        );
        assert!(!denied
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
