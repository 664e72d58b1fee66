//! REST API exposure for the framework
//!
//! The REST exposure consumes a `ServerHost` and produces an Axum `Router`
//! serving HAL resources, health checks and any custom routes.

use super::super::host::ServerHost;
use crate::server::handler::ResourceHandler;
use crate::server::router::build_resource_routes;
use anyhow::Result;
use axum::http::HeaderValue;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Paths of the health check routes, mounted at the server root
pub const HEALTH_PATHS: [&str; 2] = ["health", "healthz"];

/// REST API exposure implementation
pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a host
    ///
    /// Returns a router with:
    /// - Health check routes
    /// - Custom routes
    /// - Resource routes for every exposed repository
    ///
    /// wrapped in a trace layer, plus a CORS layer when origins are
    /// configured.
    pub fn build_router(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Result<Router> {
        let cors = Self::cors_layer(&host.config.cors_allowed_origins)?;
        let handler = ResourceHandler::new(host);

        let mut app = Self::health_routes();
        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }
        app = app.merge(build_resource_routes(handler));

        if let Some(cors) = cors {
            app = app.layer(cors);
        }
        Ok(app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http())))
    }

    fn cors_layer(origins: &[String]) -> Result<Option<CorsLayer>> {
        if origins.is_empty() {
            return Ok(None);
        }
        let layer = if origins.iter().any(|o| o == "*") {
            CorsLayer::new().allow_origin(Any)
        } else {
            let origins = origins
                .iter()
                .map(|o| {
                    HeaderValue::from_str(o)
                        .map_err(|e| anyhow::anyhow!("Invalid CORS origin '{}': {}", o, e))
                })
                .collect::<Result<Vec<_>>>()?;
            CorsLayer::new().allow_origin(AllowOrigin::list(origins))
        };
        Ok(Some(layer.allow_methods(Any).allow_headers(Any)))
    }

    /// Build health check routes
    fn health_routes() -> Router {
        HEALTH_PATHS.iter().fold(Router::new(), |router, path| {
            router.route(&format!("/{}", path), get(Self::health_check))
        })
    }

    /// Health check endpoint handler
    async fn health_check() -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": "halrest"
        }))
    }
}
