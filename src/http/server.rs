use crate::alerts::SharedAlertLog;
use crate::config::HttpConfig;
use crate::error::{Result, ServerError};
use crate::supervisor::CameraSupervisor;
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tracing::info;

use super::handlers::{
    alert_snapshot_handler, alerts_handler, camera_snapshot_handler, cameras_handler,
    not_found_handler, ping_handler,
};

/// Shared state for the query server.
#[derive(Clone)]
pub struct ServerState {
    pub(crate) alerts: SharedAlertLog,
    pub(crate) supervisor: Arc<CameraSupervisor>,
}

/// Build the read-only query router. GET-only: other methods on known
/// paths get 405, unknown paths get a JSON 404.
pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/ping", get(ping_handler))
        .route("/alerts", get(alerts_handler))
        .route("/alerts/{id}/snapshot", get(alert_snapshot_handler))
        .route("/cameras", get(cameras_handler))
        .route("/cameras/{id}/snapshot", get(camera_snapshot_handler))
        .fallback(not_found_handler)
        .layer(middleware::from_fn(common_headers))
        .with_state(state)
}

/// Every response carries CORS and closes its connection; one request per
/// connection keeps remote consumers trivial.
async fn common_headers(request: axum::extract::Request, next: Next) -> axum::response::Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

/// Minimal read-only HTTP surface over the alert log and camera slots.
pub struct QueryServer {
    config: HttpConfig,
    state: ServerState,
}

impl QueryServer {
    pub fn new(
        config: HttpConfig,
        alerts: SharedAlertLog,
        supervisor: Arc<CameraSupervisor>,
    ) -> Self {
        Self {
            config,
            state: ServerState { alerts, supervisor },
        }
    }

    /// Bind the listener and serve until shutdown.
    pub async fn serve(self, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<()> {
        let app = build_router(self.state);
        let addr = format!("{}:{}", self.config.ip, self.config.port);

        let listener =
            tokio::net::TcpListener::bind(&addr)
                .await
                .map_err(|e| ServerError::BindFailed {
                    address: addr.clone(),
                    source: e,
                })?;

        info!("Query API listening on {}", addr);
        info!("  http://{}/ping", addr);
        info!("  http://{}/alerts", addr);
        info!("  http://{}/cameras", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve {
                details: e.to_string(),
            })?;

        Ok(())
    }
}
