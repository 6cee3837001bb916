use crate::frame::{encode_jpeg, SNAPSHOT_JPEG_QUALITY};
use crate::http::server::ServerState;
use crate::supervisor::MAX_CAMERA_SLOTS;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

/// Timestamp format presented by the alerts endpoint.
const ALERT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertSummary {
    id: String,
    timestamp: String,
    camera_name: String,
    #[serde(rename = "type")]
    kind: String,
    message: String,
    has_snapshot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_path: Option<String>,
}

#[derive(Serialize)]
struct CameraSummary {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    source: String,
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": message, "statusCode": status.as_u16() })),
    )
        .into_response()
}

pub async fn ping_handler() -> &'static str {
    "ok"
}

/// All alerts, newest first.
pub async fn alerts_handler(State(state): State<ServerState>) -> Response {
    let log = state.alerts.read().unwrap();

    let summaries: Vec<AlertSummary> = log
        .iter()
        .rev()
        .map(|alert| AlertSummary {
            id: alert.id.clone(),
            timestamp: alert.timestamp.format(ALERT_TIME_FORMAT).to_string(),
            camera_name: alert.camera_name.clone(),
            kind: alert.kind.as_str().to_string(),
            message: alert.message.clone(),
            has_snapshot: alert.has_image(),
            snapshot_path: if alert.snapshot_path.is_empty() {
                None
            } else {
                Some(alert.snapshot_path.clone())
            },
        })
        .collect();

    Json(summaries).into_response()
}

/// Serve the exported snapshot file behind an alert, if one exists.
pub async fn alert_snapshot_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    let snapshot_path = {
        let log = state.alerts.read().unwrap();
        match log.find_by_id(&id) {
            Some(alert) => alert.snapshot_path.clone(),
            None => return not_found("Alert not found"),
        }
    };

    if snapshot_path.is_empty() {
        return not_found("Snapshot not available");
    }

    match tokio::fs::read(&snapshot_path).await {
        Ok(data) => {
            let mime = if snapshot_path.ends_with(".jpg") || snapshot_path.ends_with(".jpeg") {
                "image/jpeg"
            } else {
                "image/png"
            };
            ([(header::CONTENT_TYPE, mime)], data).into_response()
        }
        Err(e) => {
            debug!("Snapshot file {} unreadable: {}", snapshot_path, e);
            not_found("Snapshot not available")
        }
    }
}

/// All available camera slots as `cam{N}` descriptors.
pub async fn cameras_handler(State(state): State<ServerState>) -> Response {
    let mut cameras = Vec::new();

    for index in 1..=MAX_CAMERA_SLOTS {
        if state.supervisor.camera_available(index) {
            cameras.push(CameraSummary {
                id: format!("cam{}", index - 1),
                name: state.supervisor.camera_name(index),
                kind: state.supervisor.camera_kind(index),
                source: state.supervisor.camera_source(index),
            });
        }
    }

    Json(cameras).into_response()
}

/// JPEG-encode the current frame of one camera.
pub async fn camera_snapshot_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    let slot = match parse_camera_id(&id) {
        Some(slot) => slot,
        None => return not_found("Invalid camera ID"),
    };

    if !state.supervisor.camera_available(slot) {
        return not_found("Camera not available");
    }

    let pipeline = state
        .supervisor
        .pipeline(slot)
        .expect("available slot has a pipeline");

    let frame = match pipeline.current_frame() {
        Some(frame) => frame,
        None => return error_response(StatusCode::SERVICE_UNAVAILABLE, "No frame available"),
    };

    match encode_jpeg(&frame, SNAPSHOT_JPEG_QUALITY) {
        Ok(jpeg) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        Err(e) => {
            debug!("Snapshot encoding failed for {}: {}", id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode image")
        }
    }
}

pub async fn not_found_handler() -> Response {
    not_found("Not found")
}

/// `cam{N}` with N in 0..4, as a 1-based slot index.
fn parse_camera_id(id: &str) -> Option<usize> {
    let n: usize = id.strip_prefix("cam")?.parse().ok()?;
    if n >= MAX_CAMERA_SLOTS {
        return None;
    }
    Some(n + 1)
}
