//! Axum-based HTTP surface
//!
//! Reads published channels and device status, and dispatches channel
//! commands, remote services and refresh triggers to the vehicle handler.

use crate::error::DriveLinkError;
use crate::sink::{ChannelCommand, ChannelStore, ChannelValue};
use crate::vehicle::{RefreshOutcome, VehicleHandler};
use crate::vehicle::render::IMAGE;
use axum::body::Bytes;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub handler: VehicleHandler,
    pub store: Arc<ChannelStore>,
}

#[derive(Debug, Deserialize)]
pub struct CommandBody {
    pub command: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoteBody {
    #[serde(default)]
    pub payload: Option<String>,
}

/// Handler errors rendered as JSON
#[derive(Debug)]
pub struct ApiError(pub DriveLinkError);

impl From<DriveLinkError> for ApiError {
    fn from(e: DriveLinkError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self.0 {
            DriveLinkError::Validation { .. } | DriveLinkError::Parse { .. } => StatusCode::BAD_REQUEST,
            DriveLinkError::Config { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (code, Json(json!({"ok": false, "error": self.0.to_string()}))).into_response()
    }
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let handler = &state.handler;
    let image = handler.image_properties();
    Json(json!({
        "vin": handler.config().vehicle.vin,
        "device": state.store.status(),
        "protocol": format!("{:?}", handler.protocol_mode()),
        "configured": handler.is_configured(),
        "cycle_in_flight": handler.tracker().in_flight().len(),
        "editing": handler.editor().is_open(),
        "capabilities": handler.capabilities().names(),
        "image": {
            "viewport": image.params.viewport,
            "size": image.params.size,
            "failed_count": image.failed_count,
        },
    }))
}

pub async fn channels(State(state): State<AppState>) -> impl IntoResponse {
    let map: serde_json::Map<String, serde_json::Value> = state
        .store
        .snapshot()
        .into_iter()
        .map(|(k, v)| (k, v.to_json()))
        .collect();
    Json(serde_json::Value::Object(map))
}

pub async fn channel_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CommandBody>,
) -> Result<impl IntoResponse, ApiError> {
    let command = ChannelCommand::from_json(&body.command).ok_or_else(|| {
        DriveLinkError::validation(id.as_str(), format!("unsupported command {}", body.command))
    })?;
    state.handler.handle_command(&id, command)?;
    Ok(Json(json!({"ok": true, "channel": id})))
}

pub async fn remote_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let body: RemoteBody = if body.is_empty() {
        RemoteBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| DriveLinkError::validation("payload", e.to_string()))?
    };
    state
        .handler
        .execute_remote_service(&service, body.payload)?;
    Ok((StatusCode::ACCEPTED, Json(json!({"ok": true, "service": service}))))
}

pub async fn refresh(State(state): State<AppState>) -> impl IntoResponse {
    match state.handler.refresh() {
        RefreshOutcome::Started { cycle, sources } => (
            StatusCode::ACCEPTED,
            Json(json!({
                "ok": true,
                "cycle": cycle.0,
                "sources": sources.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            })),
        ),
        RefreshOutcome::Busy => (
            StatusCode::CONFLICT,
            Json(json!({"ok": false, "error": "refresh cycle in flight"})),
        ),
        RefreshOutcome::NotConfigured => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ok": false, "error": "vehicle not configured"})),
        ),
        RefreshOutcome::Disposed => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ok": false, "error": "vehicle handler disposed"})),
        ),
    }
}

pub async fn image(State(state): State<AppState>) -> Response {
    match state.store.get(IMAGE) {
        Some(ChannelValue::Raw { content_type, data }) => {
            ([(header::CONTENT_TYPE, content_type)], data).into_response()
        }
        _ => (StatusCode::NOT_FOUND, "no image").into_response(),
    }
}

pub async fn fingerprint(State(state): State<AppState>) -> Response {
    match state.handler.last_fingerprint() {
        Some(dump) => ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], dump).into_response(),
        None => (StatusCode::NOT_FOUND, "no completed refresh cycle").into_response(),
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/channels", get(channels))
        .route("/api/channels/{id}", post(channel_command))
        .route("/api/remote/{service}", post(remote_service))
        .route("/api/refresh", post(refresh))
        .route("/api/image", get(image))
        .route("/api/fingerprint", get(fingerprint))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let router = build_router(state);
    let ip: IpAddr = host.parse().unwrap_or(IpAddr::from([127, 0, 0, 1]));
    let addr = SocketAddr::new(ip, port);
    tracing::info!("HTTP surface listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| DriveLinkError::web(format!("cannot bind {}: {}", addr, e)))?;
    axum::serve(listener, router)
        .await
        .map_err(|e| DriveLinkError::web(e.to_string()))?;
    Ok(())
}
