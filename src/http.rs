//! The HTTP surface: login, config, role, rotation, health, and metrics,
//! mirroring the host daemon's own HTTP unit.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::center::Center;
use crate::config::{Config, ConfigSafeView};
use crate::error::CoreError;
use crate::role::Role;

#[derive(Clone)]
struct AppState {
    center: Arc<Center>,
}

pub fn router(center: Arc<Center>) -> Router {
    let state = AppState { center };

    Router::new()
        .route("/v1/login", post(login))
        .route("/v1/config", post(put_config).get(get_config).delete(delete_config))
        .route(
            "/v1/role/{name}",
            post(put_role).get(get_role).delete(delete_role),
        )
        .route("/v1/role", get(list_roles))
        .route("/v1/rotation/keytab", post(rotate_keytab))
        .route("/v1/health", get(health))
        .route("/v1/metrics", get(metrics))
        .with_state(state)
}

/// Wrap a `CoreError` in the `{error: "authentication failed: <safe
/// message>"}` envelope with a status mapped from its kind.
fn error_response(prefix: &str, err: CoreError) -> Response {
    use crate::error::ErrorKind;

    let status = match err.kind() {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotConfigured => StatusCode::NOT_FOUND,
        ErrorKind::KerberosFailure | ErrorKind::PacError(_) | ErrorKind::AuthorizationDenied => {
            StatusCode::UNAUTHORIZED
        }
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };

    error!(kind = ?err.kind(), detail = %crate::redact::redact(err.internal_detail()), "{prefix}: {err}");

    (status, Json(ErrorBody { error: format!("{prefix}: {err}") })).into_response()
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

//----------- Login ------------------------------------------------------------

#[derive(Deserialize)]
struct LoginRequest {
    role: String,
    spnego: String,
    cb_tlse: Option<String>,
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let channel_binding = match req.cb_tlse.as_deref().map(decode_channel_binding).transpose() {
        Ok(cb) => cb,
        Err(err) => return error_response("authentication failed", err),
    };

    match crate::login::login(&state.center, &req.role, &req.spnego, channel_binding.as_deref()).await {
        Ok(auth) => Json(auth).into_response(),
        Err(err) => error_response("authentication failed", err),
    }
}

fn decode_channel_binding(s: &str) -> Result<Vec<u8>, CoreError> {
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|_| CoreError::invalid_input("cb_tlse is not valid base64"))
}

//----------- Config ------------------------------------------------------------

async fn put_config(State(state): State<AppState>, Json(config): Json<Config>) -> Response {
    match state.center.set_config(config) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response("configuration rejected", err),
    }
}

async fn get_config(State(state): State<AppState>) -> Response {
    match state.center.current() {
        Some(loaded) => Json(ConfigSafeView::from(&loaded.config)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_config(State(state): State<AppState>) -> Response {
    match state.center.clear_config() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response("could not clear configuration", err),
    }
}

//----------- Role ------------------------------------------------------------

async fn put_role(State(state): State<AppState>, Path(name): Path<String>, Json(mut role): Json<Role>) -> Response {
    role.name = name;
    match state.center.roles.put_role(&role) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response("role rejected", err),
    }
}

async fn get_role(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.center.roles.get_role(&name) {
        Ok(Some(role)) => Json(role).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => error_response("could not read role", err),
    }
}

async fn delete_role(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.center.roles.delete_role(&name) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response("could not delete role", err),
    }
}

async fn list_roles(State(state): State<AppState>) -> Response {
    match state.center.roles.list_roles() {
        Ok(names) => Json(names).into_response(),
        Err(err) => error_response("could not list roles", err),
    }
}

//----------- Rotation ------------------------------------------------------------

#[derive(Deserialize)]
struct RotateKeytabRequest {
    keytab: String,
}

async fn rotate_keytab(State(state): State<AppState>, Json(req): Json<RotateKeytabRequest>) -> Response {
    let bytes = match base64::engine::general_purpose::STANDARD.decode(&req.keytab) {
        Ok(bytes) => bytes,
        Err(_) => return error_response("rotation rejected", CoreError::invalid_input("keytab is not valid base64")),
    };

    match state.center.rotate_keytab(&bytes) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response("rotation rejected", err),
    }
}

//----------- Health & metrics ------------------------------------------------

#[derive(Serialize)]
struct Health {
    config_present: bool,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health { config_present: state.center.current().is_some() })
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.center.metrics.assemble() {
        Ok(body) => {
            let mut response = body.into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));
            response
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
