use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use iothub_device_client::sas::SasToken;
use tracing::warn;

use super::handlers::unauthorized;
use super::types::ErrorResponse;
use super::ApiState;

type AuthResult = Result<(), (StatusCode, Json<ErrorResponse>)>;

/// Device routes accept tokens signed with that device's own key.
pub fn authorize_device(state: &ApiState, headers: &HeaderMap, device_id: &str) -> AuthResult {
    let key = state
        .store
        .device(device_id)
        .map(|identity| identity.primary_key)
        .ok_or_else(|| unauthorized("unknown_device", "device is not registered"))?;
    let resource = format!("{}/devices/{device_id}", state.config.host_name);
    check(headers, &key, &resource, "device")
}

/// Registry and cloud-to-device routes accept the service key.
pub fn authorize_service(state: &ApiState, headers: &HeaderMap) -> AuthResult {
    check(
        headers,
        &state.config.service_key,
        &state.config.host_name,
        "service",
    )
}

/// Event-hub reads accept the listen key.
pub fn authorize_listener(state: &ApiState, headers: &HeaderMap) -> AuthResult {
    check(
        headers,
        &state.config.listen_key,
        &state.config.host_name,
        "listener",
    )
}

fn check(headers: &HeaderMap, key: &str, resource: &str, role: &'static str) -> AuthResult {
    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| unauthorized("missing_token", "authorization header is required"))?;

    let token = SasToken::parse(raw).map_err(|err| {
        warn!(role, error = %err, "rejected malformed token");
        unauthorized("malformed_token", &err.to_string())
    })?;

    token
        .verify(key, resource, Utc::now().timestamp())
        .map_err(|err| {
            warn!(role, resource, error = %err, "token verification failed");
            unauthorized("invalid_token", &err.to_string())
        })
}
