use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::ETAG, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::DateTime;
use tracing::{error, info};

use super::auth::{authorize_device, authorize_listener, authorize_service};
use super::types::{
    ErrorResponse, EventBatch, EventData, EventsQuery, PartitionsResponse, RegisterDeviceRequest,
    SendC2dRequest, SendC2dResponse,
};
use super::ApiState;
use crate::store::{CloudMessage, DeviceIdentity, EventQuery, HubError, NewMessage};

const HEADER_MESSAGE_ID: &str = "iothub-messageid";
const HEADER_CORRELATION_ID: &str = "iothub-correlationid";
const HEADER_APP_PREFIX: &str = "iothub-app-";

const MAX_EVENTS_PER_READ: usize = 500;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn post_event(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    authorize_device(&state, &headers, &device_id)?;
    if body.is_empty() {
        return Err(bad_request("empty_event", "event body cannot be empty"));
    }

    let message = message_from_headers(&headers, body);
    state
        .store
        .enqueue_event(&device_id, message)
        .map_err(hub_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn receive_c2d(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authorize_device(&state, &headers, &device_id)?;

    let Some((lock_token, cloud)) = state.store.receive_c2d(&device_id).map_err(hub_error)? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let response_headers = match delivery_headers(&lock_token, &cloud) {
        Ok(headers) => headers,
        Err(rejection) => {
            if let Err(err) = state.store.release_c2d(&device_id, &lock_token) {
                error!(%device_id, error = %err, "undeliverable message not released");
            }
            return Err(rejection);
        }
    };

    Ok((StatusCode::OK, response_headers, cloud.message.body).into_response())
}

fn delivery_headers(lock_token: &str, cloud: &CloudMessage) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(ETAG, header_value(&format!("\"{lock_token}\""))?);
    headers.insert(HEADER_MESSAGE_ID, header_value(&cloud.message_id)?);
    if let Some(id) = &cloud.message.correlation_id {
        headers.insert(HEADER_CORRELATION_ID, header_value(id)?);
    }
    for (name, value) in &cloud.message.properties {
        let name = HeaderName::try_from(format!("{HEADER_APP_PREFIX}{name}"))
            .map_err(internal_error)?;
        headers.insert(name, header_value(value)?);
    }
    Ok(headers)
}

pub async fn settle_c2d(
    State(state): State<Arc<ApiState>>,
    Path((device_id, lock_token)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    authorize_device(&state, &headers, &device_id)?;
    let result = if params.contains_key("reject") {
        state.store.reject_c2d(&device_id, &lock_token)
    } else {
        state.store.complete_c2d(&device_id, &lock_token)
    };
    result.map_err(hub_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn abandon_c2d(
    State(state): State<Arc<ApiState>>,
    Path((device_id, lock_token)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    authorize_device(&state, &headers, &device_id)?;
    state
        .store
        .abandon_c2d(&device_id, &lock_token)
        .map_err(hub_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn register_device(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    request: Option<Json<RegisterDeviceRequest>>,
) -> ApiResult<DeviceIdentity> {
    authorize_service(&state, &headers)?;
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let identity = state
        .store
        .register_device(&device_id, request.primary_key)
        .map_err(hub_error)?;
    Ok(Json(identity))
}

pub async fn get_device(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<DeviceIdentity> {
    authorize_service(&state, &headers)?;
    state
        .store
        .device(&device_id)
        .map(Json)
        .ok_or_else(|| not_found("device_not_found", "device is not registered"))
}

pub async fn remove_device(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    authorize_service(&state, &headers)?;
    state.store.remove_device(&device_id).map_err(hub_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_c2d(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SendC2dRequest>,
) -> ApiResult<SendC2dResponse> {
    authorize_service(&state, &headers)?;
    let body = STANDARD
        .decode(&request.body)
        .map_err(|_| bad_request("invalid_body", "body must be base64"))?;
    if body.is_empty() {
        return Err(bad_request("empty_message", "message body cannot be empty"));
    }

    let message_id = state
        .store
        .send_c2d(
            &device_id,
            NewMessage {
                body: body.into(),
                message_id: request.message_id,
                correlation_id: request.correlation_id,
                properties: request.properties,
            },
        )
        .map_err(hub_error)?;

    info!(%device_id, %message_id, "cloud-to-device message accepted");
    Ok(Json(SendC2dResponse { message_id }))
}

pub async fn list_partitions(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> ApiResult<PartitionsResponse> {
    authorize_listener(&state, &headers)?;
    Ok(Json(PartitionsResponse {
        partition_count: state.store.partition_count(),
        partitions: state.store.partition_info(),
    }))
}

pub async fn read_events(
    State(state): State<Arc<ApiState>>,
    Path(partition): Path<u32>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> ApiResult<EventBatch> {
    authorize_listener(&state, &headers)?;

    let enqueued_after = match query.enqueued_after_ms {
        Some(millis) => Some(DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            bad_request("invalid_time", "enqueued_after_ms is out of range")
        })?),
        None => None,
    };
    let from_sequence = query.from_sequence.unwrap_or(0);
    let events = state
        .store
        .read_events(
            partition,
            &EventQuery {
                from_sequence,
                enqueued_after,
                max_count: query.max_count.unwrap_or(100).clamp(1, MAX_EVENTS_PER_READ),
            },
        )
        .map_err(hub_error)?;

    let next_sequence = events
        .last()
        .map_or(from_sequence, |event| event.sequence_number + 1);
    Ok(Json(EventBatch {
        partition,
        events: events.into_iter().map(EventData::from).collect(),
        next_sequence,
    }))
}

pub async fn health_check(State(state): State<Arc<ApiState>>) -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "iothub-simulator",
        "host_name": state.config.host_name,
        "partition_count": state.store.partition_count(),
    })))
}

fn message_from_headers(headers: &HeaderMap, body: Bytes) -> NewMessage {
    let mut properties = BTreeMap::new();
    let mut message_id = None;
    let mut correlation_id = None;

    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        let name = name.as_str();
        if name == HEADER_MESSAGE_ID {
            message_id = Some(value.to_string());
        } else if name == HEADER_CORRELATION_ID {
            correlation_id = Some(value.to_string());
        } else if let Some(property) = name.strip_prefix(HEADER_APP_PREFIX) {
            properties.insert(property.to_string(), value.to_string());
        }
    }

    NewMessage {
        body,
        message_id,
        correlation_id,
        properties,
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(internal_error)
}

pub(crate) fn hub_error(err: HubError) -> ApiError {
    let (status, code) = match &err {
        HubError::DeviceNotFound(_) => (StatusCode::NOT_FOUND, "device_not_found"),
        HubError::InvalidDeviceId(_) => (StatusCode::BAD_REQUEST, "invalid_device_id"),
        HubError::InvalidPartition { .. } => (StatusCode::BAD_REQUEST, "invalid_partition"),
        HubError::LockNotFound { .. } => (StatusCode::PRECONDITION_FAILED, "lock_lost"),
        HubError::InvalidKey(_) => (StatusCode::BAD_REQUEST, "invalid_key"),
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

pub(crate) fn bad_request(code: &str, message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

pub(crate) fn not_found(code: &str, message: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

pub(crate) fn unauthorized(code: &str, message: &str) -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

fn internal_error<E: std::fmt::Display>(err: E) -> ApiError {
    error!(error = %err, "hub API internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal server error".to_string(),
            code: "internal_error".to_string(),
            details: Some(serde_json::json!({ "message": err.to_string() })),
        }),
    )
}
