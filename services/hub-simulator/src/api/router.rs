use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::link;
use super::ApiState;

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/devices/:device_id/messages/events", post(handlers::post_event))
        .route(
            "/devices/:device_id/messages/devicebound",
            get(handlers::receive_c2d),
        )
        .route(
            "/devices/:device_id/messages/devicebound/:lock_token",
            delete(handlers::settle_c2d),
        )
        .route(
            "/devices/:device_id/messages/devicebound/:lock_token/abandon",
            post(handlers::abandon_c2d),
        )
        .route("/devices/:device_id/amqp", get(link::device_link))
        .route(
            "/registry/devices/:device_id",
            put(handlers::register_device)
                .get(handlers::get_device)
                .delete(handlers::remove_device),
        )
        .route(
            "/service/devices/:device_id/messages",
            post(handlers::send_c2d),
        )
        .route("/eventhub/partitions", get(handlers::list_partitions))
        .route(
            "/eventhub/partitions/:partition/events",
            get(handlers::read_events),
        )
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
