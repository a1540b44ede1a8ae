//! Request handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::chain::ConnectionState;
use crate::http::AppState;

/// `GET /fund?to=<address>`. Query keys match case-insensitively.
pub async fn fund(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let address = params
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("to"))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty());

    let Some(address) = address else {
        return (StatusCode::BAD_REQUEST, "Must provide a valid address").into_response();
    };

    match state.pipeline.fund(address).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(error) => error.into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub network: String,
    pub connection: &'static str,
    pub tracked_addresses: usize,
}

/// `GET /health`. Always 200; a missing node connection reports `degraded`.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let connection = state.connection.state();
    let status = if connection == ConnectionState::Connected {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        network: state.network_name.clone(),
        connection: connection.as_str(),
        tracked_addresses: state.limiter.tracked_addresses(),
    })
}
