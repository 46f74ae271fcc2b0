//! API v0 endpoints.
//!
//! Version 0 signals an unstable API; breaking changes are expected
//! until the governor reaches 1.0.

use axum::{
    Json,
    extract::{Path, State},
};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::server::{ApiError, SharedState};
use crate::api_client::types::{ErrorBody, GovernorStatus, TunableValue, TunableWrite};
use crate::tracing::prelude::*;
use crate::tunables::Tunables;

/// Build the v0 API routes with OpenAPI metadata.
pub fn routes() -> OpenApiRouter<SharedState> {
    OpenApiRouter::new()
        .routes(routes!(health))
        .routes(routes!(get_status))
        .routes(routes!(get_tunables))
        .routes(routes!(get_tunable, put_tunable))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = OK, description = "Server is running", body = String),
    ),
)]
async fn health() -> &'static str {
    "OK"
}

/// Return the status published after the last control tick.
#[utoipa::path(
    get,
    path = "/status",
    tag = "status",
    responses(
        (status = OK, description = "Current governor status", body = GovernorStatus),
    ),
)]
async fn get_status(State(state): State<SharedState>) -> Json<GovernorStatus> {
    Json(state.status())
}

/// Return every tunable with its current value.
#[utoipa::path(
    get,
    path = "/tunables",
    tag = "tunables",
    responses(
        (status = OK, description = "All tunables", body = Vec<TunableValue>),
    ),
)]
async fn get_tunables(State(state): State<SharedState>) -> Json<Vec<TunableValue>> {
    Json(
        state
            .tunables
            .read_all()
            .into_iter()
            .map(|(tunable, value)| TunableValue {
                name: tunable.to_string(),
                value,
            })
            .collect(),
    )
}

/// Return one tunable by name.
#[utoipa::path(
    get,
    path = "/tunables/{name}",
    tag = "tunables",
    params(
        ("name" = String, Path, description = "Tunable name"),
    ),
    responses(
        (status = OK, description = "Tunable value", body = TunableValue),
        (status = NOT_FOUND, description = "Unknown tunable", body = ErrorBody),
    ),
)]
async fn get_tunable(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<TunableValue>, ApiError> {
    let tunable = Tunables::lookup(&name)?;
    Ok(Json(TunableValue {
        name: tunable.to_string(),
        value: state.tunables.read(tunable),
    }))
}

/// Write one tunable. The value is a decimal string.
#[utoipa::path(
    put,
    path = "/tunables/{name}",
    tag = "tunables",
    params(
        ("name" = String, Path, description = "Tunable name"),
    ),
    request_body = TunableWrite,
    responses(
        (status = OK, description = "Value after the write", body = TunableValue),
        (status = BAD_REQUEST, description = "Malformed or out-of-range value", body = ErrorBody),
        (status = NOT_FOUND, description = "Unknown tunable", body = ErrorBody),
        (status = LOCKED, description = "Tunable permanently locked", body = ErrorBody),
        (status = CONFLICT, description = "Tunable currently unavailable", body = ErrorBody),
    ),
)]
async fn put_tunable(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(req): Json<TunableWrite>,
) -> Result<Json<TunableValue>, ApiError> {
    let tunable = Tunables::lookup(&name)?;
    if let Err(e) = state.tunables.write(tunable, &req.value).await {
        warn!(tunable = %tunable, value = %req.value, error = %e, "Tunable write rejected");
        return Err(e.into());
    }
    info!(tunable = %tunable, value = %req.value.trim(), "Tunable written");

    Ok(Json(TunableValue {
        name: tunable.to_string(),
        value: state.tunables.read(tunable),
    }))
}
