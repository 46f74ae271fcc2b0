use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use super::v0;
use crate::api_client::types::{ErrorBody, GovernorStatus};
use crate::tracing::prelude::*;
use crate::tunables::{TunableError, Tunables};

#[derive(OpenApi)]
#[openapi(info(
    title = "thermgov",
    description = "Thermal governor status and tunables"
))]
struct ApiDoc;

/// State handed to every handler.
#[derive(Clone)]
pub struct SharedState {
    pub tunables: Arc<Tunables>,
    pub status_rx: watch::Receiver<GovernorStatus>,
}

impl SharedState {
    pub fn status(&self) -> GovernorStatus {
        self.status_rx.borrow().clone()
    }
}

/// Tunable failures mapped onto HTTP statuses.
#[derive(Debug)]
pub struct ApiError(pub TunableError);

impl From<TunableError> for ApiError {
    fn from(e: TunableError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.0 {
            TunableError::InvalidInput(_) | TunableError::OutOfRange { .. } => {
                StatusCode::BAD_REQUEST
            }
            TunableError::UnknownTunable(_) => StatusCode::NOT_FOUND,
            TunableError::PermanentlyLocked(_) => StatusCode::LOCKED,
            TunableError::Unavailable(..) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the full application router.
pub fn router(state: SharedState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api/v0", v0::routes())
        .split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `addr` until `cancellation` fires.
pub async fn serve(
    addr: SocketAddr,
    state: SharedState,
    cancellation: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancellation.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}
