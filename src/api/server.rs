use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::*;
use crate::api::middleware::verify_internal_ident;
use crate::scoring::{Engine, EngineError};

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub internal_token: &'static str,
}

pub fn router(state: Arc<AppState>) -> Router {
    let internal_routes = Router::new()
        .route("/events/{event_id}/poll", post(poll_event))
        .route("/events/{event_id}/refresh", post(refresh_event))
        .route("/events/{event_id}/sync", post(sync_event))
        .route("/events/{event_id}/tracking", delete(reset_event))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            verify_internal_ident,
        ));

    Router::new()
        .merge(internal_routes)
        .route("/", get(|| async { Response::new(Body::empty()) }))
        .route("/checkhealth", get(|| async { "SERVER_OK" }))
        .route("/events/{event_id}/leaderboard", get(leaderboard))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .with_state(state)
}

/// Serves the api until `shutdown` is cancelled, letting in-flight requests finish.
#[instrument(skip(state, shutdown))]
pub async fn serve(
    state: Arc<AppState>,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), RouteError> {
    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    tracing::info!(
        server_url = &format!("http://127.0.0.1:{}", socket_addr.port()),
        "server ready"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, "error occurred inside route handler");
    }

    res
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    EngineError(#[from] EngineError),

    #[error("invalid event id '{0}'")]
    InvalidEvent(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let (status, message, err) = match &self {
            RouteError::EngineError(err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                err.to_string(),
                Some(self),
            ),

            RouteError::InvalidEvent(ident) => (
                StatusCode::BAD_REQUEST,
                format!("invalid event id '{ident}'"),
                None,
            ),

            RouteError::IoError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                Some(self),
            ),
        };

        let mut response = (status, Json(ErrorResponse { message })).into_response();
        if let Some(err) = err {
            response.extensions_mut().insert(Arc::new(err));
        }

        response
    }
}
