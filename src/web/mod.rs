//! HTTP realisation of the exported objects.
//!
//! Every exported object gets a path prefix. Methods are `POST` routes,
//! properties are `GET` routes and property-changed signals are streamed as
//! server-sent events.

pub mod handlers;

use crate::core::RegistryError;
use crate::service::{LoginMessages, RegistryService, UserSnapshot};
use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub machines: RegistryService,
    pub login_messages: Arc<LoginMessages>,
    pub user: Arc<UserSnapshot>,
}

impl AppState {
    pub fn new(
        machines: RegistryService,
        login_messages: LoginMessages,
        user: UserSnapshot,
    ) -> Self {
        Self {
            machines,
            login_messages: Arc::new(login_messages),
            user: Arc::new(user),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::healthcheck))
        .route("/LoginMessages/get", post(handlers::get_login_messages))
        .route("/LoginMessages/dismiss", post(handlers::dismiss_login_messages))
        .route("/machines/records", get(handlers::get_records))
        .route("/machines/update", post(handlers::update_record))
        .route("/machines/changes", get(handlers::watch_changes))
        .route("/user", get(handlers::get_user))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Registry(RegistryError),
}

impl From<RegistryError> for WebError {
    fn from(err: RegistryError) -> Self {
        WebError::Registry(err)
    }
}

impl WebError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            WebError::Registry(RegistryError::InvalidFilename(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_input")
            }
            WebError::Registry(RegistryError::CorruptFragment { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_format")
            }
            WebError::Registry(RegistryError::Io { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "io_error")
            }
            WebError::Registry(RegistryError::ServiceStopped) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
            WebError::Registry(RegistryError::Watch(_) | RegistryError::Task(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let WebError::Registry(err) = self;
        let message = err.to_string();

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
