use crate::connector::ConnectorError;
use crate::db::DbError;
use crate::settings::SettingsError;
use crate::upsert::UpsertError;
use crate::workbook::WorkbookError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Everything a route handler can fail with.
///
/// Connector failures answer with a JSON `{"error": ...}` body; everything
/// else is a plain-text 500, the body being the error message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("could not read request body: {0}")]
    Body(String),
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("Error: {0}")]
    Database(#[from] DbError),
    #[error("Error: {0}")]
    Upsert(#[from] UpsertError),
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        log::error!("{self}");
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()).into_response(),
            AppError::Connector(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response(),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
        }
    }
}
