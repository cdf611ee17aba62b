use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

use crate::models::ErrorMessage;
use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

/// Domain errors. Each kind maps to exactly one HTTP status.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    SelfAction(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Invalid request: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("Internal error")]
    Internal,
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::AlreadyExists(msg) => AppError::AlreadyExists(msg),
            other => {
                log::error!("Store failure: {}", other);
                AppError::Internal
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::SelfAction(_) | AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());
        match self {
            AppError::Validation(messages) => response.json(
                messages
                    .iter()
                    .map(|msg| ErrorMessage { msg: msg.clone() })
                    .collect::<Vec<_>>(),
            ),
            other => response.json(ErrorMessage {
                msg: other.to_string(),
            }),
        }
    }
}
