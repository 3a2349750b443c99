use crate::validation::ValidationErrors;
use actix_web::{HttpResponse, ResponseError, error::BlockingError, http::StatusCode, http::header};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid input")]
    Validation(ValidationErrors),
    #[error("{0}")]
    BadRequest(String),
    #[error("Method \"{0}\" not allowed.")]
    MethodNotAllowed(String),
    #[error("Unsupported media type \"{0}\" in request.")]
    UnsupportedMediaType(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("A server error occurred.")]
    Internal,
}

#[derive(Serialize)]
struct ApiErrBody {
    detail: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Storage(_) | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut resp = HttpResponse::build(self.status_code());
        match self {
            ApiError::Validation(errors) => resp.json(errors),
            ApiError::MethodNotAllowed(_) => resp
                .insert_header((header::ALLOW, "POST"))
                .json(ApiErrBody { detail: self.to_string() }),
            // Storage details stay in the log, clients get the generic message.
            ApiError::Storage(_) => resp.json(ApiErrBody {
                detail: ApiError::Internal.to_string(),
            }),
            _ => resp.json(ApiErrBody { detail: self.to_string() }),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self {
        ApiError::Validation(e)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        log::error!("db error: {e:?}");
        ApiError::Internal
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        log::error!("storage error: {e:?}");
        ApiError::Storage(e.to_string())
    }
}

impl From<BlockingError> for ApiError {
    fn from(e: BlockingError) -> Self {
        log::error!("blocking task failed: {e}");
        ApiError::Internal
    }
}
