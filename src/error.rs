// src/error.rs
use log::error;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use thiserror::Error;
use warp::http::StatusCode;
use warp::reject::Reject;
use warp::{Rejection, Reply};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("database connection lock poisoned")]
    LockPoisoned,
    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Rejection carried out of a handler when the store or loader fails.
#[derive(Debug)]
pub struct CustomError {
    pub message: String,
}

impl fmt::Display for CustomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CustomError {}

impl Reject for CustomError {}

impl From<AppError> for CustomError {
    fn from(err: AppError) -> Self {
        CustomError {
            message: err.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

pub async fn handle_rejection(err: Rejection) -> std::result::Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<CustomError>() {
        error!("Request failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.message.clone())
    } else if let Some(e) = err.find::<warp::filters::cors::CorsForbidden>() {
        (StatusCode::FORBIDDEN, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method Not Allowed".to_string(),
        )
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Unsupported Media Type".to_string(),
        )
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_string(),
        )
    };

    let body = warp::reply::json(&ErrorBody {
        code: status.as_u16(),
        message,
    });
    Ok(warp::reply::with_status(body, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_error_converts_into_rejection_message() {
        let err: CustomError = AppError::Config("bad port".to_string()).into();
        assert_eq!(err.to_string(), "invalid configuration: bad port");
    }

    #[tokio::test]
    async fn not_found_rejection_becomes_404_json() {
        let reply = handle_rejection(warp::reject::not_found())
            .await
            .unwrap()
            .into_response();
        assert_eq!(reply.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn custom_rejection_becomes_500_json() {
        let rejection = warp::reject::custom(CustomError {
            message: "store unavailable".to_string(),
        });
        let reply = handle_rejection(rejection).await.unwrap().into_response();
        assert_eq!(reply.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
