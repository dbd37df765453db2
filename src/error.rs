//! Error handling.

use axum::{
    extract::multipart::MultipartError,
    extract::multipart::MultipartRejection,
    extract::rejection::{JsonRejection, QueryRejection},
    http::header,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tokio::sync::AcquireError;
use tracing::{event, Level};

use crate::models::Field;

/// Boxed error returned by pluggable collaborators such as storage backends.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Equipment statistics server error type
///
/// This type encapsulates the various errors that may occur.
/// Each variant may result in a different API error response.
#[derive(Debug, Error)]
pub enum EquipStatError {
    /// Attempt to summarise a table without any rows
    #[error("cannot summarise an empty table")]
    EmptyInput,

    /// A required column is absent from every row or has no usable values
    #[error("column {field} is not usable: {reason}")]
    Schema { field: Field, reason: &'static str },

    /// Error decoding the uploaded CSV table
    #[error("failed to read CSV table")]
    CsvRead(#[from] csv::Error),

    /// Upload request without a file part
    #[error("CSV file not provided")]
    UploadMissing,

    /// Error reading a multipart upload
    #[error("failed to read multipart upload")]
    Multipart(#[from] MultipartError),

    /// Upload request that is not a multipart form
    #[error("upload must be a multipart form")]
    MultipartRejection(#[from] MultipartRejection),

    /// The envelope storage backend failed or could not be reached
    #[error("envelope storage is unavailable")]
    StorageUnavailable(#[source] BoxError),

    /// No retained envelope has the requested id
    #[error("dataset {id} not found")]
    NotFound { id: u64 },

    /// Missing, unknown or expired access token
    #[error("authentication credentials were not provided or have expired")]
    Unauthorized,

    /// Login with an unknown user or wrong password
    #[error("no active account found with the given credentials")]
    InvalidCredentials,

    /// Refresh with an unknown, used or expired refresh token
    #[error("refresh token is invalid or expired")]
    InvalidRefreshToken,

    /// Error deserialising request data
    #[error("request data is not valid")]
    RequestDataJsonRejection(#[from] JsonRejection),

    /// Error deserialising query parameters
    #[error("query parameters are not valid")]
    QueryRejection(#[from] QueryRejection),

    /// Error validating request data (single error)
    #[error("request data is not valid")]
    RequestDataValidationSingle(#[from] validator::ValidationError),

    /// Error validating request data (multiple errors)
    #[error("request data is not valid")]
    RequestDataValidation(#[from] validator::ValidationErrors),

    /// Insufficient memory to process request
    #[error("Insufficient memory to process request ({requested} > {total})")]
    InsufficientMemory { requested: usize, total: usize },

    /// Error acquiring a semaphore
    #[error("error acquiring resources")]
    SemaphoreAcquireError(#[from] AcquireError),

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    /// Error producing a report document
    #[error("failed to render report")]
    Render(#[source] BoxError),

    /// Error gathering or encoding metrics
    #[error("failed to export metrics")]
    Metrics(#[from] prometheus::Error),
}

impl EquipStatError {
    /// Wrap a backend failure as [EquipStatError::StorageUnavailable].
    pub fn storage<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::StorageUnavailable(error.into())
    }
}

impl From<sled::Error> for EquipStatError {
    fn from(error: sled::Error) -> Self {
        Self::storage(error)
    }
}

impl IntoResponse for EquipStatError {
    /// Convert from an `EquipStatError` into an [axum::response::Response].
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

/// Body of error response
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorBody {
    /// Main error message
    message: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    caused_by: Option<Vec<String>>,
}

impl ErrorBody {
    /// Return a new ErrorBody
    ///
    /// # Arguments
    ///
    /// * `error`: The error that occurred
    fn new<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        let message = error.to_string();
        let mut causes = Vec::new();
        let mut current = error.source();
        while let Some(source) = current {
            causes.push(source.to_string());
            current = source.source();
        }
        causes.dedup();
        let caused_by = if causes.is_empty() {
            None
        } else {
            Some(causes)
        };
        ErrorBody { message, caused_by }
    }
}

/// A response to send in error cases
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorResponse {
    /// HTTP status of the response
    #[serde(skip)]
    status: StatusCode,

    /// Response body
    error: ErrorBody,
}

impl ErrorResponse {
    /// Return a new ErrorResponse
    ///
    /// # Arguments
    ///
    /// * `status`: HTTP status of the response
    /// * `error`: The error that occurred. This will be formatted into a suitable `ErrorBody`
    fn new<E>(status: StatusCode, error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        ErrorResponse {
            status,
            error: ErrorBody::new(error),
        }
    }
}

impl From<EquipStatError> for ErrorResponse {
    /// Convert from an `EquipStatError` into an `ErrorResponse`.
    fn from(error: EquipStatError) -> Self {
        let status = match &error {
            // Bad request: the caller should fix their input.
            EquipStatError::EmptyInput
            | EquipStatError::Schema { .. }
            | EquipStatError::CsvRead(_)
            | EquipStatError::UploadMissing
            | EquipStatError::Multipart(_)
            | EquipStatError::MultipartRejection(_)
            | EquipStatError::RequestDataJsonRejection(_)
            | EquipStatError::QueryRejection(_)
            | EquipStatError::RequestDataValidationSingle(_)
            | EquipStatError::RequestDataValidation(_)
            | EquipStatError::InsufficientMemory { .. } => StatusCode::BAD_REQUEST,

            // Unauthorised: the caller should (re)authenticate.
            EquipStatError::Unauthorized
            | EquipStatError::InvalidCredentials
            | EquipStatError::InvalidRefreshToken => StatusCode::UNAUTHORIZED,

            // Not found
            EquipStatError::NotFound { .. } => StatusCode::NOT_FOUND,

            // Service unavailable: the caller may try again later.
            EquipStatError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            // Internal server error
            EquipStatError::SemaphoreAcquireError(_)
            | EquipStatError::TryFromInt(_)
            | EquipStatError::Render(_)
            | EquipStatError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let response = Self::new(status, &error);

        // Log server errors.
        if response.status.is_server_error() {
            event!(Level::ERROR, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::ERROR, "Caused by: {}", source.to_string());
                current = source.source();
            }
        }

        response
    }
}

impl IntoResponse for ErrorResponse {
    /// Convert from an `ErrorResponse` into an `axum::response::Response`.
    ///
    /// Renders the response as JSON.
    fn into_response(self) -> Response {
        let json_body = serde_json::to_string_pretty(&self);
        match json_body {
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialise error response: {}", err),
            )
                .into_response(),
            Ok(json_body) => (
                self.status,
                [(&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string())],
                json_body,
            )
                .into_response(),
        }
    }
}
