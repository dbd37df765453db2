//! Client for the equipstat HTTP API.
//!
//! [session::ResilientClient] owns a credential pair and transparently refreshes it when the
//! server reports that the access token has expired. It talks to the server through a
//! [transport::Transport] and obtains tokens from an [issuer::Issuer]; [api::EquipStatClient]
//! wires both to reqwest and exposes typed calls.

pub mod api;
pub mod issuer;
pub mod session;
pub mod transport;

pub use api::EquipStatClient;
pub use issuer::{HttpIssuer, Issuer};
pub use session::{CredentialPair, ResilientClient, Session};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, RequestBody, Transport};

use crate::error::BoxError;

use thiserror::Error;

/// Failure to obtain a token pair from an [Issuer].
#[derive(Debug, Error)]
pub enum IssuerError {
    /// The issuer refused the credentials or refresh token
    #[error("credentials rejected: {0}")]
    Rejected(String),

    /// The issuer could not be reached or answered unexpectedly
    #[error("token issuer unavailable")]
    Unavailable(#[source] BoxError),

    /// The issuer did not answer within the refresh timeout
    #[error("token issuer timed out")]
    Timeout,
}

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// Login failed
    #[error("login failed")]
    Authentication(#[source] IssuerError),

    /// Refresh requested without a refresh token
    #[error("no refresh token available, log in first")]
    NoRefreshToken,

    /// The issuer did not refresh the token pair
    #[error("token refresh failed")]
    RefreshFailed(#[source] IssuerError),

    /// The access token expired and could not be refreshed
    #[error("session expired, log in again")]
    SessionExpired,

    /// The request could not be sent or its response not received
    #[error("request failed")]
    Transport(#[source] BoxError),

    /// The server answered with an error status
    #[error("server responded with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body did not have the expected shape
    #[error("failed to decode response")]
    Decode(#[from] serde_json::Error),
}

/// What a caller should do about a [ClientError].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// The request was rejected as invalid; correct it before sending again
    FixInput,
    /// A transient failure; the same request may succeed later
    TryAgain,
    /// The session is unusable; log in again
    LogInAgain,
    Other,
}

impl ClientError {
    /// Returns the recovery action for this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            ClientError::Authentication(IssuerError::Rejected(_)) => ErrorClass::FixInput,
            ClientError::Authentication(_) => ErrorClass::TryAgain,
            ClientError::NoRefreshToken
            | ClientError::RefreshFailed(_)
            | ClientError::SessionExpired => ErrorClass::LogInAgain,
            ClientError::Transport(_) => ErrorClass::TryAgain,
            ClientError::Status { status, .. } => match status {
                401 | 403 => ErrorClass::LogInAgain,
                408 | 429 | 500..=599 => ErrorClass::TryAgain,
                400..=499 => ErrorClass::FixInput,
                _ => ErrorClass::Other,
            },
            ClientError::Decode(_) => ErrorClass::Other,
        }
    }

    /// Build a [ClientError::Status] from an error response.
    pub(crate) fn status(status: u16, body: &[u8]) -> Self {
        ClientError::Status {
            status,
            message: error_message(body),
        }
    }
}

/// Extract the message from a server error body.
///
/// Error responses are JSON of the form `{"error": {"message": ...}}`; anything else is returned
/// as (lossily decoded) text.
pub(crate) fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classes() {
        let status = |status| ClientError::Status {
            status,
            message: String::new(),
        };
        assert_eq!(ErrorClass::FixInput, status(400).class());
        assert_eq!(ErrorClass::FixInput, status(404).class());
        assert_eq!(ErrorClass::LogInAgain, status(401).class());
        assert_eq!(ErrorClass::TryAgain, status(429).class());
        assert_eq!(ErrorClass::TryAgain, status(503).class());
        assert_eq!(ErrorClass::Other, status(302).class());
        assert_eq!(ErrorClass::LogInAgain, ClientError::SessionExpired.class());
        assert_eq!(ErrorClass::LogInAgain, ClientError::NoRefreshToken.class());
        assert_eq!(
            ErrorClass::LogInAgain,
            ClientError::RefreshFailed(IssuerError::Timeout).class()
        );
        assert_eq!(
            ErrorClass::FixInput,
            ClientError::Authentication(IssuerError::Rejected("bad".into())).class()
        );
        assert_eq!(
            ErrorClass::TryAgain,
            ClientError::Authentication(IssuerError::Unavailable("down".into())).class()
        );
        assert_eq!(
            ErrorClass::TryAgain,
            ClientError::Transport("connection reset".into()).class()
        );
    }

    #[test]
    fn error_message_from_json_body() {
        let body = br#"{"error": {"message": "dataset 4 not found"}}"#;
        assert_eq!("dataset 4 not found", error_message(body));
    }

    #[test]
    fn error_message_from_text_body() {
        assert_eq!("Bad Gateway", error_message(b"Bad Gateway\n"));
        assert_eq!("{}", error_message(b"{}"));
    }

    #[test]
    fn status_error_display() {
        let error = ClientError::status(404, br#"{"error": {"message": "dataset 4 not found"}}"#);
        assert_eq!(
            "server responded with status 404: dataset 4 not found",
            error.to_string()
        );
    }
}
