//! Token issuance as seen by the client.

use super::session::CredentialPair;
use super::{error_message, IssuerError};
use crate::models::{LoginRequest, RefreshRequest, TokenPair};

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

/// Issues and refreshes [CredentialPair]s.
#[async_trait]
pub trait Issuer: Send + Sync {
    /// Exchange a username and password for a token pair.
    async fn login(&self, username: &str, password: &str) -> Result<CredentialPair, IssuerError>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, IssuerError>;
}

/// [Issuer] backed by the server's token endpoints.
#[derive(Clone, Debug)]
pub struct HttpIssuer {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpIssuer {
    pub fn new(base_url: Url, http: reqwest::Client) -> Self {
        Self { base_url, http }
    }

    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<CredentialPair, IssuerError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| IssuerError::Unavailable(err.into()))?;
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| IssuerError::Unavailable(err.into()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| IssuerError::Unavailable(err.into()))?;
        if status.is_success() {
            let pair: TokenPair = serde_json::from_slice(&bytes)
                .map_err(|err| IssuerError::Unavailable(err.into()))?;
            Ok(pair.into())
        } else if status.is_client_error() {
            Err(IssuerError::Rejected(error_message(&bytes)))
        } else {
            Err(IssuerError::Unavailable(
                format!("status {}: {}", status, error_message(&bytes)).into(),
            ))
        }
    }
}

#[async_trait]
impl Issuer for HttpIssuer {
    async fn login(&self, username: &str, password: &str) -> Result<CredentialPair, IssuerError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.post("/api/token", &body).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, IssuerError> {
        let body = RefreshRequest {
            refresh: refresh_token.to_string(),
        };
        self.post("/api/token/refresh", &body).await
    }
}
