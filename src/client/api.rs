//! Typed calls to the equipstat HTTP API.

use super::issuer::HttpIssuer;
use super::session::{CredentialPair, ResilientClient};
use super::transport::{ApiRequest, HttpTransport, RequestBody};
use super::ClientError;
use crate::models::AggregateEnvelope;

use std::sync::Arc;

use bytes::Bytes;
use url::Url;

/// A downloaded report document.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportDocument {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Client for the equipstat HTTP API.
#[derive(Debug)]
pub struct EquipStatClient {
    session: ResilientClient,
}

impl EquipStatClient {
    /// Create a client for the server at `base_url` using reqwest.
    pub fn new(base_url: Url) -> Self {
        let http = reqwest::Client::new();
        let transport = HttpTransport::new(base_url.clone(), http.clone());
        let issuer = HttpIssuer::new(base_url, http);
        Self::with_session(ResilientClient::new(Arc::new(transport), Arc::new(issuer)))
    }

    /// Create a client over an existing session.
    pub fn with_session(session: ResilientClient) -> Self {
        Self { session }
    }

    /// The underlying session.
    pub fn session(&self) -> &ResilientClient {
        &self.session
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<CredentialPair, ClientError> {
        self.session.login(username, password).await
    }

    pub fn logout(&self) {
        self.session.logout()
    }

    /// Upload a CSV table and return the envelope summarising it.
    pub async fn upload_csv(
        &self,
        file_name: &str,
        bytes: impl Into<Bytes>,
    ) -> Result<AggregateEnvelope, ClientError> {
        let request = ApiRequest::post(
            "/upload",
            RequestBody::Csv {
                file_name: file_name.to_string(),
                bytes: bytes.into(),
            },
        );
        self.session.execute(&request).await?.json()
    }

    /// Returns the retained envelopes, most recent first.
    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<AggregateEnvelope>, ClientError> {
        let target = match limit {
            Some(limit) => format!("/history?limit={}", limit),
            None => "/history".to_string(),
        };
        self.session.execute(&ApiRequest::get(target)).await?.json()
    }

    /// Returns a single retained envelope.
    pub async fn dataset(&self, id: u64) -> Result<AggregateEnvelope, ClientError> {
        self.session
            .execute(&ApiRequest::get(format!("/datasets/{}", id)))
            .await?
            .json()
    }

    /// Download the rendered report of a retained envelope.
    pub async fn download_report(&self, id: u64) -> Result<ReportDocument, ClientError> {
        let response = self
            .session
            .execute(&ApiRequest::get(format!("/datasets/{}/report", id)))
            .await?;
        Ok(ReportDocument {
            content_type: response.content_type,
            bytes: response.body,
        })
    }
}
