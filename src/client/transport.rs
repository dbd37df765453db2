//! Request/response channel to the server.

use super::ClientError;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Method};
use serde::de::DeserializeOwned;
use url::Url;

/// Body of an [ApiRequest].
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    /// A CSV file sent as the `file` part of a multipart form
    Csv { file_name: String, bytes: Bytes },
}

/// A request to the API, independent of the credentials it is sent with.
///
/// A request may be sent more than once, so it is passed by reference and never consumed.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path and query relative to the server base URL, e.g. `/history?limit=5`
    pub target: String,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn get(target: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            target: target.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn post(target: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method: Method::POST,
            target: target.into(),
            body,
        }
    }
}

/// A response from the API.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl ApiResponse {
    /// Unauthorized: the access token is missing, invalid or expired.
    pub const UNAUTHORIZED: u16 = 401;

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialise the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Sends [ApiRequest]s, optionally authenticated by a bearer token.
///
/// Any response received, whatever its status, is `Ok`; errors mean no response was received.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<ApiResponse, ClientError>;
}

/// [Transport] over HTTP(S) using reqwest.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: Url, http: reqwest::Client) -> Self {
        Self { base_url, http }
    }
}

fn transport_error(error: impl Into<crate::error::BoxError>) -> ClientError {
    ClientError::Transport(error.into())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        let url = self
            .base_url
            .join(&request.target)
            .map_err(transport_error)?;
        let mut builder = self.http.request(request.method.clone(), url);
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Csv { file_name, bytes } => {
                let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                    .file_name(file_name.clone())
                    .mime_str("text/csv")
                    .map_err(transport_error)?;
                builder.multipart(reqwest::multipart::Form::new().part("file", part))
            }
        };
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(transport_error)?;
        tracing::debug!(
            method = %request.method,
            path = %request.target,
            status,
            "Received response"
        );
        Ok(ApiResponse {
            status,
            content_type,
            body,
        })
    }
}
