//! Remote rate limit authority client.
//!
//! The gatekeeper talks to the authority through the [`AuthorityClient`]
//! trait so tests (and alternative transports) can stand in for the HTTP
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{RemoteError, Result};
use crate::ratelimit::StatsSnapshot;

/// Header carrying the authority credential.
const API_KEY_HEADER: &str = "Gatehouse-Api-Key";

/// Contract with the remote rate limit authority.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Fetch current usage statistics for an API key and service.
    async fn check(&self, api_key: &str, service: &str) -> std::result::Result<StatsSnapshot, RemoteError>;

    /// Report a usage event, returning the authority-assigned event
    /// identifier (diagnostics only).
    async fn report(
        &self,
        api_key: &str,
        service: &str,
        event_type: &str,
        ip_address: &str,
    ) -> std::result::Result<String, RemoteError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckRequest<'a> {
    api_key: &'a str,
    service: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventRequest<'a> {
    api_key: &'a str,
    service: &'a str,
    event_type: &'a str,
    ip_address: &'a str,
}

#[derive(Deserialize)]
struct EventResponse {
    #[serde(rename = "eventID")]
    event_id: String,
}

/// HTTP implementation of [`AuthorityClient`].
pub struct HttpAuthorityClient {
    http: Client,
    endpoint_url: String,
    api_key: String,
}

impl HttpAuthorityClient {
    /// Create a client for the given endpoint with a bounded request
    /// timeout.
    pub fn new(
        endpoint_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint_url: endpoint_url.into(),
            api_key: api_key.into(),
        })
    }

    async fn post<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> std::result::Result<reqwest::Response, RemoteError> {
        let url = format!("{}/{}", self.endpoint_url.trim_end_matches('/'), path);
        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status));
        }
        Ok(response)
    }
}

fn classify_send_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout(error)
    } else {
        RemoteError::Connection(error)
    }
}

#[async_trait]
impl AuthorityClient for HttpAuthorityClient {
    async fn check(&self, api_key: &str, service: &str) -> std::result::Result<StatsSnapshot, RemoteError> {
        let response = self.post("check", &CheckRequest { api_key, service }).await?;
        response.json().await.map_err(RemoteError::Decode)
    }

    async fn report(
        &self,
        api_key: &str,
        service: &str,
        event_type: &str,
        ip_address: &str,
    ) -> std::result::Result<String, RemoteError> {
        let body = EventRequest {
            api_key,
            service,
            event_type,
            ip_address,
        };
        let response = self.post("event", &body).await?;
        let event: EventResponse = response.json().await.map_err(RemoteError::Decode)?;
        Ok(event.event_id)
    }
}
