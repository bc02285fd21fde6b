//! Reqwest-based implementation of the `PortalHttpClient` trait.
//!
//! One `reqwest::Client` with its cookie jar represents the single portal
//! identity owned by a [`crate::FusionSolarClient`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};

use super::transport::{
    PortalHttpClient, PortalRequest, PortalResponse, RequestBody, TransportError,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reqwest-backed cookie session.
pub struct ReqwestPortalClient {
    client: Client,
}

impl ReqwestPortalClient {
    /// Creates a client with a cookie store and the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/html;q=0.9, */*;q=0.8"),
        );

        let client = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Request(err.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client. It must have a cookie store enabled,
    /// otherwise the login will not survive to the next request.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PortalHttpClient for ReqwestPortalClient {
    async fn execute(&self, request: PortalRequest) -> Result<PortalResponse, TransportError> {
        let PortalRequest {
            method,
            url,
            query,
            headers,
            body,
        } = request;

        log::debug!("-> {} {}", method, url);

        let mut builder = self.client.request(method.clone(), url.clone()).headers(headers);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(fields) => builder.form(&fields),
        };

        let response = builder
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let final_url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;

        log::debug!("<- {} {} -> {}", method, final_url, status);

        Ok(PortalResponse {
            status,
            headers,
            body,
            url: final_url,
        })
    }
}
