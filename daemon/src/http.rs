//! HTTP plumbing shared by all providers.
//!
//! Providers only describe requests as plain [`HttpRequest`] values; the
//! [`HttpTransport`] trait performs them. The daemon uses the reqwest-backed
//! [`ReqwestTransport`], tests use a scripted in-memory transport.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::HttpSettings;
use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Case-insensitive header lookup
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Performs a single HTTP exchange
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, FetchError>;
}

/// Apply the headers every outbound request carries
pub fn prepare(request: HttpRequest) -> HttpRequest {
    if request.header_value("cache-control").is_some() {
        request
    } else {
        request.header("cache-control", "no-cache")
    }
}

/// Send a prepared request, turning HTTP error statuses into [`FetchError::Status`]
pub async fn execute(
    transport: &dyn HttpTransport,
    request: HttpRequest,
) -> Result<HttpResponse, FetchError> {
    let request = prepare(request);
    let url = request.url.clone();
    log::debug!("{:?} {}", request.method, url);

    let response = transport.send(request).await?;
    log::debug!("{} -> {} ({} bytes)", url, response.status, response.body.len());

    if response.status >= 400 {
        return Err(FetchError::Status {
            status: response.status,
            url,
        });
    }

    Ok(response)
}

/// reqwest-backed transport used by the daemon
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse::new(status, body))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;

    #[test]
    fn test_prepare_adds_no_cache() {
        let req = prepare(HttpRequest::get("https://example.com"));
        assert_eq!(req.header_value("Cache-Control"), Some("no-cache"));
    }

    #[test]
    fn test_prepare_keeps_existing_cache_control() {
        let req = prepare(HttpRequest::get("https://example.com").header("Cache-Control", "max-age=60"));
        assert_eq!(req.header_value("cache-control"), Some("max-age=60"));
        assert_eq!(req.headers.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_maps_error_status() {
        let transport = ScriptedTransport::new().respond(404, "missing");
        let err = execute(&transport, HttpRequest::get("https://example.com/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_execute_passes_redirect_status() {
        let transport = ScriptedTransport::new().respond(330, "{}");
        let resp = execute(&transport, HttpRequest::post("https://example.com", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status, 330);
        assert_eq!(
            transport.requests()[0].header_value("cache-control"),
            Some("no-cache")
        );
    }
}
