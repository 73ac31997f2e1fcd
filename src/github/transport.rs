use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};

use crate::config::Credential;
use crate::error::{Error, Result};

/// What the fetch engine needs to know about one HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Response {
    /// Map a non-2xx status onto the error taxonomy.
    pub fn check(&self, url: &str) -> Result<()> {
        match self.status {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(Error::Auth(format!(
                "credential rejected by {}",
                url
            ))),
            StatusCode::FORBIDDEN if self.rate_limit_exhausted() => Err(Error::request(
                url,
                "rate limit exceeded (X-RateLimit-Remaining: 0)",
            )),
            StatusCode::FORBIDDEN => Err(Error::Auth(format!(
                "access to {} is forbidden: {}",
                url,
                excerpt(&self.body)
            ))),
            status => Err(Error::request(
                url,
                format!("{} - {}", status, excerpt(&self.body)),
            )),
        }
    }

    fn rate_limit_exhausted(&self) -> bool {
        self.headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() == "0")
            .unwrap_or(false)
    }
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Issues GET requests on behalf of the fetch engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `timeout` bounds the whole request, body included.
    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<Response>;
}

/// `reqwest`-backed transport carrying the session credential.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(credential: &Credential) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(authorization) = credential.authorization() {
            let mut value = HeaderValue::from_str(&authorization)?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json;charset=UTF-8"),
        );
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(concat!("github-wdc/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<Response> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    url: url.to_string(),
                }
            } else {
                Error::request(url, e.to_string())
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    Error::request(url, format!("failed to read body: {}", e))
                }
            })?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
