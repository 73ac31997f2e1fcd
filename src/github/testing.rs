//! In-process transport for exercising the fetch engine without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, LINK};
use reqwest::StatusCode;
use tokio::time::{sleep, Duration};

use crate::error::Result;
use crate::github::transport::{Response, Transport};

/// Serves canned responses keyed by URL, matched exactly first and then by
/// the URL without its query string. Unknown URLs answer 404.
#[derive(Default)]
pub(crate) struct FakeTransport {
    routes: HashMap<String, Response>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requested: Mutex<Vec<String>>,
    last_timeout: Mutex<Option<Duration>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn json(self, url: &str, body: serde_json::Value) -> Self {
        self.page(url, 200, body, None)
    }

    pub(crate) fn page(
        mut self,
        url: &str,
        status: u16,
        body: serde_json::Value,
        next: Option<&str>,
    ) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(next) = next {
            let link = format!(r#"<{}>; rel="next""#, next);
            headers.insert(LINK, HeaderValue::from_str(&link).unwrap());
        }
        self.routes.insert(
            url.to_string(),
            Response {
                status: StatusCode::from_u16(status).unwrap(),
                headers,
                body: body.to_string(),
            },
        );
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    /// Timeout handed to the most recent request.
    pub(crate) fn last_timeout(&self) -> Option<Duration> {
        *self.last_timeout.lock().unwrap()
    }

    fn lookup(&self, url: &str) -> Response {
        let bare = url.split('?').next().unwrap_or(url);
        self.routes
            .get(url)
            .or_else(|| self.routes.get(bare))
            .cloned()
            .unwrap_or_else(|| Response {
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                body: r#"{"message": "Not Found"}"#.to_string(),
            })
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(url.to_string());
        *self.last_timeout.lock().unwrap() = timeout;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.lookup(url))
    }
}
