use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::config::{Config, Credential, FetchOptions, DEFAULT_API_URL};
use crate::error::{Error, Result};
use crate::github::paginator::Paginator;
use crate::github::rate_limiter::{RateLimitBody, RateLimitState, RateLimiter};
use crate::github::transport::{HttpTransport, Transport};
use crate::models::Record;

const DEFAULT_CONCURRENCY: usize = 5;

pub struct GitHubClient {
    transport: Arc<dyn Transport>,
    rate_limiter: RateLimiter,
    base_url: String,
    concurrency_limit: usize,
}

impl GitHubClient {
    pub fn new(credential: &Credential) -> Result<Self> {
        Ok(Self::with_transport(
            Arc::new(HttpTransport::new(credential)?),
            DEFAULT_API_URL,
        ))
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::with_transport(
            Arc::new(HttpTransport::new(&config.credential)?),
            config.api_url.clone(),
        )
        .with_concurrency_limit(config.concurrency_limit))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            rate_limiter: RateLimiter::new(),
            base_url: base_url.into(),
            concurrency_limit: DEFAULT_CONCURRENCY,
        }
    }

    /// At most `limit` URL chains are fetched at the same time.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Call `GET /rate_limit`, which also proves the credential is accepted.
    pub async fn get_rate_limit(&self) -> Result<RateLimitState> {
        let url = format!("{}/rate_limit", self.base_url.trim_end_matches('/'));
        tracing::info!("Checking GitHub rate limit");

        let response = self.transport.get(&url, None).await?;
        response.check(&url)?;

        let body: RateLimitBody = serde_json::from_str(&response.body)
            .map_err(|e| Error::request(&url, format!("unexpected rate limit body: {}", e)))?;
        let state = RateLimitState::from(body);
        self.rate_limiter.record(state);

        Ok(state)
    }

    /// Fetch one URL and all of its follow-up pages.
    pub async fn fetch_all(&self, url: &str, options: &FetchOptions) -> Result<Vec<Record>> {
        Paginator::new(self.transport.as_ref(), &self.rate_limiter)
            .fetch_all(url, options)
            .await
    }

    /// Fetch every URL with at most `concurrency_limit` chains in flight.
    ///
    /// Records are concatenated in the order chains complete. The first failing
    /// chain aborts the others and its error is returned.
    pub async fn fetch_many(&self, urls: &[String], options: &FetchOptions) -> Result<Vec<Record>> {
        let paginator = Paginator::new(self.transport.as_ref(), &self.rate_limiter);
        tracing::info!(
            "Fetching {} URL(s) with concurrency {}",
            urls.len(),
            self.concurrency_limit
        );

        let mut chains = stream::iter(urls)
            .map(|url| paginator.fetch_all(url, options))
            .buffer_unordered(self.concurrency_limit);

        let mut raw = Vec::new();
        while let Some(batch) = chains.try_next().await? {
            raw.extend(batch);
        }

        if let Some(max_rows) = options.max_rows {
            raw.truncate(max_rows);
        }

        Ok(raw)
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}
