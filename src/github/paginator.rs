use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use reqwest::Url;
use serde_json::Value;
use tokio::time::{timeout_at, Instant};

use crate::config::FetchOptions;
use crate::error::{Error, Result};
use crate::github::rate_limiter::RateLimiter;
use crate::github::transport::{Response, Transport};
use crate::models::Record;

/// Field added to every fetched record naming the request it came from.
pub const REQUEST_URL_FIELD: &str = "_request_url";

/// Query parameters sent unless the caller or the URL says otherwise.
const DEFAULT_QUERY: [(&str, &str); 2] = [("sort", "updated"), ("per_page", "5000")];

static LINK_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]*)>;\s*rel="(\w*)""#).expect("link pattern is valid"));

/// Follows `Link: rel="next"` headers from one seed URL until exhausted.
pub struct Paginator<'a> {
    transport: &'a dyn Transport,
    rate_limiter: &'a RateLimiter,
}

impl<'a> Paginator<'a> {
    pub fn new(transport: &'a dyn Transport, rate_limiter: &'a RateLimiter) -> Self {
        Self {
            transport,
            rate_limiter,
        }
    }

    /// Fetch every page reachable from `url`, concatenated in page order.
    ///
    /// Stops early once `options.max_rows` records were collected, and fails
    /// with [`Error::Timeout`] once the deadline passes, including while a
    /// page request is still in flight.
    pub async fn fetch_all(&self, url: &str, options: &FetchOptions) -> Result<Vec<Record>> {
        let seed = with_query(url, &options.query)?;
        let mut all_items = Vec::new();
        let mut pages = 0usize;
        let mut next = Some(seed.clone());

        while let Some(page_url) = next.take() {
            tracing::debug!("Fetching: {}", page_url);
            let response = self.get_within_budget(&page_url, options).await?;
            self.rate_limiter.update_from_headers(&response.headers);
            response.check(&page_url)?;

            let items = records_from_body(&page_url, &response.body, &seed)?;
            all_items.extend(items);
            pages += 1;

            if let Some(max_rows) = options.max_rows {
                if all_items.len() >= max_rows {
                    tracing::debug!("Row limit {} reached for {}", max_rows, seed);
                    break;
                }
            }

            next = next_page(&response.headers);
        }

        tracing::debug!(
            "Fetched {} records in {} pages from {}",
            all_items.len(),
            pages,
            seed
        );
        Ok(all_items)
    }

    async fn get_within_budget(&self, url: &str, options: &FetchOptions) -> Result<Response> {
        let Some(deadline) = options.deadline else {
            return self.transport.get(url, None).await;
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout { url: url.to_string() });
        }

        timeout_at(deadline, self.transport.get(url, Some(remaining)))
            .await
            .map_err(|_| Error::Timeout { url: url.to_string() })?
    }
}

/// Layer the default and caller query parameters onto `url`.
///
/// Parameters already spelled out in the URL win, then caller options, then
/// the defaults.
pub(crate) fn with_query(url: &str, options: &BTreeMap<String, String>) -> Result<String> {
    let mut parsed =
        Url::parse(url).map_err(|e| Error::request(url, format!("malformed URL: {}", e)))?;

    let present: HashSet<String> = parsed.query_pairs().map(|(k, _)| k.into_owned()).collect();

    let mut params: BTreeMap<&str, &str> = DEFAULT_QUERY.into_iter().collect();
    for (key, value) in options {
        params.insert(key, value);
    }
    params.retain(|key, _| !present.contains(*key));

    if !params.is_empty() {
        let mut pairs = parsed.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }

    Ok(parsed.into())
}

/// The `rel="next"` target of a response, if any.
pub(crate) fn next_page(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| LINK_ENTRY.captures_iter(v))
        .find(|c| &c[2] == "next")
        .map(|c| c[1].to_string())
}

/// Turn a response body into tagged records.
///
/// Arrays are record batches, `{"items": [...]}` is a search result, and any
/// other object is a single record.
pub(crate) fn records_from_body(url: &str, body: &str, origin: &str) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::request(url, format!("response is not JSON: {}", e)))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("items") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                object.insert("items".to_string(), other);
                vec![Value::Object(object)]
            }
            None => vec![Value::Object(object)],
        },
        other => {
            tracing::error!("Unexpected response body from {}: {}", url, other);
            return Err(Error::request(
                url,
                "unexpected result set, please check your API call syntax",
            ));
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(mut record) => {
                record.insert(
                    REQUEST_URL_FIELD.to_string(),
                    Value::String(origin.to_string()),
                );
                Ok(record)
            }
            other => Err(Error::request(
                url,
                format!("expected objects in result set, found {}", other),
            )),
        })
        .collect()
}
