use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::normalize::DataType;

pub const DEFAULT_API_URL: &str = "https://api.github.com/";

#[derive(Debug, Clone)]
pub struct Config {
    pub credential: Credential,
    pub api_url: String,
    pub concurrency_limit: usize,
    pub schema_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let credential = Credential::resolve(
            env::var("GITHUB_USERNAME").ok(),
            env::var("GITHUB_PASSWORD").ok(),
            env::var("GITHUB_TOKEN").ok(),
        );

        let api_url = env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let concurrency_limit = env::var("CONCURRENCY_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        if concurrency_limit == 0 {
            return Err(Error::Config(
                "CONCURRENCY_LIMIT must be at least 1".to_string(),
            ));
        }

        let schema_dir = env::var("SCHEMA_DIR").ok().map(PathBuf::from);

        Ok(Self {
            credential,
            api_url,
            concurrency_limit,
            schema_dir,
        })
    }
}

/// Either a username and password or a token for GitHub.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Token(String),
    Basic { username: String, password: String },
    Anonymous,
}

impl Credential {
    /// A non-empty token always wins over a username/password pair.
    pub fn resolve(
        username: Option<String>,
        password: Option<String>,
        token: Option<String>,
    ) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        match (non_empty(username), non_empty(password), non_empty(token)) {
            (_, _, Some(token)) => Credential::Token(token),
            (Some(username), Some(password), None) => Credential::Basic { username, password },
            _ => Credential::Anonymous,
        }
    }

    pub fn authorization(&self) -> Option<String> {
        match self {
            Credential::Token(token) => Some(format!("Bearer {}", token)),
            Credential::Basic { username, password } => Some(format!(
                "Basic {}",
                STANDARD.encode(format!("{}:{}", username, password))
            )),
            Credential::Anonymous => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Credential::Anonymous)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Token(_) => f.write_str("Token(***)"),
            Credential::Basic { username, .. } => write!(f, "Basic({}:***)", username),
            Credential::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// Connection parameters supplied by the host for one session.
#[derive(Debug, Clone)]
pub struct ConnectionData {
    pub data_type: DataType,
    pub query: String,
    pub max_number_of_rows: Option<usize>,
    pub timeout: Option<Duration>,
    pub label_filter: Option<String>,
    pub include_closed: bool,
}

impl ConnectionData {
    pub fn new(data_type: DataType, query: impl Into<String>) -> Self {
        Self {
            data_type,
            query: query.into(),
            max_number_of_rows: None,
            timeout: None,
            label_filter: None,
            include_closed: false,
        }
    }

    /// Parse the flat string-keyed configuration handed over by the host.
    pub fn from_map(values: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            values
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let data_type = get("dataType")
            .ok_or_else(|| Error::Config("dataType is required".to_string()))?
            .parse()?;

        let query = get("query")
            .ok_or_else(|| Error::Config("query is required".to_string()))?
            .to_string();

        let max_number_of_rows = get("maxNumberOfRows")
            .map(|v| {
                v.parse::<usize>()
                    .map_err(|_| Error::Config(format!("maxNumberOfRows is not a number: {}", v)))
            })
            .transpose()?
            .filter(|rows| *rows > 0);

        let timeout = get("timeout")
            .map(|v| {
                v.parse::<f64>()
                    .ok()
                    .filter(|minutes| *minutes > 0.0)
                    .and_then(|minutes| Duration::try_from_secs_f64(minutes * 60.0).ok())
                    .ok_or_else(|| {
                        Error::Config(format!("timeout is not a usable number of minutes: {}", v))
                    })
            })
            .transpose()?;

        let include_closed = get("includeClosed")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
            .unwrap_or(false);

        Ok(Self {
            data_type,
            query,
            max_number_of_rows,
            timeout,
            label_filter: get("labelFilter").map(str::to_string),
            include_closed,
        })
    }

    /// Parse the JSON-serialized form of the connection data.
    pub fn from_json(json: &str) -> Result<Self> {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;

        let values = object
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => return None,
                    other => other.to_string(),
                };
                Some((key, value))
            })
            .collect();

        Self::from_map(&values)
    }

    /// Options for one `getData` call, with the wall-clock budget starting now.
    pub fn fetch_options(&self) -> FetchOptions {
        let mut query = BTreeMap::new();

        if self.include_closed && self.data_type != DataType::Traffic {
            query.insert("state".to_string(), "all".to_string());
        }

        if self.data_type == DataType::Issues {
            if let Some(ref labels) = self.label_filter {
                query.insert("labels".to_string(), labels.clone());
            }
        }

        FetchOptions {
            query,
            max_rows: self.max_number_of_rows,
            // a budget too large to represent is no budget at all
            deadline: self.timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }
}

/// Session-wide values every core operation receives explicitly.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub credential: Credential,
    pub connection: ConnectionData,
}

impl SessionContext {
    pub fn new(credential: Credential, connection: ConnectionData) -> Self {
        Self {
            credential,
            connection,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Caller query parameters, layered over the request defaults.
    pub query: BTreeMap<String, String>,
    pub max_rows: Option<usize>,
    pub deadline: Option<Instant>,
}

impl FetchOptions {
    pub fn is_expired(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}
