//! Reshaping of raw API records into flat, joinable tables.
//!
//! Each [`DataType`] knows which tables it serves, how to build request URLs
//! for them and how to normalize the fetched records. Normalizers hold no
//! state of their own; everything they produce lands in the caller's
//! [`TableSet`].

pub mod entities;
pub mod issues;
pub mod pulls;
pub mod traffic;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Record, TableRequest, TableSet};
use crate::query;

pub const ISSUES: &str = "issues";
pub const PULLS: &str = "pulls";
pub const USERS: &str = "users";
pub const MILESTONES: &str = "milestones";
pub const ASSIGNEES: &str = "assignees";
pub const LABELS: &str = "labels";
pub const ASSIGNED_LABELS: &str = "assigned_labels";
pub const COMMENTS: &str = "comments";
pub const REPOS: &str = "repos";
pub const TRAFFIC_CLONES: &str = "traffic_clones";
pub const TRAFFIC_POPULAR_PATHS: &str = "traffic_popular_paths";
pub const TRAFFIC_POPULAR_REFERRERS: &str = "traffic_popular_referrers";
pub const TRAFFIC_VIEWS: &str = "traffic_views";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Issues,
    Pulls,
    Traffic,
}

impl DataType {
    /// Tables served by this data type, in schema order.
    pub fn tables(&self) -> &'static [&'static str] {
        match self {
            DataType::Issues => &[ISSUES, USERS, MILESTONES, ASSIGNEES, LABELS, ASSIGNED_LABELS, COMMENTS],
            DataType::Pulls => &[PULLS, USERS, MILESTONES, ASSIGNEES],
            DataType::Traffic => &[
                REPOS,
                TRAFFIC_CLONES,
                TRAFFIC_POPULAR_PATHS,
                TRAFFIC_POPULAR_REFERRERS,
                TRAFFIC_VIEWS,
            ],
        }
    }

    pub fn serves(&self, table_id: &str) -> bool {
        self.tables().contains(&table_id)
    }

    /// Name of the join descriptor relating this data type's tables.
    pub fn joins_descriptor(&self) -> &'static str {
        match self {
            DataType::Issues => "_issues_joins",
            DataType::Pulls => "_pulls_joins",
            DataType::Traffic => "_traffic_joins",
        }
    }

    /// Concrete URLs to fetch for `table_id`.
    pub fn request_urls(&self, base: &str, query_template: &str, table_id: &str) -> Result<Vec<String>> {
        match self {
            DataType::Traffic => query::expand(base, &query::traffic_path(query_template, table_id)),
            DataType::Issues | DataType::Pulls => query::expand(base, query_template),
        }
    }

    /// Fold `raw` into `tables`.
    pub fn normalize(&self, tables: &mut TableSet, request: &TableRequest, raw: Vec<Record>) {
        match self {
            DataType::Issues => issues::normalize(tables, raw),
            DataType::Pulls => pulls::normalize(tables, raw),
            DataType::Traffic => traffic::normalize(tables, request, raw),
        }
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "issue" | "issues" => Ok(DataType::Issues),
            "pr" | "pull" | "pulls" => Ok(DataType::Pulls),
            "traffic" => Ok(DataType::Traffic),
            other => Err(Error::Config(format!("Unsupported data-type: {}", other))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Issues => write!(f, "issues"),
            DataType::Pulls => write!(f, "pulls"),
            DataType::Traffic => write!(f, "traffic"),
        }
    }
}
