//! Query templates and their expansion into request URLs.
//!
//! A query is a path relative to the API base, optionally containing one
//! bracketed, comma-separated list: `repos/acme/[svc-a,svc-b]/issues` expands
//! to one URL per list element, in list order. Only the first bracket group is
//! expanded; any later group is left in the URL verbatim.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static BRACKET_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]").expect("bracket pattern is valid"));

static TRAFFIC_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/traffic$").expect("traffic pattern is valid"));

/// Expand a query template into concrete URLs under `base`.
pub fn expand(base: &str, query: &str) -> Result<Vec<String>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(Error::Query("query is empty".to_string()));
    }

    let Some(group) = BRACKET_LIST.find(query) else {
        return Ok(vec![join(base, query)]);
    };

    let inner = &query[group.start() + 1..group.end() - 1];
    let values: Vec<&str> = inner.split(',').map(str::trim).collect();

    if values.iter().any(|v| v.is_empty()) {
        return Err(Error::Query(format!(
            "empty value in bracket list of {}",
            query
        )));
    }

    Ok(values
        .into_iter()
        .map(|value| {
            let concrete = format!("{}{}{}", &query[..group.start()], value, &query[group.end()..]);
            join(base, &concrete)
        })
        .collect())
}

/// Point a traffic query at the sub-resource backing `table_id`.
///
/// Suffixes go on the path; a `?query` part is kept after it. For `repos`
/// only a final `/traffic` segment is removed.
pub fn traffic_path(query: &str, table_id: &str) -> String {
    let query = query.trim();
    let (path, params) = match query.find('?') {
        Some(idx) => query.split_at(idx),
        None => (query, ""),
    };
    let path = path.trim_end_matches('/');

    let path = match table_id {
        "traffic_clones" => format!("{}/clones", path),
        "traffic_popular_paths" => format!("{}/popular/paths", path),
        "traffic_popular_referrers" => format!("{}/popular/referrers", path),
        "traffic_views" => format!("{}/views", path),
        "repos" => TRAFFIC_SEGMENT.replace(path, "").into_owned(),
        _ => path.to_string(),
    };

    format!("{}{}", path, params)
}

fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
