use serde_json::Value;

use crate::github::paginator::REQUEST_URL_FIELD;
use crate::models::{id_key, Record, TableSet};

use super::entities::{self, record_id, repo_full_name};
use super::PULLS;

/// Split raw pull requests into pulls, users, milestones and assignees.
///
/// The pull list endpoint returns labels without enough detail to join on,
/// so labels stay as they are.
pub fn normalize(tables: &mut TableSet, raw: Vec<Record>) {
    for table in super::DataType::Pulls.tables() {
        tables.table_mut(table);
    }

    let mut added = 0usize;
    for mut pull in raw {
        let Some(pull_id) = record_id(&pull) else {
            tracing::warn!(
                "Skipping pull request without id from {}",
                pull.get(REQUEST_URL_FIELD).and_then(|v| v.as_str()).unwrap_or("unknown request")
            );
            continue;
        };

        entities::extract_assignees(tables, &mut pull, &pull_id);
        entities::extract_milestone(tables, &mut pull);
        entities::extract_user(tables, &mut pull);

        let repo_name = pull
            .get("base")
            .and_then(|base| base.pointer("/repo/full_name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                pull.get(REQUEST_URL_FIELD)
                    .and_then(Value::as_str)
                    .and_then(repo_full_name)
            });
        if let Some(repo_name) = repo_name {
            pull.insert("repo_name".to_string(), Value::String(repo_name));
        }

        if let Some(key) = id_key(&pull_id) {
            if tables.insert_unique(PULLS, key, pull) {
                added += 1;
            }
        }
    }

    tracing::info!("Normalized {} new pull requests", added);
}
