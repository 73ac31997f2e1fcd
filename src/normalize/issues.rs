use serde_json::Value;

use crate::github::paginator::REQUEST_URL_FIELD;
use crate::models::{id_key, pair_key, Record, TableSet};

use super::entities::{self, record_id, repo_full_name};
use super::{ASSIGNED_LABELS, COMMENTS, ISSUES, LABELS};

/// Split raw issues into issues, users, milestones, assignees, labels,
/// assigned labels and comment references.
pub fn normalize(tables: &mut TableSet, raw: Vec<Record>) {
    for table in super::DataType::Issues.tables() {
        tables.table_mut(table);
    }

    let mut added = 0usize;
    for mut issue in raw {
        let Some(issue_id) = record_id(&issue) else {
            tracing::warn!(
                "Skipping issue without id from {}",
                issue.get(REQUEST_URL_FIELD).and_then(|v| v.as_str()).unwrap_or("unknown request")
            );
            continue;
        };

        entities::extract_assignees(tables, &mut issue, &issue_id);
        extract_labels(tables, &mut issue, &issue_id);
        extract_comments(tables, &issue, &issue_id);
        entities::extract_milestone(tables, &mut issue);
        entities::extract_user(tables, &mut issue);

        if let Some(repo_name) = issue
            .get("repository_url")
            .and_then(Value::as_str)
            .and_then(repo_full_name)
        {
            issue.insert("repo_name".to_string(), Value::String(repo_name));
        }

        let is_pull_request = issue.contains_key("pull_request");
        issue.insert("is_pull_request".to_string(), Value::Bool(is_pull_request));

        if let Some(key) = id_key(&issue_id) {
            if tables.insert_unique(ISSUES, key, issue) {
                added += 1;
            }
        }
    }

    tracing::info!("Normalized {} new issues", added);
}

fn extract_labels(tables: &mut TableSet, issue: &mut Record, issue_id: &Value) {
    let Some(Value::Array(labels)) = issue.remove("labels") else {
        return;
    };

    for label in labels {
        let Value::Object(label) = label else {
            continue;
        };
        let Some(label_id) = record_id(&label) else {
            continue;
        };
        if let Some(key) = id_key(&label_id) {
            tables.insert_unique(LABELS, key, label);
        }
        if let Some(key) = pair_key(issue_id, &label_id) {
            let mut row = Record::new();
            row.insert("parent_id".to_string(), issue_id.clone());
            row.insert("label_id".to_string(), label_id);
            tables.insert_unique(ASSIGNED_LABELS, key, row);
        }
    }
}

/// Issues with comments get a row pointing at their comments endpoint.
fn extract_comments(tables: &mut TableSet, issue: &Record, issue_id: &Value) {
    let count = issue.get("comments").and_then(Value::as_u64).unwrap_or(0);
    if count == 0 {
        return;
    }
    let Some(key) = id_key(issue_id) else {
        return;
    };

    let mut row = Record::new();
    row.insert("parent_id".to_string(), issue_id.clone());
    row.insert(
        "comments_url".to_string(),
        issue.get("comments_url").cloned().unwrap_or(Value::Null),
    );
    row.insert("comments".to_string(), Value::from(count));
    tables.insert_unique(COMMENTS, key, row);
}
