//! Extraction of entities shared by issues and pull requests.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::models::{id_key, pair_key, Record, TableSet};

use super::{ASSIGNEES, MILESTONES, USERS};

static REPO_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)repos/([\w\-.]+)/([\w\-.]+)").expect("repo pattern is valid")
});

/// `owner/name` of the repository a GitHub API URL points into.
pub fn repo_full_name(url: &str) -> Option<String> {
    REPO_PATH
        .captures(url)
        .map(|c| format!("{}/{}", &c[1], &c[2]))
}

/// The record's `id`, unless missing or null.
pub(crate) fn record_id(record: &Record) -> Option<Value> {
    record.get("id").filter(|id| !id.is_null()).cloned()
}

/// Store `user` once per id and hand back that id.
pub(crate) fn add_user(tables: &mut TableSet, user: Record) -> Option<Value> {
    let id = record_id(&user)?;
    let key = id_key(&id)?;
    tables.insert_unique(USERS, key, user);
    Some(id)
}

/// Move `assignees` (or the legacy single `assignee`) into the users and
/// assignees tables.
pub(crate) fn extract_assignees(tables: &mut TableSet, record: &mut Record, parent_id: &Value) {
    let single = record.remove("assignee");
    let assignees = match record.remove("assignees") {
        Some(Value::Array(list)) if !list.is_empty() => list,
        _ => single.into_iter().collect(),
    };

    for assignee in assignees {
        let Value::Object(user) = assignee else {
            continue;
        };
        let Some(user_id) = add_user(tables, user) else {
            continue;
        };
        if let Some(key) = pair_key(parent_id, &user_id) {
            let mut row = Record::new();
            row.insert("parent_id".to_string(), parent_id.clone());
            row.insert("user_id".to_string(), user_id);
            tables.insert_unique(ASSIGNEES, key, row);
        }
    }
}

/// Replace the nested milestone by `milestone_id`; its creator becomes a user.
pub(crate) fn extract_milestone(tables: &mut TableSet, record: &mut Record) {
    let Some(Value::Object(mut milestone)) = record.remove("milestone") else {
        return;
    };
    let Some(milestone_id) = record_id(&milestone) else {
        return;
    };
    record.insert("milestone_id".to_string(), milestone_id.clone());

    if let Some(Value::Object(creator)) = milestone.remove("creator") {
        if let Some(user_id) = add_user(tables, creator) {
            milestone.insert("user_id".to_string(), user_id);
        }
    }

    if let Some(key) = id_key(&milestone_id) {
        tables.insert_unique(MILESTONES, key, milestone);
    }
}

/// Replace the nested author by `user_id`.
pub(crate) fn extract_user(tables: &mut TableSet, record: &mut Record) {
    let Some(Value::Object(user)) = record.remove("user") else {
        return;
    };
    if let Some(user_id) = add_user(tables, user) {
        record.insert("user_id".to_string(), user_id);
    }
}
