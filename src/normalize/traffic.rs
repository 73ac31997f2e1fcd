use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::github::paginator::REQUEST_URL_FIELD;
use crate::models::{Record, TableRequest, TableSet};

use super::entities::repo_full_name;
use super::{TRAFFIC_CLONES, TRAFFIC_VIEWS};

/// Column compared temporally rather than numerically during incremental refresh.
const TIMESTAMP: &str = "timestamp";

/// Replace the requested traffic table with the rows in `raw`.
///
/// Views and clones are unnested to one row per day. Rows without a
/// `timestamp` are stamped with the start of the current local day. When the
/// request carries a watermark only rows strictly past it are kept.
pub fn normalize(tables: &mut TableSet, request: &TableRequest, raw: Vec<Record>) {
    let table_id = request.table_id.as_str();
    let watermark = request.watermark();
    let today = start_of_today();
    let table = tables.reset(table_id);

    let mut skipped = 0usize;
    for record in raw {
        let repo_name = record
            .get(REQUEST_URL_FIELD)
            .and_then(Value::as_str)
            .and_then(repo_full_name);

        let rows = match table_id {
            TRAFFIC_VIEWS => unnest(record, "views"),
            TRAFFIC_CLONES => unnest(record, "clones"),
            _ => vec![record],
        };

        for mut row in rows {
            match repo_name {
                Some(ref name) => {
                    row.insert("repo_name".to_string(), Value::String(name.clone()));
                }
                None => tracing::warn!("Traffic row for {} has no repository in its request URL", table_id),
            }

            row.entry(TIMESTAMP)
                .or_insert_with(|| Value::String(today.clone()));

            if let Some((column, value)) = watermark {
                if !is_past_watermark(&row, column, value) {
                    skipped += 1;
                    continue;
                }
            }

            table.push(row);
        }
    }

    tracing::info!(
        "Normalized {} rows into {} ({} at or below watermark)",
        table.len(),
        table_id,
        skipped
    );
}

fn unnest(mut record: Record, field: &str) -> Vec<Record> {
    match record.remove(field) {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Local midnight of the current day, as an ISO-8601 UTC instant.
fn start_of_today() -> String {
    let midnight = Local::now().date_naive().and_time(NaiveTime::MIN);
    let instant = midnight
        .and_local_timezone(Local)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc());
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn is_past_watermark(row: &Record, column: &str, watermark: &Value) -> bool {
    let Some(candidate) = row.get(column) else {
        return false;
    };

    if column == TIMESTAMP {
        match (parse_instant(candidate), parse_instant(watermark)) {
            (Some(candidate), Some(watermark)) => candidate > watermark,
            _ => false,
        }
    } else {
        match (parse_number(candidate), parse_number(watermark)) {
            (Some(candidate), Some(watermark)) => candidate > watermark,
            _ => false,
        }
    }
}

fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();

    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{REPOS, TRAFFIC_POPULAR_PATHS, TRAFFIC_POPULAR_REFERRERS};
    use serde_json::json;

    fn views() -> Vec<Record> {
        serde_json::from_value(json!([{
            "count": 14,
            "uniques": 4,
            "views": [
                {"timestamp": "2024-01-01T00:00:00Z", "count": 4, "uniques": 1},
                {"timestamp": "2024-01-03T00:00:00Z", "count": 10, "uniques": 3}
            ],
            "_request_url": "https://api.github.com/repos/acme/widgets/traffic/views?per_page=5000&sort=updated"
        }]))
        .unwrap()
    }

    #[test]
    fn test_views_are_unnested() {
        let mut tables = TableSet::new();
        normalize(&mut tables, &TableRequest::new(TRAFFIC_VIEWS), views());

        let rows = tables.rows(TRAFFIC_VIEWS).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["repo_name"], "acme/widgets");
        assert_eq!(rows[1]["count"], 10);
    }

    #[test]
    fn test_timestamp_watermark() {
        let request = TableRequest::incremental(TRAFFIC_VIEWS, "timestamp", "2024-01-02T00:00:00Z");
        let mut tables = TableSet::new();
        normalize(&mut tables, &request, views());

        let rows = tables.rows(TRAFFIC_VIEWS).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["timestamp"], "2024-01-03T00:00:00Z");
    }

    #[test]
    fn test_numeric_watermark() {
        let request = TableRequest::incremental(TRAFFIC_VIEWS, "count", json!(5));
        let mut tables = TableSet::new();
        normalize(&mut tables, &request, views());

        let rows = tables.rows(TRAFFIC_VIEWS).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["count"], 10);
    }

    #[test]
    fn test_empty_watermark_keeps_everything() {
        let request = TableRequest::incremental(TRAFFIC_VIEWS, "timestamp", "");
        let mut tables = TableSet::new();
        normalize(&mut tables, &request, views());

        assert_eq!(tables.rows(TRAFFIC_VIEWS).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_timestamp_is_start_of_day() {
        let raw: Vec<Record> = serde_json::from_value(json!([
            {"path": "/acme/widgets", "title": "widgets", "count": 3, "uniques": 2,
             "_request_url": "https://api.github.com/repos/acme/widgets/traffic/popular/paths"}
        ]))
        .unwrap();

        let mut tables = TableSet::new();
        normalize(&mut tables, &TableRequest::new(TRAFFIC_POPULAR_PATHS), raw);

        let row = &tables.rows(TRAFFIC_POPULAR_PATHS).unwrap()[0];
        let stamp = parse_instant(&row["timestamp"]).unwrap();
        assert_eq!(
            stamp.with_timezone(&Local).time(),
            NaiveTime::MIN,
            "stamp should be local midnight"
        );
        assert_eq!(row["repo_name"], "acme/widgets");
    }

    #[test]
    fn test_clones_are_unnested_per_repository() {
        let raw: Vec<Record> = serde_json::from_value(json!([
            {
                "count": 5,
                "uniques": 3,
                "clones": [
                    {"timestamp": "2024-02-01T00:00:00Z", "count": 2, "uniques": 1},
                    {"timestamp": "2024-02-02T00:00:00Z", "count": 3, "uniques": 2}
                ],
                "_request_url": "https://api.github.com/repos/acme/widgets/traffic/clones?per_page=5000&sort=updated"
            },
            {
                "count": 1,
                "uniques": 1,
                "clones": [{"timestamp": "2024-02-01T00:00:00Z", "count": 1, "uniques": 1}],
                "_request_url": "https://api.github.com/repos/acme/gadgets/traffic/clones?per_page=5000&sort=updated"
            }
        ]))
        .unwrap();

        let mut tables = TableSet::new();
        normalize(&mut tables, &TableRequest::new(TRAFFIC_CLONES), raw);

        let rows = tables.rows(TRAFFIC_CLONES).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1]["timestamp"], "2024-02-02T00:00:00Z");
        assert_eq!(rows[1]["repo_name"], "acme/widgets");
        assert_eq!(rows[2]["repo_name"], "acme/gadgets");
        assert!(rows.iter().all(|r| !r.contains_key("clones")));
    }

    #[test]
    fn test_referrers_are_single_rows() {
        let raw: Vec<Record> = serde_json::from_value(json!([
            {"referrer": "news.ycombinator.com", "count": 40, "uniques": 31,
             "_request_url": "https://api.github.com/repos/acme/widgets/traffic/popular/referrers"},
            {"referrer": "github.com", "count": 12, "uniques": 7,
             "_request_url": "https://api.github.com/repos/acme/widgets/traffic/popular/referrers"}
        ]))
        .unwrap();

        let mut tables = TableSet::new();
        normalize(&mut tables, &TableRequest::new(TRAFFIC_POPULAR_REFERRERS), raw);

        let rows = tables.rows(TRAFFIC_POPULAR_REFERRERS).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["referrer"], "news.ycombinator.com");
        assert_eq!(rows[1]["uniques"], 7);
        assert!(rows.iter().all(|r| r["repo_name"] == "acme/widgets"));
        assert!(rows.iter().all(|r| r["timestamp"].is_string()));
    }

    #[test]
    fn test_each_call_replaces_table() {
        let raw: Vec<Record> = serde_json::from_value(json!([
            {"id": 1, "full_name": "acme/widgets", "_request_url": "https://api.github.com/repos/acme/widgets"}
        ]))
        .unwrap();

        let mut tables = TableSet::new();
        normalize(&mut tables, &TableRequest::new(REPOS), raw.clone());
        normalize(&mut tables, &TableRequest::new(REPOS), raw);

        assert_eq!(tables.rows(REPOS).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_instant_formats() {
        let expected = parse_instant(&json!("2024-01-02T00:00:00Z")).unwrap();
        assert_eq!(parse_instant(&json!("2024-01-02 00:00:00.000")), Some(expected));
        assert_eq!(parse_instant(&json!("2024-01-02")), Some(expected));
        assert_eq!(parse_instant(&json!(42)), None);
    }
}
