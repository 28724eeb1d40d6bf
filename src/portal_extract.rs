// src/portal_extract.rs
//! Recovers activity records from a rendered activity-log page.
//!
//! The portal embeds its data as a JSON payload in a `<script>` block on most pages.
//! When that payload is missing or cannot be parsed, the rendered table is read
//! instead: a row classed `task-header` opens a record, the `task-detail` rows
//! after it carry the note. Both paths produce the same [`ActivityRecord`] shape.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::html_text::strip_tags;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub task_description: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityDay {
    pub date_label: String,
    pub activities: Vec<ActivityRecord>,
}

/// Which part of the page the records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    EmbeddedJson,
    Table,
    Nothing,
}

const TASK_KEYS: [&str; 3] = ["taskDescription", "task", "description"];
const NOTE_KEYS: [&str; 3] = ["note", "notes", "comment"];

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script([^>]*)>(.*?)</script>").unwrap());
static ROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<tr([^>]*)>(.*?)</tr>").unwrap());
static CLASS_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)class\s*=\s*["']([^"']*)["']"#).unwrap());

pub fn extract_activities(html: &str) -> (Vec<ActivityRecord>, ExtractionSource) {
    if let Some(records) = from_embedded_json(html) {
        return (records, ExtractionSource::EmbeddedJson);
    }
    let records = from_table(html);
    if records.is_empty() {
        (records, ExtractionSource::Nothing)
    } else {
        (records, ExtractionSource::Table)
    }
}

/// `None` when no script carries a parsable payload with an activity list.
pub fn from_embedded_json(html: &str) -> Option<Vec<ActivityRecord>> {
    for caps in SCRIPT_RE.captures_iter(html) {
        let attrs = caps.get(1).map_or("", |m| m.as_str()).to_ascii_lowercase();
        if !(attrs.contains("application/json") || attrs.contains("__next_data__")) {
            continue;
        }
        let body = caps.get(2).map_or("", |m| m.as_str()).trim();
        let payload: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(e) => {
                debug!("Skipping unparsable embedded payload: {}", e);
                continue;
            }
        };
        if let Some(records) = find_activity_array(&payload) {
            return Some(records);
        }
    }
    None
}

fn find_activity_array(value: &Value) -> Option<Vec<ActivityRecord>> {
    match value {
        Value::Array(items) => {
            let looks_like_activities = items.iter().any(|item| task_text(item).is_some());
            if looks_like_activities {
                return Some(
                    items
                        .iter()
                        .filter_map(|item| {
                            task_text(item).map(|task| ActivityRecord {
                                task_description: task,
                                note: note_text(item),
                            })
                        })
                        .collect(),
                );
            }
            items.iter().find_map(find_activity_array)
        }
        Value::Object(map) => map.values().find_map(find_activity_array),
        _ => None,
    }
}

fn task_text(item: &Value) -> Option<String> {
    let obj = item.as_object()?;
    TASK_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
}

fn note_text(item: &Value) -> String {
    item.as_object()
        .and_then(|obj| {
            NOTE_KEYS
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

pub fn from_table(html: &str) -> Vec<ActivityRecord> {
    let mut records: Vec<ActivityRecord> = Vec::new();
    let mut current: Option<ActivityRecord> = None;

    for caps in ROW_RE.captures_iter(html) {
        let attrs = caps.get(1).map_or("", |m| m.as_str());
        let class = CLASS_ATTR_RE
            .captures(attrs)
            .and_then(|c| c.get(1))
            .map_or("", |m| m.as_str());
        let text = strip_tags(caps.get(2).map_or("", |m| m.as_str()));

        if class.contains("task-header") {
            records.extend(current.take());
            current = Some(ActivityRecord {
                task_description: text,
                note: String::new(),
            });
        } else if class.contains("task-detail") {
            // A detail row without a header before it has nothing to attach to.
            if let Some(record) = current.as_mut() {
                if !text.is_empty() {
                    if !record.note.is_empty() {
                        record.note.push('\n');
                    }
                    record.note.push_str(&text);
                }
            }
        }
    }
    records.extend(current);
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE_PAGE: &str = r#"
        <table class="log">
          <tr class="task-header"><td><strong>Personal Care</strong> Task is completed.</td></tr>
          <tr class="task-detail"><td>Helped with washing by Laura on 22-01-2026 12:57</td></tr>
          <tr class="spacer"><td>&nbsp;</td></tr>
          <tr class="task-header odd"><td>Activity Log</td></tr>
          <tr class="task-header"><td>Meal Task is not completed.</td></tr>
          <tr class="task-detail"><td>Refused lunch</td></tr>
          <tr class="task-detail"><td>Ate a biscuit</td></tr>
        </table>"#;

    #[test]
    fn test_table_rows_group_by_header() {
        let records = from_table(TABLE_PAGE);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].task_description, "Personal Care Task is completed.");
        assert_eq!(records[0].note, "Helped with washing by Laura on 22-01-2026 12:57");
        assert_eq!(records[1].task_description, "Activity Log");
        assert_eq!(records[1].note, "");
        assert_eq!(records[2].note, "Refused lunch\nAte a biscuit");
    }

    #[test]
    fn test_embedded_payload_takes_precedence() {
        let html = format!(
            r#"<html><script id="__NEXT_DATA__" type="application/json">
            {{"props":{{"pageProps":{{"date":"2026-01-22","log":[
                {{"taskDescription":"Personal Care Task is completed.","note":"Helped with washing"}},
                {{"taskDescription":"Activity Log","note":null}}
            ]}}}}}}
            </script>{}</html>"#,
            TABLE_PAGE
        );
        let (records, source) = extract_activities(&html);
        assert_eq!(source, ExtractionSource::EmbeddedJson);
        assert_eq!(
            records,
            vec![
                ActivityRecord {
                    task_description: "Personal Care Task is completed.".into(),
                    note: "Helped with washing".into(),
                },
                ActivityRecord {
                    task_description: "Activity Log".into(),
                    note: String::new(),
                },
            ]
        );
    }

    #[test]
    fn test_broken_payload_falls_back_to_table() {
        let html = format!(
            r#"<script type="application/json">{{"log": [</script>{}"#,
            TABLE_PAGE
        );
        let (records, source) = extract_activities(&html);
        assert_eq!(source, ExtractionSource::Table);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_payload_without_activities_falls_back() {
        let html = r#"<script type="application/json">{"user":{"name":"x"}}</script><p>No entries</p>"#;
        let (records, source) = extract_activities(html);
        assert!(records.is_empty());
        assert_eq!(source, ExtractionSource::Nothing);
    }
}
