// src/activity_format.rs
use once_cell::sync::Lazy;
use regex::Regex;

use crate::html_text::escape_html;
use crate::notifier::RenderedMessage;
use crate::portal_extract::{ActivityDay, ActivityRecord};

const ACTIVITY_LOG_PREFIX: &str = "Activity Log";
const STATUS_PHRASES: [&str; 2] = [" Task is not completed.", " Task is completed."];
const NO_NOTES: &str = "No notes";

static ATTRIBUTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(.*\s)?(by\s+[^\n]+?\s+on\s+\d{1,2}-\d{1,2}-\d{4}\s+\d{1,2}:\d{2})\s*$")
        .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Completed,
    Pending,
}

impl TaskStatus {
    /// Any description mentioning `completed` is badged Completed.
    pub fn from_description(description: &str) -> Self {
        if description.contains("completed") {
            TaskStatus::Completed
        } else {
            TaskStatus::Pending
        }
    }

    pub fn badge(self) -> &'static str {
        match self {
            TaskStatus::Completed => "Completed",
            TaskStatus::Pending => "Pending",
        }
    }
}

/// A note split into its free text and the trailing "by X on date time" stamp, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteParts {
    pub body: String,
    pub attribution: Option<String>,
}

/// One activity as it appears in the email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedActivity {
    pub label: String,
    pub title: String,
    pub status: TaskStatus,
    pub note: NoteParts,
}

/// "Personal Care Task is completed." becomes "Personal Care - completed".
pub fn activity_label(description: &str) -> String {
    description
        .trim()
        .trim_end_matches('.')
        .replace(" Task is ", " - ")
}

/// Heading shown next to the status badge, with the status phrase removed.
pub fn activity_title(description: &str) -> String {
    let trimmed = description.trim();
    let stripped = STATUS_PHRASES
        .iter()
        .find_map(|phrase| trimmed.strip_suffix(phrase))
        .unwrap_or(trimmed);
    stripped.replace(" Task is ", " - ")
}

pub fn split_note(note: &str) -> NoteParts {
    let note = note.trim();
    if note.is_empty() {
        return NoteParts {
            body: NO_NOTES.to_string(),
            attribution: None,
        };
    }
    match ATTRIBUTION_RE.captures(note) {
        Some(caps) => {
            let body = caps.get(1).map_or("", |m| m.as_str()).trim();
            NoteParts {
                body: if body.is_empty() { NO_NOTES } else { body }.to_string(),
                attribution: Some(caps[2].to_string()),
            }
        }
        None => NoteParts {
            body: note.to_string(),
            attribution: None,
        },
    }
}

/// Stable sort: "Activity Log" entries first, the rest in portal order.
pub fn order_activities(activities: &[ActivityRecord]) -> Vec<&ActivityRecord> {
    let mut ordered: Vec<&ActivityRecord> = activities.iter().collect();
    ordered.sort_by_key(|a| !a.task_description.starts_with(ACTIVITY_LOG_PREFIX));
    ordered
}

pub fn format_activities(activities: &[ActivityRecord]) -> Vec<FormattedActivity> {
    order_activities(activities)
        .into_iter()
        .map(|a| FormattedActivity {
            label: activity_label(&a.task_description),
            title: activity_title(&a.task_description),
            status: TaskStatus::from_description(&a.task_description),
            note: split_note(&a.note),
        })
        .collect()
}

/// `None` when the day has no activities; nothing should be sent for it.
pub fn render_activity_day(day: &ActivityDay) -> Option<RenderedMessage> {
    if day.activities.is_empty() {
        return None;
    }
    let items = format_activities(&day.activities);
    let subject = format!(
        "Care activity log - {} ({} {})",
        day.date_label,
        items.len(),
        if items.len() == 1 { "entry" } else { "entries" }
    );

    Some(RenderedMessage {
        subject,
        plain_text: render_plain(&day.date_label, &items),
        html: render_html(&day.date_label, &items),
    })
}

fn render_plain(date_label: &str, items: &[FormattedActivity]) -> String {
    let heading = format!("Activity log for {}", date_label);
    let mut out = format!("{}\n{}\n", heading, "=".repeat(heading.len()));
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!("\n{}. {} [{}]\n", i + 1, item.label, item.status.badge()));
        for line in item.note.body.lines() {
            out.push_str(&format!("   {}\n", line));
        }
        if let Some(stamp) = &item.note.attribution {
            out.push_str(&format!("   ({})\n", stamp));
        }
    }
    out
}

fn render_html(date_label: &str, items: &[FormattedActivity]) -> String {
    let mut rows = String::new();
    for item in items {
        let (badge_bg, badge_fg) = match item.status {
            TaskStatus::Completed => ("#e6f4ea", "#1e7e34"),
            TaskStatus::Pending => ("#fff4e5", "#b35c00"),
        };
        let body = escape_html(&item.note.body).replace('\n', "<br>");
        let stamp = item
            .note
            .attribution
            .as_deref()
            .map(|s| {
                format!(
                    r#"<div style="color:#6c757d;font-size:12px;margin-top:4px">{}</div>"#,
                    escape_html(s)
                )
            })
            .unwrap_or_default();
        rows.push_str(&format!(
            r#"<tr><td style="padding:10px;border-bottom:1px solid #eee">
<div><strong>{title}</strong> <span style="background:{bg};color:{fg};border-radius:10px;padding:2px 8px;font-size:12px">{badge}</span></div>
<div style="margin-top:4px">{body}</div>{stamp}
</td></tr>
"#,
            title = escape_html(&item.title),
            bg = badge_bg,
            fg = badge_fg,
            badge = item.status.badge(),
            body = body,
            stamp = stamp,
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html><body style="font-family:Arial,sans-serif;color:#212529">
<h2>Activity log for {date}</h2>
<table style="border-collapse:collapse;width:100%;max-width:640px">
{rows}</table>
</body></html>
"#,
        date = escape_html(date_label),
        rows = rows,
    )
}
