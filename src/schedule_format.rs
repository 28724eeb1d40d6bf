// src/schedule_format.rs
use chrono::{Duration, NaiveDate};

use crate::coverage::{CoverageGapResult, CoverageWindow};
use crate::date_range::display_key;
use crate::html_text::escape_html;
use crate::notifier::RenderedMessage;
use crate::schedule_parser::{DaySchedule, Schedule, Visit};

pub const DIGEST_DAYS: i64 = 7;
const NO_VISITS_TODAY: &str = "No visits today";
const GAP_SUFFIX: &str = " - coverage gap warning";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayState {
    Normal,
    Today,
    /// Wins over `Today` when today itself has a gap.
    Gap,
}

impl DayState {
    fn style(self) -> (&'static str, &'static str) {
        // (header background, border colour)
        match self {
            DayState::Normal => ("#f8f9fa", "#dee2e6"),
            DayState::Today => ("#e7f1ff", "#0d6efd"),
            DayState::Gap => ("#fdecea", "#dc3545"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DigestDay<'a> {
    pub day: &'a DaySchedule,
    /// Sorted by start time.
    pub visits: Vec<&'a Visit>,
    pub coverage: CoverageGapResult,
    pub state: DayState,
}

/// Today and the following six days that exist in the schedule.
pub fn digest_days<'a>(
    schedule: &'a Schedule,
    today: NaiveDate,
    window: &CoverageWindow,
) -> Vec<DigestDay<'a>> {
    (0..DIGEST_DAYS)
        .map(|offset| today + Duration::days(offset))
        .filter_map(|date| schedule.get(date))
        .map(|day| {
            let mut visits: Vec<&Visit> = day.visits.iter().collect();
            visits.sort_by_key(|v| v.start);
            let coverage = window.analyze(&day.visits);
            let state = if coverage.has_gap {
                DayState::Gap
            } else if day.date == today {
                DayState::Today
            } else {
                DayState::Normal
            };
            DigestDay {
                day,
                visits,
                coverage,
                state,
            }
        })
        .collect()
}

/// "Sarah 09:00-13:00, Tom 15:30-18:00" or "No visits today".
pub fn today_summary(schedule: &Schedule, today: NaiveDate) -> String {
    let mut visits: Vec<&Visit> = schedule
        .get(today)
        .map(|d| d.visits.iter().collect())
        .unwrap_or_default();
    if visits.is_empty() {
        return NO_VISITS_TODAY.to_string();
    }
    visits.sort_by_key(|v| v.start);
    visits
        .iter()
        .map(|v| format!("{} {}-{}", v.first_name(), v.start, v.end))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The schedule stops too early to trust the coming days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingData {
    EndsOn(NaiveDate),
    NoEntries,
}

impl MissingData {
    fn subject_suffix(self) -> String {
        match self {
            MissingData::EndsOn(date) => format!(" - schedule data ends {}", display_key(date)),
            MissingData::NoEntries => " - schedule data missing".to_string(),
        }
    }

    fn warning(self) -> String {
        match self {
            MissingData::EndsOn(date) => format!(
                "Timesheet data only runs until {}. A newer timesheet may be missing.",
                display_key(date)
            ),
            MissingData::NoEntries => "The timesheet contains no dated entries.".to_string(),
        }
    }
}

/// Checks that the schedule reaches at least `today + alert_days`. `alert_days == 0` disables it.
pub fn missing_data(schedule: &Schedule, today: NaiveDate, alert_days: u32) -> Option<MissingData> {
    if alert_days == 0 {
        return None;
    }
    let horizon = today + Duration::days(i64::from(alert_days));
    match schedule.last_date() {
        Some(last) if last >= horizon => None,
        Some(last) => Some(MissingData::EndsOn(last)),
        None => Some(MissingData::NoEntries),
    }
}

pub fn render_digest(
    schedule: &Schedule,
    today: NaiveDate,
    window: &CoverageWindow,
    missing_data_alert_days: u32,
) -> RenderedMessage {
    let days = digest_days(schedule, today, window);
    let any_gap = days.iter().any(|d| d.coverage.has_gap);
    let runs_out = missing_data(schedule, today, missing_data_alert_days);

    let mut subject = today_summary(schedule, today);
    if any_gap {
        subject.push_str(GAP_SUFFIX);
    }
    if let Some(missing) = runs_out {
        subject.push_str(&missing.subject_suffix());
    }

    RenderedMessage {
        subject,
        plain_text: render_plain(&days, today, runs_out),
        html: render_html(&days, today, runs_out),
    }
}

fn range_heading(today: NaiveDate) -> String {
    format!(
        "Care schedule {} - {}",
        display_key(today),
        display_key(today + Duration::days(DIGEST_DAYS - 1))
    )
}

fn render_plain(days: &[DigestDay<'_>], today: NaiveDate, runs_out: Option<MissingData>) -> String {
    let mut out = format!("{}\n", range_heading(today));
    if let Some(missing) = runs_out {
        out.push_str(&format!("\n! {}\n", missing.warning()));
    }
    if days.is_empty() {
        out.push_str("\nNo scheduled days in the next week.\n");
    }
    for digest in days {
        let marker = if digest.day.date == today { " (today)" } else { "" };
        out.push_str(&format!(
            "\n{} {}{}\n",
            digest.day.day_name,
            display_key(digest.day.date),
            marker
        ));
        if digest.visits.is_empty() {
            out.push_str("  No visits scheduled\n");
        }
        for visit in &digest.visits {
            out.push_str(&format!(
                "  {}-{}  {:>6}  {}\n",
                visit.start, visit.end, visit.duration, visit.caregiver
            ));
        }
        if digest.coverage.has_gap {
            out.push_str(&format!(
                "  ! Coverage gap: {} minutes without a visit\n",
                digest.coverage.gap_minutes
            ));
        }
    }
    out
}

fn render_html(days: &[DigestDay<'_>], today: NaiveDate, runs_out: Option<MissingData>) -> String {
    let mut sections = String::new();
    if let Some(missing) = runs_out {
        sections.push_str(&format!(
            r#"<p style="background:#fff3cd;border:1px solid #ffc107;padding:8px">{}</p>
"#,
            escape_html(&missing.warning())
        ));
    }
    if days.is_empty() {
        sections.push_str("<p>No scheduled days in the next week.</p>\n");
    }
    for digest in days {
        let (background, border) = digest.state.style();
        let marker = if digest.day.date == today { " (today)" } else { "" };
        let mut rows = String::new();
        if digest.visits.is_empty() {
            rows.push_str(r#"<tr><td colspan="3" style="padding:4px 8px;color:#6c757d">No visits scheduled</td></tr>"#);
        }
        for visit in &digest.visits {
            rows.push_str(&format!(
                r#"<tr><td style="padding:4px 8px">{}-{}</td><td style="padding:4px 8px">{}</td><td style="padding:4px 8px">{}</td></tr>"#,
                visit.start,
                visit.end,
                escape_html(&visit.duration),
                escape_html(&visit.caregiver)
            ));
        }
        let gap = if digest.coverage.has_gap {
            format!(
                r#"<div style="color:#dc3545;font-weight:bold;padding:4px 8px">Coverage gap: {} minutes without a visit</div>"#,
                digest.coverage.gap_minutes
            )
        } else {
            String::new()
        };
        sections.push_str(&format!(
            r#"<div class="day day-{state}" style="border-left:4px solid {border};margin:12px 0">
<div style="background:{background};padding:6px 8px;font-weight:bold">{name} {date}{marker}</div>
<table style="border-collapse:collapse">{rows}</table>{gap}
</div>
"#,
            state = format!("{:?}", digest.state).to_lowercase(),
            border = border,
            background = background,
            name = escape_html(&digest.day.day_name),
            date = display_key(digest.day.date),
            marker = marker,
            rows = rows,
            gap = gap,
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html><body style="font-family:Arial,sans-serif;color:#212529">
<h2>{heading}</h2>
{sections}</body></html>
"#,
        heading = escape_html(&range_heading(today)),
        sections = sections,
    )
}
