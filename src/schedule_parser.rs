// src/schedule_parser.rs
//! Turns timesheet text into per-day visit lists.
//!
//! Text arrives page by page, whitespace collapsed within each page and pages joined
//! by newlines. Parsing is two passes: first every date header is located with its
//! span, then the text between one header's end and the next header's start is
//! scanned for visit lines. A visit therefore always belongs to the nearest header
//! before it.
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::html_text::collapse_whitespace;

/// How many documents candidate selection looks at, newest first.
pub const DEFAULT_LOOKBACK: usize = 5;

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?\s*-\s*(\d{1,2})\s+(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\s+(\d{4})\b",
    )
    .unwrap()
});

static VISIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{1,2}:\d{2})\s+(\d{1,2}:\d{2})\s+(\d{1,2}:\d{2}h)\s+([\p{L}'’.\-]+(?:\s+[\p{L}'’.\-]+)*\s*,\s*[\p{L}'’.\-]+)",
    )
    .unwrap()
});

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Could not decode PDF document: {0}")]
    Decode(#[from] lopdf::Error),

    #[error("Document contains no pages")]
    EmptyDocument,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid time of day '{0}'")]
pub struct ClockTimeError(String);

/// Wall-clock time as minutes since midnight. Accepts `00:00` to `24:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_hm(hours: u16, minutes: u16) -> Option<Self> {
        let total = hours.checked_mul(60)?.checked_add(minutes)?;
        (minutes < 60 && total <= 24 * 60).then_some(ClockTime(total))
    }

    pub fn minutes(self) -> u32 {
        u32::from(self.0)
    }
}

impl FromStr for ClockTime {
    type Err = ClockTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ClockTimeError(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(err)?;
        let hours = h.parse::<u16>().map_err(|_| err())?;
        let minutes = m.parse::<u16>().map_err(|_| err())?;
        if m.len() != 2 {
            return Err(err());
        }
        ClockTime::from_hm(hours, minutes).ok_or_else(err)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    pub start: ClockTime,
    pub end: ClockTime,
    pub duration: String,
    /// "Surname, Firstname" as printed.
    pub caregiver: String,
}

impl Visit {
    pub fn first_name(&self) -> &str {
        match self.caregiver.split_once(',') {
            Some((_, first)) if !first.trim().is_empty() => first.trim(),
            _ => self.caregiver.trim(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub day_name: String,
    /// In order of appearance, not sorted.
    pub visits: Vec<Visit>,
}

/// Days of one timesheet document, ordered by date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    days: BTreeMap<NaiveDate, DaySchedule>,
}

impl Schedule {
    pub fn get(&self, date: NaiveDate) -> Option<&DaySchedule> {
        self.days.get(&date)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.days.contains_key(&date)
    }

    pub fn days(&self) -> impl Iterator<Item = &DaySchedule> {
        self.days.values()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    fn day_mut(&mut self, date: NaiveDate) -> &mut DaySchedule {
        self.days.entry(date).or_insert_with(|| DaySchedule {
            date,
            day_name: date.format("%A").to_string(),
            visits: Vec::new(),
        })
    }
}

/// A located date header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSpan {
    pub start: usize,
    pub end: usize,
    /// `None` when the header names an impossible date (e.g. 31 February).
    pub date: Option<NaiveDate>,
}

fn month_number(name: &str) -> Option<u32> {
    let key: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match key.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// First pass: every date header with its byte span, in text order.
pub fn find_date_headers(text: &str) -> Vec<HeaderSpan> {
    HEADER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let day = caps[2].parse::<u32>().ok();
            let month = month_number(&caps[3]);
            let year = caps[4].parse::<i32>().ok();
            let date = match (year, month, day) {
                (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y, m, d),
                _ => None,
            };
            if date.is_none() {
                warn!("Ignoring visits under invalid date header '{}'", whole.as_str());
            }
            Some(HeaderSpan {
                start: whole.start(),
                end: whole.end(),
                date,
            })
        })
        .collect()
}

/// Every visit line in a section, in order of appearance.
pub fn parse_visits(section: &str) -> Vec<Visit> {
    VISIT_RE
        .captures_iter(section)
        .filter_map(|caps| {
            let start = caps[1].parse::<ClockTime>();
            let end = caps[2].parse::<ClockTime>();
            match (start, end) {
                (Ok(start), Ok(end)) => Some(Visit {
                    start,
                    end,
                    duration: caps[3].to_string(),
                    caregiver: collapse_whitespace(&caps[4]),
                }),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Skipping visit line '{}': {}", &caps[0], e);
                    None
                }
            }
        })
        .collect()
}

/// Second pass: slice the text between consecutive headers and collect visits per date.
pub fn parse_schedule_text(text: &str) -> Schedule {
    let headers = find_date_headers(text);
    let mut schedule = Schedule::default();

    for (i, header) in headers.iter().enumerate() {
        let section_end = headers.get(i + 1).map_or(text.len(), |next| next.start);
        let Some(date) = header.date else {
            continue;
        };
        let visits = parse_visits(&text[header.end..section_end]);
        debug!("{}: {} visit(s)", date, visits.len());
        schedule.day_mut(date).visits.extend(visits);
    }
    schedule
}

/// Text of a PDF, pages in order, each page's whitespace collapsed, pages joined by `\n`.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ScheduleError> {
    let document = lopdf::Document::load_mem(bytes)?;
    let pages = document.get_pages();
    if pages.is_empty() {
        return Err(ScheduleError::EmptyDocument);
    }
    let mut page_texts = Vec::with_capacity(pages.len());
    for page_number in pages.keys() {
        let raw = document.extract_text(&[*page_number])?;
        page_texts.push(collapse_whitespace(&raw));
    }
    Ok(page_texts.join("\n"))
}

pub fn parse_schedule_pdf(bytes: &[u8]) -> Result<Schedule, ScheduleError> {
    Ok(parse_schedule_text(&extract_pdf_text(bytes)?))
}

/// Picks one whole schedule from candidates ordered newest first.
///
/// At most `lookback` candidates are loaded. The first schedule that has an entry for
/// `target` wins. Otherwise the last schedule that parsed at all is returned. Candidates
/// that fail to load are skipped.
pub fn select_schedule<T, I, F>(
    candidates: I,
    target: NaiveDate,
    lookback: usize,
    mut load_text: F,
) -> Option<Schedule>
where
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> Result<String, ScheduleError>,
{
    let mut fallback = None;
    for (index, candidate) in candidates.into_iter().take(lookback).enumerate() {
        let text = match load_text(&candidate) {
            Ok(text) => text,
            Err(e) => {
                warn!("Skipping timesheet candidate #{}: {}", index + 1, e);
                continue;
            }
        };
        let schedule = parse_schedule_text(&text);
        if schedule.contains(target) {
            debug!("Timesheet candidate #{} covers {}", index + 1, target);
            return Some(schedule);
        }
        debug!(
            "Timesheet candidate #{} has {} day(s) but not {}",
            index + 1,
            schedule.len(),
            target
        );
        fallback = Some(schedule);
    }
    fallback
}
