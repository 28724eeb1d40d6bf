// src/schedule_run.rs
use chrono::NaiveDate;
use tracing::info;

use crate::coverage::CoverageWindow;
use crate::notifier::{send_digest, MailTransport, RenderedMessage};
use crate::schedule_format::render_digest;
use crate::schedule_parser::{extract_pdf_text, select_schedule, DEFAULT_LOOKBACK};
use crate::timesheet_mail::{TimesheetCandidate, TimesheetSource};
use crate::AppError;

#[derive(Debug, Clone)]
pub struct ScheduleRunOptions {
    pub today: NaiveDate,
    pub window: CoverageWindow,
    pub missing_data_alert_days: u32,
    pub lookback: usize,
}

impl ScheduleRunOptions {
    pub fn new(today: NaiveDate, window: CoverageWindow, missing_data_alert_days: u32) -> Self {
        Self {
            today,
            window,
            missing_data_alert_days,
            lookback: DEFAULT_LOOKBACK,
        }
    }
}

/// Finds the newest usable timesheet, renders the weekly digest and sends it.
/// Every failure, delivery included, ends the run.
pub async fn run_schedule_digest(
    source: &dyn TimesheetSource,
    mailer: &dyn MailTransport,
    options: &ScheduleRunOptions,
) -> Result<RenderedMessage, AppError> {
    let candidates = source.recent_timesheets().await?;
    info!("Evaluating {} timesheet candidate(s)", candidates.len());
    let considered = candidates.len().min(options.lookback);

    let schedule = select_schedule(
        candidates,
        options.today,
        options.lookback,
        |candidate: &TimesheetCandidate| {
            info!(
                "Parsing '{}' from '{}' ({})",
                candidate.filename, candidate.subject, candidate.received
            );
            extract_pdf_text(&candidate.pdf)
        },
    )
    .ok_or(AppError::NoSchedule(considered))?;

    let digest = render_digest(
        &schedule,
        options.today,
        &options.window,
        options.missing_data_alert_days,
    );
    info!("Digest subject: {}", digest.subject);
    send_digest(mailer, &digest).await?;
    Ok(digest)
}
