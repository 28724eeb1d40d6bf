// src/activity_run.rs
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::activity_format::render_activity_day;
use crate::date_range::{display_key, iso_key};
use crate::notifier::{send_activity, write_fallback, MailAlert, MailTransport};
use crate::portal_client::{ActivitySource, PortalError};
use crate::retry::{with_retry, FailureAlert, RetryPolicy};
use crate::sent_ledger::{fingerprint, SentLedger};

pub const DEFAULT_COURTESY_DELAY_SECS: u64 = 2;

/// Knobs for one activity-log run.
#[derive(Debug, Clone)]
pub struct ActivityRunOptions {
    pub force: bool,
    pub retry: RetryPolicy,
    /// Pause between consecutive dates so the portal is not hammered.
    pub courtesy_delay: Duration,
    /// Base name for previews; each date gets its own file, see [`dated_fallback_path`].
    pub fallback_path: PathBuf,
}

/// `activity_preview.html` for 7 Jan 2026 becomes `activity_preview_2026-01-07.html`.
pub fn dated_fallback_path(base: &Path, date: NaiveDate) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "activity_preview".to_string());
    let name = match base.extension() {
        Some(ext) => format!("{}_{}.{}", stem, iso_key(date), ext.to_string_lossy()),
        None => format!("{}_{}", stem, iso_key(date)),
    };
    base.with_file_name(name)
}

/// Per-date outcomes of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub sent: usize,
    pub already_sent: usize,
    pub empty: usize,
    pub previewed: usize,
    pub errors: usize,
}

/// Logs in, processes every date in order, and always closes the session.
///
/// Only a login failure is returned as an error; per-date failures are counted in the summary.
pub async fn run_activity_log(
    source: &dyn ActivitySource,
    mailer: Option<&dyn MailTransport>,
    ledger: &mut SentLedger,
    dates: &[NaiveDate],
    options: &ActivityRunOptions,
) -> Result<RunSummary, PortalError> {
    let result = process_dates(source, mailer, ledger, dates, options).await;
    source.close().await;
    result
}

async fn process_dates(
    source: &dyn ActivitySource,
    mailer: Option<&dyn MailTransport>,
    ledger: &mut SentLedger,
    dates: &[NaiveDate],
    options: &ActivityRunOptions,
) -> Result<RunSummary, PortalError> {
    let alert = mailer.map(MailAlert::new);
    let alert_ref: Option<&dyn FailureAlert> = alert.as_ref().map(|a| a as &dyn FailureAlert);

    with_retry("Portal login", &options.retry, alert_ref, || source.login()).await?;

    let mut summary = RunSummary::default();
    for (index, date) in dates.iter().enumerate() {
        if index > 0 && !options.courtesy_delay.is_zero() {
            sleep(options.courtesy_delay).await;
        }
        let date_key = display_key(*date);
        let label = format!("Fetch activity log for {}", date_key);

        let day = match with_retry(&label, &options.retry, alert_ref, || source.fetch_day(*date))
            .await
        {
            Ok(day) => day,
            Err(e) => {
                error!("Giving up on {}: {}", date_key, e);
                summary.errors += 1;
                continue;
            }
        };

        let Some(message) = render_activity_day(&day) else {
            info!("No activities recorded for {}", date_key);
            summary.empty += 1;
            continue;
        };

        let content_fingerprint = fingerprint(&day.activities);
        if !options.force && ledger.was_sent(&date_key, &content_fingerprint) {
            info!("Activity log for {} already sent, skipping", date_key);
            summary.already_sent += 1;
            continue;
        }

        let Some(mailer) = mailer else {
            let preview_path = dated_fallback_path(&options.fallback_path, *date);
            match write_fallback(&preview_path, &message) {
                Ok(()) => summary.previewed += 1,
                Err(e) => {
                    error!("Failed to write fallback output {:?}: {}", preview_path, e);
                    summary.errors += 1;
                }
            }
            continue;
        };

        if send_activity(mailer, &message).await {
            if let Err(e) = ledger.mark_sent(&date_key, &content_fingerprint) {
                warn!("Sent {} but could not update the ledger: {}", date_key, e);
            }
            summary.sent += 1;
        } else {
            summary.errors += 1;
        }
    }

    info!(
        "Activity run finished: {} sent, {} already sent, {} empty, {} previewed, {} errors",
        summary.sent, summary.already_sent, summary.empty, summary.previewed, summary.errors
    );
    Ok(summary)
}
