// src/bin/schedule_digest.rs
use anyhow::{Context, Result};
use tracing::info;

use carelog::config::AppConfig;
use carelog::date_range::today;
use carelog::notifier::SmtpMailer;
use carelog::schedule_run::{run_schedule_digest, ScheduleRunOptions};
use carelog::timesheet_mail::ImapTimesheetSource;
use carelog::AppError;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    carelog::init_tracing();

    let smtp = config
        .smtp()?
        .ok_or_else(|| AppError::MissingEnvVar("SMTP_HOST".to_string()))?;
    let mailer = SmtpMailer::new(&smtp).context("Failed to set up SMTP transport")?;
    let source = ImapTimesheetSource::new(config.imap()?);

    let options = ScheduleRunOptions::new(
        today(),
        config.coverage_window(),
        config.missing_data_alert_days,
    );
    let digest = run_schedule_digest(&source, &mailer, &options)
        .await
        .context("Schedule digest run failed")?;

    info!("Schedule digest sent: {}", digest.subject);
    Ok(())
}
