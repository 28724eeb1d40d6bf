// src/main.rs
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::time::Duration;
use tracing::{info, warn};

use carelog::activity_run::{run_activity_log, ActivityRunOptions, DEFAULT_COURTESY_DELAY_SECS};
use carelog::config::AppConfig;
use carelog::date_range::{parse_date, resolve_range, today};
use carelog::notifier::{MailTransport, SmtpMailer};
use carelog::portal_client::PortalClient;
use carelog::retry::RetryPolicy;
use carelog::sent_ledger::SentLedger;

/// Emails the care portal's activity log, one message per day with new content.
#[derive(Parser, Debug)]
#[command(name = "carelog", version)]
struct Cli {
    /// First date to fetch (DD/MM/YYYY or YYYY-MM-DD). Defaults to today.
    #[arg(short = 'f', long = "from", value_parser = parse_cli_date)]
    from: Option<NaiveDate>,

    /// Last date to fetch (DD/MM/YYYY or YYYY-MM-DD).
    #[arg(short = 't', long = "to", value_parser = parse_cli_date)]
    to: Option<NaiveDate>,

    /// Send even if the same content was already emailed.
    #[arg(long)]
    force: bool,
}

fn parse_cli_date(value: &str) -> Result<NaiveDate, String> {
    parse_date(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dates = match resolve_range(cli.from, cli.to, today()) {
        Ok(dates) => dates,
        Err(e) => Cli::command()
            .error(ErrorKind::ValueValidation, e.to_string())
            .exit(),
    };

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    carelog::init_tracing();
    info!(
        "Processing {} date(s){}",
        dates.len(),
        if cli.force { " (forced)" } else { "" }
    );

    let portal = PortalClient::new(config.portal()?).context("Failed to set up portal client")?;
    let mailer = match config.smtp()? {
        Some(smtp) => Some(SmtpMailer::new(&smtp).context("Failed to set up SMTP transport")?),
        None => {
            warn!(
                "SMTP_HOST is not set; output goes to {:?} and nothing is marked as sent",
                config.fallback_output_path
            );
            None
        }
    };
    let mut ledger = SentLedger::load(&config.sent_ledger_path);

    let options = ActivityRunOptions {
        force: cli.force,
        retry: RetryPolicy::default(),
        courtesy_delay: Duration::from_secs(DEFAULT_COURTESY_DELAY_SECS),
        fallback_path: config.fallback_output_path.clone(),
    };

    run_activity_log(
        &portal,
        mailer.as_ref().map(|m| m as &dyn MailTransport),
        &mut ledger,
        &dates,
        &options,
    )
    .await
    .context("Activity log run aborted")?;

    Ok(())
}
