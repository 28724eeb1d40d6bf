// src/lib.rs
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod activity_format;
pub mod activity_run;
pub mod config;
pub mod coverage;
pub mod date_range;
pub mod error;
pub mod html_text;
pub mod notifier;
pub mod portal_client;
pub mod portal_extract;
pub mod retry;
pub mod schedule_format;
pub mod schedule_parser;
pub mod schedule_run;
pub mod sent_ledger;
pub mod timesheet_mail;


pub use error::AppError;

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
