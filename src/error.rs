// src/error.rs
use thiserror::Error;

use crate::date_range::DateRangeError;
use crate::notifier::NotifyError;
use crate::portal_client::PortalError;
use crate::schedule_parser::ScheduleError;
use crate::sent_ledger::LedgerError;
use crate::timesheet_mail::MailSourceError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] envy::Error),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid date range: {0}")]
    DateRange(#[from] DateRangeError),

    #[error("Care portal error: {0}")]
    Portal(#[from] PortalError),

    #[error("Timesheet error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Mailbox error: {0}")]
    MailSource(#[from] MailSourceError),

    #[error("Notification delivery failed: {0}")]
    Notify(#[from] NotifyError),

    #[error("Sent ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("No timesheet schedule found in the last {0} candidate document(s)")]
    NoSchedule(usize),
}
