// src/config.rs
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::coverage::CoverageWindow;
use crate::AppError;

pub const DEFAULT_LEDGER_FILE: &str = "sent_ledger.json";
pub const DEFAULT_FALLBACK_FILE: &str = "activity_preview.html";

/// Environment-sourced settings for both programs. Field names map to upper-case
/// variables (`portal_url` reads `PORTAL_URL`).
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    // Care portal
    pub portal_url: Option<String>,
    pub portal_username: Option<String>,
    pub portal_password: Option<String>,
    #[serde(default = "default_login_path")]
    pub portal_login_path: String,
    #[serde(default = "default_activity_path")]
    pub portal_activity_path: String,
    #[serde(default = "default_logout_path")]
    pub portal_logout_path: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // SMTP
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_secure: bool,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub mail_from: Option<String>,
    #[serde(default)]
    pub mail_to: String,

    // IMAP
    pub imap_host: Option<String>,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    pub imap_user: Option<String>,
    pub imap_pass: Option<String>,
    #[serde(default = "default_imap_mailbox")]
    pub imap_mailbox: String,
    #[serde(default = "default_timesheet_subject")]
    pub timesheet_subject: String,
    #[serde(default = "default_timesheet_lookback_days")]
    pub timesheet_lookback_days: u32,

    // Schedule tunables
    #[serde(default = "default_coverage_start_hour")]
    pub coverage_start_hour: u32,
    #[serde(default = "default_coverage_end_hour")]
    pub coverage_end_hour: u32,
    #[serde(default = "default_max_gap_minutes")]
    pub max_gap_minutes: u32,
    #[serde(default = "default_missing_data_alert_days")]
    pub missing_data_alert_days: u32,

    // Local files
    #[serde(default = "default_ledger_path")]
    pub sent_ledger_path: PathBuf,
    #[serde(default = "default_fallback_path")]
    pub fallback_output_path: PathBuf,
}

fn default_login_path() -> String {
    "/login".to_string()
}
fn default_activity_path() -> String {
    "/activity-log".to_string()
}
fn default_logout_path() -> String {
    "/logout".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_smtp_port() -> u16 {
    587
}
fn default_imap_port() -> u16 {
    993
}
fn default_imap_mailbox() -> String {
    "INBOX".to_string()
}
fn default_timesheet_subject() -> String {
    "timesheet".to_string()
}
fn default_timesheet_lookback_days() -> u32 {
    14
}
fn default_coverage_start_hour() -> u32 {
    9
}
fn default_coverage_end_hour() -> u32 {
    18
}
fn default_max_gap_minutes() -> u32 {
    120
}
fn default_missing_data_alert_days() -> u32 {
    2
}
fn default_ledger_path() -> PathBuf {
    PathBuf::from(DEFAULT_LEDGER_FILE)
}
fn default_fallback_path() -> PathBuf {
    PathBuf::from(DEFAULT_FALLBACK_FILE)
}

/// Portal settings, validated for the activity-log program.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub login_path: String,
    pub activity_path: String,
    pub logout_path: String,
    pub request_timeout: Duration,
}

/// SMTP settings. Absent when no `SMTP_HOST` is configured.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub recipients: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub mailbox: String,
    pub subject_filter: String,
    pub lookback_days: u32,
    /// Bounds the connect and every read or write on the IMAP socket.
    pub timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        Ok(envy::from_env::<AppConfig>()?)
    }

    pub fn portal(&self) -> Result<PortalConfig, AppError> {
        Ok(PortalConfig {
            base_url: required(&self.portal_url, "PORTAL_URL")?,
            username: required(&self.portal_username, "PORTAL_USERNAME")?,
            password: required(&self.portal_password, "PORTAL_PASSWORD")?,
            login_path: self.portal_login_path.clone(),
            activity_path: self.portal_activity_path.clone(),
            logout_path: self.portal_logout_path.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }

    /// `Ok(None)` when SMTP is not configured at all; the caller decides whether that is fatal.
    pub fn smtp(&self) -> Result<Option<SmtpConfig>, AppError> {
        let host = match self.smtp_host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Ok(None),
        };
        let recipients = split_recipients(&self.mail_to);
        if recipients.is_empty() {
            return Err(AppError::MissingEnvVar("MAIL_TO".to_string()));
        }
        let from = self
            .mail_from
            .clone()
            .or_else(|| self.smtp_user.clone())
            .ok_or_else(|| AppError::MissingEnvVar("MAIL_FROM".to_string()))?;

        Ok(Some(SmtpConfig {
            host,
            port: self.smtp_port,
            secure: self.smtp_secure,
            username: self.smtp_user.clone(),
            password: self.smtp_pass.clone(),
            from,
            recipients,
            timeout: Duration::from_secs(self.request_timeout_secs),
        }))
    }

    pub fn imap(&self) -> Result<ImapConfig, AppError> {
        Ok(ImapConfig {
            host: required(&self.imap_host, "IMAP_HOST")?,
            port: self.imap_port,
            username: required(&self.imap_user, "IMAP_USER")?,
            password: required(&self.imap_pass, "IMAP_PASS")?,
            mailbox: self.imap_mailbox.clone(),
            subject_filter: self.timesheet_subject.clone(),
            lookback_days: self.timesheet_lookback_days,
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        })
    }

    pub fn coverage_window(&self) -> CoverageWindow {
        CoverageWindow {
            start_hour: self.coverage_start_hour,
            end_hour: self.coverage_end_hour,
            max_gap_minutes: self.max_gap_minutes,
        }
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String, AppError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::MissingEnvVar(name.to_string())),
    }
}

pub fn split_recipients(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>();
        envy::from_iter::<_, AppConfig>(vars).expect("config should deserialize")
    }

    #[test]
    fn test_defaults_apply() {
        let config = config_from(&[]);
        assert_eq!(config.coverage_start_hour, 9);
        assert_eq!(config.coverage_end_hour, 18);
        assert_eq!(config.max_gap_minutes, 120);
        assert_eq!(config.smtp_port, 587);
        assert!(!config.smtp_secure);
        assert_eq!(config.sent_ledger_path, PathBuf::from(DEFAULT_LEDGER_FILE));
        assert!(config.smtp().unwrap().is_none());
    }

    #[test]
    fn test_missing_portal_credentials() {
        let config = config_from(&[("PORTAL_URL", "https://portal.example")]);
        match config.portal() {
            Err(AppError::MissingEnvVar(name)) => assert_eq!(name, "PORTAL_USERNAME"),
            other => panic!("Expected MissingEnvVar but got: {:?}", other),
        }
    }

    #[test]
    fn test_smtp_recipients_are_split() {
        let config = config_from(&[
            ("SMTP_HOST", "smtp.example"),
            ("SMTP_SECURE", "true"),
            ("SMTP_PORT", "465"),
            ("MAIL_FROM", "bot@example.com"),
            ("MAIL_TO", " a@example.com, ,b@example.com "),
        ]);
        let smtp = config.smtp().unwrap().unwrap();
        assert!(smtp.secure);
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.recipients, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_smtp_without_recipients_is_rejected() {
        let config = config_from(&[("SMTP_HOST", "smtp.example"), ("MAIL_FROM", "bot@x.org")]);
        assert!(matches!(config.smtp(), Err(AppError::MissingEnvVar(name)) if name == "MAIL_TO"));
    }
}
