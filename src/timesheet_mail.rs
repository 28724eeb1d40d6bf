// src/timesheet_mail.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Local, TimeZone};
use mailparse::{MailHeaderMap, ParsedMail};
use native_tls::TlsStream;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ImapConfig;

#[derive(Error, Debug)]
pub enum MailSourceError {
    #[error("IMAP error: {0}")]
    Imap(#[from] imap::error::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("TLS handshake with {host} failed: {reason}")]
    TlsHandshake { host: String, reason: String },

    #[error("Connection error: {0}")]
    Io(#[from] io::Error),

    #[error("Could not parse message: {0}")]
    Parse(#[from] mailparse::MailParseError),

    #[error("Mailbox task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One PDF attachment from a timesheet email.
#[derive(Debug, Clone)]
pub struct TimesheetCandidate {
    pub received: DateTime<FixedOffset>,
    pub subject: String,
    pub filename: String,
    pub pdf: Vec<u8>,
}

/// Supplies timesheet attachments, newest first.
#[async_trait]
pub trait TimesheetSource: Send + Sync {
    async fn recent_timesheets(&self) -> Result<Vec<TimesheetCandidate>, MailSourceError>;
}

/// Subject and PDF attachments of one raw RFC 822 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTimesheetMail {
    pub subject: String,
    pub date: Option<i64>,
    pub attachments: Vec<(String, Vec<u8>)>,
}

pub fn parse_timesheet_mail(raw: &[u8]) -> Result<ParsedTimesheetMail, MailSourceError> {
    let parsed = mailparse::parse_mail(raw)?;
    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
    let date = parsed
        .headers
        .get_first_value("Date")
        .and_then(|d| mailparse::dateparse(&d).ok());
    let mut attachments = Vec::new();
    collect_pdf_parts(&parsed, &mut attachments)?;
    Ok(ParsedTimesheetMail {
        subject,
        date,
        attachments,
    })
}

fn collect_pdf_parts(
    part: &ParsedMail<'_>,
    out: &mut Vec<(String, Vec<u8>)>,
) -> Result<(), MailSourceError> {
    if part.subparts.is_empty() {
        let disposition = part.get_content_disposition();
        let filename = disposition
            .params
            .get("filename")
            .or_else(|| part.ctype.params.get("name"))
            .cloned()
            .unwrap_or_default();
        let is_pdf = part.ctype.mimetype.eq_ignore_ascii_case("application/pdf")
            || filename.to_ascii_lowercase().ends_with(".pdf");
        if is_pdf {
            out.push((filename, part.get_body_raw()?));
        }
        return Ok(());
    }
    for sub in &part.subparts {
        collect_pdf_parts(sub, out)?;
    }
    Ok(())
}

/// Flattens messages into candidates ordered newest first, keeping attachment order within a message.
pub fn order_candidates(mut candidates: Vec<TimesheetCandidate>) -> Vec<TimesheetCandidate> {
    candidates.sort_by(|a, b| b.received.cmp(&a.received));
    candidates
}

#[derive(Clone)]
pub struct ImapTimesheetSource {
    config: ImapConfig,
}

impl ImapTimesheetSource {
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }

    /// TCP socket with `config.timeout` applied to the connect and to every read and write.
    fn open_socket(config: &ImapConfig) -> Result<TcpStream, MailSourceError> {
        let mut last_error = None;
        for addr in (config.host.as_str(), config.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, config.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(config.timeout))?;
                    stream.set_write_timeout(Some(config.timeout))?;
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("IMAP connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no address found for {}", config.host),
                )
            })
            .into())
    }

    fn connect(config: &ImapConfig) -> Result<imap::Client<TlsStream<TcpStream>>, MailSourceError> {
        let socket = Self::open_socket(config)?;
        let tls = native_tls::TlsConnector::builder().build()?;
        let stream = tls
            .connect(&config.host, socket)
            .map_err(|e| MailSourceError::TlsHandshake {
                host: config.host.clone(),
                reason: e.to_string(),
            })?;
        let mut client = imap::Client::new(stream);
        client.read_greeting()?;
        Ok(client)
    }

    fn fetch_blocking(config: &ImapConfig) -> Result<Vec<TimesheetCandidate>, MailSourceError> {
        let client = Self::connect(config)?;
        let mut session = client
            .login(&config.username, &config.password)
            .map_err(|(e, _)| e)?;
        session.select(&config.mailbox)?;

        let since = Local::now().date_naive() - Duration::days(i64::from(config.lookback_days));
        let query = format!("SINCE {}", since.format("%d-%b-%Y"));
        let mut uids: Vec<u32> = session.uid_search(&query)?.into_iter().collect();
        uids.sort_unstable();
        debug!("IMAP search '{}' matched {} message(s)", query, uids.len());

        let mut candidates = Vec::new();
        if !uids.is_empty() {
            let uid_set = uids
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let fetches = session.uid_fetch(uid_set, "(INTERNALDATE BODY.PEEK[])")?;
            let filter = config.subject_filter.to_lowercase();
            for fetch in fetches.iter() {
                let Some(body) = fetch.body() else {
                    continue;
                };
                let mail = match parse_timesheet_mail(body) {
                    Ok(mail) => mail,
                    Err(e) => {
                        warn!("Skipping unparsable message uid {:?}: {}", fetch.uid, e);
                        continue;
                    }
                };
                if !mail.subject.to_lowercase().contains(&filter) {
                    continue;
                }
                let received = fetch
                    .internal_date()
                    .or_else(|| {
                        let ts = mail.date?;
                        FixedOffset::east_opt(0)?.timestamp_opt(ts, 0).single()
                    })
                    .unwrap_or_else(|| Local::now().fixed_offset());
                for (filename, pdf) in mail.attachments {
                    candidates.push(TimesheetCandidate {
                        received,
                        subject: mail.subject.clone(),
                        filename,
                        pdf,
                    });
                }
            }
        }

        if let Err(e) = session.logout() {
            warn!("IMAP logout failed: {}", e);
        }
        info!(
            "Found {} timesheet attachment(s) in {}",
            candidates.len(),
            config.mailbox
        );
        Ok(order_candidates(candidates))
    }
}

#[async_trait]
impl TimesheetSource for ImapTimesheetSource {
    async fn recent_timesheets(&self) -> Result<Vec<TimesheetCandidate>, MailSourceError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || Self::fetch_blocking(&config)).await?
    }
}
