// src/portal_client.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::PortalConfig;
use crate::date_range::{display_key, iso_key};
use crate::html_text::decode_entities;
use crate::portal_extract::{extract_activities, ActivityDay};

const USERNAME_FIELD: &str = "username";
const PASSWORD_FIELD: &str = "password";

static INPUT_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<input\b([^>]*)>").unwrap());
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)([a-z_:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("URL parsing error")]
    UrlParse(#[from] url::ParseError),

    #[error("Login rejected: still on {0} after submitting credentials")]
    Auth(String),

    #[error("Session expired: redirected to {0}")]
    SessionExpired(String),

    #[error("Portal returned {status} for {url}")]
    Status { status: StatusCode, url: String },
}

impl PortalError {
    /// Authentication failures are fatal for the run; everything else is per-date.
    pub fn is_auth(&self) -> bool {
        matches!(self, PortalError::Auth(_))
    }
}

/// A logged-in view of the portal that yields one day of activities at a time.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn login(&self) -> Result<(), PortalError>;
    async fn fetch_day(&self, date: NaiveDate) -> Result<ActivityDay, PortalError>;
    /// Ends the session. Must not fail; problems are logged.
    async fn close(&self);
}

/// Cookie-backed HTTP session against the care portal.
#[derive(Clone)]
pub struct PortalClient {
    config: PortalConfig,
    base_url: Url,
    http_client: Client,
}

impl PortalClient {
    pub fn new(config: PortalConfig) -> Result<Self, PortalError> {
        let http_client = Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()?;
        let base_url = Url::parse(&config.base_url)?;
        Ok(Self {
            config,
            base_url,
            http_client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PortalError> {
        Ok(self.base_url.join(path)?)
    }

    fn is_login_url(&self, url: &Url) -> bool {
        let login_path = self.config.login_path.trim_end_matches('/');
        !login_path.is_empty() && url.path().trim_end_matches('/').ends_with(login_path)
    }

    pub fn activity_url(&self, date: NaiveDate) -> Result<Url, PortalError> {
        let mut url = self.endpoint(&self.config.activity_path)?;
        url.query_pairs_mut().append_pair("date", &iso_key(date));
        Ok(url)
    }
}

#[async_trait]
impl ActivitySource for PortalClient {
    async fn login(&self) -> Result<(), PortalError> {
        let login_url = self.endpoint(&self.config.login_path)?;
        debug!("Loading login form from {}", login_url);

        let page = self.http_client.get(login_url.clone()).send().await?;
        let status = page.status();
        if !status.is_success() {
            return Err(PortalError::Status {
                status,
                url: login_url.to_string(),
            });
        }
        let form_html = page.text().await?;

        let mut form = hidden_inputs(&form_html);
        form.retain(|(name, _)| name != USERNAME_FIELD && name != PASSWORD_FIELD);
        form.push((USERNAME_FIELD.to_string(), self.config.username.clone()));
        form.push((PASSWORD_FIELD.to_string(), self.config.password.clone()));

        let response = self
            .http_client
            .post(login_url.clone())
            .form(&form)
            .send()
            .await?;
        let landed_on = response.url().clone();
        let status = response.status();

        if self.is_login_url(&landed_on) {
            warn!("Login did not leave the login page (status {})", status);
            return Err(PortalError::Auth(landed_on.to_string()));
        }
        if !status.is_success() {
            return Err(PortalError::Status {
                status,
                url: landed_on.to_string(),
            });
        }

        info!("Logged in to care portal as {}", self.config.username);
        Ok(())
    }

    async fn fetch_day(&self, date: NaiveDate) -> Result<ActivityDay, PortalError> {
        let url = self.activity_url(date)?;
        debug!("Fetching activity log from {}", url);

        let response = self
            .http_client
            .get(url.clone())
            .header(ACCEPT, "text/html")
            .send()
            .await?;
        let landed_on = response.url().clone();
        if self.is_login_url(&landed_on) {
            return Err(PortalError::SessionExpired(landed_on.to_string()));
        }
        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::Status {
                status,
                url: url.to_string(),
            });
        }

        let html = response.text().await?;
        let (activities, source) = extract_activities(&html);
        info!(
            "Found {} activities for {} ({:?})",
            activities.len(),
            display_key(date),
            source
        );

        Ok(ActivityDay {
            date_label: display_key(date),
            activities,
        })
    }

    async fn close(&self) {
        let logout_url = match self.endpoint(&self.config.logout_path) {
            Ok(url) => url,
            Err(e) => {
                warn!("Invalid logout path {}: {}", self.config.logout_path, e);
                return;
            }
        };
        match self.http_client.get(logout_url).send().await {
            Ok(resp) => debug!("Logout request returned {}", resp.status()),
            Err(e) => warn!("Logout request failed: {}", e),
        }
        info!("Portal session closed");
    }
}

/// Name/value pairs of every hidden `<input>` in a form page.
pub fn hidden_inputs(html: &str) -> Vec<(String, String)> {
    INPUT_TAG_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let mut name = None;
            let mut value = String::new();
            let mut hidden = false;
            for attr in ATTR_RE.captures_iter(&caps[1]) {
                let attr_value = attr
                    .get(2)
                    .or_else(|| attr.get(3))
                    .map_or("", |m| m.as_str());
                match attr[1].to_ascii_lowercase().as_str() {
                    "type" => hidden = attr_value.eq_ignore_ascii_case("hidden"),
                    "name" => name = Some(attr_value.to_string()),
                    "value" => value = decode_entities(attr_value),
                    _ => {}
                }
            }
            match name {
                Some(name) if hidden => Some((name, value)),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::runtime::Runtime;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LOGIN_FORM: &str = r#"<form method="post">
        <input type="hidden" name="_token" value="csrf&amp;123">
        <input name="username" type="text">
        <input type='password' name='password'>
        <input value="en" name="locale" type="HIDDEN" />
      </form>"#;

    fn client_for(server: &MockServer) -> PortalClient {
        PortalClient::new(PortalConfig {
            base_url: server.uri(),
            username: "carer@example.com".to_string(),
            password: "secret".to_string(),
            login_path: "/login".to_string(),
            activity_path: "/activity-log".to_string(),
            logout_path: "/logout".to_string(),
            request_timeout: Duration::from_secs(5),
        })
        .expect("Failed to create test client")
    }

    async fn mount_login_form(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_FORM))
            .mount(server)
            .await;
    }

    #[test]
    fn test_hidden_inputs() {
        let inputs = hidden_inputs(LOGIN_FORM);
        assert_eq!(
            inputs,
            vec![
                ("_token".to_string(), "csrf&123".to_string()),
                ("locale".to_string(), "en".to_string()),
            ]
        );
    }

    #[test]
    fn test_login_success_follows_redirect() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let server = MockServer::start().await;
            mount_login_form(&server).await;
            Mock::given(method("POST"))
                .and(path("/login"))
                .and(body_string_contains("_token=csrf%26123"))
                .and(body_string_contains("username=carer%40example.com"))
                .respond_with(
                    ResponseTemplate::new(302)
                        .insert_header("Location", "/dashboard")
                        .insert_header("Set-Cookie", "session=abc; Path=/"),
                )
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/dashboard"))
                .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Welcome</h1>"))
                .mount(&server)
                .await;

            let client = client_for(&server);
            client.login().await.expect("login should succeed");
        });
    }

    #[test]
    fn test_login_rejected_when_still_on_login_page() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let server = MockServer::start().await;
            mount_login_form(&server).await;
            Mock::given(method("POST"))
                .and(path("/login"))
                .respond_with(
                    ResponseTemplate::new(302).insert_header("Location", "/login?error=1"),
                )
                .mount(&server)
                .await;

            let client = client_for(&server);
            let result = client.login().await;
            match result {
                Err(ref e) if e.is_auth() => (),
                other => panic!("Expected Auth error but got: {:?}", other),
            }
        });
    }

    #[test]
    fn test_fetch_day_reads_table_page() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/activity-log"))
                .and(query_param("date", "2026-01-22"))
                .respond_with(ResponseTemplate::new(200).set_body_string(
                    r#"<tr class="task-header"><td>Meal Task is completed.</td></tr>
                       <tr class="task-detail"><td>Soup</td></tr>"#,
                ))
                .mount(&server)
                .await;

            let client = client_for(&server);
            let day = client
                .fetch_day(NaiveDate::from_ymd_opt(2026, 1, 22).unwrap())
                .await
                .unwrap();
            assert_eq!(day.date_label, "22/01/2026");
            assert_eq!(day.activities.len(), 1);
            assert_eq!(day.activities[0].note, "Soup");
        });
    }

    #[test]
    fn test_fetch_day_empty_page_is_not_an_error() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/activity-log"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_string("<p>No entries for this day</p>"),
                )
                .mount(&server)
                .await;

            let client = client_for(&server);
            let day = client
                .fetch_day(NaiveDate::from_ymd_opt(2026, 1, 23).unwrap())
                .await
                .unwrap();
            assert!(day.activities.is_empty());
        });
    }

    #[test]
    fn test_fetch_day_errors() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/activity-log"))
                .and(query_param("date", "2026-01-24"))
                .respond_with(ResponseTemplate::new(302).insert_header("Location", "/login"))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/login"))
                .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_FORM))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/activity-log"))
                .and(query_param("date", "2026-01-25"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server)
                .await;

            let client = client_for(&server);
            let expired = client
                .fetch_day(NaiveDate::from_ymd_opt(2026, 1, 24).unwrap())
                .await;
            assert!(matches!(expired, Err(PortalError::SessionExpired(_))));

            let unavailable = client
                .fetch_day(NaiveDate::from_ymd_opt(2026, 1, 25).unwrap())
                .await;
            match unavailable {
                Err(PortalError::Status { status, .. }) => {
                    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE)
                }
                other => panic!("Expected Status error but got: {:?}", other),
            }
        });
    }
}
