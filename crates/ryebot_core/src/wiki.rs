use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::config::BotConfig;
use crate::error::{ApiError, RyebotError};

/// The minimal wiki surface the rest of the bot consumes. One live
/// implementation (`MediaWikiClient`); tests substitute recording fakes.
pub trait WikiApi {
    fn login(&mut self, username: &str, password: &str) -> Result<()>;
    fn site_identity(&mut self) -> Result<SiteIdentity>;
    fn read_page(&mut self, title: &str) -> Result<PageContent>;
    fn edit_page(&mut self, title: &str, content: &str, summary: &str) -> Result<EditReceipt>;
    fn request_count(&self) -> usize;
}

/// Who and where we are after login, used to validate the session.
#[derive(Debug, Clone)]
pub struct SiteIdentity {
    pub wiki_id: String,
    pub host: String,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct PageContent {
    pub title: String,
    pub exists: bool,
    pub content: String,
    pub revision_id: Option<u64>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EditReceipt {
    pub title: String,
    pub revision_id: Option<u64>,
    pub no_change: bool,
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            api_url: config.api_url(),
            user_agent: config.user_agent(),
            timeout_ms: env_value_u64("RYEBOT_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("RYEBOT_RATE_LIMIT_READ", 300),
            rate_limit_write_ms: env_value_u64("RYEBOT_RATE_LIMIT_WRITE", 1_000),
            max_retries: env_value_usize("RYEBOT_HTTP_RETRIES", 2),
            max_write_retries: env_value_usize("RYEBOT_HTTP_WRITE_RETRIES", 1),
            retry_delay_ms: env_value_u64("RYEBOT_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
    csrf_token: Option<String>,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
            csrf_token: None,
        })
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid wiki API URL: {}", self.config.api_url))?;

        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit(false);
            let response = self
                .client
                .get(base_url.clone())
                .header("User-Agent", self.config.user_agent.clone())
                .query(&pairs)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt, false);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }
                    return decode_api_payload(response);
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt, false);
                        continue;
                    }
                    return Err(RyebotError::Connectivity {
                        reason: error.to_string(),
                    }
                    .into());
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    fn request_json_post(&mut self, params: &[(&str, String)], is_write: bool) -> Result<Value> {
        let max_retries = if is_write {
            self.config.max_write_retries
        } else {
            self.config.max_retries
        };
        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        for attempt in 0..=max_retries {
            self.apply_rate_limit(is_write);
            let response = self
                .client
                .post(&self.config.api_url)
                .header("User-Agent", self.config.user_agent.clone())
                .form(&pairs)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt, is_write);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }
                    return decode_api_payload(response);
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt, is_write);
                        continue;
                    }
                    return Err(RyebotError::Connectivity {
                        reason: error.to_string(),
                    }
                    .into());
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    fn apply_rate_limit(&mut self, is_write: bool) {
        let delay = if is_write {
            Duration::from_millis(self.config.rate_limit_write_ms)
        } else {
            Duration::from_millis(self.config.rate_limit_read_ms)
        };
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize, is_write: bool) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let multiplier = if is_write { 2u64 } else { 1u64 };
        sleep(Duration::from_millis(
            base.saturating_mul(multiplier).saturating_add(jitter),
        ));
    }

    fn ensure_csrf_token(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
        ])?;
        let parsed: TokenQueryResponse =
            serde_json::from_value(response).context("failed to decode csrf token response")?;
        let token = parsed
            .query
            .tokens
            .as_ref()
            .and_then(|tokens| tokens.csrftoken.as_ref())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }
}

impl WikiApi for MediaWikiClient {
    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let token_response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
            ("type", "login".to_string()),
        ])?;
        let token_payload: TokenQueryResponse = serde_json::from_value(token_response)
            .context("failed to decode login token response")?;
        let login_token = token_payload
            .query
            .tokens
            .as_ref()
            .and_then(|tokens| tokens.logintoken.as_ref())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let login_response = self.request_json_post(
            &[
                ("action", "login".to_string()),
                ("lgname", username.to_string()),
                ("lgpassword", password.to_string()),
                ("lgtoken", login_token),
            ],
            true,
        )?;
        let login_payload: LoginResponse =
            serde_json::from_value(login_response).context("failed to decode login response")?;
        match login_payload.login.result.as_deref() {
            Some("Success") => {
                self.csrf_token = None;
                Ok(())
            }
            other => Err(RyebotError::Authentication {
                wiki: self.config.api_url.clone(),
                reason: login_payload
                    .login
                    .reason
                    .or_else(|| other.map(ToString::to_string))
                    .unwrap_or_else(|| "unknown error".to_string()),
            }
            .into()),
        }
    }

    fn site_identity(&mut self) -> Result<SiteIdentity> {
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "userinfo|siteinfo".to_string()),
            ("siprop", "general".to_string()),
        ])?;
        let parsed: SiteQueryResponse =
            serde_json::from_value(response).context("failed to decode site identity response")?;
        let username = parsed
            .query
            .userinfo
            .map(|info| info.name)
            .ok_or_else(|| anyhow::anyhow!("missing userinfo in API response"))?;
        let host = parsed
            .query
            .general
            .and_then(|general| general.servername)
            .ok_or_else(|| anyhow::anyhow!("missing siteinfo in API response"))?;

        Ok(SiteIdentity {
            wiki_id: wiki_id_from_host(&host),
            host,
            username,
        })
    }

    fn read_page(&mut self, title: &str) -> Result<PageContent> {
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "content|timestamp|ids".to_string()),
            ("rvslots", "main".to_string()),
        ])?;
        let parsed: PageQueryResponse = serde_json::from_value(response)
            .context("failed to decode page content API response")?;
        let page = parsed
            .query
            .pages
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("page query returned no entries for \"{title}\""))?;

        if page.missing.unwrap_or(false) {
            return Ok(PageContent {
                title: page.title,
                exists: false,
                content: String::new(),
                revision_id: None,
                timestamp: None,
            });
        }

        let revision = page
            .revisions
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("page \"{title}\" has no revisions"))?;
        let content = revision
            .slots
            .and_then(|slots| slots.main)
            .and_then(|slot| slot.content)
            .unwrap_or_default();

        Ok(PageContent {
            title: page.title,
            exists: true,
            content,
            revision_id: revision.revid,
            timestamp: revision.timestamp,
        })
    }

    fn edit_page(&mut self, title: &str, content: &str, summary: &str) -> Result<EditReceipt> {
        let token = self.ensure_csrf_token()?;
        let response = self.request_json_post(
            &[
                ("action", "edit".to_string()),
                ("title", title.to_string()),
                ("text", content.to_string()),
                ("summary", summary.to_string()),
                ("bot", "1".to_string()),
                ("minor", "1".to_string()),
                ("token", token),
            ],
            true,
        );

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                if let Some(api_error) = error.downcast_ref::<ApiError>()
                    && is_write_rejection(&api_error.code)
                {
                    return Err(RyebotError::WriteFailed {
                        page: title.to_string(),
                        reason: format!("[{}] {}", api_error.code, api_error.info),
                    }
                    .into());
                }
                return Err(error);
            }
        };

        let edit_payload: EditResponse =
            serde_json::from_value(response).context("failed to decode edit response")?;
        let edit = edit_payload
            .edit
            .ok_or_else(|| anyhow::anyhow!("missing edit payload in API response"))?;
        if edit.result.as_deref() != Some("Success") {
            return Err(RyebotError::WriteFailed {
                page: title.to_string(),
                reason: edit.result.unwrap_or_else(|| "unknown".to_string()),
            }
            .into());
        }

        Ok(EditReceipt {
            title: title.to_string(),
            revision_id: edit.newrevid,
            no_change: edit.nochange.unwrap_or(false),
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn decode_api_payload(response: reqwest::blocking::Response) -> Result<Value> {
    let payload: Value = response
        .json()
        .context("failed to decode MediaWiki API JSON response")?;
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string();
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info")
            .to_string();
        return Err(ApiError { code, info }.into());
    }
    Ok(payload)
}

/// Error codes MediaWiki returns when an edit is rejected rather than the
/// transport failing. These surface to scripts as `WriteFailed`.
fn is_write_rejection(code: &str) -> bool {
    matches!(
        code,
        "protectedpage"
            | "protectednamespace"
            | "protectednamespace-interface"
            | "cascadeprotected"
            | "customcssjsprotected"
            | "permissiondenied"
            | "permissions"
            | "blocked"
            | "autoblocked"
            | "editconflict"
            | "spamblacklist"
            | "abusefilter-disallowed"
            | "readonly"
    )
}

/// wiki.gg hosts are `<wiki>.wiki.gg`; elsewhere fall back to the host name.
fn wiki_id_from_host(host: &str) -> String {
    let host = host
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    host.strip_suffix(".wiki.gg").unwrap_or(host).to_string()
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize)]
struct TokenQueryResponse {
    query: TokenQuery,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    csrftoken: Option<String>,
    logintoken: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    login: LoginPayload,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SiteQueryResponse {
    query: SiteQuery,
}

#[derive(Debug, Deserialize)]
struct SiteQuery {
    userinfo: Option<UserInfo>,
    general: Option<GeneralInfo>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GeneralInfo {
    servername: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PageQueryResponse {
    #[serde(default)]
    query: PageQuery,
}

#[derive(Debug, Deserialize, Default)]
struct PageQuery {
    #[serde(default)]
    pages: Vec<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    title: String,
    missing: Option<bool>,
    #[serde(default)]
    revisions: Vec<Revision>,
}

#[derive(Debug, Deserialize)]
struct Revision {
    revid: Option<u64>,
    timestamp: Option<String>,
    slots: Option<Slots>,
}

#[derive(Debug, Deserialize)]
struct Slots {
    main: Option<Slot>,
}

#[derive(Debug, Deserialize)]
struct Slot {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize)]
struct EditPayload {
    result: Option<String>,
    newrevid: Option<u64>,
    nochange: Option<bool>,
}
