//! HTTP adapter for the course platform's account API.
//!
//! Endpoints, relative to the configured base URL:
//! - `POST /api/login` with `{email, password}` → `{token}`
//! - `GET /api/me` → `{display_name, currency}`
//! - `POST /api/enroll` with `{url, coupon_code}` → `{status, price_minor?}`
//!
//! A 401 or 403 is an authentication failure; anything else unexpected is
//! fatal during login and a per-course error during enrollment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use freecourse::{
    AccountGateway, AccountInfo, CourseRecord, Credentials, EnrollError, EnrollOutcome, Enroller,
    LoginError, LoginResult, LoginSession, Settings,
};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// One cookie of a browser export: `[{"name": ..., "value": ...}, ...]`.
#[derive(Debug, Deserialize)]
struct ExportedCookie {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CookieExport {
    List(Vec<ExportedCookie>),
    Map(BTreeMap<String, String>),
}

/// Account API client.
#[derive(Clone)]
pub struct HttpAccount {
    client: reqwest::Client,
    base_url: String,
    cookie_file: Option<PathBuf>,
}

impl HttpAccount {
    pub fn new(base_url: &str, timeout: Duration, cookie_file: Option<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie_file,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.account.base_url,
            Duration::from_secs(settings.account.request_timeout_secs),
            settings.cookie_file.clone(),
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Attach credentials to a request.
fn authorize(request: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
    match credentials {
        Credentials::Token { token } => request.bearer_auth(token),
        Credentials::Cookies { cookies } => {
            let header = cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            request.header(reqwest::header::COOKIE, header)
        }
    }
}

fn is_auth_status(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Map a login-phase response to an error unless it succeeded.
fn check_login_response(resp: Response, what: &str) -> LoginResult<Response> {
    let status = resp.status();
    if is_auth_status(status) {
        return Err(LoginError::Authentication(format!("{what} rejected ({status})")));
    }
    if !status.is_success() {
        return Err(LoginError::Fatal(format!("{what} returned {status}")));
    }
    Ok(resp)
}

/// Read a cookie export written by a browser extension.
fn read_cookie_file(path: &Path) -> LoginResult<BTreeMap<String, String>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LoginError::Authentication(format!(
                "cookie file {} not found",
                path.display()
            )));
        }
        Err(e) => {
            return Err(LoginError::Fatal(format!(
                "cannot read cookie file {}: {e}",
                path.display()
            )));
        }
    };

    let export: CookieExport = serde_json::from_str(&raw).map_err(|e| {
        LoginError::Authentication(format!("cookie file {} is malformed: {e}", path.display()))
    })?;

    let cookies = match export {
        CookieExport::List(list) => list.into_iter().map(|c| (c.name, c.value)).collect(),
        CookieExport::Map(map) => map,
    };
    Ok(cookies)
}

#[async_trait]
impl AccountGateway for HttpAccount {
    async fn session_from_cookies(&self) -> LoginResult<Credentials> {
        let path = self
            .cookie_file
            .as_deref()
            .ok_or_else(|| LoginError::Authentication("no cookie file configured".into()))?;

        let cookies = read_cookie_file(path)?;
        if cookies.is_empty() {
            return Err(LoginError::Authentication(format!(
                "cookie file {} holds no cookies",
                path.display()
            )));
        }
        tracing::debug!(count = cookies.len(), "loaded browser cookies");
        Ok(Credentials::Cookies { cookies })
    }

    async fn login(&self, email: &str, password: &str) -> LoginResult<Credentials> {
        let resp = self
            .client
            .post(self.endpoint("/api/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| LoginError::Fatal(format!("login request failed: {e}")))?;

        let body: TokenResponse = check_login_response(resp, "login")?
            .json()
            .await
            .map_err(|e| LoginError::Fatal(format!("invalid login response: {e}")))?;
        Ok(Credentials::Token { token: body.token })
    }

    async fn session_info(&self, credentials: &Credentials) -> LoginResult<AccountInfo> {
        let resp = authorize(self.client.get(self.endpoint("/api/me")), credentials)
            .send()
            .await
            .map_err(|e| LoginError::Fatal(format!("session info request failed: {e}")))?;

        check_login_response(resp, "session")?
            .json()
            .await
            .map_err(|e| LoginError::Fatal(format!("invalid session info: {e}")))
    }
}

#[async_trait]
impl Enroller for HttpAccount {
    async fn enroll(
        &self,
        session: &LoginSession,
        course: &CourseRecord,
    ) -> Result<EnrollOutcome, EnrollError> {
        let resp = authorize(self.client.post(self.endpoint("/api/enroll")), session.credentials())
            .json(&json!({ "url": course.url, "coupon_code": course.coupon_code }))
            .send()
            .await
            .map_err(|e| EnrollError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EnrollError::Http(format!("enroll returned {status}")));
        }
        resp.json()
            .await
            .map_err(|e| EnrollError::Response(e.to_string()))
    }
}
