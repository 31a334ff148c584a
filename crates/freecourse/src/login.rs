//! Login fallback chain.
//!
//! Methods are tried in a fixed priority order, picking the first one whose
//! configuration is present: stored browser session, saved credentials,
//! interactive prompt. An authentication failure clears the failing source
//! from the settings and evaluation restarts from the top, so the same
//! method is never retried with the same inputs. Anything else is fatal.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::settings::Settings;
use crate::types::{LoginError, LoginResult};

const DEFAULT_MAX_PROMPT_ATTEMPTS: u32 = 3;

/// Credential bundle proving an authenticated session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credentials {
    Cookies { cookies: BTreeMap<String, String> },
    Token { token: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Cookies { cookies } => f
                .debug_struct("Cookies")
                .field("names", &cookies.keys().collect::<Vec<_>>())
                .finish(),
            Credentials::Token { .. } => f.write_str("Token(<redacted>)"),
        }
    }
}

/// Account metadata needed for the enrollment summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub display_name: String,
    pub currency: String,
}

/// A way of obtaining credentials, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    StoredSession,
    SavedCredentials,
    Interactive,
}

impl LoginMethod {
    /// First method whose configuration is present.
    pub fn select(settings: &Settings) -> Self {
        if settings.use_browser_cookies {
            LoginMethod::StoredSession
        } else if settings.has_saved_credentials() {
            LoginMethod::SavedCredentials
        } else {
            LoginMethod::Interactive
        }
    }
}

/// Coordinator state, as observed from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    TryingStoredSession,
    TryingSavedCredentials,
    PromptInteractive,
    Authenticated,
}

impl From<LoginMethod> for LoginState {
    fn from(method: LoginMethod) -> Self {
        match method {
            LoginMethod::StoredSession => LoginState::TryingStoredSession,
            LoginMethod::SavedCredentials => LoginState::TryingSavedCredentials,
            LoginMethod::Interactive => LoginState::PromptInteractive,
        }
    }
}

/// Established session. Immutable once created.
#[derive(Debug, Clone)]
pub struct LoginSession {
    credentials: Credentials,
    account: AccountInfo,
    method: LoginMethod,
}

impl LoginSession {
    pub fn new(credentials: Credentials, account: AccountInfo, method: LoginMethod) -> Self {
        Self {
            credentials,
            account,
            method,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn account(&self) -> &AccountInfo {
        &self.account
    }

    pub fn currency(&self) -> &str {
        &self.account.currency
    }

    pub fn method(&self) -> LoginMethod {
        self.method
    }
}

/// Account-side operations the coordinator depends on.
#[async_trait]
pub trait AccountGateway: Send + Sync {
    /// Build credentials from a session exported by the operator's browser.
    async fn session_from_cookies(&self) -> LoginResult<Credentials>;

    /// Log in with an email and password.
    async fn login(&self, email: &str, password: &str) -> LoginResult<Credentials>;

    /// Fetch account metadata for the given credentials.
    async fn session_info(&self, credentials: &Credentials) -> LoginResult<AccountInfo>;
}

/// Asks the operator for an email and password.
pub trait CredentialPrompt: Send + Sync {
    fn prompt(&self) -> LoginResult<(String, String)>;
}

/// One entry of the coordinator's attempt log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    pub method: LoginMethod,
    pub error: Option<LoginError>,
}

/// Drives the login fallback chain to an authenticated session.
pub struct LoginCoordinator {
    gateway: Arc<dyn AccountGateway>,
    prompt: Arc<dyn CredentialPrompt>,
    max_prompt_attempts: u32,
    state: Option<LoginState>,
    attempts: Vec<LoginAttempt>,
}

impl LoginCoordinator {
    pub fn new(gateway: Arc<dyn AccountGateway>, prompt: Arc<dyn CredentialPrompt>) -> Self {
        Self {
            gateway,
            prompt,
            max_prompt_attempts: DEFAULT_MAX_PROMPT_ATTEMPTS,
            state: None,
            attempts: Vec::new(),
        }
    }

    /// Limit how many times the operator is asked for credentials.
    pub fn with_max_prompt_attempts(mut self, attempts: u32) -> Self {
        self.max_prompt_attempts = attempts;
        self
    }

    /// Current state; `None` before [`login`](Self::login) is called.
    pub fn state(&self) -> Option<LoginState> {
        self.state
    }

    /// Every method tried so far, in order.
    pub fn attempts(&self) -> &[LoginAttempt] {
        &self.attempts
    }

    /// Run the prompt on the blocking pool; it reads from the terminal.
    async fn ask(&self) -> LoginResult<(String, String)> {
        let prompt = Arc::clone(&self.prompt);
        tokio::task::spawn_blocking(move || prompt.prompt())
            .await
            .map_err(|e| LoginError::Fatal(format!("credential prompt failed: {e}")))?
    }

    /// Walk the fallback chain until a session is established.
    ///
    /// `settings` is demoted in place as sources fail, and credentials typed
    /// at the prompt are written back on success. Callers persist it.
    pub async fn login(&mut self, settings: &mut Settings) -> LoginResult<LoginSession> {
        let mut prompts = 0u32;
        loop {
            let method = LoginMethod::select(settings);
            self.state = Some(method.into());
            tracing::debug!(?method, "attempting login");

            let mut typed = None;
            let credentials = match method {
                LoginMethod::StoredSession => self.gateway.session_from_cookies().await,
                LoginMethod::SavedCredentials => {
                    self.gateway.login(&settings.email, &settings.password).await
                }
                LoginMethod::Interactive => {
                    if prompts >= self.max_prompt_attempts {
                        return Err(LoginError::Exhausted { attempts: prompts });
                    }
                    prompts += 1;
                    let (email, password) = self.ask().await?;
                    let result = self.gateway.login(&email, &password).await;
                    typed = Some((email, password));
                    result
                }
            };

            let session = match credentials {
                Ok(credentials) => self
                    .gateway
                    .session_info(&credentials)
                    .await
                    .map(|account| LoginSession::new(credentials, account, method)),
                Err(e) => Err(e),
            };

            match session {
                Ok(session) => {
                    if let Some((email, password)) = typed {
                        settings.email = email;
                        settings.password = password;
                    }
                    self.attempts.push(LoginAttempt { method, error: None });
                    self.state = Some(LoginState::Authenticated);
                    tracing::info!(
                        ?method,
                        account = %session.account().display_name,
                        currency = %session.currency(),
                        "logged in"
                    );
                    return Ok(session);
                }
                Err(error) if error.is_authentication() => {
                    tracing::error!(?method, %error, "login failed, falling back");
                    self.attempts.push(LoginAttempt {
                        method,
                        error: Some(error),
                    });
                    demote(method, settings);
                }
                Err(error) => {
                    self.attempts.push(LoginAttempt {
                        method,
                        error: Some(error.clone()),
                    });
                    return Err(error);
                }
            }
        }
    }
}

fn demote(method: LoginMethod, settings: &mut Settings) {
    match method {
        LoginMethod::StoredSession => settings.use_browser_cookies = false,
        LoginMethod::SavedCredentials | LoginMethod::Interactive => {
            settings.email.clear();
            settings.password.clear();
        }
    }
}
