//! Login fallback chain integration tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use freecourse::{
    AccountGateway, AccountInfo, CredentialPrompt, Credentials, LoginCoordinator, LoginError,
    LoginMethod, LoginResult, LoginState, Settings,
};

// ─────────────────────── helpers ───────────────────────

const GOOD_PASSWORD: &str = "correct horse";

/// Gateway accepting `GOOD_PASSWORD` and, optionally, the browser session.
struct FakeGateway {
    cookies: LoginResult<Credentials>,
    /// Token whose session-info lookup is rejected.
    revoked_token: Option<String>,
    /// Error returned for every password login instead of checking it.
    login_override: Option<LoginError>,
    calls: Mutex<Vec<String>>,
}

impl FakeGateway {
    fn new(cookies: LoginResult<Credentials>) -> Self {
        Self {
            cookies,
            revoked_token: None,
            login_override: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

fn cookie_session() -> Credentials {
    let mut cookies = BTreeMap::new();
    cookies.insert("access_token".to_string(), "from-browser".to_string());
    Credentials::Cookies { cookies }
}

#[async_trait]
impl AccountGateway for FakeGateway {
    async fn session_from_cookies(&self) -> LoginResult<Credentials> {
        self.calls.lock().unwrap().push("cookies".into());
        self.cookies.clone()
    }

    async fn login(&self, email: &str, password: &str) -> LoginResult<Credentials> {
        self.calls.lock().unwrap().push(format!("login:{email}"));
        if let Some(error) = &self.login_override {
            return Err(error.clone());
        }
        if password == GOOD_PASSWORD {
            Ok(Credentials::Token {
                token: format!("token-for-{email}"),
            })
        } else {
            Err(LoginError::Authentication("bad email or password".into()))
        }
    }

    async fn session_info(&self, credentials: &Credentials) -> LoginResult<AccountInfo> {
        self.calls.lock().unwrap().push("info".into());
        if let (Credentials::Token { token }, Some(revoked)) = (credentials, &self.revoked_token) {
            if token == revoked {
                return Err(LoginError::Authentication("session expired".into()));
            }
        }
        Ok(AccountInfo {
            display_name: "Learner".into(),
            currency: "usd".into(),
        })
    }
}

/// Prompt replaying canned answers.
struct FakePrompt {
    answers: Mutex<VecDeque<LoginResult<(String, String)>>>,
    asked: Mutex<u32>,
}

impl FakePrompt {
    fn new(answers: Vec<LoginResult<(String, String)>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            asked: Mutex::new(0),
        }
    }

    fn asked(&self) -> u32 {
        *self.asked.lock().unwrap()
    }
}

impl CredentialPrompt for FakePrompt {
    fn prompt(&self) -> LoginResult<(String, String)> {
        *self.asked.lock().unwrap() += 1;
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LoginError::Cancelled))
    }
}

fn answer(email: &str, password: &str) -> LoginResult<(String, String)> {
    Ok((email.to_string(), password.to_string()))
}

fn coordinator(gateway: &Arc<FakeGateway>, prompt: &Arc<FakePrompt>) -> LoginCoordinator {
    let gateway: Arc<dyn AccountGateway> = gateway.clone();
    let prompt: Arc<dyn CredentialPrompt> = prompt.clone();
    LoginCoordinator::new(gateway, prompt)
}

fn settings(cookies: bool, email: &str, password: &str) -> Settings {
    Settings {
        use_browser_cookies: cookies,
        email: email.to_string(),
        password: password.to_string(),
        ..Settings::default()
    }
}

// ═══════════════════════════════════════════════════════
// HAPPY PATHS
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_stored_session_is_preferred() {
    let gateway = Arc::new(FakeGateway::new(Ok(cookie_session())));
    let prompt = Arc::new(FakePrompt::new(vec![]));
    let mut settings = settings(true, "me@example.test", GOOD_PASSWORD);
    let mut login = coordinator(&gateway, &prompt);

    let session = login.login(&mut settings).await.unwrap();

    assert_eq!(session.method(), LoginMethod::StoredSession);
    assert_eq!(session.credentials(), &cookie_session());
    assert_eq!(session.currency(), "usd");
    assert_eq!(login.state(), Some(LoginState::Authenticated));
    assert_eq!(gateway.calls(), vec!["cookies", "info"]);
    assert!(settings.use_browser_cookies);
    assert_eq!(prompt.asked(), 0);
}

#[tokio::test]
async fn test_saved_credentials_without_cookies() {
    let gateway = Arc::new(FakeGateway::new(Ok(cookie_session())));
    let prompt = Arc::new(FakePrompt::new(vec![]));
    let mut settings = settings(false, "me@example.test", GOOD_PASSWORD);

    let session = coordinator(&gateway, &prompt).login(&mut settings).await.unwrap();

    assert_eq!(session.method(), LoginMethod::SavedCredentials);
    assert_eq!(gateway.count("cookies"), 0);
}

// ═══════════════════════════════════════════════════════
// DEMOTION
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_failed_cookie_session_is_never_retried() {
    let gateway = Arc::new(FakeGateway::new(Err(LoginError::Authentication(
        "no browser session".into(),
    ))));
    let prompt = Arc::new(FakePrompt::new(vec![]));
    let mut settings = settings(true, "me@example.test", GOOD_PASSWORD);
    let mut login = coordinator(&gateway, &prompt);

    let session = login.login(&mut settings).await.unwrap();

    assert_eq!(session.method(), LoginMethod::SavedCredentials);
    assert!(!settings.use_browser_cookies, "cookie flag must be cleared");
    assert_eq!(gateway.count("cookies"), 1);

    let methods: Vec<_> = login.attempts().iter().map(|a| a.method).collect();
    assert_eq!(methods, vec![LoginMethod::StoredSession, LoginMethod::SavedCredentials]);
    assert!(login.attempts()[0].error.is_some());
    assert!(login.attempts()[1].error.is_none());
}

#[tokio::test]
async fn test_wrong_saved_password_falls_back_to_prompt() {
    let gateway = Arc::new(FakeGateway::new(Ok(cookie_session())));
    let prompt = Arc::new(FakePrompt::new(vec![answer("new@example.test", GOOD_PASSWORD)]));
    let mut settings = settings(false, "old@example.test", "stale");

    let session = coordinator(&gateway, &prompt).login(&mut settings).await.unwrap();

    assert_eq!(session.method(), LoginMethod::Interactive);
    assert_eq!(prompt.asked(), 1);
    assert_eq!(settings.email, "new@example.test");
    assert_eq!(settings.password, GOOD_PASSWORD);
    assert_eq!(
        gateway.calls(),
        vec!["login:old@example.test", "login:new@example.test", "info"]
    );
}

#[tokio::test]
async fn test_session_info_failure_demotes_like_login_failure() {
    let mut gateway = FakeGateway::new(Ok(cookie_session()));
    gateway.revoked_token = Some("token-for-me@example.test".into());
    let gateway = Arc::new(gateway);
    let prompt = Arc::new(FakePrompt::new(vec![answer("other@example.test", GOOD_PASSWORD)]));
    let mut settings = settings(false, "me@example.test", GOOD_PASSWORD);

    let session = coordinator(&gateway, &prompt).login(&mut settings).await.unwrap();

    assert_eq!(session.method(), LoginMethod::Interactive);
    assert_eq!(settings.email, "other@example.test");
}

// ═══════════════════════════════════════════════════════
// FATAL PATHS
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_non_authentication_error_is_fatal() {
    let mut gateway = FakeGateway::new(Ok(cookie_session()));
    gateway.login_override = Some(LoginError::Fatal("connection refused".into()));
    let gateway = Arc::new(gateway);
    let prompt = Arc::new(FakePrompt::new(vec![answer("x@example.test", GOOD_PASSWORD)]));
    let mut settings = settings(false, "me@example.test", GOOD_PASSWORD);
    let mut login = coordinator(&gateway, &prompt);

    let result = login.login(&mut settings).await;

    assert_eq!(result.unwrap_err(), LoginError::Fatal("connection refused".into()));
    assert_eq!(prompt.asked(), 0);
    assert_eq!(settings.email, "me@example.test", "fatal errors do not demote");
    assert_eq!(login.attempts().len(), 1);
}

#[tokio::test]
async fn test_cancelled_prompt_stops_login() {
    let gateway = Arc::new(FakeGateway::new(Ok(cookie_session())));
    let prompt = Arc::new(FakePrompt::new(vec![Err(LoginError::Cancelled)]));
    let mut settings = Settings::default();

    let result = coordinator(&gateway, &prompt).login(&mut settings).await;

    assert_eq!(result.unwrap_err(), LoginError::Cancelled);
    assert_eq!(gateway.count("login"), 0);
}

#[tokio::test]
async fn test_interactive_attempts_are_bounded() {
    let gateway = Arc::new(FakeGateway::new(Ok(cookie_session())));
    let prompt = Arc::new(FakePrompt::new(vec![
        answer("a@example.test", "nope"),
        answer("b@example.test", "nope"),
        answer("c@example.test", "nope"),
    ]));
    let mut settings = Settings::default();
    let mut login = coordinator(&gateway, &prompt).with_max_prompt_attempts(2);

    let result = login.login(&mut settings).await;

    assert_eq!(result.unwrap_err(), LoginError::Exhausted { attempts: 2 });
    assert_eq!(prompt.asked(), 2);
    assert_eq!(login.state(), Some(LoginState::PromptInteractive));
    assert!(!settings.has_saved_credentials());
}

// ═══════════════════════════════════════════════════════
// PROMPT EXECUTION
// ═══════════════════════════════════════════════════════

/// Prompt noting which thread it was asked on.
#[derive(Default)]
struct ThreadPrompt {
    thread: Mutex<Option<std::thread::ThreadId>>,
}

impl CredentialPrompt for ThreadPrompt {
    fn prompt(&self) -> LoginResult<(String, String)> {
        *self.thread.lock().unwrap() = Some(std::thread::current().id());
        answer("typed@example.test", GOOD_PASSWORD)
    }
}

struct BrokenPrompt;

impl CredentialPrompt for BrokenPrompt {
    fn prompt(&self) -> LoginResult<(String, String)> {
        panic!("terminal went away");
    }
}

#[tokio::test]
async fn test_prompt_does_not_block_the_runtime_thread() {
    let gateway: Arc<dyn AccountGateway> = Arc::new(FakeGateway::new(Err(
        LoginError::Authentication("no cookies".into()),
    )));
    let prompt = Arc::new(ThreadPrompt::default());
    let mut settings = Settings::default();

    let session = LoginCoordinator::new(gateway, prompt.clone())
        .login(&mut settings)
        .await
        .unwrap();

    assert_eq!(session.method(), LoginMethod::Interactive);
    let asked_on = prompt.thread.lock().unwrap().expect("prompt was asked");
    assert_ne!(asked_on, std::thread::current().id());
}

#[tokio::test]
async fn test_crashing_prompt_is_fatal() {
    let gateway: Arc<dyn AccountGateway> = Arc::new(FakeGateway::new(Err(
        LoginError::Authentication("no cookies".into()),
    )));
    let mut settings = Settings::default();

    let result = LoginCoordinator::new(gateway, Arc::new(BrokenPrompt))
        .login(&mut settings)
        .await;

    assert!(matches!(result.unwrap_err(), LoginError::Fatal(_)));
}
