use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root of the chat application. Chat-by-id routes hang off `/a/chat/s/`.
pub const CHAT_ROOT_URL: &str = "https://chat.deepseek.com/";

pub(crate) fn chat_url(chat_id: &str) -> String {
    format!("{CHAT_ROOT_URL}a/chat/s/{chat_id}")
}

/// Static configuration for one session.
///
/// Either `token` or both of `email`/`password` must be present; this is
/// validated when the session is constructed and again on account switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub token: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Chat to open on initialize; `None` starts at the chat root.
    pub chat_id: Option<String>,
    /// Run the best-effort bot-challenge verification pass on initialize.
    pub attempt_verification: bool,
    #[serde(skip)]
    pub timings: Timings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token: None,
            email: None,
            password: None,
            chat_id: None,
            attempt_verification: true,
            timings: Timings::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn with_credentials(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        validate_credentials(
            self.token.as_deref(),
            self.email.as_deref(),
            self.password.as_deref(),
        )
    }

    pub(crate) fn has_full_credentials(&self) -> bool {
        self.email.is_some() && self.password.is_some()
    }
}

/// A token alone or a full email/password pair; anything else (including a
/// lone email or a lone password) is rejected.
pub(crate) fn validate_credentials(
    token: Option<&str>,
    email: Option<&str>,
    password: Option<&str>,
) -> Result<(), EngineError> {
    if token.is_none() && !(email.is_some() && password.is_some()) {
        return Err(EngineError::MissingCredentials(
            "either a token alone or both email and password must be provided".into(),
        ));
    }
    Ok(())
}

/// Every settle interval and polling cadence the engine uses, made explicit
/// so tests can shrink them. Defaults reflect observed behavior of the host
/// application, not tunable preferences.
#[derive(Debug, Clone)]
pub struct Timings {
    /// Bot-challenge verification window; expiry means "no challenge".
    pub challenge_wait: Duration,
    pub challenge_poll: Duration,
    /// Wait for the login page's own rendering before touching the form.
    pub page_settle: Duration,
    /// A reload with an invalid token briefly grants false access before
    /// invalidation; observation before this settle is meaningless.
    pub token_settle: Duration,
    /// How long the textbox gets to become locatable after login/navigation.
    pub textbox_wait: Duration,
    /// Settle after clicking the login submit control.
    pub submit_settle: Duration,
    /// Settle after a forced navigation during login recovery.
    pub post_nav_settle: Duration,
    /// Cadence of the start-of-generation poll.
    pub generation_poll: Duration,
    /// Cadence of the completion/extraction poll.
    pub extraction_poll: Duration,
    pub keep_alive_interval: Duration,
    /// Bounded wait for required controls located through `select`.
    pub select_wait: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            challenge_wait: Duration::from_secs(10),
            challenge_poll: Duration::from_millis(500),
            page_settle: Duration::from_secs(3),
            token_settle: Duration::from_secs(2),
            textbox_wait: Duration::from_secs(5),
            submit_settle: Duration::from_secs(10),
            post_nav_settle: Duration::from_secs(5),
            generation_poll: Duration::from_millis(500),
            extraction_poll: Duration::from_secs(1),
            keep_alive_interval: Duration::from_secs(300),
            select_wait: Duration::from_secs(5),
        }
    }
}

impl Timings {
    /// Near-zero intervals for tests driving a fake probe.
    pub fn immediate() -> Self {
        Self {
            challenge_wait: Duration::from_millis(10),
            challenge_poll: Duration::from_millis(1),
            page_settle: Duration::ZERO,
            token_settle: Duration::ZERO,
            textbox_wait: Duration::from_millis(10),
            submit_settle: Duration::ZERO,
            post_nav_settle: Duration::ZERO,
            generation_poll: Duration::from_millis(1),
            extraction_poll: Duration::from_millis(1),
            keep_alive_interval: Duration::from_millis(50),
            select_wait: Duration::from_millis(10),
        }
    }
}
