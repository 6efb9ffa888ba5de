//! Session lifecycle manager.
//!
//! One engine instance owns one live automation context. Operations are
//! `&mut self` and must be serialized by the caller; the keep-alive loop is
//! the only background task and performs no competing mutation.

use crate::config::{self, CHAT_ROOT_URL, SessionConfig, chat_url};
use crate::error::EngineError;
use crate::locator::{self, LoginField};
use crate::probe::Probe;
use crate::reply::{Reply, Theme};
use crate::scripts;
use crate::sync::{self, SendOptions, SideChannels};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// Profile/avatar indicator opening the account menu.
const PROFILE_QUERY: &str =
    "div[class*='avatar'], img[class*='avatar'], div[class*='profile']";

/// Containers the account dropdown may render into.
const MENU_QUERY: &str = "div[role='menu'], div[class*='dropdown'], div[class*='menu']";

/// The delete action lives inside a dropdown whose direct children are not
/// the actionable item; the recursive text search is bounded to this depth.
const MENU_SEARCH_DEPTH: u32 = 10;

const DELETE_ALL_CHATS_LABEL: &str = "Delete all chats";
const NEW_CHAT_INTENT: &[&str] = &["new chat"];
const CONFIRM_INTENT: &[&str] = &["confirm", "delete"];

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Active,
    Terminated,
}

/// Priority-ordered login outcome signals. No single DOM signal reliably
/// indicates authentication success on a dynamic SPA, so detection is an
/// evidence-combination problem: the first firing signal wins.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoginSignal {
    UrlLeftLoginRoute,
    PostLoginMarkers,
    PasswordFieldGone,
    ErrorText(String),
    Ambiguous,
}

/// The single live automation context over a conversational web app.
///
/// All operations except [`Session::initialize`] require the session to be
/// active and fail with [`EngineError::MissingInitialization`] otherwise.
#[derive(Debug)]
pub struct Session<P: Probe> {
    probe: P,
    config: SessionConfig,
    state: SessionState,
    chat_id: Option<String>,
    deepthink_enabled: bool,
    search_enabled: bool,
    active: Arc<AtomicBool>,
    keep_alive: Option<JoinHandle<()>>,
}

impl<P: Probe> Session<P> {
    /// Validates credentials (a token alone, or both email and password)
    /// and builds an uninitialized session around the probe.
    pub fn new(probe: P, config: SessionConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let chat_id = config.chat_id.clone();
        Ok(Self {
            probe,
            config,
            state: SessionState::Uninitialized,
            chat_id,
            deepthink_enabled: false,
            search_enabled: false,
            active: Arc::new(AtomicBool::new(false)),
            keep_alive: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn deepthink_enabled(&self) -> bool {
        self.deepthink_enabled
    }

    pub fn search_enabled(&self) -> bool {
        self.search_enabled
    }

    fn ensure_active(&self) -> Result<(), EngineError> {
        if self.state == SessionState::Active {
            Ok(())
        } else {
            Err(EngineError::MissingInitialization)
        }
    }

    /// Bring the session up: navigate to the chat root (or the configured
    /// chat), pass any bot challenge, start the keep-alive task and log in.
    ///
    /// This is the only transition into the active state. It is not
    /// reentrant: calling it again on an active session is a caller error
    /// with undefined effect.
    pub async fn initialize(&mut self) -> Result<(), EngineError> {
        self.state = SessionState::Initializing;

        let url = match &self.chat_id {
            Some(id) => chat_url(id),
            None => CHAT_ROOT_URL.to_string(),
        };
        debug!(%url, "navigating to the chat application");
        self.probe.navigate(&url).await?;

        if self.config.attempt_verification {
            self.pass_bot_challenge().await;
        }

        self.state = SessionState::Active;
        self.active.store(true, Ordering::Relaxed);
        self.keep_alive = Some(spawn_keep_alive(
            self.active.clone(),
            self.config.timings.keep_alive_interval,
        ));

        if self.config.token.is_some() {
            self.login_with_token().await
        } else {
            self.login_classic(false).await
        }
    }

    /// Best-effort bot-challenge pass: wait for the interstitial to clear.
    /// Window expiry is treated as "no challenge present", never an error.
    async fn pass_bot_challenge(&mut self) {
        debug!("checking for a bot-challenge interstitial");
        let deadline = Instant::now() + self.config.timings.challenge_wait;
        let poll = self.config.timings.challenge_poll;
        while Instant::now() < deadline {
            match self.probe.evaluate(scripts::CHALLENGE_PRESENT).await {
                Ok(value) if value.as_bool() == Some(true) => sleep(poll).await,
                Ok(_) => return,
                Err(err) => {
                    debug!(error = %err, "challenge probe failed; assuming no challenge");
                    return;
                }
            }
        }
        warn!("bot-challenge verification window expired; proceeding");
    }

    /// Token login: install the token in client-side storage and reload.
    /// An invalid token briefly grants access after the reload, so the
    /// settle delay before checking for the textbox is mandatory.
    async fn login_with_token(&mut self) -> Result<(), EngineError> {
        let Some(token) = self.config.token.clone() else {
            return self.login_classic(false).await;
        };

        debug!("logging in with the stored token");
        self.probe.evaluate(&scripts::store_token(&token)).await?;
        self.probe.reload().await?;
        sleep(self.config.timings.token_settle).await;

        let visible = self
            .probe
            .wait_for(scripts::TEXT_SURFACE_QUERY, self.config.timings.textbox_wait)
            .await?;
        if visible {
            debug!("token login successful");
            return Ok(());
        }

        if self.config.has_full_credentials() {
            debug!("token rejected; falling back to email and password");
            self.login_classic(true).await
        } else {
            Err(EngineError::InvalidCredentials(
                "the token was rejected and no email/password fallback is configured".into(),
            ))
        }
    }

    /// Classic login: fill the form, submit, settle, then classify the
    /// outcome from the priority-ordered signal set. `token_failed` only
    /// customizes the final failure message.
    async fn login_classic(&mut self, token_failed: bool) -> Result<(), EngineError> {
        debug!("attempting login with email and password");
        sleep(self.config.timings.page_settle).await;
        if let Err(err) = self.probe.evaluate(scripts::READY_STATE_COMPLETE).await {
            debug!(error = %err, "readiness check failed; continuing");
        }

        let (Some(email), Some(password)) =
            (self.config.email.clone(), self.config.password.clone())
        else {
            return Err(EngineError::InvalidCredentials(
                "classic login requires both email and password".into(),
            ));
        };

        let inputs = locator::locate_login_inputs(&mut self.probe).await?;
        let email_field = locator::pick_login_field(&inputs, LoginField::Email)
            .ok_or_else(|| {
                EngineError::InvalidCredentials(
                    "could not find an email or username input on the login page".into(),
                )
            })?
            .clone();
        let password_field = locator::pick_login_field(&inputs, LoginField::Password)
            .ok_or_else(|| {
                EngineError::InvalidCredentials(
                    "could not find a password input on the login page".into(),
                )
            })?
            .clone();

        self.fill_login_field(&email_field.selector, &email, "email").await?;
        self.fill_login_field(&password_field.selector, &password, "password")
            .await?;

        if let Err(err) = self.probe.evaluate(scripts::CLICK_CONSENT_CHECKBOXES).await {
            debug!(error = %err, "consent checkbox pass failed; continuing");
        }

        let clickables = locator::locate_clickables(&mut self.probe).await?;
        let submit = locator::pick_submit(&clickables, Some(&password_field.rect))
            .ok_or_else(|| {
                EngineError::InvalidCredentials("could not find the login submit control".into())
            })?
            .clone();
        self.probe.click(&locator::handle_for(&submit)).await?;

        sleep(self.config.timings.submit_settle).await;

        match self.classify_login().await? {
            LoginSignal::UrlLeftLoginRoute
            | LoginSignal::PostLoginMarkers
            | LoginSignal::PasswordFieldGone => {
                self.ensure_chat_surface().await;
                debug!(fallback = token_failed, "classic login successful");
                Ok(())
            }
            LoginSignal::ErrorText(text) => Err(EngineError::InvalidCredentials(format!(
                "login rejected: {text}"
            ))),
            LoginSignal::Ambiguous => {
                // Heuristic safety net, not a guaranteed-correct detector:
                // force-navigate to the chat root and recheck for the
                // textbox before declaring failure.
                debug!("login outcome ambiguous; forcing navigation to the chat root");
                self.probe.navigate(CHAT_ROOT_URL).await?;
                sleep(self.config.timings.post_nav_settle).await;
                let found = locator::locate_textbox(&mut self.probe, self.config.timings.select_wait)
                    .await?
                    .is_some();
                if found {
                    debug!("textbox present after forced navigation; login considered successful");
                    Ok(())
                } else {
                    Err(EngineError::InvalidCredentials(
                        final_failure_message(token_failed).into(),
                    ))
                }
            }
        }
    }

    async fn fill_login_field(
        &mut self,
        selector: &str,
        value: &str,
        which: &str,
    ) -> Result<(), EngineError> {
        let filled = self
            .probe
            .evaluate(&scripts::fill_field(selector, value))
            .await?;
        if filled.as_bool() != Some(true) {
            return Err(EngineError::InvalidCredentials(format!(
                "the {which} input vanished before it could be filled"
            )));
        }
        Ok(())
    }

    async fn classify_login(&mut self) -> Result<LoginSignal, EngineError> {
        if self.check(scripts::URL_PAST_LOGIN).await? {
            return Ok(LoginSignal::UrlLeftLoginRoute);
        }
        if self.check(scripts::POST_LOGIN_MARKERS).await? {
            return Ok(LoginSignal::PostLoginMarkers);
        }
        if self.check(scripts::PASSWORD_FIELD_ABSENT).await? {
            return Ok(LoginSignal::PasswordFieldGone);
        }
        match self.probe.evaluate(scripts::LOGIN_ERROR_TEXT).await? {
            Value::String(text) if !text.is_empty() => Ok(LoginSignal::ErrorText(text)),
            _ => Ok(LoginSignal::Ambiguous),
        }
    }

    async fn check(&mut self, script: &str) -> Result<bool, EngineError> {
        Ok(self.probe.evaluate(script).await?.as_bool() == Some(true))
    }

    /// After a successful login the landing page may be a welcome screen
    /// without a composer; steer towards the chat root. Best-effort only.
    async fn ensure_chat_surface(&mut self) {
        let select_wait = self.config.timings.select_wait;
        let settle = self.config.timings.post_nav_settle;
        match locator::locate_textbox(&mut self.probe, select_wait).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("no textbox on the landing page; navigating to the chat root");
                if let Err(err) = self.probe.navigate(CHAT_ROOT_URL).await {
                    debug!(error = %err, "navigation to the chat root failed");
                    return;
                }
                sleep(settle).await;
                match locator::locate_textbox(&mut self.probe, select_wait).await {
                    Ok(Some(_)) => debug!("textbox found after navigation"),
                    Ok(None) => debug!("still no textbox; login considered successful anyway"),
                    Err(err) => debug!(error = %err, "textbox recheck failed"),
                }
            }
            Err(err) => debug!(error = %err, "textbox check failed; continuing"),
        }
    }

    /// Send a message and wait for the structured reply.
    ///
    /// Returns `Ok(None)` when no reply was observed before the deadline.
    pub async fn send_message(
        &mut self,
        message: &str,
        options: SendOptions,
    ) -> Result<Option<Reply>, EngineError> {
        self.ensure_active()?;
        let timings = self.config.timings.clone();
        let deadline = Instant::now() + options.effective_timeout();

        debug!(chars = message.chars().count(), "sending message");
        let textbox = locator::locate_textbox(&mut self.probe, timings.select_wait)
            .await?
            .ok_or_else(|| {
                EngineError::CouldNotFindElement("could not find the message textbox".into())
            })?;
        let textbox_handle = locator::handle_for(&textbox);

        if options.slow_mode {
            let mut buf = [0u8; 4];
            for ch in message.chars() {
                self.probe
                    .type_text(&textbox_handle, ch.encode_utf8(&mut buf))
                    .await?;
                sleep(options.slow_mode_delay).await;
            }
        } else {
            self.probe.type_text(&textbox_handle, message).await?;
        }

        let send = locator::locate_send_button(&mut self.probe, Some(&textbox.rect)).await?;

        // Reconcile the option toggles with the requested modes; the flags
        // track the page state and are only flipped when a toggle is
        // actually clicked.
        let toggles = locator::locate_mode_toggles(
            &mut self.probe,
            &textbox.rect,
            send.as_ref().map(|c| c.selector.as_str()),
        )
        .await?;
        if toggles.len() >= 2 {
            if options.deepthink != self.deepthink_enabled {
                self.probe.click(&locator::handle_for(&toggles[0])).await?;
                self.deepthink_enabled = options.deepthink;
            }
            if options.search != self.search_enabled {
                self.probe.click(&locator::handle_for(&toggles[1])).await?;
                self.search_enabled = options.search;
            }
        } else {
            warn!("mode toggles not found; sending without them");
        }

        let send = send.ok_or_else(|| {
            EngineError::CouldNotFindElement("could not find the send control".into())
        })?;
        self.probe.click(&locator::handle_for(&send)).await?;

        let channels = SideChannels {
            deepthink: self.deepthink_enabled,
            search: self.search_enabled,
        };
        let raw = sync::await_reply(&mut self.probe, deadline, &timings, channels).await?;
        Ok(raw.map(|raw| Reply::assemble(raw, self.chat_id.clone())))
    }

    /// Regenerate the most recent reply and wait for the result.
    pub async fn regenerate(&mut self, timeout: Duration) -> Result<Option<Reply>, EngineError> {
        self.ensure_active()?;
        let timings = self.config.timings.clone();
        let deadline = Instant::now() + timeout;

        debug!("regenerating the latest reply");
        sync::trigger_regenerate(&mut self.probe).await?;

        let channels = SideChannels {
            deepthink: self.deepthink_enabled,
            search: self.search_enabled,
        };
        let raw = sync::await_reply(&mut self.probe, deadline, &timings, channels).await?;
        Ok(raw.map(|raw| Reply::assemble(raw, self.chat_id.clone())))
    }

    /// Clear the stored token and reload.
    pub async fn logout(&mut self) -> Result<(), EngineError> {
        self.ensure_active()?;
        debug!("logging out");
        self.probe.evaluate(&scripts::remove_token()).await?;
        self.probe.reload().await?;
        Ok(())
    }

    /// Log out, install new credentials and log back in. Credential rules
    /// match construction: a token alone, or both email and password.
    pub async fn switch_account(
        &mut self,
        token: Option<String>,
        email: Option<String>,
        password: Option<String>,
    ) -> Result<(), EngineError> {
        self.ensure_active()?;
        config::validate_credentials(token.as_deref(), email.as_deref(), password.as_deref())?;

        debug!("switching account");
        self.logout().await?;
        self.config.token = token;
        self.config.email = email;
        self.config.password = password;

        if self.config.token.is_some() {
            self.login_with_token().await
        } else {
            self.login_classic(false).await
        }
    }

    /// Navigate to a chat by id. The route accepts unknown ids without
    /// erroring server-side, so the URL echo is the only verification.
    pub async fn switch_chat(&mut self, chat_id: &str) -> Result<(), EngineError> {
        self.ensure_active()?;
        debug!(%chat_id, "switching chat");
        self.probe.navigate(&chat_url(chat_id)).await?;

        let visible = self
            .probe
            .wait_for(scripts::TEXT_SURFACE_QUERY, self.config.timings.textbox_wait)
            .await?;
        if !visible {
            return Err(EngineError::CouldNotFindElement(
                "the message textbox never appeared after switching chats".into(),
            ));
        }

        let echoed = self
            .probe
            .evaluate(&scripts::url_contains(chat_id))
            .await?
            .as_bool()
            == Some(true);
        if !echoed {
            return Err(EngineError::InvalidChatId(format!(
                "the page did not accept chat id {chat_id:?}"
            )));
        }

        self.chat_id = Some(chat_id.to_string());
        debug!("chat switched");
        Ok(())
    }

    /// Start a fresh conversation.
    pub async fn reset_chat(&mut self) -> Result<(), EngineError> {
        self.ensure_active()?;
        let clickables = locator::locate_clickables(&mut self.probe).await?;
        let control = locator::pick_by_intent(&clickables, NEW_CHAT_INTENT)
            .ok_or_else(|| {
                EngineError::CouldNotFindElement("could not find the new-chat control".into())
            })?
            .clone();
        self.probe.click(&locator::handle_for(&control)).await?;
        self.chat_id = None;
        debug!("chat reset");
        Ok(())
    }

    /// Persist a theme preference and reload so the app picks it up.
    pub async fn switch_theme(&mut self, theme: Theme) -> Result<(), EngineError> {
        self.ensure_active()?;
        debug!(theme = theme.as_str(), "switching theme");
        self.probe
            .evaluate(&scripts::store_theme(theme.as_str()))
            .await?;
        self.probe.reload().await?;
        Ok(())
    }

    /// Delete every conversation through the account menu.
    pub async fn delete_all_chats(&mut self) -> Result<(), EngineError> {
        self.ensure_active()?;
        debug!("deleting all chats");

        let profile = self
            .probe
            .select(PROFILE_QUERY, self.config.timings.select_wait)
            .await?
            .ok_or_else(|| {
                EngineError::CouldNotFindElement("could not find the profile control".into())
            })?;
        self.probe.click(&profile).await?;

        let clicked = self
            .probe
            .evaluate(&scripts::click_menu_item_by_text(
                MENU_QUERY,
                DELETE_ALL_CHATS_LABEL,
                MENU_SEARCH_DEPTH,
            ))
            .await?;
        if clicked.as_bool() != Some(true) {
            return Err(EngineError::CouldNotFindElement(
                "could not find the delete-all-chats menu item".into(),
            ));
        }

        let clickables = locator::locate_clickables(&mut self.probe).await?;
        let confirm = locator::pick_by_intent(&clickables, CONFIRM_INTENT)
            .ok_or_else(|| {
                EngineError::CouldNotFindElement(
                    "could not find the deletion confirmation control".into(),
                )
            })?
            .clone();
        self.probe.click(&locator::handle_for(&confirm)).await?;

        debug!("all chats deleted");
        Ok(())
    }

    /// Read the authentication token back out of client-side storage.
    pub async fn retrieve_token(&mut self) -> Result<Option<String>, EngineError> {
        self.ensure_active()?;
        match self.probe.evaluate(&scripts::read_token()).await? {
            Value::String(token) => Ok(Some(token)),
            _ => Ok(None),
        }
    }

    /// Cooperative teardown: flips the active flag the keep-alive loop
    /// observes on its next wake. In-flight polling operations are not
    /// cancelled; they run to their own deadline.
    pub fn terminate(&mut self) {
        self.active.store(false, Ordering::Relaxed);
        self.state = SessionState::Terminated;
        self.keep_alive.take();
        debug!("session terminated");
    }
}

impl<P: Probe> Drop for Session<P> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Relaxed);
    }
}

fn final_failure_message(token_failed: bool) -> &'static str {
    if token_failed {
        "both the token and the email/password were rejected"
    } else {
        "the email or password is incorrect"
    }
}

/// Heartbeat placeholder held for the lifetime of the session. Reload on
/// tick is disabled; turning it back on requires mutual exclusion with any
/// in-flight extraction. The loop ends, without tearing down the session,
/// as soon as the active flag drops.
fn spawn_keep_alive(active: Arc<AtomicBool>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        while active.load(Ordering::Relaxed) {
            sleep(interval).await;
        }
        debug!("keep-alive task stopped");
    })
}
