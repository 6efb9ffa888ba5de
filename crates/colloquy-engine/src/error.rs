use crate::probe::ProbeError;

/// Caller-facing error taxonomy.
///
/// Transient detection failures inside polling loops are never surfaced
/// directly; only the final, post-deadline outcome reaches the caller, and
/// every variant carries a human-readable cause.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Neither a token nor a full email/password pair was supplied.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Login was classified as failed, or a required login form element
    /// could not be reached.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// An operation was invoked before `initialize` completed.
    #[error("Session not initialized: run initialize() before any other operation")]
    MissingInitialization,

    /// A required, non-optional control is absent after full fallback
    /// exhaustion.
    #[error("Could not find element: {0}")]
    CouldNotFindElement(String),

    /// The post-navigation URL does not echo the requested chat id.
    #[error("Invalid chat id: {0}")]
    InvalidChatId(String),

    /// The reply was exactly the server's canonical busy message.
    #[error("Server busy: {0}")]
    ServerBusy(String),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),
}
