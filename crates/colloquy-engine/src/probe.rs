use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Opaque reference to a located UI element.
///
/// Handles are scoped to the current page load: any navigation or reload
/// invalidates every handle issued before it, and callers must re-locate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    selector: String,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }

    /// The runtime-derived selector backing this handle.
    pub fn selector(&self) -> &str {
        &self.selector
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum ProbeError {
    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Script execution error: {0}")]
    Script(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Probe not ready")]
    NotReady,

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        ProbeError::Serialization(err.to_string())
    }
}

/// Primitive capability to inspect and manipulate a live rendered page.
///
/// The engine consumes this trait and never assumes a concrete browser:
/// production uses a CDP-backed implementation, tests use a scripted fake.
/// Absence of an element is a normal outcome (`Ok(None)` / `Ok(false)`),
/// never an error; errors are reserved for transport and script failures.
#[async_trait]
pub trait Probe: Send {
    /// Evaluate an expression in page context and return its JSON value.
    async fn evaluate(&mut self, script: &str) -> Result<Value, ProbeError>;

    /// Select the first element matching `query`, waiting up to `timeout`.
    async fn select(
        &mut self,
        query: &str,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, ProbeError>;

    /// Select all elements currently matching `query`.
    async fn select_all(&mut self, query: &str) -> Result<Vec<ElementHandle>, ProbeError>;

    /// Simulate a click on the element.
    async fn click(&mut self, handle: &ElementHandle) -> Result<(), ProbeError>;

    /// Simulate a keystroke sequence into the element.
    async fn type_text(&mut self, handle: &ElementHandle, text: &str) -> Result<(), ProbeError>;

    /// Navigate the page to `url`.
    async fn navigate(&mut self, url: &str) -> Result<(), ProbeError>;

    /// Reload the current page.
    async fn reload(&mut self) -> Result<(), ProbeError>;

    /// Poll for the presence of `query`, up to `timeout`.
    async fn wait_for(&mut self, query: &str, timeout: Duration) -> Result<bool, ProbeError>;
}
