//! [`Probe`] implementation over a live Chromium page.

use crate::cdp::{CdpClient, LaunchOptions};
use async_trait::async_trait;
use colloquy_engine::probe::{ElementHandle, Probe, ProbeError};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Bound on every JavaScript evaluation; dialogs or a wedged renderer must
/// not hang the engine's polling loops.
const EVAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum retries for context errors during page navigation.
const MAX_CONTEXT_RETRIES: u32 = 10;

/// Delay between retries when the context is not found (page navigating).
const CONTEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Poll cadence for presence checks (`select`/`wait_for`).
const PRESENCE_POLL: Duration = Duration::from_millis(100);

/// Check if an error indicates the page context is unavailable.
fn is_context_error(err: &str) -> bool {
    err.contains("Cannot find context")
        || err.contains("Execution context was destroyed")
        || err.contains("-32000")
}

/// CDP-backed probe. Element handles carry the selector they were located
/// with and are re-resolved on every interaction, so they stay cheap and
/// fail loudly once the page has moved on.
pub struct CdpProbe {
    client: CdpClient,
}

impl CdpProbe {
    pub async fn launch(options: &LaunchOptions) -> Result<Self, ProbeError> {
        let client = CdpClient::launch(options)
            .await
            .map_err(|e| ProbeError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    pub async fn close(self) -> Result<(), ProbeError> {
        self.client
            .close()
            .await
            .map_err(|e| ProbeError::Other(e.to_string()))
    }

    async fn evaluate_once(&self, script: &str) -> Result<Value, ProbeError> {
        let eval = tokio::time::timeout(EVAL_TIMEOUT, self.client.page.evaluate(script.to_string()));
        match eval.await {
            Ok(Ok(result)) => Ok(result.value().cloned().unwrap_or(Value::Null)),
            Ok(Err(e)) => Err(ProbeError::Script(e.to_string())),
            Err(_) => Err(ProbeError::Timeout(format!(
                "evaluation exceeded {}s",
                EVAL_TIMEOUT.as_secs()
            ))),
        }
    }

    async fn element_present(&self, query: &str) -> bool {
        self.client.page.find_element(query).await.is_ok()
    }
}

#[async_trait]
impl Probe for CdpProbe {
    /// Evaluate with a bounded retry on context errors: a navigating page
    /// briefly has no execution context, which is transient, not fatal.
    async fn evaluate(&mut self, script: &str) -> Result<Value, ProbeError> {
        let mut last_error = None;
        for attempt in 0..MAX_CONTEXT_RETRIES {
            match self.evaluate_once(script).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if is_context_error(&err.to_string()) {
                        tracing::debug!(
                            "evaluation context error (attempt {}/{}), retrying...",
                            attempt + 1,
                            MAX_CONTEXT_RETRIES
                        );
                        last_error = Some(err);
                        tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| ProbeError::Script("evaluation failed after retries".into())))
    }

    async fn select(
        &mut self,
        query: &str,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, ProbeError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.element_present(query).await {
                return Ok(Some(ElementHandle::new(query)));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(PRESENCE_POLL).await;
        }
    }

    async fn select_all(&mut self, query: &str) -> Result<Vec<ElementHandle>, ProbeError> {
        // Tag each match so every handle gets a selector of its own; the
        // page-load scope of handles makes the attribute safe to reuse.
        let script = format!(
            r#"(() => {{
    const els = Array.from(document.querySelectorAll({query}));
    return els.map((el, i) => {{
        el.setAttribute('data-colloquy-h', String(i));
        return "[data-colloquy-h='" + i + "']";
    }});
}})()"#,
            query = serde_json::to_string(query)?,
        );
        let value = self.evaluate(&script).await?;
        let selectors: Vec<String> = serde_json::from_value(value).unwrap_or_default();
        Ok(selectors.into_iter().map(ElementHandle::new).collect())
    }

    async fn click(&mut self, handle: &ElementHandle) -> Result<(), ProbeError> {
        let element = self
            .client
            .page
            .find_element(handle.selector())
            .await
            .map_err(|e| ProbeError::Other(format!("stale handle {}: {}", handle.selector(), e)))?;
        element
            .click()
            .await
            .map_err(|e| ProbeError::Other(format!("click failed: {}", e)))?;
        Ok(())
    }

    async fn type_text(&mut self, handle: &ElementHandle, text: &str) -> Result<(), ProbeError> {
        // insertText through the focused element triggers the page's own
        // reactive emitters, unlike assigning .value directly.
        let script = format!(
            r#"(() => {{
    const el = document.querySelector({selector});
    if (!el) return false;
    el.focus();
    document.execCommand('insertText', false, {text});
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    return true;
}})()"#,
            selector = serde_json::to_string(handle.selector())?,
            text = serde_json::to_string(text)?,
        );
        let value = self.evaluate(&script).await?;
        if value.as_bool() != Some(true) {
            return Err(ProbeError::Other(format!(
                "stale handle {}: element gone before typing",
                handle.selector()
            )));
        }
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), ProbeError> {
        tracing::info!("Navigating to: {}", url);
        self.client
            .page
            .goto(url)
            .await
            .map_err(|e| ProbeError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), ProbeError> {
        self.client
            .page
            .execute(chromiumoxide::cdp::browser_protocol::page::ReloadParams::builder().build())
            .await
            .map_err(|e| ProbeError::Navigation(format!("reload failed: {}", e)))?;
        Ok(())
    }

    async fn wait_for(&mut self, query: &str, timeout: Duration) -> Result<bool, ProbeError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.element_present(query).await {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(PRESENCE_POLL).await;
        }
    }
}
