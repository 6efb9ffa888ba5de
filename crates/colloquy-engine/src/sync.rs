//! Response synchronization protocol.
//!
//! Generation is observable only through transient loading indicators and
//! eventual text content, so waiting for a reply is two sequential bounded
//! polling phases against a wall-clock deadline: wait for generation to
//! start, then wait for it to finish and extract. Transient failures inside
//! the loops are swallowed and retried; only the post-deadline outcome is
//! surfaced, and a deadline with no text is a well-defined absent result,
//! not an error.

use crate::config::Timings;
use crate::error::EngineError;
use crate::probe::Probe;
use crate::reply::{self, RawReply, RawReasoning, SearchResult};
use crate::scripts;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// Canonical busy message of the host application. The match is exact and
/// case-insensitive; if the phrasing ever changes upstream this signal
/// silently stops firing.
pub(crate) const BUSY_MESSAGE: &str = "The server is busy. Please try again later.";

const DEEPTHINK_SURCHARGE: Duration = Duration::from_secs(20);
const SEARCH_SURCHARGE: Duration = Duration::from_secs(60);

/// Options for one message exchange.
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Pace keystrokes with `slow_mode_delay` between characters instead of
    /// injecting the text in one shot.
    pub slow_mode: bool,
    pub deepthink: bool,
    pub search: bool,
    /// Base wait for the reply; deepthink and search add fixed surcharges.
    pub timeout: Duration,
    pub slow_mode_delay: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            slow_mode: false,
            deepthink: false,
            search: false,
            timeout: Duration::from_secs(60),
            slow_mode_delay: Duration::from_millis(250),
        }
    }
}

impl SendOptions {
    /// Deadline budget for this exchange: base timeout plus +20s when deep
    /// reasoning is requested and +60s when search is requested.
    pub fn effective_timeout(&self) -> Duration {
        let mut total = self.timeout;
        if self.deepthink {
            total += DEEPTHINK_SURCHARGE;
        }
        if self.search {
            total += SEARCH_SURCHARGE;
        }
        total
    }
}

/// Which optional side channels to read after extraction.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SideChannels {
    pub deepthink: bool,
    pub search: bool,
}

/// Run both polling phases and assemble the raw reply.
///
/// `Ok(None)` means no reply was observed before the deadline, distinct
/// from the server communicating a failure, which raises `ServerBusy`.
pub(crate) async fn await_reply<P: Probe + ?Sized>(
    probe: &mut P,
    deadline: Instant,
    timings: &Timings,
    channels: SideChannels,
) -> Result<Option<RawReply>, EngineError> {
    wait_for_generation_start(probe, deadline, timings.generation_poll).await;

    let Some(text) = wait_for_reply_text(probe, deadline, timings.extraction_poll).await else {
        warn!("no reply text extracted before the deadline");
        return Ok(None);
    };

    if text.eq_ignore_ascii_case(BUSY_MESSAGE) {
        return Err(EngineError::ServerBusy(text));
    }

    let mut raw = RawReply {
        text,
        ..RawReply::default()
    };
    if channels.deepthink {
        (raw.deepthink_duration, raw.deepthink_content) = extract_reasoning(probe).await;
    }
    if channels.search {
        raw.search_results = extract_search_results(probe).await;
    }
    Ok(Some(raw))
}

/// Phase one: poll for a generation indicator to appear. A very fast reply
/// can complete before the indicator is ever observed, so expiry here is
/// logged and tolerated.
async fn wait_for_generation_start<P: Probe + ?Sized>(
    probe: &mut P,
    deadline: Instant,
    poll: Duration,
) {
    debug!("waiting for the reply to start generating");
    while Instant::now() < deadline {
        match probe.evaluate(scripts::GENERATION_ACTIVE).await {
            Ok(value) if value.as_bool() == Some(true) => return,
            Ok(_) => {}
            Err(err) => debug!(error = %err, "generation probe failed, retrying"),
        }
        sleep(poll).await;
    }
    warn!("generation indicator never appeared; the reply may already be complete");
}

/// Phase two: poll until the indicator is gone, then extract the latest
/// reply text, retrying extraction on the same cadence until the deadline.
async fn wait_for_reply_text<P: Probe + ?Sized>(
    probe: &mut P,
    deadline: Instant,
    poll: Duration,
) -> Option<String> {
    debug!("waiting for the reply to finish generating");
    while Instant::now() < deadline {
        match probe.evaluate(scripts::GENERATION_ACTIVE).await {
            Ok(value) if value.as_bool() == Some(true) => {}
            Ok(_) => match probe.evaluate(scripts::EXTRACT_REPLY).await {
                Ok(Value::String(text)) if !text.is_empty() => return Some(text),
                Ok(_) => {}
                Err(err) => debug!(error = %err, "reply extraction failed, retrying"),
            },
            Err(err) => debug!(error = %err, "generation probe failed, retrying"),
        }
        sleep(poll).await;
    }
    None
}

/// Reasoning side channel. Any failure yields absent values; the primary
/// reply text is never sacrificed for an optional channel.
async fn extract_reasoning<P: Probe + ?Sized>(probe: &mut P) -> (Option<f64>, Option<String>) {
    match probe.evaluate(scripts::EXTRACT_REASONING).await {
        Ok(value) => match serde_json::from_value::<RawReasoning>(value) {
            Ok(raw) => raw.into_parts(),
            Err(err) => {
                debug!(error = %err, "reasoning payload unreadable");
                (None, None)
            }
        },
        Err(err) => {
            debug!(error = %err, "reasoning extraction failed");
            (None, None)
        }
    }
}

/// Search side channel; same non-fatal contract as reasoning.
async fn extract_search_results<P: Probe + ?Sized>(probe: &mut P) -> Option<Vec<SearchResult>> {
    match probe.evaluate(scripts::EXTRACT_SEARCH_RESULTS).await {
        Ok(value) => reply::parse_search_results(value),
        Err(err) => {
            debug!(error = %err, "search result extraction failed");
            None
        }
    }
}

/// Trigger the page's own regenerate control for the most recent reply.
pub(crate) async fn trigger_regenerate<P: Probe + ?Sized>(
    probe: &mut P,
) -> Result<(), EngineError> {
    let value = probe.evaluate(scripts::CLICK_REGENERATE).await?;
    if value.as_bool() != Some(true) {
        return Err(EngineError::CouldNotFindElement(
            "could not find the regenerate control on the latest reply".into(),
        ));
    }
    Ok(())
}
