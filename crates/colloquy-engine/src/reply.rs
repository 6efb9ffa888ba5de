//! Structured reply assembly.
//!
//! Pure construction: raw fragments extracted by the synchronization
//! protocol become an immutable [`Reply`]. No probe access happens here.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

/// Theme preference persisted through client-side storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "LIGHT",
            Theme::Dark => "DARK",
            Theme::System => "SYSTEM",
        }
    }
}

/// One entry of the search side channel, in on-page presentation order.
/// `index` is the on-page ordinal and is not guaranteed contiguous.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub image_url: String,
    pub website: String,
    pub date: String,
    pub index: u32,
    pub title: String,
    pub description: String,
}

/// The structured result of one message exchange. Immutable after
/// creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// Chat the exchange happened in, when one was active.
    pub chat_id: Option<String>,
    /// Seconds the model reported thinking, when deep reasoning was on.
    pub deepthink_duration: Option<f64>,
    pub deepthink_content: Option<String>,
    pub search_results: Option<Vec<SearchResult>>,
}

/// Raw fragments handed over by the synchronization protocol.
#[derive(Debug, Default)]
pub(crate) struct RawReply {
    pub text: String,
    pub deepthink_duration: Option<f64>,
    pub deepthink_content: Option<String>,
    pub search_results: Option<Vec<SearchResult>>,
}

impl Reply {
    pub(crate) fn assemble(raw: RawReply, chat_id: Option<String>) -> Self {
        Self {
            text: raw.text,
            chat_id,
            deepthink_duration: raw.deepthink_duration,
            deepthink_content: raw.deepthink_content,
            search_results: raw.search_results,
        }
    }
}

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)thought for (\d+(?:\.\d+)?)").unwrap());

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Parse the numeric duration out of a "Thought for N seconds" header.
pub(crate) fn parse_reasoning_duration(text: &str) -> Option<f64> {
    DURATION_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawReasoning {
    #[serde(default)]
    pub duration_text: String,
    #[serde(default)]
    pub content: String,
}

impl RawReasoning {
    /// Duration and content, each absent when empty or unparseable.
    pub fn into_parts(self) -> (Option<f64>, Option<String>) {
        let duration = parse_reasoning_duration(&self.duration_text);
        let content = if self.content.trim().is_empty() {
            None
        } else {
            Some(self.content)
        };
        (duration, content)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSearchResult {
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub index_text: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl From<RawSearchResult> for SearchResult {
    fn from(raw: RawSearchResult) -> Self {
        let index = DIGITS_RE
            .find(&raw.index_text)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        SearchResult {
            image_url: raw.image_url,
            website: raw.website,
            date: raw.date,
            index,
            title: raw.title,
            description: raw.description,
        }
    }
}

/// Deserialize the search side channel, preserving on-page order.
/// Anything malformed yields `None` rather than an error.
pub(crate) fn parse_search_results(value: Value) -> Option<Vec<SearchResult>> {
    let raw: Vec<RawSearchResult> = serde_json::from_value(value).ok()?;
    Some(raw.into_iter().map(SearchResult::from).collect())
}
