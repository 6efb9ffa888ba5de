//! Element snapshots crossing the evaluate boundary.
//!
//! The collection scripts in [`crate::scripts`] describe every candidate
//! element as a flat JSON object; the locator scores these snapshots without
//! touching the page again.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Euclidean distance between rect centers.
    pub fn center_distance(&self, other: &Rect) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// Distance from this rect's origin to the anchor's right edge, the way
    /// a control sitting beside an input is nearest: horizontal gap from the
    /// anchor's right, vertical gap between tops.
    pub fn distance_beside(&self, anchor: &Rect) -> f64 {
        ((self.x - anchor.right()).powi(2) + (self.y - anchor.y).powi(2)).sqrt()
    }
}

/// One DOM element as observed by a collection script.
///
/// Every field is optional-by-default: the scripts only report what the
/// markup actually exposes, and the scoring tiers treat missing attributes
/// as non-matches rather than errors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Candidate {
    pub tag: String,
    /// Runtime-derived selector good enough to re-find the element within
    /// the current page load.
    pub selector: String,
    pub input_type: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub placeholder: Option<String>,
    /// Accessible label (`aria-label`).
    pub label: Option<String>,
    pub title: Option<String>,
    pub text: Option<String>,
    pub rect: Rect,
    pub viewport_height: f64,
    pub editable: bool,
    pub has_icon: bool,
}

impl Candidate {
    fn field_contains(field: &Option<String>, needles: &[&str]) -> bool {
        field
            .as_deref()
            .map(|value| {
                let lower = value.to_lowercase();
                needles.iter().any(|needle| lower.contains(needle))
            })
            .unwrap_or(false)
    }

    pub fn placeholder_contains(&self, needles: &[&str]) -> bool {
        Self::field_contains(&self.placeholder, needles)
    }

    pub fn label_contains(&self, needles: &[&str]) -> bool {
        Self::field_contains(&self.label, needles)
    }

    pub fn title_contains(&self, needles: &[&str]) -> bool {
        Self::field_contains(&self.title, needles)
    }

    pub fn text_contains(&self, needles: &[&str]) -> bool {
        Self::field_contains(&self.text, needles)
    }

    pub fn name_contains(&self, needles: &[&str]) -> bool {
        Self::field_contains(&self.name, needles)
    }

    pub fn id_contains(&self, needles: &[&str]) -> bool {
        Self::field_contains(&self.id, needles)
    }

    pub fn input_type_is(&self, wanted: &str) -> bool {
        self.input_type
            .as_deref()
            .map(|t| t.eq_ignore_ascii_case(wanted))
            .unwrap_or(false)
    }
}

/// Tolerant deserialization of a collection script's result: anything that
/// is not an array of well-formed snapshots contributes nothing.
pub fn parse_candidates(value: Value) -> Vec<Candidate> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    }
}
