//! Resilient, scored discovery of interactive elements.
//!
//! The host application's markup is not contractually stable, so nothing
//! here queries for exact selectors. Each role is located by an ordered
//! chain of filter/score tiers over a candidate snapshot; the first tier
//! producing a result wins, and exhausting every tier yields `None`:
//! absence is a normal outcome, never an error. Occasional false positives
//! are the accepted cost of staying functional across UI changes.

use crate::probe::{ElementHandle, Probe, ProbeError};
use crate::scan::{self, Candidate, Rect};
use crate::scripts;
use std::time::Duration;
use tracing::debug;

const MESSAGE_INTENT: &[&str] = &["message", "chat", "ask"];
const SEND_GLYPHS: &[&str] = &["↵", "→", "⏎"];
const TOGGLE_INTENT: &[&str] = &["deepthink", "think", "search"];
const LOGIN_INTENT: &[&str] = &["log in", "login", "sign in", "signin"];
const EMAIL_INTENT: &[&str] = &["email", "user", "phone"];
const PASSWORD_INTENT: &[&str] = &["password"];

/// How far below/above the textbox a control may sit and still count as
/// part of the composer's toggle cluster.
const COMPOSER_BAND: f64 = 96.0;

pub(crate) fn handle_for(candidate: &Candidate) -> ElementHandle {
    ElementHandle::new(&candidate.selector)
}

// ---------------------------------------------------------------
// Pure tiers
// ---------------------------------------------------------------

/// Textbox: placeholder intent → bottom-proximity/area score → first
/// textarea → first editable container.
pub fn pick_textbox(candidates: &[Candidate]) -> Option<&Candidate> {
    if let Some(hit) = candidates.iter().find(|c| {
        c.placeholder_contains(MESSAGE_INTENT) || c.label_contains(MESSAGE_INTENT)
    }) {
        return Some(hit);
    }

    let mut textareas: Vec<&Candidate> =
        candidates.iter().filter(|c| c.tag == "textarea").collect();
    if !textareas.is_empty() {
        // Lower is better: distance from the viewport bottom, discounted by
        // rendered area so the dominant input wins over stray widgets.
        textareas.sort_by(|a, b| {
            composite_textbox_score(a)
                .partial_cmp(&composite_textbox_score(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        return Some(textareas[0]);
    }

    candidates.iter().find(|c| c.editable)
}

fn composite_textbox_score(candidate: &Candidate) -> f64 {
    (candidate.viewport_height - candidate.rect.bottom()) - candidate.rect.area() * 0.01
}

/// Send control: send token/glyph in text → send in accessible label/title
/// → nearest clickable beside the textbox → last icon-bearing clickable.
pub fn pick_send_button<'a>(
    candidates: &'a [Candidate],
    textbox: Option<&Rect>,
) -> Option<&'a Candidate> {
    if let Some(hit) = candidates.iter().find(|c| {
        c.text_contains(&["send"])
            || c.text
                .as_deref()
                .map(|t| SEND_GLYPHS.contains(&t.trim()))
                .unwrap_or(false)
    }) {
        return Some(hit);
    }

    if let Some(hit) = candidates
        .iter()
        .find(|c| c.label_contains(&["send"]) || c.title_contains(&["send"]))
    {
        return Some(hit);
    }

    if let Some(anchor) = textbox {
        let nearest = candidates.iter().min_by(|a, b| {
            a.rect
                .distance_beside(anchor)
                .partial_cmp(&b.rect.distance_beside(anchor))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if nearest.is_some() {
            return nearest;
        }
    }

    // Icon-only send buttons conventionally sit last in the control cluster.
    candidates.iter().filter(|c| c.has_icon).next_back()
}

/// Option toggles of the composer, left-to-right. Index 0 toggles deep
/// reasoning, index 1 toggles search (host UI convention).
pub fn pick_mode_toggles<'a>(
    candidates: &'a [Candidate],
    textbox: &Rect,
    send_selector: Option<&str>,
) -> Vec<&'a Candidate> {
    let mut toggles: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| Some(c.selector.as_str()) != send_selector)
        .filter(|c| c.text_contains(TOGGLE_INTENT) || c.label_contains(TOGGLE_INTENT))
        .collect();

    if toggles.is_empty() {
        toggles = candidates
            .iter()
            .filter(|c| Some(c.selector.as_str()) != send_selector)
            .filter(|c| {
                c.rect.y >= textbox.y - COMPOSER_BAND
                    && c.rect.y <= textbox.bottom() + COMPOSER_BAND
            })
            .collect();
    }

    toggles.sort_by(|a, b| {
        a.rect
            .x
            .partial_cmp(&b.rect.x)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    toggles
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Email,
    Password,
}

/// Login inputs by attribute preference: type, name, placeholder, id,
/// accessible label, then a generic type-based fallback.
pub fn pick_login_field(
    candidates: &[Candidate],
    field: LoginField,
) -> Option<&Candidate> {
    let inputs: Vec<&Candidate> = candidates.iter().filter(|c| c.tag == "input").collect();
    let intent: &[&str] = match field {
        LoginField::Email => EMAIL_INTENT,
        LoginField::Password => PASSWORD_INTENT,
    };
    let wanted_type = match field {
        LoginField::Email => "email",
        LoginField::Password => "password",
    };

    inputs
        .iter()
        .copied()
        .find(|c| c.input_type_is(wanted_type))
        .or_else(|| inputs.iter().copied().find(|c| c.name_contains(intent)))
        .or_else(|| inputs.iter().copied().find(|c| c.placeholder_contains(intent)))
        .or_else(|| inputs.iter().copied().find(|c| c.id_contains(intent)))
        .or_else(|| inputs.iter().copied().find(|c| c.label_contains(intent)))
        .or_else(|| match field {
            LoginField::Email => inputs.iter().copied().find(|c| c.input_type_is("text")),
            LoginField::Password => None,
        })
}

/// Submit control: type=submit → login vocabulary in text → nearest
/// clickable to the password field → last clickable.
pub fn pick_submit<'a>(
    candidates: &'a [Candidate],
    password: Option<&Rect>,
) -> Option<&'a Candidate> {
    if let Some(hit) = candidates.iter().find(|c| c.input_type_is("submit")) {
        return Some(hit);
    }

    if let Some(hit) = candidates
        .iter()
        .find(|c| c.text_contains(LOGIN_INTENT) || c.label_contains(LOGIN_INTENT))
    {
        return Some(hit);
    }

    if let Some(anchor) = password {
        let nearest = candidates.iter().min_by(|a, b| {
            a.rect
                .center_distance(anchor)
                .partial_cmp(&b.rect.center_distance(anchor))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if nearest.is_some() {
            return nearest;
        }
    }

    candidates.last()
}

/// First clickable whose text or accessible label matches the vocabulary.
pub fn pick_by_intent<'a>(
    candidates: &'a [Candidate],
    intent: &[&str],
) -> Option<&'a Candidate> {
    candidates
        .iter()
        .find(|c| c.text_contains(intent) || c.label_contains(intent))
}

// ---------------------------------------------------------------
// Probe-driven discovery
// ---------------------------------------------------------------

async fn collect<P: Probe + ?Sized>(
    probe: &mut P,
    query: &str,
) -> Result<Vec<Candidate>, ProbeError> {
    let value = probe.evaluate(&scripts::collect_candidates(query)).await?;
    Ok(scan::parse_candidates(value))
}

/// Locate the message textbox, degrading to the stable standards-based
/// fallback queries when no snapshot scores.
pub(crate) async fn locate_textbox<P: Probe + ?Sized>(
    probe: &mut P,
    select_wait: Duration,
) -> Result<Option<Candidate>, ProbeError> {
    let candidates = collect(probe, scripts::TEXT_SURFACE_QUERY).await?;
    if let Some(hit) = pick_textbox(&candidates) {
        debug!(selector = %hit.selector, "textbox located");
        return Ok(Some(hit.clone()));
    }

    match probe.select(scripts::TEXT_SURFACE_QUERY, select_wait).await? {
        Some(handle) => Ok(Some(Candidate {
            tag: "textarea".into(),
            selector: handle.selector().to_string(),
            ..Candidate::default()
        })),
        None => Ok(None),
    }
}

pub(crate) async fn locate_send_button<P: Probe + ?Sized>(
    probe: &mut P,
    textbox: Option<&Rect>,
) -> Result<Option<Candidate>, ProbeError> {
    let candidates = collect(probe, scripts::CLICKABLE_QUERY).await?;
    Ok(pick_send_button(&candidates, textbox).cloned())
}

pub(crate) async fn locate_mode_toggles<P: Probe + ?Sized>(
    probe: &mut P,
    textbox: &Rect,
    send_selector: Option<&str>,
) -> Result<Vec<Candidate>, ProbeError> {
    let candidates = collect(probe, scripts::CLICKABLE_QUERY).await?;
    Ok(pick_mode_toggles(&candidates, textbox, send_selector)
        .into_iter()
        .cloned()
        .collect())
}

pub(crate) async fn locate_login_inputs<P: Probe + ?Sized>(
    probe: &mut P,
) -> Result<Vec<Candidate>, ProbeError> {
    collect(probe, scripts::LOGIN_INPUT_QUERY).await
}

pub(crate) async fn locate_clickables<P: Probe + ?Sized>(
    probe: &mut P,
) -> Result<Vec<Candidate>, ProbeError> {
    collect(probe, scripts::CLICKABLE_QUERY).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candidate(tag: &str, selector: &str) -> Candidate {
        Candidate {
            tag: tag.into(),
            selector: selector.into(),
            viewport_height: 800.0,
            rect: Rect {
                x: 0.0,
                y: 0.0,
                width: 100.0,
                height: 40.0,
            },
            ..Candidate::default()
        }
    }

    #[test]
    fn test_textbox_prefers_placeholder_intent() {
        let mut plain = make_candidate("textarea", "textarea.a");
        plain.rect.y = 700.0;
        let mut intent = make_candidate("textarea", "textarea.b");
        intent.placeholder = Some("Message DeepSeek".into());
        let binding = [plain, intent];
        let picked = pick_textbox(&binding).unwrap();
        assert_eq!(picked.selector, "textarea.b");
    }

    #[test]
    fn test_textbox_scores_bottom_proximity_and_area() {
        let mut top_small = make_candidate("textarea", "textarea.top");
        top_small.rect = Rect {
            x: 0.0,
            y: 10.0,
            width: 100.0,
            height: 20.0,
        };
        let mut bottom_large = make_candidate("textarea", "textarea.bottom");
        bottom_large.rect = Rect {
            x: 0.0,
            y: 700.0,
            width: 600.0,
            height: 80.0,
        };
        let binding = [top_small, bottom_large];
        let picked = pick_textbox(&binding).unwrap();
        assert_eq!(picked.selector, "textarea.bottom");
    }

    #[test]
    fn test_textbox_lone_editable_container_still_found() {
        let mut editable = make_candidate("div", "div.editor");
        editable.editable = true;
        let binding = [editable];
        let picked = pick_textbox(&binding).unwrap();
        assert_eq!(picked.selector, "div.editor");
    }

    #[test]
    fn test_textbox_absent_is_none() {
        assert!(pick_textbox(&[]).is_none());
        let plain_div = make_candidate("div", "div.x");
        assert!(pick_textbox(&[plain_div]).is_none());
    }

    #[test]
    fn test_send_button_text_tier_beats_proximity() {
        let anchor = Rect {
            x: 0.0,
            y: 700.0,
            width: 500.0,
            height: 40.0,
        };
        let mut near = make_candidate("button", "button.near");
        near.rect = Rect {
            x: 505.0,
            y: 700.0,
            width: 30.0,
            height: 30.0,
        };
        let mut labelled = make_candidate("button", "button.send");
        labelled.text = Some("Send".into());
        labelled.rect = Rect {
            x: 10.0,
            y: 10.0,
            width: 30.0,
            height: 30.0,
        };
        let binding = [near, labelled];
        let picked = pick_send_button(&binding, Some(&anchor)).unwrap();
        assert_eq!(picked.selector, "button.send");
    }

    #[test]
    fn test_send_button_glyph_counts_as_text() {
        let mut glyph = make_candidate("button", "button.glyph");
        glyph.text = Some(" ↵ ".into());
        let binding = [glyph];
        let picked = pick_send_button(&binding, None).unwrap();
        assert_eq!(picked.selector, "button.glyph");
    }

    #[test]
    fn test_send_button_aria_label_tier() {
        let mut labelled = make_candidate("div", "div.btn");
        labelled.label = Some("Send message".into());
        let plain = make_candidate("button", "button.plain");
        // No textbox anchor: skips the proximity tier entirely.
        let binding = [plain, labelled];
        let picked = pick_send_button(&binding, None).unwrap();
        assert_eq!(picked.selector, "div.btn");
    }

    #[test]
    fn test_send_button_proximity_tier() {
        let anchor = Rect {
            x: 0.0,
            y: 700.0,
            width: 500.0,
            height: 40.0,
        };
        let mut near = make_candidate("button", "button.near");
        near.rect = Rect {
            x: 505.0,
            y: 702.0,
            width: 30.0,
            height: 30.0,
        };
        let mut far = make_candidate("button", "button.far");
        far.rect = Rect {
            x: 10.0,
            y: 10.0,
            width: 30.0,
            height: 30.0,
        };
        let binding = [far, near];
        let picked = pick_send_button(&binding, Some(&anchor)).unwrap();
        assert_eq!(picked.selector, "button.near");
    }

    #[test]
    fn test_send_button_last_icon_fallback() {
        let mut first = make_candidate("button", "button.one");
        first.has_icon = true;
        let mut last = make_candidate("button", "button.two");
        last.has_icon = true;
        let plain = make_candidate("button", "button.plain");
        let binding = [first, last, plain];
        let picked = pick_send_button(&binding, None).unwrap();
        assert_eq!(picked.selector, "button.two");
    }

    #[test]
    fn test_mode_toggles_by_vocabulary_in_reading_order() {
        let textbox = Rect {
            x: 0.0,
            y: 700.0,
            width: 500.0,
            height: 40.0,
        };
        let mut search = make_candidate("button", "button.search");
        search.text = Some("Search".into());
        search.rect.x = 120.0;
        let mut think = make_candidate("button", "button.think");
        think.text = Some("DeepThink (R1)".into());
        think.rect.x = 40.0;
        let binding = [search, think];
        let toggles = pick_mode_toggles(&binding, &textbox, None);
        assert_eq!(toggles.len(), 2);
        assert_eq!(toggles[0].selector, "button.think");
        assert_eq!(toggles[1].selector, "button.search");
    }

    #[test]
    fn test_mode_toggles_composer_band_excludes_send() {
        let textbox = Rect {
            x: 0.0,
            y: 700.0,
            width: 500.0,
            height: 40.0,
        };
        let mut inside = make_candidate("button", "button.inside");
        inside.rect.y = 750.0;
        let mut outside = make_candidate("button", "button.outside");
        outside.rect.y = 100.0;
        let mut send = make_candidate("button", "button.send");
        send.rect.y = 750.0;
        let binding = [inside, outside, send];
        let toggles = pick_mode_toggles(&binding, &textbox, Some("button.send"));
        assert_eq!(toggles.len(), 1);
        assert_eq!(toggles[0].selector, "button.inside");
    }

    #[test]
    fn test_login_field_preference_order() {
        let mut by_name = make_candidate("input", "input.name");
        by_name.name = Some("user_email".into());
        let mut by_type = make_candidate("input", "input.type");
        by_type.input_type = Some("email".into());
        let binding = [by_name, by_type];
        let picked =
            pick_login_field(&binding, LoginField::Email).unwrap();
        assert_eq!(picked.selector, "input.type");
    }

    #[test]
    fn test_login_field_generic_text_fallback() {
        let mut generic = make_candidate("input", "input.generic");
        generic.input_type = Some("text".into());
        let binding = [generic];
        let picked = pick_login_field(&binding, LoginField::Email).unwrap();
        assert_eq!(picked.selector, "input.generic");
    }

    #[test]
    fn test_password_field_has_no_text_fallback() {
        let mut generic = make_candidate("input", "input.generic");
        generic.input_type = Some("text".into());
        assert!(pick_login_field(&[generic], LoginField::Password).is_none());
    }

    #[test]
    fn test_submit_prefers_type_then_text() {
        let mut text = make_candidate("button", "button.text");
        text.text = Some("Log in".into());
        let mut typed = make_candidate("input", "input.submit");
        typed.input_type = Some("submit".into());
        let binding = [text.clone(), typed];
        let picked = pick_submit(&binding, None).unwrap();
        assert_eq!(picked.selector, "input.submit");
        let binding = [text];
        let picked = pick_submit(&binding, None).unwrap();
        assert_eq!(picked.selector, "button.text");
    }

    #[test]
    fn test_submit_proximity_to_password() {
        let password = Rect {
            x: 100.0,
            y: 300.0,
            width: 200.0,
            height: 40.0,
        };
        let mut near = make_candidate("button", "button.near");
        near.rect = Rect {
            x: 100.0,
            y: 360.0,
            width: 200.0,
            height: 40.0,
        };
        let mut far = make_candidate("button", "button.far");
        far.rect = Rect {
            x: 600.0,
            y: 20.0,
            width: 40.0,
            height: 40.0,
        };
        let binding = [far, near];
        let picked = pick_submit(&binding, Some(&password)).unwrap();
        assert_eq!(picked.selector, "button.near");
    }
}
