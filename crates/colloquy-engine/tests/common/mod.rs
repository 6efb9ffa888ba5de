#![allow(dead_code)] // each test binary uses a different subset of the fake

//! Scripted probe fake shared by the integration tests.
//!
//! Evaluate rules are keyed on the exact script text (the `scripts` module
//! is public, so tests build the very strings the engine evaluates) with a
//! substring fallback. Rules hold a queue of values: each hit pops one
//! until a single value remains, which then repeats.

use async_trait::async_trait;
use colloquy_engine::probe::{ElementHandle, Probe, ProbeError};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MockState {
    eval_exact: HashMap<String, VecDeque<Value>>,
    eval_contains: Vec<(String, VecDeque<Value>)>,
    select_results: HashMap<String, VecDeque<Option<String>>>,
    select_all_results: HashMap<String, Vec<String>>,
    wait_results: HashMap<String, VecDeque<bool>>,
    pub evaluated: Vec<String>,
    pub clicked: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub navigated: Vec<String>,
    pub reloads: usize,
}

fn next_queued<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    match queue.len() {
        0 => None,
        1 => queue.front().cloned(),
        _ => queue.pop_front(),
    }
}

#[derive(Clone, Debug, Default)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Queue a response for an exact script.
    pub fn on_eval(&self, script: impl Into<String>, value: Value) -> &Self {
        self.state()
            .eval_exact
            .entry(script.into())
            .or_default()
            .push_back(value);
        self
    }

    /// Queue a response for any script containing `marker`.
    pub fn on_eval_containing(&self, marker: impl Into<String>, value: Value) -> &Self {
        let marker = marker.into();
        let mut state = self.state();
        if let Some((_, queue)) = state.eval_contains.iter_mut().find(|(m, _)| *m == marker) {
            queue.push_back(value);
        } else {
            state.eval_contains.push((marker, VecDeque::from([value])));
        }
        self
    }

    pub fn on_select(&self, query: impl Into<String>, selector: Option<&str>) -> &Self {
        self.state()
            .select_results
            .entry(query.into())
            .or_default()
            .push_back(selector.map(str::to_string));
        self
    }

    #[allow(dead_code)]
    pub fn on_select_all(&self, query: impl Into<String>, selectors: &[&str]) -> &Self {
        self.state()
            .select_all_results
            .insert(query.into(), selectors.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn on_wait(&self, query: impl Into<String>, present: bool) -> &Self {
        self.state()
            .wait_results
            .entry(query.into())
            .or_default()
            .push_back(present);
        self
    }
}

#[async_trait]
impl Probe for MockProbe {
    async fn evaluate(&mut self, script: &str) -> Result<Value, ProbeError> {
        let mut state = self.state.lock().unwrap();
        state.evaluated.push(script.to_string());
        if let Some(queue) = state.eval_exact.get_mut(script) {
            if let Some(value) = next_queued(queue) {
                return Ok(value);
            }
        }
        for (marker, queue) in state.eval_contains.iter_mut() {
            if script.contains(marker.as_str()) {
                if let Some(value) = next_queued(queue) {
                    return Ok(value);
                }
            }
        }
        Ok(Value::Null)
    }

    async fn select(
        &mut self,
        query: &str,
        _timeout: Duration,
    ) -> Result<Option<ElementHandle>, ProbeError> {
        let mut state = self.state.lock().unwrap();
        let selector = state
            .select_results
            .get_mut(query)
            .and_then(next_queued)
            .flatten();
        Ok(selector.map(ElementHandle::new))
    }

    async fn select_all(&mut self, query: &str) -> Result<Vec<ElementHandle>, ProbeError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .select_all_results
            .get(query)
            .map(|selectors| selectors.iter().map(ElementHandle::new).collect())
            .unwrap_or_default())
    }

    async fn click(&mut self, handle: &ElementHandle) -> Result<(), ProbeError> {
        self.state.lock().unwrap().clicked.push(handle.selector().to_string());
        Ok(())
    }

    async fn type_text(&mut self, handle: &ElementHandle, text: &str) -> Result<(), ProbeError> {
        self.state
            .lock()
            .unwrap()
            .typed
            .push((handle.selector().to_string(), text.to_string()));
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), ProbeError> {
        self.state.lock().unwrap().navigated.push(url.to_string());
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), ProbeError> {
        self.state.lock().unwrap().reloads += 1;
        Ok(())
    }

    async fn wait_for(&mut self, query: &str, _timeout: Duration) -> Result<bool, ProbeError> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .wait_results
            .get_mut(query)
            .and_then(next_queued)
            .unwrap_or(false))
    }
}
