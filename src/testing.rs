//! Scripted model and search fakes for unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::{LlmError, SearchError};
use crate::llm::LanguageModel;
use crate::search::{SearchHit, SearchOptions, SearchProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Plan,
    Extract,
    Report,
    Other,
}

impl CallKind {
    fn classify(schema: &Value) -> Self {
        let properties = &schema["properties"];
        if properties.get("queries").is_some() {
            CallKind::Plan
        } else if properties.get("learnings").is_some() {
            CallKind::Extract
        } else if properties.get("reportMarkdown").is_some() {
            CallKind::Report
        } else {
            CallKind::Other
        }
    }
}

type ModelScript = dyn Fn(CallKind, &str) -> Result<Value, LlmError> + Send + Sync;

pub struct FakeModel {
    script: Box<ModelScript>,
    calls: Mutex<Vec<(CallKind, String)>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeModel {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(CallKind, &str) -> Result<Value, LlmError> + Send + Sync + 'static,
    {
        FakeModel {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Every completion waits for a permit on `gate` before answering.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self, kind: CallKind) -> usize {
        self.calls.lock().unwrap().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn prompts(&self, kind: CallKind) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn complete(
        &self,
        _system: &str,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, LlmError> {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.map_err(|e| LlmError::Request {
                message: e.to_string(),
            })?;
        }
        let kind = CallKind::classify(schema);
        self.calls.lock().unwrap().push((kind, prompt.to_string()));
        (self.script)(kind, prompt)
    }
}

type SearchScript =
    dyn Fn(&str, &SearchOptions) -> Result<Vec<SearchHit>, SearchError> + Send + Sync;

pub struct FakeSearch {
    script: Box<SearchScript>,
    delay: Duration,
    delays: HashMap<String, Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeSearch {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str, &SearchOptions) -> Result<Vec<SearchHit>, SearchError> + Send + Sync + 'static,
    {
        FakeSearch {
            script: Box::new(script),
            delay: Duration::ZERO,
            delays: HashMap::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_delay_for(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // decremented even when the executor's timeout drops this future
        let _guard = InFlight(&self.in_flight);

        let delay = self.delays.get(query).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        (self.script)(query, options)
    }
}

pub fn plan_response(queries: &[(&str, &str)]) -> Value {
    let queries: Vec<Value> = queries
        .iter()
        .map(|(query, goal)| json!({ "query": query, "researchGoal": goal }))
        .collect();
    json!({ "queries": queries })
}

pub fn extraction_response(learnings: &[&str], follow_ups: &[&str]) -> Value {
    json!({ "learnings": learnings, "followUpQuestions": follow_ups })
}

pub fn report_response(markdown: &str) -> Value {
    json!({ "reportMarkdown": markdown })
}

pub fn hit(url: &str, content: &str) -> SearchHit {
    SearchHit {
        url: Some(url.to_string()),
        title: None,
        content: Some(content.to_string()),
    }
}
