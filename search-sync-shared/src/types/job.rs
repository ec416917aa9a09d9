//! Jobs captured while indexing is paused.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Context keys kept when a job is parked in a waiting queue.
pub const CONTEXT_WHITELIST: [&str; 4] = ["correlation_id", "project", "root_namespace", "user"];

/// Request context carried along with a job.
///
/// Only the keys in [`CONTEXT_WHITELIST`] survive, which bounds what a
/// waiting queue has to store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobContext(BTreeMap<String, String>);

impl JobContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the whitelisted subset of `values`.
    pub fn capture<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut ctx = Self::new();
        for (key, value) in values {
            ctx.insert(key, value);
        }
        ctx
    }

    /// Insert a value; keys outside the whitelist are ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if CONTEXT_WHITELIST.contains(&key.as_str()) {
            self.0.insert(key, value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Arguments of a queue-producing call plus its context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub args: Vec<Value>,
    #[serde(default)]
    pub context: JobContext,
}

impl Job {
    pub fn new(args: Vec<Value>) -> Self {
        Self {
            args,
            context: JobContext::new(),
        }
    }

    pub fn with_context(args: Vec<Value>, context: JobContext) -> Self {
        Self { args, context }
    }
}
