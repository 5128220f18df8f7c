use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The result map recorded for one step or fan-out child. Always an object;
/// `success` is the only key every result shares. Tool output keys sit next
/// to it untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepResult(Map<String, Value>);

impl StepResult {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Normalizes whatever a tool returned into a result map. Objects keep
    /// their keys and gain `success: true` if the tool did not set one;
    /// anything else is wrapped as `{success: true, output: <value>}`.
    pub fn from_tool_output(output: Value) -> Self {
        match output {
            Value::Object(mut map) => {
                map.entry("success").or_insert(Value::Bool(true));
                Self(map)
            }
            other => {
                let mut map = Map::new();
                map.insert("success".to_string(), Value::Bool(true));
                map.insert("output".to_string(), other);
                Self(map)
            }
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("success".to_string(), Value::Bool(false));
        map.insert("error".to_string(), Value::String(message.into()));
        Self(map)
    }

    /// A step that never ran because something it references already failed.
    pub fn skipped(message: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("success".to_string(), Value::Bool(false));
        map.insert("error".to_string(), Value::String(message.into()));
        map.insert("skipped".to_string(), Value::Bool(true));
        Self(map)
    }

    pub fn success(&self) -> bool {
        self.0
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn error(&self) -> Option<&str> {
        self.0.get("error").and_then(Value::as_str)
    }

    pub fn was_skipped(&self) -> bool {
        self.0
            .get("skipped")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Append-only record of everything executed so far in one plan run. Keys
/// are `step_N` for top-level steps and `N.j` for fan-out children; entries
/// are never overwritten, so template resolution against earlier steps stays
/// stable for the whole run.
#[derive(Clone, Debug, Default)]
pub struct ExecutionContext {
    results: BTreeMap<String, StepResult>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, step_id: impl Into<String>, result: StepResult) {
        let step_id = step_id.into();
        debug_assert!(
            !self.results.contains_key(&step_id),
            "step id {step_id} recorded twice"
        );
        self.results.insert(step_id, result);
    }

    pub fn get(&self, step_id: &str) -> Option<&StepResult> {
        self.results.get(step_id)
    }

    /// True when the step exists and recorded a failure. Unknown ids are not
    /// failures; a reference to a step that has not run yet must not block
    /// execution.
    pub fn step_failed(&self, step_id: &str) -> bool {
        self.results
            .get(step_id)
            .is_some_and(|result| !result.success())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
