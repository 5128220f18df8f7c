//! Step dependency checking. A step depends on every earlier step its
//! params reference; if any of those recorded a failure, the step is
//! skipped instead of running against broken input.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::template::refs_in_text;

/// All `step_N` keys referenced anywhere in the params, including inside
/// nested lists and maps. `{item}` references are not dependencies.
pub fn referenced_step_keys(params: &Map<String, Value>) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    for value in params.values() {
        collect_step_keys(value, &mut keys);
    }
    keys
}

/// True when any step referenced by `params` has already failed. References
/// to steps that have not run resolve nothing and block nothing.
pub fn step_depends_on_failure(params: &Map<String, Value>, context: &ExecutionContext) -> bool {
    referenced_step_keys(params)
        .iter()
        .any(|key| context.step_failed(key))
}

/// Same check for a single value, used for fan-out expressions.
pub fn value_depends_on_failure(value: &Value, context: &ExecutionContext) -> bool {
    let mut keys = BTreeSet::new();
    collect_step_keys(value, &mut keys);
    keys.iter().any(|key| context.step_failed(key))
}

fn collect_step_keys(value: &Value, keys: &mut BTreeSet<String>) {
    match value {
        Value::String(text) => {
            for reference in refs_in_text(text) {
                if reference.step_key != "item" {
                    keys.insert(reference.step_key);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_step_keys(item, keys);
            }
        }
        Value::Object(map) => {
            for nested in map.values() {
                collect_step_keys(nested, keys);
            }
        }
        _ => {}
    }
}
