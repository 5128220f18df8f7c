//! Parameter template resolution.
//!
//! Plans reference earlier output with `{step_N.field}` (or the double-brace
//! spelling `{{step_N.field}}`, which tolerates interior whitespace) and the
//! current fan-out item with `{item}` / `{item.field}`. A string that is
//! exactly one reference resolves to the referenced value with its type
//! intact; references embedded in longer text are stringified in place.
//! Anything that cannot be resolved is left verbatim so the tool sees what
//! the plan said.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::context::{ExecutionContext, StepResult};
use crate::domain::email::{encode_content, Attachment};

static DOUBLE_BRACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*(step_\d+|item)((?:\.[A-Za-z0-9_]+)*)\s*\}\}").unwrap());
static SINGLE_BRACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(step_\d+|item)((?:\.[A-Za-z0-9_]+)*)\}").unwrap());

/// A parsed reference: the step key (`step_N` or `item`) and the dotted
/// field path after it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateRef {
    pub step_key: String,
    pub path: Vec<String>,
}

impl TemplateRef {
    /// Parses `text` as a single reference, tolerating surrounding
    /// whitespace. Returns `None` for embedded references, malformed refs
    /// like bare `{step_1}`, and plain text.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        for pattern in [&*DOUBLE_BRACE, &*SINGLE_BRACE] {
            if let Some(captures) = pattern.captures(trimmed) {
                let matched = captures.get(0)?;
                if matched.start() == 0 && matched.end() == trimmed.len() {
                    return Self::from_captures(&captures);
                }
            }
        }
        None
    }

    fn from_captures(captures: &Captures<'_>) -> Option<Self> {
        let step_key = captures[1].to_string();
        let path: Vec<String> = captures[2]
            .split('.')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        // A step reference without a field selects nothing.
        if step_key != "item" && path.is_empty() {
            return None;
        }
        Some(Self { step_key, path })
    }

    fn is_step(&self) -> bool {
        self.step_key != "item"
    }
}

/// Everything a reference can resolve against: prior step results, the
/// email's attachments and, inside a fan-out, the current item.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    context: &'a ExecutionContext,
    attachments: &'a [Attachment],
    item: Option<&'a Value>,
}

impl<'a> Scope<'a> {
    pub fn new(context: &'a ExecutionContext, attachments: &'a [Attachment]) -> Self {
        Self {
            context,
            attachments,
            item: None,
        }
    }

    pub fn with_item(self, item: &'a Value) -> Self {
        Self {
            item: Some(item),
            ..self
        }
    }
}

/// A resolved top-level parameter: the primary value plus any side
/// parameters it pulled in (inline attachment bytes travel as an adjacent
/// `<key>_content` / `<key>_filename` pair).
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedParam {
    pub value: Value,
    pub side_params: Vec<(String, Value)>,
}

/// Resolves a whole parameter map. Nested values resolve recursively;
/// attachment binding applies to top-level string values only.
pub fn resolve_params(params: &Map<String, Value>, scope: &Scope<'_>) -> Map<String, Value> {
    let mut resolved = Map::new();
    for (key, value) in params {
        let param = resolve_param(key, value, scope);
        resolved.insert(key.clone(), param.value);
        for (side_key, side_value) in param.side_params {
            resolved.insert(side_key, side_value);
        }
    }
    resolved
}

fn resolve_param(key: &str, value: &Value, scope: &Scope<'_>) -> ResolvedParam {
    bind_attachment(key, resolve_value(value, scope), scope.attachments)
}

/// Resolves references inside one value. Non-strings pass through with
/// their elements resolved; strings follow the sole-reference and embedded
/// rules described at the top of this module.
pub fn resolve_value(value: &Value, scope: &Scope<'_>) -> Value {
    match value {
        Value::String(text) => resolve_text(text, scope),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| resolve_value(item, scope)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, nested)| (key.clone(), resolve_value(nested, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_text(text: &str, scope: &Scope<'_>) -> Value {
    if let Some(reference) = TemplateRef::parse(text) {
        return match resolve_ref(&reference, scope) {
            Some(value) => value,
            None => {
                warn_unresolved(text.trim());
                Value::String(text.to_string())
            }
        };
    }
    if !DOUBLE_BRACE.is_match(text) && !SINGLE_BRACE.is_match(text) {
        return Value::String(text.to_string());
    }
    let first_pass = substitute(&DOUBLE_BRACE, text, scope);
    let second_pass = substitute(&SINGLE_BRACE, &first_pass, scope);
    Value::String(second_pass.into_owned())
}

fn substitute<'t>(pattern: &Regex, text: &'t str, scope: &Scope<'_>) -> Cow<'t, str> {
    pattern.replace_all(text, |captures: &Captures<'_>| {
        let literal = &captures[0];
        match TemplateRef::from_captures(captures).and_then(|reference| resolve_ref(&reference, scope))
        {
            Some(value) => fragment(&value),
            None => {
                warn_unresolved(literal);
                literal.to_string()
            }
        }
    })
}

/// String form of a value spliced into surrounding text. Strings embed
/// unquoted; everything else embeds as compact JSON.
fn fragment(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Every well-formed reference in `text`, in match order. Both brace
/// spellings are scanned, so a double-brace reference may appear twice;
/// callers that care deduplicate.
pub(crate) fn refs_in_text(text: &str) -> Vec<TemplateRef> {
    DOUBLE_BRACE
        .captures_iter(text)
        .chain(SINGLE_BRACE.captures_iter(text))
        .filter_map(|captures| TemplateRef::from_captures(&captures))
        .collect()
}

fn warn_unresolved(reference: &str) {
    tracing::warn!(
        event_name = "template.unresolved",
        reference = %reference,
        "reference left verbatim"
    );
}

fn resolve_ref(reference: &TemplateRef, scope: &Scope<'_>) -> Option<Value> {
    if reference.is_step() {
        let result = scope.context.get(&reference.step_key)?;
        // One field segment only. Deeper paths are recognized by the
        // grammar but never resolve, and stay verbatim in the output.
        if reference.path.len() != 1 {
            return None;
        }
        return lookup_step_field(result, &reference.path[0]).cloned();
    }
    let item = scope.item?;
    match reference.path.as_slice() {
        [] => Some(item.clone()),
        [field] => item.as_object()?.get(field).cloned(),
        _ => None,
    }
}

/// Field lookup inside a step result, unwrapping the two container shapes
/// tools commonly produce: an `extractedData` envelope and a fan-out
/// aggregate whose first entry carries the data.
fn lookup_step_field<'a>(result: &'a StepResult, field: &str) -> Option<&'a Value> {
    if let Some(value) = result.field(field) {
        return Some(value);
    }
    if let Some(value) = result
        .field("extractedData")
        .and_then(Value::as_object)
        .and_then(|extracted| extracted.get(field))
    {
        return Some(value);
    }
    let first = result
        .field("batchResults")
        .and_then(Value::as_array)
        .and_then(|batch| batch.first())
        .and_then(Value::as_object)?;
    if let Some(value) = first.get(field) {
        return Some(value);
    }
    first
        .get("extractedData")
        .and_then(Value::as_object)
        .and_then(|extracted| extracted.get(field))
}

/// Swaps an exact attachment identifier for the attachment's storage id.
/// When the attachment only has inline bytes, the bytes ride along as
/// `<key>_content` (base64) with the original filename in
/// `<key>_filename`.
fn bind_attachment(key: &str, value: Value, attachments: &[Attachment]) -> ResolvedParam {
    let matched = match &value {
        Value::String(candidate) => attachments
            .iter()
            .find(|attachment| attachment.matches(candidate)),
        _ => None,
    };
    let Some(attachment) = matched else {
        return ResolvedParam {
            value,
            side_params: Vec::new(),
        };
    };
    let mut side_params = Vec::new();
    if let Some(bytes) = &attachment.content {
        side_params.push((
            format!("{key}_content"),
            Value::String(encode_content(bytes)),
        ));
        side_params.push((
            format!("{key}_filename"),
            Value::String(attachment.name.clone()),
        ));
    }
    ResolvedParam {
        value: Value::String(attachment.storage_id().to_string()),
        side_params,
    }
}
