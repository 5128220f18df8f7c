use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One tool invocation in a plan. `params` may contain template references
/// into earlier step results; `foreach` turns the step into a fan-out over a
/// resolved list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub tool: String,
    pub params: Map<String, Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreach: Option<String>,
}

impl Step {
    pub fn new(tool: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            params,
            description: String::new(),
            critical: false,
            foreach: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_foreach(mut self, expression: impl Into<String>) -> Self {
        self.foreach = Some(expression.into());
        self
    }
}

/// Where a plan came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    /// Parsed out of the language model's reply.
    Model,
    /// Built deterministically because the reply was unusable.
    Fallback,
}

impl PlanSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanSource::Model => "model",
            PlanSource::Fallback => "fallback",
        }
    }
}

/// An ordered, immutable list of steps. Construction goes through
/// [`crate::parser::parse_plan`] or [`crate::parser::build_fallback_plan`],
/// both of which guarantee at least one step.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Plan {
    source: PlanSource,
    steps: Vec<Step>,
}

impl Plan {
    pub fn from_model(steps: Vec<Step>) -> Self {
        Self {
            source: PlanSource::Model,
            steps,
        }
    }

    pub fn fallback(steps: Vec<Step>) -> Self {
        Self {
            source: PlanSource::Fallback,
            steps,
        }
    }

    pub fn source(&self) -> PlanSource {
        self.source
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Context key for a top-level step, 1-based: `step_1`, `step_2`, ...
pub fn step_key(step_number: usize) -> String {
    format!("step_{step_number}")
}

/// Context key for a fan-out child, 1-based on both axes: item 2 of step 3
/// is `3.2`.
pub fn child_step_id(step_number: usize, item_number: usize) -> String {
    format!("{step_number}.{item_number}")
}
