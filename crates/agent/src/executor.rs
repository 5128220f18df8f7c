//! Sequential plan execution. Each step resolves its params against
//! everything recorded so far, dispatches to a registered tool and records
//! a result map whatever happens; the only thing that stops a run early is
//! a critical step failing.

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use mailey_core::context::{ExecutionContext, StepResult};
use mailey_core::deps::{step_depends_on_failure, value_depends_on_failure};
use mailey_core::domain::email::EmailMessage;
use mailey_core::domain::plan::{child_step_id, step_key, Plan, Step};
use mailey_core::domain::report::{ExecutionReport, StepRecord};
use mailey_core::template::{resolve_params, resolve_value, Scope};

use crate::tools::ToolRegistry;

/// Error recorded on a step that was skipped because a step it references
/// already failed.
pub const DEPENDENCY_FAILURE_ERROR: &str = "Dependent step(s) failed";

pub struct PlanExecutor {
    registry: ToolRegistry,
}

impl PlanExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs every step in order and returns the full execution log. Tool
    /// failures are recorded, never raised; a failed critical step aborts
    /// the rest of the plan without recording the steps that never ran.
    pub async fn execute(&self, plan: &Plan, email: &EmailMessage) -> ExecutionReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut context = ExecutionContext::new();
        let mut records = Vec::new();
        let mut aborted = false;

        tracing::info!(
            event_name = "engine.run.start",
            run_id = %run_id,
            message_id = %email.message_id,
            plan_source = plan.source().as_str(),
            step_count = plan.len()
        );

        for (position, step) in plan.steps().iter().enumerate() {
            let step_number = position + 1;
            let step_id = step_key(step_number);

            let result = match &step.foreach {
                Some(expression) => {
                    self.run_fan_out(step, step_number, expression, email, &mut context, &mut records)
                        .await
                }
                None => self.run_step(step, email, &context).await,
            };

            tracing::debug!(
                event_name = "engine.step.finished",
                run_id = %run_id,
                step = %step_id,
                tool = %step.tool,
                success = result.success()
            );

            let failed = !result.success();
            context.insert(step_id.clone(), result.clone());
            records.push(StepRecord { step: step_id, tool: step.tool.clone(), result });

            if failed && step.critical {
                tracing::warn!(
                    event_name = "engine.run.aborted",
                    run_id = %run_id,
                    step = %step_key(step_number),
                    tool = %step.tool,
                    "critical step failed, dropping the rest of the plan"
                );
                aborted = true;
                break;
            }
        }

        ExecutionReport {
            run_id,
            plan_source: plan.source(),
            started_at,
            finished_at: Utc::now(),
            aborted,
            records,
        }
    }

    async fn run_step(
        &self,
        step: &Step,
        email: &EmailMessage,
        context: &ExecutionContext,
    ) -> StepResult {
        if step_depends_on_failure(&step.params, context) {
            return StepResult::skipped(DEPENDENCY_FAILURE_ERROR);
        }
        let scope = Scope::new(context, &email.attachments);
        let params = resolve_params(&step.params, &scope);
        self.invoke_tool(&step.tool, params).await
    }

    /// Expands a `foreach` step: resolves the expression to an item list,
    /// runs one child per item and records each child under `N.j` before
    /// appending the parent aggregate. A non-list expression value becomes
    /// a single item.
    async fn run_fan_out(
        &self,
        step: &Step,
        step_number: usize,
        expression: &str,
        email: &EmailMessage,
        context: &mut ExecutionContext,
        records: &mut Vec<StepRecord>,
    ) -> StepResult {
        if step_depends_on_failure(&step.params, context)
            || value_depends_on_failure(&Value::String(expression.to_string()), context)
        {
            return StepResult::skipped(DEPENDENCY_FAILURE_ERROR);
        }

        let resolved = {
            let scope = Scope::new(context, &email.attachments);
            resolve_value(&Value::String(expression.to_string()), &scope)
        };
        let items = match resolved {
            Value::Array(items) => items,
            other => vec![other],
        };

        tracing::debug!(
            event_name = "engine.fanout.expanded",
            step = %step_key(step_number),
            tool = %step.tool,
            item_count = items.len()
        );

        let mut entries = Vec::with_capacity(items.len());
        let mut any_success = false;
        for (offset, item) in items.iter().enumerate() {
            let item_number = offset + 1;
            let child_id = child_step_id(step_number, item_number);
            let params = {
                let scope = Scope::new(context, &email.attachments).with_item(item);
                resolve_params(&step.params, &scope)
            };
            let result = self.invoke_tool(&step.tool, params).await;
            any_success |= result.success();

            let mut entry = result.as_map().clone();
            entry.insert("itemIndex".to_string(), Value::from(item_number));
            entry.insert("item".to_string(), item.clone());
            entries.push(Value::Object(entry));

            context.insert(child_id.clone(), result.clone());
            records.push(StepRecord { step: child_id, tool: step.tool.clone(), result });
        }

        let mut aggregate = Map::new();
        aggregate.insert("success".to_string(), Value::Bool(any_success));
        aggregate.insert("batchCount".to_string(), Value::from(entries.len()));
        aggregate.insert("batchResults".to_string(), Value::Array(entries));
        StepResult::new(aggregate)
    }

    async fn invoke_tool(&self, tool_name: &str, params: Map<String, Value>) -> StepResult {
        let Some(tool) = self.registry.get(tool_name) else {
            return StepResult::failure(format!("{tool_name} not found"));
        };
        match tool.execute(Value::Object(params)).await {
            Ok(output) => StepResult::from_tool_output(output),
            Err(error) => StepResult::failure(format!("{error:#}")),
        }
    }
}
