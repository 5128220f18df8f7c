use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::context::StepResult;
use crate::domain::plan::PlanSource;

/// One entry in the execution log: the step (or fan-out child) id, the tool
/// it targeted and the recorded result map.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step: String,
    pub tool: String,
    pub result: StepResult,
}

/// What one plan run produced, in execution order. Fan-out children appear
/// before their parent's aggregate entry.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub run_id: Uuid,
    pub plan_source: PlanSource,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when a critical step failed and the rest of the plan was dropped.
    pub aborted: bool,
    pub records: Vec<StepRecord>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        !self.aborted && self.records.iter().all(|record| record.result.success())
    }

    pub fn record_for(&self, step_id: &str) -> Option<&StepRecord> {
        self.records.iter().find(|record| record.step == step_id)
    }
}
