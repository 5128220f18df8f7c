//! Agent Runtime - plan production and tool orchestration
//!
//! This crate is the orchestration half of mailey. It turns an inbound
//! email into a step plan and runs that plan against registered tools:
//! - Asks the LLM for a JSON step array (`planner`)
//! - Parses replies strictly and falls back to a deterministic plan
//! - Executes steps in order with dependency gating and fan-out (`executor`)
//! - Retries transient tool failures with exponential backoff (`retry`)
//!
//! # Architecture
//!
//! Execution follows a fixed loop:
//! 1. **Planning** (`planner`) - Email → `Plan` via `LlmClient`, fallback on any trouble
//! 2. **Resolution** - Step params resolve `{step_N.field}` references against recorded results
//! 3. **Dispatch** (`tools`) - Look up the step's tool by name and execute it
//! 4. **Recording** (`executor`) - Every step leaves a result map; failures are data
//!
//! # Key Types
//!
//! - `PlanExecutor` - Sequential step runner (see `executor` module)
//! - `LlmClient` - Pluggable completion trait behind the planner
//! - `ToolRegistry` - Name → tool dispatch table
//!
//! # Safety Principle
//!
//! The LLM only proposes plans. It NEVER executes anything directly: every
//! reply is parsed strictly, anything unusable is replaced by the fallback
//! plan, and a tool failure can only stop the run through a `critical` step.

pub mod executor;
pub mod llm;
pub mod planner;
pub mod retry;
pub mod tools;
