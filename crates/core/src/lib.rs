pub mod batch;
pub mod config;
pub mod context;
pub mod deps;
pub mod domain;
pub mod errors;
pub mod parser;
pub mod retry;
pub mod template;

pub use batch::{concat_combiner, process_in_batches, split_text};
pub use config::{
    AppConfig, ConfigError, ConfigOverrides, EngineConfig, LlmConfig, LlmProvider, LoadOptions,
    LogFormat, LoggingConfig,
};
pub use context::{ExecutionContext, StepResult};
pub use deps::{referenced_step_keys, step_depends_on_failure, value_depends_on_failure};
pub use domain::email::{top_level_body, Attachment, EmailMessage, EMAIL_CHAIN_FILENAME};
pub use domain::plan::{child_step_id, step_key, Plan, PlanSource, Step};
pub use domain::report::{ExecutionReport, StepRecord};
pub use errors::DomainError;
pub use parser::{
    build_fallback_plan, parse_plan, FALLBACK_PARSE_TOOL, FALLBACK_SUMMARISE_TOOL,
    FALLBACK_SUMMARY_MAX_CHARS,
};
pub use retry::{is_retryable_message, is_retryable_status};
pub use template::{resolve_params, resolve_value, ResolvedParam, Scope, TemplateRef};
