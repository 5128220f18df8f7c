use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use mailey_agent::executor::PlanExecutor;
use mailey_agent::retry::with_retry;
use mailey_agent::tools::{Tool, ToolRegistry};
use mailey_core::batch::{concat_combiner, process_in_batches, split_text};
use mailey_core::config::{AppConfig, LoadOptions};
use mailey_core::domain::email::{Attachment, EmailMessage};
use mailey_core::domain::plan::PlanSource;
use mailey_core::parser::{build_fallback_plan, parse_plan};

use crate::commands::CommandResult;

const BATCH_SMOKE_TEXT: &str =
    "mailey smoke batches this sentence and retries transient faults.";
const BATCH_SMOKE_LIMIT: usize = 16;

/// The model reply the smoke run feeds through the real parser. It covers a
/// critical step, a fan-out and template references across steps.
const DEMO_REPLY: &str = r#"Here is the plan:
[
  {"tool": "parse", "params": {"fileId": "invoice.pdf"}, "critical": true},
  {"tool": "record", "params": {"sku": "{item}"}, "foreach": "{step_1.lineItems}"},
  {"tool": "summarise", "params": {"text": "Vendor {step_1.vendor} produced {step_2.batchCount} batch(es)"}}
]"#;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("plan_parse"));
            checks.push(skipped("fallback_plan"));
            checks.push(skipped("plan_execution"));
            checks.push(skipped("batch_retry"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let email = demo_email();

    let parse_started = Instant::now();
    let plan = parse_plan(DEMO_REPLY, &email);
    let parse_ok = plan.source() == PlanSource::Model && plan.len() == 3;
    checks.push(SmokeCheck {
        name: "plan_parse",
        status: if parse_ok { SmokeStatus::Pass } else { SmokeStatus::Fail },
        elapsed_ms: parse_started.elapsed().as_millis() as u64,
        message: if parse_ok {
            format!("parsed a {}-step model plan", plan.len())
        } else {
            format!(
                "expected a 3-step model plan, got {} steps from {} source",
                plan.len(),
                plan.source().as_str()
            )
        },
    });

    let fallback_started = Instant::now();
    let fallback = build_fallback_plan(&email);
    let fallback_ok = fallback.source() == PlanSource::Fallback
        && !fallback.is_empty()
        && fallback.steps().last().map(|step| step.tool.as_str()) == Some("summarise");
    checks.push(SmokeCheck {
        name: "fallback_plan",
        status: if fallback_ok { SmokeStatus::Pass } else { SmokeStatus::Fail },
        elapsed_ms: fallback_started.elapsed().as_millis() as u64,
        message: if fallback_ok {
            format!("built a {}-step fallback plan", fallback.len())
        } else {
            "fallback plan missing its parse-then-summarise shape".to_string()
        },
    });

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "plan_execution",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("batch_retry"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let execution_started = Instant::now();
    let executor = PlanExecutor::new(demo_registry());
    let report = runtime.block_on(executor.execute(&plan, &email));
    let execution_ok = report.succeeded();
    checks.push(SmokeCheck {
        name: "plan_execution",
        status: if execution_ok { SmokeStatus::Pass } else { SmokeStatus::Fail },
        elapsed_ms: execution_started.elapsed().as_millis() as u64,
        message: if execution_ok {
            format!(
                "executed {} step(s) into {} record(s)",
                plan.len(),
                report.records.len()
            )
        } else {
            format!(
                "plan execution failed (aborted: {}, records: {})",
                report.aborted,
                report.records.len()
            )
        },
    });

    let batch_started = Instant::now();
    let chunk_count = split_text(BATCH_SMOKE_TEXT, BATCH_SMOKE_LIMIT).len() as u32;
    let calls = Arc::new(AtomicU32::new(0));
    // The production backoff is capped here so a smoke run stays fast.
    let base_delay = Duration::from_millis(config.engine.retry_base_delay_ms.min(25));
    let attempts = config.engine.tool_retry_attempts;
    let batch_result: Result<String> = runtime.block_on(async {
        process_in_batches(
            BATCH_SMOKE_TEXT,
            BATCH_SMOKE_LIMIT,
            |chunk| {
                let calls = Arc::clone(&calls);
                async move {
                    with_retry(
                        || {
                            let calls = Arc::clone(&calls);
                            let chunk = chunk.clone();
                            async move {
                                if calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                                    Err(anyhow!("503 service unavailable"))
                                } else {
                                    Ok(chunk)
                                }
                            }
                        },
                        attempts,
                        base_delay,
                    )
                    .await
                }
            },
            concat_combiner,
        )
        .await
    });
    let total_calls = calls.load(Ordering::SeqCst);
    match batch_result {
        Ok(reassembled) if reassembled == BATCH_SMOKE_TEXT => checks.push(SmokeCheck {
            name: "batch_retry",
            status: SmokeStatus::Pass,
            elapsed_ms: batch_started.elapsed().as_millis() as u64,
            message: format!(
                "reassembled {} chunk(s) losslessly after {} retried call(s)",
                chunk_count,
                total_calls.saturating_sub(chunk_count)
            ),
        }),
        Ok(reassembled) => checks.push(SmokeCheck {
            name: "batch_retry",
            status: SmokeStatus::Fail,
            elapsed_ms: batch_started.elapsed().as_millis() as u64,
            message: format!(
                "chunks reassembled to {} chars, expected {}",
                reassembled.chars().count(),
                BATCH_SMOKE_TEXT.chars().count()
            ),
        }),
        Err(error) => checks.push(SmokeCheck {
            name: "batch_retry",
            status: SmokeStatus::Fail,
            elapsed_ms: batch_started.elapsed().as_millis() as u64,
            message: format!("batched processing failed: {error:#}"),
        }),
    }

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due to previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}

fn demo_email() -> EmailMessage {
    EmailMessage {
        message_id: "smoke-demo".to_string(),
        from: "smoke@mailey.dev".to_string(),
        subject: "Smoke invoice".to_string(),
        body: "Attached invoice for the smoke run. Please process it.".to_string(),
        received_at: Utc::now(),
        attachments: vec![Attachment {
            id: "att-demo".to_string(),
            name: "invoice.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            content: None,
            file_id: Some("file-demo-1".to_string()),
        }],
    }
}

fn demo_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(DemoParse);
    registry.register(DemoRecord);
    registry.register(DemoSummarise);
    registry
}

struct DemoParse;

#[async_trait]
impl Tool for DemoParse {
    fn name(&self) -> &'static str {
        "parse"
    }

    fn description(&self) -> &'static str {
        "demo parser returning fixed extracted data"
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let file = params["fileId"].as_str().context("fileId param missing")?;
        Ok(json!({
            "success": true,
            "sourceFile": file,
            "extractedData": {
                "vendor": "Acme Demo Ltd",
                "lineItems": ["laptop-16", "dock-pro"]
            }
        }))
    }
}

struct DemoRecord;

#[async_trait]
impl Tool for DemoRecord {
    fn name(&self) -> &'static str {
        "record"
    }

    fn description(&self) -> &'static str {
        "demo recorder echoing its payload"
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        Ok(params)
    }
}

struct DemoSummarise;

#[async_trait]
impl Tool for DemoSummarise {
    fn name(&self) -> &'static str {
        "summarise"
    }

    fn description(&self) -> &'static str {
        "demo summariser counting characters"
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let text = params["text"].as_str().context("text param missing")?;
        Ok(json!({
            "success": true,
            "summary": format!("{} chars summarised", text.chars().count())
        }))
    }
}
