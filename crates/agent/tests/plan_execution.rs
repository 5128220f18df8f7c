//! Integration tests for plan execution
//!
//! These tests drive whole plans through the executor with in-memory tools:
//! - Template chaining and attachment binding across steps
//! - Dependency skips and critical aborts mid-plan
//! - Fan-out child naming, aggregation and later addressing
//! - A tool that batches long input and retries transient failures
//! - The planner degrading to the fallback plan when the LLM is down

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use mailey_agent::executor::{PlanExecutor, DEPENDENCY_FAILURE_ERROR};
use mailey_agent::llm::LlmClient;
use mailey_agent::planner::Planner;
use mailey_agent::retry::with_retry;
use mailey_agent::tools::{Tool, ToolRegistry};
use mailey_core::batch::{concat_combiner, process_in_batches};
use mailey_core::domain::email::{encode_content, Attachment, EmailMessage};
use mailey_core::domain::plan::{Plan, PlanSource, Step};

/// Pretends to parse a stored document. Unknown files error like a storage
/// miss would.
struct ParseTool;

#[async_trait]
impl Tool for ParseTool {
    fn name(&self) -> &'static str {
        "parse"
    }

    fn description(&self) -> &'static str {
        "extracts structured data from a stored document"
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let file = params["fileId"].as_str().context("fileId param missing")?;
        if file.starts_with("missing") {
            return Err(anyhow!("no stored file {file}"));
        }
        Ok(json!({
            "success": true,
            "sourceFile": file,
            "extractedData": {
                "vendor": "Acme Ltd",
                "total": 1288.5,
                "lineItems": ["laptop", "dock"]
            }
        }))
    }
}

struct SummariseTool;

#[async_trait]
impl Tool for SummariseTool {
    fn name(&self) -> &'static str {
        "summarise"
    }

    fn description(&self) -> &'static str {
        "summarises a block of text"
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let text = params["text"].as_str().context("text param missing")?;
        Ok(json!({
            "success": true,
            "summary": format!("{} chars summarised", text.chars().count())
        }))
    }
}

/// Echoes its params back, like a write-side tool acknowledging a payload.
struct RecordTool;

#[async_trait]
impl Tool for RecordTool {
    fn name(&self) -> &'static str {
        "record"
    }

    fn description(&self) -> &'static str {
        "records a payload and echoes it"
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        Ok(params)
    }
}

/// Uppercases text in bounded chunks. Every chunk's first call fails with a
/// transient status so the retry wrapper has real work to do.
struct TranslateTool {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Tool for TranslateTool {
    fn name(&self) -> &'static str {
        "translate"
    }

    fn description(&self) -> &'static str {
        "translates text chunk by chunk"
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let text = params["text"].as_str().context("text param missing")?.to_string();
        let calls = Arc::clone(&self.calls);
        let translated = process_in_batches(
            &text,
            12,
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
                                    Ok(chunk.to_uppercase())
                                }
                            }
                        },
                        3,
                        Duration::from_millis(1),
                    )
                    .await
                }
            },
            concat_combiner,
        )
        .await?;
        Ok(json!({"success": true, "translated": translated}))
    }
}

struct DownLlm;

#[async_trait]
impl LlmClient for DownLlm {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("connection refused"))
    }
}

#[tokio::test]
async fn plan_chains_results_and_binds_attachments() {
    let executor = executor();
    let plan = Plan::from_model(vec![
        step("parse", json!({"fileId": "invoice.pdf"})),
        step(
            "record",
            json!({
                "note": "Vendor {step_1.vendor} owes {step_1.total}",
                "doc": "{step_1.sourceFile}"
            }),
        ),
    ]);

    let report = executor.execute(&plan, &email()).await;

    assert!(report.succeeded());
    // The filename param was swapped for the attachment's storage id before
    // the tool ever saw it.
    assert_eq!(
        report.records[0].result.field("sourceFile"),
        Some(&json!("file-inv-1"))
    );
    let record = &report.records[1].result;
    assert_eq!(record.field("note"), Some(&json!("Vendor Acme Ltd owes 1288.5")));
    assert_eq!(record.field("doc"), Some(&json!("file-inv-1")));
}

#[tokio::test]
async fn inline_attachment_rides_along_as_content_params() {
    let executor = executor();
    let mut email = email();
    email.attachments.push(Attachment {
        id: "att-rcpt".to_string(),
        name: "receipt.png".to_string(),
        mime_type: "image/png".to_string(),
        content: Some(b"PNGBYTES".to_vec()),
        file_id: None,
    });

    let plan = Plan::from_model(vec![step("record", json!({"file": "receipt.png"}))]);
    let report = executor.execute(&plan, &email).await;

    let record = &report.records[0].result;
    assert_eq!(record.field("file"), Some(&json!("att-rcpt")));
    assert_eq!(
        record.field("file_content"),
        Some(&json!(encode_content(b"PNGBYTES")))
    );
    assert_eq!(record.field("file_filename"), Some(&json!("receipt.png")));
}

#[tokio::test]
async fn fan_out_processes_every_extracted_line_item() {
    let executor = executor();
    let plan = Plan::from_model(vec![
        step("parse", json!({"fileId": "invoice.pdf"})),
        step("record", json!({"sku": "{item}"})).with_foreach("{step_1.lineItems}"),
        step("record", json!({"first": "{step_2.sku}"})),
    ]);

    let report = executor.execute(&plan, &email()).await;

    let steps: Vec<&str> = report.records.iter().map(|r| r.step.as_str()).collect();
    assert_eq!(steps, vec!["step_1", "2.1", "2.2", "step_2", "step_3"]);

    assert_eq!(report.records[1].result.field("sku"), Some(&json!("laptop")));
    assert_eq!(report.records[2].result.field("sku"), Some(&json!("dock")));

    let aggregate = &report.records[3].result;
    assert!(aggregate.success());
    assert_eq!(aggregate.field("batchCount"), Some(&json!(2)));

    // The parent aggregate unwraps through its first batch entry.
    assert_eq!(report.records[4].result.field("first"), Some(&json!("laptop")));
}

#[tokio::test]
async fn parse_failure_skips_dependents_and_critical_failure_aborts() {
    let executor = executor();
    let plan = Plan::from_model(vec![
        step("parse", json!({"fileId": "missing.xlsx"})),
        step("record", json!({"vendor": "{step_1.vendor}"})),
        step("parse", json!({"fileId": "missing-too.bin"})).with_critical(true),
        step("record", json!({"never": "runs"})),
    ]);

    let report = executor.execute(&plan, &email()).await;

    assert_eq!(report.records.len(), 3, "the step after the abort is never recorded");
    assert!(report.aborted);
    assert!(!report.succeeded());

    let failed = &report.records[0].result;
    assert!(!failed.success());
    assert_eq!(failed.error(), Some("no stored file missing.xlsx"));

    let skipped = &report.records[1].result;
    assert!(skipped.was_skipped());
    assert_eq!(skipped.error(), Some(DEPENDENCY_FAILURE_ERROR));
}

#[tokio::test]
async fn long_text_is_translated_in_batches_with_retries() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = ToolRegistry::default();
    registry.register(TranslateTool { calls: Arc::clone(&calls) });
    let executor = PlanExecutor::new(registry);

    let text = "email triage keeps the humans off the hook.";
    let plan = Plan::from_model(vec![step("translate", json!({"text": text}))]);
    let report = executor.execute(&plan, &email()).await;

    assert!(report.succeeded());
    assert_eq!(
        report.records[0].result.field("translated"),
        Some(&json!(text.to_uppercase()))
    );
    // More calls than chunks means the transient failures really were
    // retried rather than surfaced.
    assert!(calls.load(Ordering::SeqCst) >= 4);
}

#[tokio::test]
async fn fallback_plan_runs_end_to_end_when_the_llm_is_down() {
    let planner = Planner::new(DownLlm, 20);
    let email = email();
    let plan = planner.plan(&email, "- parse: extracts data").await;
    assert_eq!(plan.source(), PlanSource::Fallback);

    let report = executor().execute(&plan, &email).await;
    assert!(report.succeeded());
    assert_eq!(report.plan_source, PlanSource::Fallback);

    // The fallback's attachment id param resolves to the stored file id.
    assert_eq!(
        report.records[0].result.field("sourceFile"),
        Some(&json!("file-inv-1"))
    );
    let summary = report
        .record_for("step_2")
        .expect("summarise record")
        .result
        .field("summary")
        .and_then(Value::as_str)
        .expect("summary text");
    assert!(summary.ends_with("chars summarised"));
}

fn step(tool: &str, params: Value) -> Step {
    Step::new(tool, params.as_object().expect("object params").clone())
}

fn executor() -> PlanExecutor {
    let mut registry = ToolRegistry::default();
    registry.register(ParseTool);
    registry.register(SummariseTool);
    registry.register(RecordTool);
    PlanExecutor::new(registry)
}

fn email() -> EmailMessage {
    EmailMessage {
        message_id: "msg-it-1".to_string(),
        from: "accounts@example.com".to_string(),
        subject: "Invoice for June".to_string(),
        body: "Invoice attached, please process.".to_string(),
        received_at: "2025-06-05T08:15:00Z".parse().expect("timestamp"),
        attachments: vec![Attachment {
            id: "att-inv".to_string(),
            name: "invoice.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            content: None,
            file_id: Some("file-inv-1".to_string()),
        }],
    }
}
