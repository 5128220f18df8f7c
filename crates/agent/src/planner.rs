//! Turns one email into a runnable [`Plan`]. The model is asked for a JSON
//! step array; an LLM error or unusable reply degrades to the deterministic
//! fallback, as does a plan over the step limit, so callers always get work
//! back.

use mailey_core::domain::email::EmailMessage;
use mailey_core::domain::plan::{Plan, PlanSource};
use mailey_core::parser::{build_fallback_plan, parse_plan};

use crate::llm::LlmClient;

pub struct Planner<L> {
    llm: L,
    max_plan_steps: usize,
}

impl<L: LlmClient> Planner<L> {
    pub fn new(llm: L, max_plan_steps: usize) -> Self {
        Self { llm, max_plan_steps: max_plan_steps.max(1) }
    }

    pub async fn plan(&self, email: &EmailMessage, tool_catalog: &str) -> Plan {
        let prompt = build_planning_prompt(email, tool_catalog);
        let reply = match self.llm.complete(&prompt).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(
                    event_name = "planner.llm_failed",
                    message_id = %email.message_id,
                    error = %format!("{error:#}"),
                    "planning request failed, using the fallback plan"
                );
                return build_fallback_plan(email);
            }
        };

        let plan = parse_plan(&reply, email);
        if plan.source() == PlanSource::Model && plan.len() > self.max_plan_steps {
            tracing::warn!(
                event_name = "planner.plan_too_long",
                message_id = %email.message_id,
                step_count = plan.len(),
                max_plan_steps = self.max_plan_steps,
                "model plan exceeds the step limit, using the fallback plan"
            );
            return build_fallback_plan(email);
        }
        plan
    }
}

/// Renders the planning prompt: instructions, the tool catalog and the
/// email itself. Quoted history is stripped from the body so the model
/// plans against the newest message only.
pub fn build_planning_prompt(email: &EmailMessage, tool_catalog: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You plan email processing. Reply with a JSON array of steps and nothing else.\n",
    );
    prompt.push_str(
        "Each step is {\"tool\": string, \"params\": object} with optional \"description\" \
         (string), \"critical\" (bool) and \"foreach\" (string).\n",
    );
    prompt.push_str(
        "Use {step_N.field} to reference the output of step N and {item} for the current \
         foreach item.\n",
    );
    prompt.push_str("\nAvailable tools:\n");
    prompt.push_str(tool_catalog);
    prompt.push_str(&format!(
        "\n\nEmail:\nFrom: {}\nSubject: {}\n",
        email.from, email.subject
    ));
    if email.attachments.is_empty() {
        prompt.push_str("Attachments: none\n");
    } else {
        prompt.push_str("Attachments:\n");
        for attachment in &email.attachments {
            prompt.push_str(&format!(
                "- {} ({}, id: {})\n",
                attachment.name, attachment.mime_type, attachment.id
            ));
        }
    }
    prompt.push_str(&format!("\nBody:\n{}\n", email.top_level_body()));
    prompt
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use mailey_core::domain::email::Attachment;
    use serde_json::json;

    use super::*;

    struct ScriptedLlm(Result<String, String>);

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            match &self.0 {
                Ok(reply) => Ok(reply.clone()),
                Err(message) => Err(anyhow!(message.clone())),
            }
        }
    }

    #[tokio::test]
    async fn usable_reply_becomes_a_model_plan() {
        let reply = r#"[{"tool": "parse", "params": {"fileId": "att-1"}}]"#.to_string();
        let planner = Planner::new(ScriptedLlm(Ok(reply)), 20);
        let plan = planner.plan(&email(), "- parse: parses documents").await;
        assert_eq!(plan.source(), PlanSource::Model);
        assert_eq!(plan.steps()[0].params["fileId"], json!("att-1"));
    }

    #[tokio::test]
    async fn llm_error_degrades_to_fallback() {
        let planner = Planner::new(ScriptedLlm(Err("connection refused".to_string())), 20);
        let plan = planner.plan(&email(), "- parse: parses documents").await;
        assert_eq!(plan.source(), PlanSource::Fallback);
        assert_eq!(plan.steps()[0].tool, "parse");
        assert_eq!(plan.steps()[0].params["fileId"], json!("att-1"));
    }

    #[tokio::test]
    async fn unusable_reply_degrades_to_fallback() {
        let planner = Planner::new(ScriptedLlm(Ok("no steps today".to_string())), 20);
        let plan = planner.plan(&email(), "").await;
        assert_eq!(plan.source(), PlanSource::Fallback);
    }

    #[tokio::test]
    async fn oversized_model_plan_degrades_to_fallback() {
        let reply = r#"[
  {"tool": "parse", "params": {}},
  {"tool": "parse", "params": {}},
  {"tool": "summarise", "params": {}}
]"#
        .to_string();
        let planner = Planner::new(ScriptedLlm(Ok(reply)), 2);
        let plan = planner.plan(&email(), "").await;
        assert_eq!(plan.source(), PlanSource::Fallback);
    }

    #[test]
    fn prompt_carries_catalog_attachments_and_top_level_body() {
        let mut email = email();
        email.body = "Please process.\n\n> quoted history".to_string();
        let prompt = build_planning_prompt(&email, "- parse: parses documents");
        assert!(prompt.contains("- parse: parses documents"));
        assert!(prompt.contains("Subject: Invoices attached"));
        assert!(prompt.contains("- invoice.pdf (application/pdf, id: att-1)"));
        assert!(prompt.contains("Please process."));
        assert!(!prompt.contains("quoted history"));
    }

    fn email() -> EmailMessage {
        EmailMessage {
            message_id: "msg-plan".to_string(),
            from: "billing@example.com".to_string(),
            subject: "Invoices attached".to_string(),
            body: "Please process the attached invoice.".to_string(),
            received_at: "2025-06-03T09:30:00Z".parse().expect("timestamp"),
            attachments: vec![Attachment {
                id: "att-1".to_string(),
                name: "invoice.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                content: None,
                file_id: Some("file-1".to_string()),
            }],
        }
    }
}
