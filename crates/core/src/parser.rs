//! Turns a model reply into a [`Plan`]. Replies are chat text that should
//! contain a JSON array of steps somewhere inside; anything unusable drops
//! to a deterministic fallback plan so execution always has work to do.

use serde_json::{Map, Value};

use crate::domain::email::{EmailMessage, EMAIL_CHAIN_FILENAME};
use crate::domain::plan::{Plan, Step};

/// The fallback summarise step truncates the email body to this many
/// characters.
pub const FALLBACK_SUMMARY_MAX_CHARS: usize = 10_000;

/// Tool targeted by fallback parse steps.
pub const FALLBACK_PARSE_TOOL: &str = "parse";
/// Tool targeted by the fallback summarise step.
pub const FALLBACK_SUMMARISE_TOOL: &str = "summarise";

/// Extracts the step array between the first `[` and the last `]` of the
/// reply. A reply with no array, invalid JSON, an empty array or any
/// malformed element falls back to [`build_fallback_plan`]. Never returns
/// an empty plan.
pub fn parse_plan(llm_text: &str, email: &EmailMessage) -> Plan {
    match extract_steps(llm_text) {
        Some(steps) => {
            tracing::debug!(
                event_name = "plan.parsed",
                message_id = %email.message_id,
                step_count = steps.len()
            );
            Plan::from_model(steps)
        }
        None => {
            tracing::info!(
                event_name = "plan.fallback",
                message_id = %email.message_id,
                "reply had no usable step array"
            );
            build_fallback_plan(email)
        }
    }
}

fn extract_steps(text: &str) -> Option<Vec<Step>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    let steps: Vec<Step> = serde_json::from_str(&text[start..=end]).ok()?;
    if steps.is_empty() {
        return None;
    }
    Some(steps)
}

/// The plan used when the model reply is unusable: one parse step per real
/// attachment (the stored email chain is not a document) followed by a
/// summarise step over the top-level body.
pub fn build_fallback_plan(email: &EmailMessage) -> Plan {
    let mut steps = Vec::new();
    for attachment in &email.attachments {
        if attachment.name == EMAIL_CHAIN_FILENAME {
            continue;
        }
        let mut params = Map::new();
        params.insert("fileId".to_string(), Value::String(attachment.id.clone()));
        steps.push(
            Step::new(FALLBACK_PARSE_TOOL, params)
                .with_description(format!("Parse attachment {}", attachment.name)),
        );
    }
    let mut params = Map::new();
    params.insert(
        "text".to_string(),
        Value::String(truncate_chars(
            &email.top_level_body(),
            FALLBACK_SUMMARY_MAX_CHARS,
        )),
    );
    steps.push(
        Step::new(FALLBACK_SUMMARISE_TOOL, params).with_description("Summarise the email"),
    );
    Plan::fallback(steps)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::email::Attachment;
    use crate::domain::plan::PlanSource;
    use serde_json::json;

    #[test]
    fn parses_step_array_embedded_in_chatter() {
        let reply = r#"Here is my plan:
[
  {"tool": "parse", "params": {"fileId": "att-1"}, "critical": true},
  {"tool": "summarise", "params": {"text": "{step_1.parsedText}"}}
]
Let me know if you need anything else."#;
        let plan = parse_plan(reply, &email(vec![]));
        assert_eq!(plan.source(), PlanSource::Model);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps()[0].tool, "parse");
        assert!(plan.steps()[0].critical);
        assert_eq!(plan.steps()[1].params["text"], json!("{step_1.parsedText}"));
    }

    #[test]
    fn reply_without_array_falls_back() {
        let plan = parse_plan("I could not work out what to do here.", &email(vec![]));
        assert_eq!(plan.source(), PlanSource::Fallback);
    }

    #[test]
    fn invalid_json_falls_back() {
        let plan = parse_plan("[{\"tool\": \"parse\", }]", &email(vec![]));
        assert_eq!(plan.source(), PlanSource::Fallback);
    }

    #[test]
    fn empty_array_falls_back() {
        let plan = parse_plan("Plan: []", &email(vec![]));
        assert_eq!(plan.source(), PlanSource::Fallback);
    }

    #[test]
    fn one_malformed_element_invalidates_the_whole_plan() {
        let reply = r#"[
  {"tool": "parse", "params": {"fileId": "att-1"}},
  {"tool": "summarise"}
]"#;
        let plan = parse_plan(reply, &email(vec![]));
        assert_eq!(plan.source(), PlanSource::Fallback);
    }

    #[test]
    fn brackets_inside_params_do_not_confuse_extraction() {
        let reply = r#"[{"tool": "parse", "params": {"pages": [1, 2, 3]}}]"#;
        let plan = parse_plan(reply, &email(vec![]));
        assert_eq!(plan.source(), PlanSource::Model);
        assert_eq!(plan.steps()[0].params["pages"], json!([1, 2, 3]));
    }

    #[test]
    fn fallback_parses_each_attachment_then_summarises() {
        let plan = build_fallback_plan(&email(vec![
            attachment("att-1", "invoice.pdf"),
            attachment("att-2", "contract.docx"),
        ]));
        assert_eq!(plan.source(), PlanSource::Fallback);
        let tools: Vec<&str> = plan.steps().iter().map(|s| s.tool.as_str()).collect();
        assert_eq!(tools, vec!["parse", "parse", "summarise"]);
        assert_eq!(plan.steps()[0].params["fileId"], json!("att-1"));
        assert_eq!(plan.steps()[1].params["fileId"], json!("att-2"));
    }

    #[test]
    fn fallback_skips_the_stored_email_chain() {
        let plan = build_fallback_plan(&email(vec![
            attachment("att-1", EMAIL_CHAIN_FILENAME),
            attachment("att-2", "invoice.pdf"),
        ]));
        let tools: Vec<&str> = plan.steps().iter().map(|s| s.tool.as_str()).collect();
        assert_eq!(tools, vec!["parse", "summarise"]);
        assert_eq!(plan.steps()[0].params["fileId"], json!("att-2"));
    }

    #[test]
    fn fallback_without_attachments_still_summarises() {
        let plan = build_fallback_plan(&email(vec![]));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps()[0].tool, "summarise");
    }

    #[test]
    fn fallback_summary_uses_top_level_body_only() {
        let mut email = email(vec![]);
        email.body =
            "Handle this today.\n\nOn Mon, 2 Jun 2025 at 10:00, Bo <bo@example.com> wrote:\n> old thread"
                .to_string();
        let plan = build_fallback_plan(&email);
        assert_eq!(plan.steps()[0].params["text"], json!("Handle this today."));
    }

    #[test]
    fn fallback_summary_is_truncated() {
        let mut email = email(vec![]);
        email.body = "a".repeat(FALLBACK_SUMMARY_MAX_CHARS + 500);
        let plan = build_fallback_plan(&email);
        let text = plan.steps()[0].params["text"].as_str().expect("text param");
        assert_eq!(text.chars().count(), FALLBACK_SUMMARY_MAX_CHARS);
    }

    fn attachment(id: &str, name: &str) -> Attachment {
        Attachment {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: "application/octet-stream".to_string(),
            content: None,
            file_id: Some(format!("file-{id}")),
        }
    }

    fn email(attachments: Vec<Attachment>) -> EmailMessage {
        EmailMessage {
            message_id: "msg-1".to_string(),
            from: "sender@example.com".to_string(),
            subject: "Attached documents".to_string(),
            body: "Please review the attached documents.".to_string(),
            received_at: "2025-06-02T08:00:00Z".parse().expect("timestamp"),
            attachments,
        }
    }
}
