use std::fs;
use std::path::Path;

use mailey_core::domain::email::EmailMessage;
use mailey_core::domain::plan::Plan;
use mailey_core::parser::{build_fallback_plan, parse_plan};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct PlanReport {
    command: &'static str,
    status: &'static str,
    message_id: String,
    plan: Plan,
}

/// Builds the plan for one stored email. With `--llm-output` the saved
/// model reply is parsed exactly like in the live pipeline; without it the
/// deterministic fallback plan is built directly.
pub fn run(email_path: &Path, llm_output_path: Option<&Path>) -> CommandResult {
    let raw = match fs::read_to_string(email_path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "plan",
                "io",
                format!("failed to read {}: {error}", email_path.display()),
                2,
            )
        }
    };
    let email: EmailMessage = match serde_json::from_str(&raw) {
        Ok(email) => email,
        Err(error) => {
            return CommandResult::failure(
                "plan",
                "email_parse",
                format!("invalid email JSON: {error}"),
                2,
            )
        }
    };
    if let Err(error) = email.validate() {
        return CommandResult::failure("plan", "email_validation", error.to_string(), 2);
    }

    let plan = match llm_output_path {
        Some(path) => match fs::read_to_string(path) {
            Ok(reply) => parse_plan(&reply, &email),
            Err(error) => {
                return CommandResult::failure(
                    "plan",
                    "io",
                    format!("failed to read {}: {error}", path.display()),
                    2,
                )
            }
        },
        None => build_fallback_plan(&email),
    };

    let human = format!(
        "plan: {} step(s) from {} source for message {}",
        plan.len(),
        plan.source().as_str(),
        email.message_id
    );
    let report = PlanReport {
        command: "plan",
        status: "ok",
        message_id: email.message_id.clone(),
        plan,
    };
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"plan\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: 0, output: format!("{human}\n{machine}") }
}
