pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "mailey",
    about = "Mailey operator CLI",
    long_about = "Operate the mailey plan engine: build plans from stored emails, inspect configuration, and run smoke validation.",
    after_help = "Examples:\n  mailey plan --email email.json\n  mailey plan --email email.json --llm-output reply.txt\n  mailey config\n  mailey smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Build the execution plan for an email file and print it")]
    Plan {
        #[arg(long, help = "Path to the email JSON file")]
        email: PathBuf,
        #[arg(long, help = "Path to a saved model reply; omit to build the fallback plan")]
        llm_output: Option<PathBuf>,
    },
    #[command(about = "Run an embedded plan end-to-end against built-in tools with per-check timing")]
    Smoke,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Plan { email, llm_output } => {
            commands::plan::run(&email, llm_output.as_deref())
        }
        Command::Smoke => commands::smoke::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
