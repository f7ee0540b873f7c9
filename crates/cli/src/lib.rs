pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::policy::PolicyFlags;

#[derive(Debug, Parser)]
#[command(
    name = "actgate",
    about = "Actgate operator CLI",
    long_about = "Operate the action confirmation pipeline: migrations, readiness, config inspection, tokens, expiry and team policy.",
    after_help = "Examples:\n  actgate doctor --json\n  actgate token user-42\n  actgate policy team-ops --allow-sms false\n  actgate member user-42 team-ops"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, service gateway mode, DB connectivity and schema version")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Issue a bearer token for a user with the configured secret")]
    Token { user_id: String },
    #[command(about = "Run one expiry pass: expire overdue actions and purge old resolved rows")]
    Sweep,
    #[command(about = "Create or update a team's capability policy")]
    Policy {
        team_id: String,
        #[arg(long, value_name = "BOOL", help = "Allow send_email for team members")]
        allow_email: Option<bool>,
        #[arg(long, value_name = "BOOL", help = "Allow send_sms for team members")]
        allow_sms: Option<bool>,
        #[arg(long, value_name = "BOOL", help = "Allow make_voice_call for team members")]
        allow_voice: Option<bool>,
    },
    #[command(about = "Assign a user to a team")]
    Member { user_id: String, team_id: String },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Token { user_id } => commands::token::run(&user_id),
        Command::Sweep => commands::sweep::run(),
        Command::Policy { team_id, allow_email, allow_sms, allow_voice } => {
            commands::policy::run(&team_id, PolicyFlags { allow_email, allow_sms, allow_voice })
        }
        Command::Member { user_id, team_id } => commands::policy::assign_member(&user_id, &team_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
