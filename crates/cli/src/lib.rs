pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use deskflow_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "deskflow",
    about = "Deskflow operator CLI",
    long_about = "Operate the deskflow ticket approval workflow: migrations, demo seeds, \
                  and approval decisions.",
    after_help = "Examples:\n  deskflow migrate\n  deskflow seed\n  deskflow pending --user bob"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset")]
    Seed,
    #[command(about = "Show a ticket together with its approval state")]
    Show {
        #[arg(long, help = "Ticket identifier")]
        ticket: String,
    },
    #[command(about = "Start the approval workflow for an open ticket")]
    Initiate {
        #[arg(long, help = "Ticket identifier")]
        ticket: String,
    },
    #[command(about = "List pending approvals the given user may decide")]
    Pending {
        #[arg(long, help = "Acting user identifier")]
        user: String,
    },
    #[command(about = "Approve a pending approval record")]
    Approve {
        #[arg(long, help = "Approval record identifier")]
        record: String,
        #[arg(long, help = "Acting user identifier")]
        user: String,
        #[arg(long, help = "Optional decision comments")]
        comments: Option<String>,
        #[arg(long, help = "Route the ticket to this team on final approval")]
        route_to: Option<String>,
    },
    #[command(about = "Reject a pending approval record; comments are required")]
    Reject {
        #[arg(long, help = "Approval record identifier")]
        record: String,
        #[arg(long, help = "Acting user identifier")]
        user: String,
        #[arg(long, help = "Reason shown to the requester")]
        comments: String,
    },
    #[command(about = "Resubmit a cancelled ticket for a fresh approval pass")]
    Resubmit {
        #[arg(long, help = "Ticket identifier")]
        ticket: String,
        #[arg(long, help = "Acting user identifier")]
        user: String,
    },
}

fn init_logging(config: &AppConfig) {
    use deskflow_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Config problems are reported as structured output by the command
    // itself; here a failed load only means logging stays uninitialized.
    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Show { ticket } => commands::workflow::show(ticket),
        Command::Initiate { ticket } => commands::workflow::initiate(ticket),
        Command::Pending { user } => commands::workflow::pending(user),
        Command::Approve { record, user, comments, route_to } => {
            commands::workflow::approve(record, user, comments, route_to)
        }
        Command::Reject { record, user, comments } => {
            commands::workflow::reject(record, user, comments)
        }
        Command::Resubmit { ticket, user } => commands::workflow::resubmit(ticket, user),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
