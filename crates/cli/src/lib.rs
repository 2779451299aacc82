pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use closer_core::config::{load_dotenv, AppConfig};
use tracing_subscriber::EnvFilter;

use commands::drive::DriveAction;
use commands::pipeline::{AnalyzeArgs, DeployArgs, EmailArgs, GenerateArgs, PackageArgs, QuickArgs};
use commands::sheets::SheetsAction;
use commands::{CommandResult, GlobalOptions};

#[derive(Debug, Parser)]
#[command(
    name = "closer",
    about = "Closer sales pipeline CLI",
    long_about = "Turn call transcripts into hosted proposals: analyze, generate, deploy, email, and keep Google Sheets and Drive in sync.",
    after_help = "Examples:\n  closer quick --client \"Acme Logistics\" --transcript call.txt\n  closer generate --client-data .tmp/transcripts/acme-logistics_20250601_data.json\n  closer sheets find acme --limit 5\n  closer doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (defaults to closer.toml or config/closer.toml)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Workspace directory for transcripts and proposals")]
    workspace: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Extract proposal data from a transcript with the LLM")]
    Analyze(AnalyzeArgs),
    #[command(about = "Render the HTML proposal from analyzed data or a client name")]
    Generate(GenerateArgs),
    #[command(about = "Publish a proposal to Vercel")]
    Deploy(DeployArgs),
    #[command(about = "Send the branded proposal email through Gmail")]
    Email(EmailArgs),
    #[command(about = "Print copy-and-paste delivery email text for a proposal file")]
    Package(PackageArgs),
    #[command(about = "Analyze, generate, deploy and sync in one step")]
    Quick(QuickArgs),
    #[command(subcommand, about = "Work with the onboarding spreadsheet")]
    Sheets(SheetsAction),
    #[command(subcommand, about = "Work with proposal storage on Google Drive")]
    Drive(DriveAction),
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Check config, workspace, templates and credentials")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    load_dotenv(None);
    let cli = Cli::parse();
    let options = GlobalOptions { config_path: cli.config, workspace: cli.workspace };
    init_logging(&options);

    let result = match cli.command {
        Command::Analyze(args) => commands::pipeline::analyze(&options, args),
        Command::Generate(args) => commands::pipeline::generate(&options, args),
        Command::Deploy(args) => commands::pipeline::deploy(&options, args),
        Command::Email(args) => commands::pipeline::email(&options, args),
        Command::Package(args) => commands::pipeline::package(&options, args),
        Command::Quick(args) => commands::pipeline::quick(&options, args),
        Command::Sheets(action) => commands::sheets::run(&options, action),
        Command::Drive(action) => commands::drive::run(&options, action),
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run(&options) },
        Command::Doctor { json } => {
            let (healthy, output) = commands::doctor::run(&options, json);
            CommandResult { exit_code: if healthy { 0 } else { 1 }, output }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single JSON payload.
fn init_logging(options: &GlobalOptions) {
    let level = options
        .load_config()
        .map(|config| config.logging.level)
        .unwrap_or_else(|_| AppConfig::default().logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
