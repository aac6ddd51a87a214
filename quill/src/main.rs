use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use quill::{
    AuditContext, Quill, QuillConfig, QuillError, SignupRequest, config::DEFAULT_CONFIG_FILE,
};
use tracing_subscriber::EnvFilter;

/// Command line interface for Quill
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "QUILL_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(clap::Subcommand)]
enum Commands {
    /// Create the database schema and upload directories
    InitDb,
    /// Create an account
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "QUILL_USER_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        display_name: Option<String>,
    },
    /// Clear the failed-login counter of an account
    Unlock { username: String },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::Version = cli.command {
        println!("Quill v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = QuillConfig::load(&cli.config)?;
    let quill = Quill::new(config);
    let ctx = AuditContext::system();

    match cli.command {
        Commands::InitDb => {
            quill.init().await?;
            println!("Initialized {}", quill.config().database_url);
        }
        Commands::CreateUser {
            username,
            email,
            password,
            display_name,
        } => {
            let request = SignupRequest {
                username,
                email,
                confirm_password: password.clone(),
                password,
                display_name,
            };
            let account = quill.signup(&request, &ctx).await?;
            println!("{}", serde_json::to_string_pretty(&account)?);
        }
        Commands::Unlock { username } => {
            let was_locked = quill.unlock(&username, &ctx).await.map_err(not_found_hint)?;
            let status = if was_locked { "unlocked" } else { "was not locked" };
            println!("{username}: {status}");
        }
        Commands::Version => {}
    }

    Ok(())
}

fn not_found_hint(e: QuillError) -> Box<dyn std::error::Error> {
    if e.is_not_found() {
        "no account with that username".into()
    } else {
        e.into()
    }
}
