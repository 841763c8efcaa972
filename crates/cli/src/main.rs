//! Insider CLI - Database migrations and license operations.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! insider-cli migrate
//!
//! # Grant a license to an existing account (support, comped seats)
//! insider-cli license grant -e buyer@example.com -t team
//! ```
//!
//! # Environment Variables
//!
//! - `INSIDER_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `INSIDER_TEAM_MAX_SIZE` / `INSIDER_INDIVIDUAL_MAX_SIZE` - Capacity for granted licenses

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "insider-cli")]
#[command(author, version, about = "Insider license backend CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage licenses
    License {
        #[command(subcommand)]
        action: LicenseAction,
    },
}

#[derive(Subcommand)]
enum LicenseAction {
    /// Grant a license to an existing account
    Grant {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// License type (`individual` or `team`)
        #[arg(short = 't', long = "type", default_value = "individual")]
        license_type: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::License { action } => match action {
            LicenseAction::Grant {
                email,
                license_type,
            } => {
                commands::license::grant(&email, &license_type).await?;
            }
        },
    }
    Ok(())
}
