// ABOUTME: CLI entry point for lightningd-pg-migrator
// ABOUTME: Parses commands, routes to handlers and maps failures to exit codes

use clap::{Parser, Subcommand};
use lightningd_pg_migrator::commands::{self, MigrateOptions};
use lightningd_pg_migrator::error::exit_code_for;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "lightningd-pg-migrator")]
#[command(about = "Move a lightningd SQLite wallet into PostgreSQL", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every wallet table into PostgreSQL in one transaction
    Migrate {
        /// Path to lightningd.sqlite3
        #[arg(long)]
        sqlite: PathBuf,
        /// Target connection string, as later passed to lightningd --wallet
        #[arg(long)]
        postgres: String,
        /// lightningd executable used to create the target schema
        #[arg(long)]
        lightningd: String,
        /// Path to a TOML file overriding the default checks
        #[arg(long)]
        config: Option<PathBuf>,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
        /// Print the planned actions without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Print the final report (or plan) as JSON on stdout
        #[arg(long)]
        output_json: bool,
        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },
    /// Check both stores are ready for migration without writing anything
    Validate {
        #[arg(long)]
        sqlite: PathBuf,
        #[arg(long)]
        postgres: String,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Compare per-table row counts after a migration
    Verify {
        #[arg(long)]
        sqlite: PathBuf,
        #[arg(long)]
        postgres: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Migrate {
            sqlite,
            postgres,
            lightningd,
            config,
            yes,
            dry_run,
            output_json,
            quiet,
        } => {
            commands::migrate(MigrateOptions {
                sqlite_path: sqlite,
                postgres_url: postgres,
                lightningd,
                config_path: config,
                yes,
                dry_run,
                output_json,
                quiet,
            })
            .await
        }
        Commands::Validate {
            sqlite,
            postgres,
            config,
        } => commands::validate(&sqlite, &postgres, config).await,
        Commands::Verify { sqlite, postgres } => commands::verify(&sqlite, &postgres).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}
