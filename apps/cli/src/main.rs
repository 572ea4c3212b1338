//! # shopsync
//!
//! Marketplace stock reconciliation from the command line.
//!
//! ```text
//! shopsync sync [--readonly]       cleanup + reconciliation batch
//! shopsync cleanup                 prune models gone from the default shop
//! shopsync lazada-reauth --token   exchange a Lazada auth code for tokens
//! shopsync tiktok-reauth --token   exchange a TikTok auth code for tokens
//! shopsync chkconfig               enabled marketplaces + token summary
//! ```
//!
//! Exit codes: `0` success, `1` configuration error, `2` store error,
//! `3` unrecoverable communication error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shopsync_engine::{AppConfig, BatchCoordinator, EngineResult};

/// Marketplace stock reconciliation.
#[derive(Debug, Parser)]
#[command(name = "shopsync", version, about)]
struct Cli {
    /// Path of the config file (falls back to $CONFIG_PATH).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run cleanup and reconcile product quantities between marketplaces.
    Sync {
        /// Observe and record deltas without writing anywhere.
        #[arg(long)]
        readonly: bool,
    },

    /// Prune local inventory of models the default marketplace dropped.
    Cleanup,

    /// Exchange a Lazada authorization code for OAuth2 tokens.
    LazadaReauth {
        /// Authorization code from the Lazada consent screen.
        #[arg(long)]
        token: String,
    },

    /// Exchange a TikTok authorization code for OAuth2 tokens.
    TiktokReauth {
        /// Authorization code from the TikTok consent screen.
        #[arg(long)]
        token: String,
    },

    /// Dump enabled marketplaces and the stored OAuth2 token summary.
    Chkconfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = AppConfig::resolve_path(cli.config.clone());
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %config_path.display(), error = %e, "Cannot load configuration");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(command: Command, config: AppConfig) -> EngineResult<()> {
    let coordinator = BatchCoordinator::new(config);

    match command {
        Command::Sync { readonly } => {
            let report = coordinator.run_sync(readonly).await?;
            info!(
                batch_id = report.batch_id,
                models = report.models_seen,
                skipped = report.models_skipped,
                writes = report.writes_attempted,
                failed = report.writes_failed,
                "Sync complete"
            );
        }

        Command::Cleanup => {
            let deleted = coordinator.run_cleanup().await?;
            info!(pruned = deleted.len(), "Cleanup complete");
            for model in deleted {
                info!(model = %model, "Pruned");
            }
        }

        Command::LazadaReauth { token } => {
            coordinator.reauth_lazada(&token).await?;
            info!("Lazada OAuth2 tokens stored");
        }

        Command::TiktokReauth { token } => {
            coordinator.reauth_tiktok(&token).await?;
            info!("TikTok OAuth2 tokens stored");
        }

        Command::Chkconfig => {
            let summary = coordinator.check_config().await?;
            info!(default_system = %summary.default_system, "Default system");
            for system in &summary.enabled {
                info!(system = %system, "Enabled");
            }
            for token in &summary.tokens {
                info!(
                    system = %token.system,
                    created_on = %token.created_on,
                    expires_on = %token.expires_on,
                    "OAuth2 tokens"
                );
            }
        }
    }

    Ok(())
}
