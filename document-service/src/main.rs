//! DocShare operations CLI
//!
//! Inspects and edits document grants directly in the configured tuple store.
//!
//! Usage:
//!   docshare --config docshare.toml check --user alice --document doc1 --permission read
//!
//! With the default in-memory backend every invocation starts from an empty
//! store; point `DOCSHARE__STORAGE__BACKEND=postgres` at a database for
//! anything beyond a dry run.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use document_authz::{ObjectRef, PermissionKind, Relation, RelationGraph, Subject};
use document_service::{
    build_facade, connect_postgres, LoggingConfig, ServiceConfig, StorageBackend,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// DocShare authorization operations
#[derive(Parser, Debug)]
#[command(name = "docshare")]
#[command(about = "Inspect and manage document permissions")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DOCSHARE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the authorization model as JSON
    Model,

    /// Create the tuple table (postgres backend only)
    Migrate,

    /// Record a user as owner of a document
    GrantOwner {
        #[arg(long)]
        user: Subject,
        #[arg(long)]
        document: ObjectRef,
    },

    /// Share a document for reading or writing
    Share {
        #[arg(long)]
        user: Subject,
        #[arg(long)]
        document: ObjectRef,
        #[arg(long)]
        permission: PermissionKind,
    },

    /// Withdraw a share
    Revoke {
        #[arg(long)]
        user: Subject,
        #[arg(long)]
        document: ObjectRef,
        #[arg(long)]
        permission: PermissionKind,
    },

    /// Remove every grant on a document
    RevokeAll {
        #[arg(long)]
        document: ObjectRef,
    },

    /// Check a permission; exits with status 1 when denied
    Check {
        #[arg(long)]
        user: Subject,
        #[arg(long)]
        document: ObjectRef,
        #[arg(long)]
        permission: PermissionKind,
    },

    /// List every user satisfying a relation on a document
    Expand {
        #[arg(long)]
        document: ObjectRef,
        #[arg(long)]
        relation: Relation,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config =
        ServiceConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_tracing(&config.logging)?;

    if config.storage.backend == StorageBackend::Memory && !matches!(cli.command, Command::Model) {
        warn!("In-memory tuple store: changes are discarded when the command exits");
    }

    match cli.command {
        Command::Model => {
            println!("{}", serde_json::to_string_pretty(&RelationGraph::authorization_model())?);
        }
        Command::Migrate => {
            if config.storage.backend != StorageBackend::Postgres {
                bail!("migrate requires storage.backend = postgres");
            }
            let store = connect_postgres(&config.storage).await?;
            store.ensure_schema().await?;
            info!("Migration complete");
        }
        command => return run_permission_command(&config, command).await,
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_permission_command(
    config: &ServiceConfig,
    command: Command,
) -> anyhow::Result<ExitCode> {
    let facade = build_facade(config).await?;

    match command {
        Command::GrantOwner { user, document } => {
            facade.grant_ownership(&user, &document).await?;
            println!("{user} owner {document}");
        }
        Command::Share { user, document, permission } => {
            facade.share_with(&user, &document, permission).await?;
            println!("{user} {} {document}", permission.relation());
        }
        Command::Revoke { user, document, permission } => {
            facade.revoke(&user, &document, permission).await?;
            println!("revoked {permission} for {user} on {document}");
        }
        Command::RevokeAll { document } => {
            facade.revoke_all(&document).await?;
            println!("revoked every grant on {document}");
        }
        Command::Check { user, document, permission } => {
            let decision = facade.check_permission(&user, &document, permission).await;
            if let Some(fault) = decision.fault() {
                eprintln!("check failed closed: {fault}");
            }
            println!("{}", if decision.is_allowed() { "allowed" } else { "denied" });
            if !decision.is_allowed() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Expand { document, relation } => {
            for subject in facade.engine().expand(&document, relation).await? {
                println!("{subject}");
            }
        }
        Command::Model | Command::Migrate => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "docshare={level},document_service={level},document_authz={level},sqlx=warn",
            level = config.level
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json {
        // Structured JSON logging for production
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}
