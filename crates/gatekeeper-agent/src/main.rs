//! gatekeeper-agent - issues short-lived database credentials on demand.
//!
//! This binary wires the PostgreSQL provider and audit sink to the
//! orchestrator and exposes the operational surface:
//! - `bootstrap` / `validate` - install and check the target-database schema
//! - `run-job` - handle one JSON job from a file or stdin
//! - `cleanup` - reclaim expired logins
//! - `health` - provider health, mapped to ok/degraded/down

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use tracing::{error, info};
use uuid::Uuid;

use gatekeeper_agent::config::{load_config, load_config_from_str};
use gatekeeper_agent::{AgentError, Config, Orchestrator, Result};
use gatekeeper_contracts::{Job, JobKind};
use gatekeeper_postgres::{PgAuditSink, PostgresProvider, PostgresProviderSettings};
use gatekeeper_providers::{DatabaseEngine, MySqlProvider, ProviderRegistry, SqlServerProvider};

#[derive(Parser)]
#[command(name = "gatekeeper-agent")]
#[command(version)]
#[command(about = "Issues short-lived database credentials on demand")]
struct Cli {
    /// Path to configuration file (env-only configuration when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose/debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install the bootstrap schema into the target database
    Bootstrap {
        /// Installer connection string (a principal allowed to create roles)
        #[arg(long)]
        dsn: String,

        /// Set this password on the gatekeeper_admin principal
        #[arg(long)]
        admin_password: Option<String>,
    },

    /// Run the bootstrap self-checks and report each one
    Validate {
        /// Connection string to check with
        #[arg(long)]
        dsn: String,
    },

    /// Handle one JSON job and print its result
    RunJob {
        /// Read the job payload from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Drop every login expired for longer than the grace period
    Cleanup {
        /// Grace period in minutes
        #[arg(long, default_value_t = 5)]
        older_than: u32,
    },

    /// Report provider health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: --verbose flag, then RUST_LOG env var, then default "info"
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    };
    tracing_subscriber::fmt().with_env_filter(&log_level).init();

    match cli.command {
        Command::Bootstrap { dsn, admin_password } => {
            let pool = installer_pool(&dsn).await?;
            gatekeeper_postgres::install(&pool, admin_password.as_deref())
                .await
                .map_err(|e| AgentError::Internal(e.to_string()))?;
            info!("bootstrap installed");
            pool.close().await;
        }

        Command::Validate { dsn } => {
            let pool = installer_pool(&dsn).await?;
            let checks = gatekeeper_postgres::validate_setup(&pool)
                .await
                .map_err(|e| AgentError::Internal(e.to_string()))?;
            pool.close().await;

            let mut failed = false;
            for check in &checks {
                println!("{:<28} {:<8} {}", check.check_name, check.status, check.details);
                failed |= !check.is_ok();
            }
            if failed {
                return Err(AgentError::Config("setup validation failed".to_string()));
            }
        }

        Command::RunJob { file } => {
            let payload = match file {
                Some(path) => std::fs::read_to_string(path)?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };

            let orchestrator = build_orchestrator(load_agent_config(cli.config.as_deref())?).await?;
            let outcome = orchestrator.handle_json(&payload).await;
            orchestrator.shutdown().await;

            match outcome {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(e) => {
                    error!("job rejected: {}", e);
                    return Err(AgentError::Validation(e));
                }
            }
        }

        Command::Cleanup { older_than } => {
            let orchestrator = build_orchestrator(load_agent_config(cli.config.as_deref())?).await?;
            let job = Job {
                id: format!("cli-cleanup-{}", Uuid::new_v4().simple()),
                correlation_id: Uuid::new_v4(),
                kind: JobKind::Cleanup {
                    older_than_minutes: older_than,
                },
            };
            let result = orchestrator.handle_job(job).await;
            orchestrator.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Command::Health => {
            let orchestrator = build_orchestrator(load_agent_config(cli.config.as_deref())?).await?;
            let health = orchestrator.health().await;
            orchestrator.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
    }

    Ok(())
}

fn load_agent_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let config = load_config(path)?;
            info!("loaded configuration from {:?}", path);
            Ok(config)
        }
        // env-only startup: defaults below are overridden by GATEKEEPER_* vars
        None => load_config_from_str(
            "database:\n  host: localhost\n  database: postgres\n",
        ),
    }
}

fn admin_connect_options(config: &Config) -> PgConnectOptions {
    let ssl_mode = match config.database.ssl_mode.as_str() {
        "require" => PgSslMode::Require,
        "disable" => PgSslMode::Disable,
        _ => PgSslMode::Prefer,
    };
    PgConnectOptions::new()
        .host(&config.database.host)
        .port(config.database.port)
        .database(&config.database.database)
        .username(&config.database.admin_user)
        .password(&config.database.admin_password)
        .ssl_mode(ssl_mode)
}

async fn installer_pool(dsn: &str) -> Result<sqlx::PgPool> {
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(dsn)
        .await
        .map_err(|e| AgentError::Config(format!("installer connection failed: {}", e)))
}

async fn build_orchestrator(config: Config) -> Result<Orchestrator> {
    let registry = ProviderRegistry::global();

    let settings = PostgresProviderSettings {
        max_connections: config.pool.max_connections,
        idle_timeout: Duration::from_secs(config.pool.idle_timeout_secs),
        connect_timeout: Duration::from_secs(config.pool.connect_timeout_secs),
        statement_timeout: Duration::from_secs(config.pool.statement_timeout_secs),
        query_timeout: Duration::from_secs(config.pool.query_timeout_secs),
    };
    registry.register(DatabaseEngine::Postgres, move || {
        Arc::new(PostgresProvider::with_settings(settings.clone()))
    });
    registry.register(DatabaseEngine::MySql, || Arc::new(MySqlProvider::new()));
    registry.register(DatabaseEngine::SqlServer, || Arc::new(SqlServerProvider::new()));

    let provider = registry.create(config.engine())?;

    // the audit sink keeps its own small admin pool; audit writes must not
    // compete with provisioning for provider connections
    let audit_pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(config.pool.connect_timeout_secs))
        .connect_with(admin_connect_options(&config))
        .await
        .map_err(|e| AgentError::Config(format!("audit pool open failed: {}", e)))?;
    let audit = Arc::new(PgAuditSink::new(audit_pool));

    Ok(Orchestrator::new(config, provider, audit))
}
