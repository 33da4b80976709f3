//! # Authorization admin CLI
//!
//! Inspects and edits assignments and runs access checks against the
//! hierarchy file and assignment database named in the configuration.
//!
//! ## Configuration
//!
//! - `AUTHZ_CONFIG` - path to the TOML configuration file
//! - `RUST_LOG` - log level (default: info)

use anyhow::{bail, Context, Result};
use authz_rbac::store::PostgresAssignmentStore;
use authz_rbac::{AuthConfig, AuthManager, ItemType, Params};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Authorization admin CLI
#[derive(Parser)]
#[command(name = "authz-admin")]
#[command(about = "Manage role assignments and check access")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "AUTHZ_CONFIG")]
    config: Option<PathBuf>,

    /// Override the hierarchy file
    #[arg(long, env = "AUTHZ_HIERARCHY")]
    hierarchy: Option<PathBuf>,

    /// Override the database URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether a user may use an item
    Check {
        item: String,
        user: String,

        /// Rule parameter as key=value; values are parsed as JSON when possible
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },

    /// Assign an item to a user
    Assign {
        item: String,
        user: String,

        /// Business rule of the assignment
        #[arg(long)]
        rule: Option<String>,

        /// JSON payload handed to the rule
        #[arg(long)]
        data: Option<String>,
    },

    /// Revoke an item from a user
    Revoke { item: String, user: String },

    /// List the assignments of a user
    Assignments { user: String },

    /// List hierarchy items
    Items {
        /// operation, task or role
        #[arg(long = "type")]
        item_type: Option<ItemType>,

        /// Only items directly assigned to this user
        #[arg(long)]
        user: Option<String>,
    },

    /// Create the assignment table
    Migrate,
}

fn parse_param(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AuthConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AuthConfig::default(),
    };

    // Apply CLI overrides
    if let Some(path) = cli.hierarchy {
        config.hierarchy.path = Some(path);
    }
    if let Some(url) = cli.database_url {
        config.database.url = Some(url);
    }
    config.validate()?;

    match cli.command {
        Command::Migrate => migrate(&config).await,
        command => run(config, command).await,
    }
}

async fn migrate(config: &AuthConfig) -> Result<()> {
    let Some(url) = config.database.url.as_deref() else {
        bail!("migrate requires database.url or DATABASE_URL");
    };

    let store = PostgresAssignmentStore::new(
        url,
        &config.database.assignment_table,
        config.database.max_connections,
    )
    .await
    .context("Failed to connect to database")?;
    store.run_migrations().await?;

    info!("Migrations applied");
    Ok(())
}

async fn run(config: AuthConfig, command: Command) -> Result<()> {
    let manager = AuthManager::from_config(config)
        .await
        .context("Failed to initialize authorization manager")?;

    match command {
        Command::Check { item, user, params } => {
            let params: Params = params.into_iter().collect();
            let allowed = manager.check_access(&item, &user, &params).await?;
            println!("{}", if allowed { "allowed" } else { "denied" });
        }
        Command::Assign { item, user, rule, data } => {
            let data = data
                .map(|raw| serde_json::from_str::<Value>(&raw))
                .transpose()
                .context("--data must be valid JSON")?;
            manager.assignments().assign(&item, &user, rule, data).await?;
            println!("assigned {} to {}", item, user);
        }
        Command::Revoke { item, user } => {
            if manager.assignments().revoke(&item, &user).await? {
                println!("revoked {} from {}", item, user);
            } else {
                println!("{} was not assigned to {}", item, user);
            }
        }
        Command::Assignments { user } => {
            let set = manager.assignments().get_assignments(&user).await?;
            let mut names: Vec<_> = set.keys().collect();
            names.sort();
            for name in names {
                match set[name].biz_rule.as_deref() {
                    Some(rule) => println!("{}\t{}", name, rule),
                    None => println!("{}", name),
                }
            }
        }
        Command::Items { item_type, user } => {
            for item in manager.items(item_type, user.as_deref()).await? {
                println!("{}\t{}\t{}", item.name, item.item_type, item.children.len());
            }
        }
        Command::Migrate => migrate(manager.config()).await?,
    }

    Ok(())
}
