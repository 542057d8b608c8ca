//! OpsConsole — multi-tenant operations console shell.
//!
//! Entry point that wires the session lifecycle subsystem together and keeps
//! the process alive until shutdown. The data-entry surfaces consult the
//! coordinator handle for the current identity.

use clap::Parser;
use console_core::config::AppConfig;
use console_session::coordinator::{LifecycleCoordinator, SessionState};
use console_session::revocation::NatsRevocationFeed;
use console_session::store::CredentialStore;
use console_session::validator::HttpSessionValidator;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ops-console")]
#[command(about = "Multi-tenant operations console")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "OPS_CONSOLE__NODE_ID")]
    node_id: Option<String>,

    /// Credential data directory (overrides config)
    #[arg(long, env = "OPS_CONSOLE__STORAGE__DATA_DIR")]
    data_dir: Option<String>,

    /// Session authority base URL (overrides config)
    #[arg(long, env = "OPS_CONSOLE__AUTHORITY__BASE_URL")]
    authority_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ops_console=info,console_session=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("OpsConsole starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(url) = cli.authority_url {
        config.authority.base_url = url;
    }

    info!(
        node_id = %config.node_id,
        data_dir = %config.storage.data_dir,
        authority = %config.authority.base_url,
        "Configuration loaded"
    );

    // Durable credential store
    let store = CredentialStore::file(&config.storage.data_dir);

    // Remote session authority client
    let validator = Arc::new(HttpSessionValidator::new(&config.authority)?);

    // Push channel for out-of-band revocation
    let feed = Arc::new(NatsRevocationFeed::connect(&config.push).await?);

    // Session lifecycle coordinator
    let coordinator =
        LifecycleCoordinator::spawn(store, validator, feed, config.session.clone());

    // Surface transitions for the console shell's logs.
    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        while let Ok(state) = events.recv().await {
            match state {
                SessionState::Idle => info!("Session state: idle"),
                SessionState::Loading(class) => info!(class = %class, "Session state: loading"),
                SessionState::Active(snapshot) => info!(
                    class = %snapshot.class,
                    subject_id = %snapshot.subject_id,
                    display_name = %snapshot.subject.display_name,
                    "Session state: active"
                ),
                SessionState::Invalid(reason) => {
                    info!(reason = ?reason, "Session state: invalidated")
                }
            }
        }
    });

    coordinator.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    Ok(())
}
