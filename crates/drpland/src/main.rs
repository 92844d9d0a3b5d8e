//! drpland — the disaster-recovery orchestration daemon.
//!
//! Single binary that assembles the stack:
//! - State store (redb)
//! - Quota validation + conflict detection
//! - Wave orchestrator loop
//! - Capacity tracker
//! - REST API
//!
//! # Usage
//!
//! ```text
//! drpland serve --port 8087 --data-dir /var/lib/drplan \
//!     --topology /etc/drplan/topology.toml --offline
//! ```
//!
//! The topology file declares the accounts and regions the daemon
//! operates over:
//!
//! ```toml
//! target_account = "111122223333"
//! staging_accounts = ["444455556666"]
//! regions = ["us-east-1", "us-west-2"]
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use drplan_capacity::Topology;
use drplan_remote::mock::{MockFactory, MockRecoveryService};
use drplan_remote::ServiceFactory;

#[derive(Parser)]
#[command(name = "drpland", about = "Disaster-recovery orchestration daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server and orchestration loop.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8087")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/drplan")]
        data_dir: PathBuf,

        /// Topology file (target account, staging accounts, regions).
        #[arg(long)]
        topology: PathBuf,

        /// Orchestrator tick interval in seconds.
        #[arg(long, default_value = "5")]
        tick_interval: u64,

        /// Use the in-memory mock recovery service instead of a live
        /// remote endpoint (local development).
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,drpland=debug,drplan=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            data_dir,
            topology,
            tick_interval,
            offline,
        } => run_serve(port, data_dir, topology, tick_interval, offline).await,
    }
}

fn load_topology(path: &PathBuf) -> anyhow::Result<Topology> {
    let content = std::fs::read_to_string(path)?;
    let topology: Topology = toml::from_str(&content)?;
    if topology.regions.is_empty() {
        anyhow::bail!("topology declares no regions");
    }
    Ok(topology)
}

async fn run_serve(
    port: u16,
    data_dir: PathBuf,
    topology_path: PathBuf,
    tick_interval: u64,
    offline: bool,
) -> anyhow::Result<()> {
    info!("drplan daemon starting");

    let topology = load_topology(&topology_path)?;
    info!(
        target_account = %topology.target_account,
        staging_accounts = topology.staging_accounts.len(),
        regions = topology.regions.len(),
        "topology loaded"
    );

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("drplan.redb");
    let store = drplan_state::StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let factory: Arc<dyn ServiceFactory> = if offline {
        info!("offline mode: using the in-memory mock recovery service");
        MockFactory::new(MockRecoveryService::new())
    } else {
        anyhow::bail!(
            "no live remote endpoint is configured in this build; run with --offline"
        );
    };

    let state = drplan_api::ApiState::new(store, factory, topology);
    let orchestrator = state.orchestrator.clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let orchestrator_handle = tokio::spawn(
        orchestrator.run(Duration::from_secs(tick_interval), shutdown_rx),
    );
    info!(interval = tick_interval, "orchestrator loop started");

    let router = drplan_api::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = orchestrator_handle.await;

    info!("drplan daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_parses_from_toml() {
        let parsed: Topology = toml::from_str(
            r#"
            target_account = "111122223333"
            staging_accounts = ["444455556666"]
            regions = ["us-east-1", "us-west-2"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.target_account, "111122223333");
        assert_eq!(parsed.staging_accounts, vec!["444455556666"]);
        assert_eq!(parsed.regions.len(), 2);
    }

    #[test]
    fn staging_accounts_default_to_empty() {
        let parsed: Topology = toml::from_str(
            r#"
            target_account = "111122223333"
            regions = ["us-east-1"]
            "#,
        )
        .unwrap();
        assert!(parsed.staging_accounts.is_empty());
    }
}
