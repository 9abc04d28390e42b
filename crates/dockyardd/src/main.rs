//! dockyardd — the Dockyard daemon.
//!
//! Single binary with two roles:
//! - `control-plane`: state store (redb), agent gRPC service, task drain
//!   and node audit loops, admin REST API
//! - `agent`: per-node loop that reports local containers and runs tasks
//!
//! # Usage
//!
//! ```text
//! dockyardd control-plane --grpc-port 50051 --api-port 8080 --data-dir /tmp/db
//! dockyardd agent --control-plane 172.17.0.1:50051 --node-id node-1
//! ```

mod agent_mode;
mod config;
mod control_plane;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{AgentArgs, ControlPlaneArgs};

const DEFAULT_LOG_FILTER: &str = "info,dockyard=debug,dockyardd=debug";

#[derive(Parser)]
#[command(name = "dockyardd", about = "Dockyard container fleet daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane (gRPC for agents, admin API, reconcile loops).
    ControlPlane(ControlPlaneArgs),

    /// Run a node agent.
    Agent(AgentArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::ControlPlane(args) => control_plane::run_control_plane(args.into()).await,
        Command::Agent(args) => {
            let (config, docker_bin) = args.into_config();
            agent_mode::run_agent(config, docker_bin).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Flip `tx` once Ctrl-C arrives.
async fn shutdown_on_ctrl_c(tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C");
        return;
    }
    info!("shutdown signal received");
    let _ = tx.send(true);
}

/// Resolves when `rx` flips to true or its sender is gone.
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
