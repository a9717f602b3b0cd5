use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use uia_agent::provider::{self, ProviderKind};
use uia_agent::rpc;
use uia_agent::scheduler;
use uia_agent::service::AgentService;

/// UI-automation agent speaking framed JSON-RPC over stdin/stdout.
#[derive(Debug, Parser)]
#[command(name = "uia-agent", version, about)]
struct Cli {
    /// Automation backend to drive.
    #[arg(long, value_enum, default_value_t = ProviderKind::Auto, env = "UIA_AGENT_PROVIDER")]
    provider: ProviderKind,

    /// Log filter when RUST_LOG is not set, e.g. "info" or "uia_agent=debug".
    #[arg(long, default_value = "info", env = "UIA_AGENT_LOG")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr only; stdout belongs to the framed protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log)),
        )
        .with_writer(std::io::stderr)
        .init();

    let (handle, pump) = scheduler::channel();
    let provider_kind = cli.provider;
    let (init_tx, init_rx) = std::sync::mpsc::channel();
    let worker = std::thread::Builder::new()
        .name("uia-worker".to_string())
        .spawn(move || {
            // Provider state is created on the thread that will own it and
            // never leaves it.
            match provider::create(provider_kind) {
                Ok(backend) => {
                    AgentService::install(AgentService::new(backend));
                    let _ = init_tx.send(Ok(()));
                    pump.run();
                }
                Err(e) => {
                    let _ = init_tx.send(Err(e));
                }
            }
        })
        .context("spawning worker thread")?;

    init_rx
        .recv()
        .context("worker thread exited before reporting readiness")?
        .context("initializing automation provider")?;
    info!(provider = ?provider_kind, "agent starting");

    let result = rpc::serve(tokio::io::stdin(), tokio::io::stdout(), handle.clone()).await;

    handle.shutdown();
    let _ = worker.join();
    result
}
