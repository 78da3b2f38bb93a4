use anyhow::Context;
use clap::Parser;
use hashledger_core::Blockchain;
use hashledger_node::{router, scheduler, AppState, Args};
use hashledger_storage::open_store;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.chain_config();

    let chain = if args.ephemeral {
        Blockchain::in_memory(config)?
    } else {
        let store = open_store(args.backend.into(), &args.data_dir)
            .with_context(|| format!("open store in {}", args.data_dir.display()))?;
        Blockchain::open(config, store)?
    };
    let chain = Arc::new(chain);
    info!(
        blocks = chain.block_count(),
        difficulty = chain.difficulty(),
        durable = chain.is_durable(),
        "chain ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = (args.mine_interval_secs > 0).then(|| {
        scheduler::spawn(
            Arc::clone(&chain),
            args.miner_id.clone(),
            Duration::from_secs(args.mine_interval_secs),
            shutdown_rx,
        )
    });

    let state = AppState {
        auto_mine_threshold: args.auto_mine_threshold,
        ..AppState::new(Arc::clone(&chain), args.miner_id.clone())
    };
    let app = router(state);

    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("invalid listen address `{}`", args.listen))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("hashledger-node listening on http://{addr}");

    let signal_chain = Arc::clone(&chain);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
            signal_chain.request_shutdown();
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Some(handle) = scheduler_task {
        if let Err(e) = handle.await {
            warn!(error = %e, "mining scheduler ended abnormally");
        }
    }
    info!(blocks = chain.block_count(), "node stopped");
    Ok(())
}
