//! Quorum disburser service.
//!
//! # Architecture Overview
//!
//! ```text
//!   POST /intent/create ─┐
//!   POST /intent/vote  ──┼─▶ ApprovalService ──▶ intents / approvals
//!   GET  /intent/...   ──┘          │
//!                                   ▼ (quorum reached)
//!                             transfer_jobs ◀──────────────┐
//!                                   │                      │ settle by (hash, from)
//!                                   ▼                      │
//!                             OutboxEngine            ChainScanner
//!                        claim → sign → record             ▲
//!                        → broadcast → receipt             │ finalized blocks
//!                                   │                      │
//!                                   └────▶ LedgerClient ───┘
//! ```
//!
//! Startup order: config, logging, metrics, store, registry, ledger client,
//! wallet, background workers, HTTP listener.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use quorum_disburser::blockchain::{LedgerClient, RpcLedgerClient, Wallet};
use quorum_disburser::config::{load_config, AppConfig};
use quorum_disburser::http::AppState;
use quorum_disburser::lifecycle::wait_for_signal;
use quorum_disburser::observability::{logging, metrics};
use quorum_disburser::{ApprovalService, ChainScanner, HttpServer, LedgerStore, OutboxEngine, Shutdown};

#[derive(Parser)]
#[command(name = "quorum-disburser")]
#[command(about = "Quorum-gated token disbursement service", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("quorum-disburser v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.server.bind_address,
        quorum = config.approval.quorum,
        chain_id = config.blockchain.chain_id,
        outbox_enabled = config.outbox.enabled,
        scanner_enabled = config.scanner.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = LedgerStore::connect(&config.database).await?;
    store.seed_registry(&config.registry).await?;

    let shutdown = Shutdown::new();
    let mut workers = Vec::new();

    if config.outbox.enabled || config.scanner.enabled {
        let client: Arc<dyn LedgerClient> =
            Arc::new(RpcLedgerClient::connect(config.blockchain.clone()).await?);

        if config.outbox.enabled {
            let wallet =
                Wallet::from_env(&config.blockchain.signer_key_env, config.blockchain.chain_id)?;
            let engine = OutboxEngine::new(
                store.clone(),
                client.clone(),
                wallet,
                config.outbox.clone(),
            );
            workers.push(tokio::spawn(engine.run(shutdown.subscribe())));
        }

        if config.scanner.enabled {
            let scanner = ChainScanner::new(store.clone(), client.clone(), config.scanner.clone());
            workers.push(tokio::spawn(scanner.run(shutdown.subscribe())));
        }
    }

    tokio::spawn(wait_for_signal(shutdown.clone()));

    let state = AppState {
        approvals: ApprovalService::new(store.clone(), config.approval.clone()),
        store: store.clone(),
    };
    let listener = TcpListener::bind(&config.server.bind_address).await?;
    HttpServer::new(state, config.server.clone())
        .run(listener, shutdown.clone())
        .await?;

    // Covers a server that stopped without a signal.
    shutdown.trigger();
    tracing::info!(workers = shutdown.receiver_count(), "Waiting for workers to drain");
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Worker task ended abnormally");
        }
    }

    store.pool().close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
