//! Chain reconciliation scanner.
//!
//! Walks finalized blocks in ascending windows above the stored high-water
//! mark, records every block and transaction, and settles Pending transfer
//! jobs whose recorded (hash, sender) shows up on chain. All RPC work for a
//! window happens first; the writes then commit in a single transaction, so a
//! failure anywhere leaves the high-water mark where it was.

use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{Transaction as _, TxEnvelope};
use alloy::primitives::{hex, Address};
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};
use tracing::Instrument;

use crate::blockchain::transaction::embedded_recipient;
use crate::blockchain::{BlockHeader, LedgerClient};
use crate::config::ScannerConfig;
use crate::error::{DisburseError, DisburseResult};
use crate::observability::metrics;
use crate::store::{
    address_key, BlockRepository, LedgerStore, NewObservedTransaction, TransactionRepository,
    TransferJobRepository,
};

const SCANNER_IDENTITY: &str = "scanner";

/// Next inclusive range to scan, or `None` when caught up.
///
/// Starts right above `last`, or at `start_block` on an empty store, and never
/// passes `remote` (the finalized head).
pub fn scan_window(last: Option<u64>, remote: u64, window: u64, start_block: u64) -> Option<(u64, u64)> {
    let from = match last {
        Some(n) => n.checked_add(1)?,
        None => start_block,
    };
    if window == 0 || from > remote {
        return None;
    }
    let to = remote.min(from.saturating_add(window - 1));
    Some((from, to))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub from: u64,
    pub to: u64,
    pub blocks: u64,
    pub transactions: u64,
    pub settled: u64,
}

/// One block fetched and decoded, ready to persist.
struct ScannedBlock {
    header: BlockHeader,
    transactions: Vec<ScannedTransaction>,
}

struct ScannedTransaction {
    record: NewObservedTransaction,
    success: bool,
}

pub struct ChainScanner {
    store: LedgerStore,
    client: Arc<dyn LedgerClient>,
    config: ScannerConfig,
}

impl ChainScanner {
    pub fn new(store: LedgerStore, client: Arc<dyn LedgerClient>, config: ScannerConfig) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let span = tracing::info_span!("scanner");

        async move {
            tracing::info!(
                interval_ms = self.config.interval_ms,
                window = self.config.window,
                start_block = self.config.start_block,
                "Chain scanner starting"
            );

            let mut ticker = time::interval(Duration::from_millis(self.config.interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        tracing::info!("Chain scanner received shutdown signal, exiting loop");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.tick().await {
                            Ok(Some(summary)) => {
                                tracing::info!(
                                    from = summary.from,
                                    to = summary.to,
                                    blocks = summary.blocks,
                                    transactions = summary.transactions,
                                    settled = summary.settled,
                                    "Scan batch committed"
                                );
                            }
                            Ok(None) => {}
                            Err(e) => tracing::error!(error = %e, "Scan batch aborted"),
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Scan the next window. `Ok(None)` means already caught up.
    pub async fn tick(&self) -> DisburseResult<Option<ScanSummary>> {
        let last = {
            let mut conn = self.store.acquire().await?;
            BlockRepository::latest_number(&mut conn).await?
        };
        let remote = self.client.finalized_header().await?;

        let Some((from, to)) =
            scan_window(last, remote.number, self.config.window, self.config.start_block)
        else {
            tracing::debug!(last = ?last, finalized = remote.number, "Scanner caught up");
            return Ok(None);
        };

        let headers = self.client.headers_by_range(from, to).await?;
        let mut scanned = Vec::with_capacity(headers.len());
        for header in headers {
            scanned.push(self.fetch_block(header).await?);
        }

        self.persist(from, &scanned).await.map(Some)
    }

    async fn fetch_block(&self, header: BlockHeader) -> DisburseResult<ScannedBlock> {
        let block = self.client.block_by_number(header.number).await?;
        if block.header.hash != header.hash {
            return Err(DisburseError::TransientNetwork(format!(
                "block {} changed between header and body fetch",
                header.number
            )));
        }

        let mut transactions = Vec::with_capacity(block.transactions.len());
        for envelope in &block.transactions {
            transactions.push(self.decode_transaction(&header, envelope).await?);
        }

        Ok(ScannedBlock {
            header,
            transactions,
        })
    }

    async fn decode_transaction(
        &self,
        header: &BlockHeader,
        envelope: &TxEnvelope,
    ) -> DisburseResult<ScannedTransaction> {
        let tx_hash = *envelope.tx_hash();

        let from = envelope.recover_signer().unwrap_or_else(|e| {
            tracing::warn!(tx_hash = %tx_hash, error = %e, "Could not recover sender");
            Address::ZERO
        });
        let to = envelope
            .to()
            .or_else(|| embedded_recipient(envelope.input()))
            .map(|a| address_key(&a))
            .unwrap_or_default();

        let receipt = self
            .client
            .transaction_receipt(tx_hash)
            .await?
            .ok_or_else(|| {
                DisburseError::TransientNetwork(format!("receipt for {tx_hash:#x} not available"))
            })?;

        let record = NewObservedTransaction {
            block_number: to_i64(header.number),
            block_hash: format!("{:#x}", header.hash),
            tx_hash: format!("{tx_hash:#x}"),
            from_address: address_key(&from),
            to_address: to.clone(),
            token_address: to,
            value: envelope.value().to_string(),
            gas_price: envelope.gas_price().unwrap_or_default().to_string(),
            gas_limit: to_i64(envelope.gas_limit()),
            gas_used: to_i64(receipt.gas_used),
            nonce: to_i64(envelope.nonce()),
            transaction_index: to_i64(receipt.transaction_index.unwrap_or_default()),
            status: i64::from(receipt.success),
            tx_type: i64::from(u8::from(envelope.tx_type())),
            input: hex::encode(envelope.input()),
        };

        Ok(ScannedTransaction {
            record,
            success: receipt.success,
        })
    }

    async fn persist(&self, from: u64, blocks: &[ScannedBlock]) -> DisburseResult<ScanSummary> {
        let mut summary = ScanSummary {
            from,
            to: from,
            ..ScanSummary::default()
        };

        let mut tx = self.store.begin().await?;

        for block in blocks {
            let header = &block.header;
            match BlockRepository::insert(
                &mut tx,
                to_i64(header.number),
                &format!("{:#x}", header.hash),
                &format!("{:#x}", header.parent_hash),
                to_i64(header.timestamp),
            )
            .await
            {
                Ok(()) => summary.blocks += 1,
                Err(DisburseError::ReconciliationConflict(msg)) => {
                    tracing::debug!(block_number = header.number, "{msg}");
                }
                Err(e) => return Err(e),
            }

            for scanned in &block.transactions {
                match TransactionRepository::insert(&mut tx, &scanned.record).await {
                    Ok(()) => summary.transactions += 1,
                    Err(DisburseError::ReconciliationConflict(msg)) => {
                        tracing::debug!(tx_hash = %scanned.record.tx_hash, "{msg}");
                    }
                    Err(e) => return Err(e),
                }

                if !scanned.success {
                    continue;
                }
                let settled = TransferJobRepository::settle_observed(
                    &mut tx,
                    &scanned.record.tx_hash,
                    &scanned.record.from_address,
                    SCANNER_IDENTITY,
                )
                .await?;
                if settled > 0 {
                    summary.settled += settled;
                    metrics::record_job_settled("scanner");
                    tracing::info!(
                        tx_hash = %scanned.record.tx_hash,
                        block_number = header.number,
                        "Transfer job settled from chain"
                    );
                }
            }

            summary.to = header.number;
        }

        tx.commit().await?;
        metrics::record_blocks_scanned(summary.blocks, summary.transactions, summary.to);
        Ok(summary)
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
