//! Transfer outbox and retry engine.
//!
//! # Per tick
//! ```text
//! claim_batch (lease)
//!     → for each job, sequentially:
//!         check receipts of the outstanding nonce (resume, or between attempts)
//!         → prepare (outstanding or fresh nonce, bumped fee, sign)
//!         → write-ahead record of hash + raw tx
//!         → broadcast
//!         → poll receipts
//!     → Success | exhausted (retry_count + 1) | Failed
//! ```
//!
//! The lease is renewed before every attempt and every receipt lookup, so it
//! only lapses when a worker stops making progress. Once a transaction is
//! recorded, later attempts replace it under the same nonce instead of
//! signing a new one; a broadcast error leaves it recorded, since the node
//! may have accepted it. Only a "nonce too low" rejection with none of the
//! job's transactions mined frees the job to take a fresh nonce.
//!
//! A job whose transaction is still in flight when attempts run out keeps its
//! hash and its claim. The claim expires after `lease_timeout_secs`; the next
//! owner checks the receipts before signing anything new.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{hex, Address, TxHash, U256};
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

use crate::blockchain::{
    BlockchainError, LedgerClient, PreparedTransfer, TransferTxBuilder, Wallet,
};
use crate::config::OutboxConfig;
use crate::error::{DisburseError, DisburseResult};
use crate::observability::metrics;
use crate::store::{
    address_key, ClaimRequest, InFlight, IntentRepository, LedgerStore, TokenRepository,
    TransferAttemptRepository, TransferJob, TransferJobRepository,
};

/// What happened to one claimed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// A successful receipt was seen; the job is Success.
    Settled,
    /// Attempts ran out; `in_flight` tells whether a transaction is still outstanding.
    Exhausted { in_flight: bool },
    /// The job can never produce a valid transaction.
    Failed,
    /// Another worker or the scanner took the job over mid-flight.
    ClaimLost,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub claimed: usize,
    pub settled: usize,
    pub exhausted: usize,
    pub failed: usize,
    pub errors: usize,
}

impl TickSummary {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Settled => self.settled += 1,
            JobOutcome::Exhausted { .. } => self.exhausted += 1,
            JobOutcome::Failed => self.failed += 1,
            JobOutcome::ClaimLost => {}
        }
    }
}

/// Where the transactions signed for a job's outstanding nonce stand.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Landing {
    /// One of them was mined successfully.
    Mined(String),
    /// One was mined and reverted, spending the nonce.
    Reverted,
    Unseen,
    ClaimLost,
}

/// Addressing resolved from the job's intent and token.
#[derive(Debug, Clone, Copy)]
struct TransferTarget {
    contract: Address,
    recipient: Address,
    amount: U256,
}

/// Outbox worker. Cheap to clone; clones share the worker identity.
#[derive(Clone)]
pub struct OutboxEngine {
    store: LedgerStore,
    client: Arc<dyn LedgerClient>,
    builder: TransferTxBuilder,
    config: OutboxConfig,
    worker_id: String,
}

impl OutboxEngine {
    pub fn new(
        store: LedgerStore,
        client: Arc<dyn LedgerClient>,
        wallet: Wallet,
        config: OutboxConfig,
    ) -> Self {
        let builder = TransferTxBuilder::new(
            client.clone(),
            wallet,
            config.gas_limit,
            config.fee_bump_percent,
        );
        Self {
            store,
            client,
            builder,
            config,
            worker_id: format!("outbox-{}", Uuid::new_v4()),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Tick until shutdown. A tick in progress always runs to completion.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let span = tracing::info_span!("outbox", worker_id = %self.worker_id);

        async move {
            tracing::info!(
                interval_ms = self.config.interval_ms,
                batch_size = self.config.batch_size,
                retry_cap = self.config.retry_cap,
                sender = %self.builder.sender(),
                "Outbox worker starting"
            );

            let mut ticker = time::interval(Duration::from_millis(self.config.interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        tracing::info!("Outbox worker received shutdown signal, exiting loop");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.tick().await {
                            Ok(summary) if summary.claimed > 0 => {
                                tracing::info!(
                                    claimed = summary.claimed,
                                    settled = summary.settled,
                                    exhausted = summary.exhausted,
                                    failed = summary.failed,
                                    errors = summary.errors,
                                    "Outbox tick complete"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!(error = %e, "Outbox tick failed"),
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Claim a batch and drive each job once.
    pub async fn tick(&self) -> DisburseResult<TickSummary> {
        let now_ms = Utc::now().timestamp_millis();
        let lease_ms = i64::try_from(self.config.lease_timeout_secs.saturating_mul(1000))
            .unwrap_or(i64::MAX);

        let jobs = {
            let mut conn = self.store.acquire().await?;
            TransferJobRepository::claim_batch(
                &mut conn,
                ClaimRequest {
                    worker_id: &self.worker_id,
                    now_ms,
                    stale_before_ms: now_ms.saturating_sub(lease_ms),
                    retry_cap: i64::from(self.config.retry_cap),
                    limit: i64::from(self.config.batch_size),
                },
            )
            .await?
        };

        let mut summary = TickSummary {
            claimed: jobs.len(),
            ..TickSummary::default()
        };

        for job in jobs {
            let span = tracing::info_span!("job", job_id = job.id, intent_id = job.intent_id);
            match self.process_job(job).instrument(span).await {
                Ok(outcome) => summary.record(outcome),
                Err(e) if e.is_transient() => {
                    summary.errors += 1;
                    tracing::warn!(error = %e, "Transfer job left for a later tick");
                }
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!(error = %e, "Transfer job could not be processed");
                }
            }
        }

        Ok(summary)
    }

    /// Drive one claimed job. Terminal problems mark it Failed; transient ones
    /// release an idle claim and surface the error.
    pub async fn process_job(&self, job: TransferJob) -> DisburseResult<JobOutcome> {
        match self.drive(&job).await {
            Ok(outcome) => Ok(outcome),
            Err(e @ (DisburseError::TerminalSubmission(_)
            | DisburseError::Validation(_)
            | DisburseError::NotFound(_))) => {
                let mut conn = self.store.acquire().await?;
                TransferJobRepository::mark_failed(&mut conn, job.id, &e.to_string(), &self.worker_id)
                    .await?;
                tracing::error!(error = %e, "Transfer job failed permanently");
                Ok(JobOutcome::Failed)
            }
            Err(e) => {
                let mut conn = self.store.acquire().await?;
                TransferJobRepository::release_idle_claim(&mut conn, job.id, &self.worker_id).await?;
                Err(e)
            }
        }
    }

    async fn drive(&self, job: &TransferJob) -> DisburseResult<JobOutcome> {
        // Jobs late in a batch may have waited out their lease behind earlier ones.
        if !self.renew_claim(job).await? {
            return Ok(claim_lost());
        }

        let target = self.resolve_target(job).await?;
        let sender = address_key(&self.builder.sender());
        let mut in_flight = InFlight::of(job);
        let mut last_error = String::new();

        if job.has_in_flight() {
            tracing::info!(tx_hash = %job.tx_hash, "Resuming job with a recorded transaction");
        }
        self.log_balances(&target, "before").await;

        for attempt in 0..self.config.attempts_per_tick {
            if attempt > 0 {
                time::sleep(Duration::from_millis(self.config.attempt_delay_ms)).await;
            }

            // Whatever is outstanding may have landed since it was recorded.
            if !in_flight.tx_hash.is_empty() {
                match self.check_landed(job, &in_flight).await? {
                    Landing::Mined(hash) => return self.settle(job, &target, &hash).await,
                    Landing::Reverted => {
                        tracing::warn!(tx_hash = %in_flight.tx_hash, "In-flight transaction reverted");
                        in_flight = self.replace_in_flight(job, InFlight::default()).await?;
                        last_error = "transaction reverted".to_string();
                    }
                    Landing::Unseen => {}
                    Landing::ClaimLost => return Ok(claim_lost()),
                }
            }
            if !self.renew_claim(job).await? {
                return Ok(claim_lost());
            }

            // A replacement carries the outstanding nonce, so at most one of them is mined.
            let pinned = if in_flight.tx_hash.is_empty() {
                None
            } else {
                in_flight.tx_nonce.and_then(|nonce| u64::try_from(nonce).ok())
            };

            let prepared = match self
                .builder
                .prepare(target.contract, target.recipient, target.amount, attempt, pinned)
                .await
            {
                Ok(prepared) => prepared,
                Err(e) => {
                    let e = DisburseError::from(e);
                    if matches!(e, DisburseError::TerminalSubmission(_)) {
                        return Err(e);
                    }
                    tracing::warn!(attempt = attempt, error = %e, "Could not prepare transfer");
                    last_error = e.to_string();
                    continue;
                }
            };

            let nonce = i64::try_from(prepared.signed.nonce).map_err(|_| {
                let nonce = prepared.signed.nonce;
                DisburseError::TerminalSubmission(format!("nonce {nonce} out of range"))
            })?;
            let next = InFlight {
                tx_hash: format!("{:#x}", prepared.signed.hash),
                signed_tx: hex::encode_prefixed(&prepared.signed.raw),
                tx_nonce: Some(nonce),
            };

            if !self.record(job, &sender, &next, &prepared).await? {
                return Ok(claim_lost());
            }

            match self.client.submit_raw_transaction(&prepared.signed.raw).await {
                Ok(_) => {
                    metrics::record_submission("ok");
                    tracing::info!(
                        attempt = attempt,
                        tx_hash = %next.tx_hash,
                        nonce = prepared.signed.nonce,
                        replacement = pinned.is_some(),
                        fee = %prepared.fee,
                        "Transfer broadcast"
                    );
                    in_flight = next;
                }
                Err(BlockchainError::NonceTooLow(reason)) => {
                    metrics::record_submission("rejected");
                    // Spent by one of this job's transactions, or by something else entirely.
                    match self.check_landed(job, &next).await? {
                        Landing::Mined(hash) => return self.settle(job, &target, &hash).await,
                        Landing::ClaimLost => return Ok(claim_lost()),
                        Landing::Reverted | Landing::Unseen => {
                            tracing::warn!(
                                attempt = attempt,
                                nonce = prepared.signed.nonce,
                                error = %reason,
                                "Nonce already used elsewhere, next attempt takes a fresh one"
                            );
                            in_flight = self.replace_in_flight(job, InFlight::default()).await?;
                            last_error = reason;
                            continue;
                        }
                    }
                }
                Err(e) => {
                    metrics::record_submission("error");
                    // The node may have taken it anyway.
                    tracing::warn!(
                        attempt = attempt,
                        tx_hash = %next.tx_hash,
                        error = %e,
                        "Broadcast outcome unknown, keeping the recorded transaction"
                    );
                    in_flight = next;
                    last_error = e.to_string();
                    continue;
                }
            }

            match self.await_landing(job, &in_flight).await? {
                Landing::Mined(hash) => return self.settle(job, &target, &hash).await,
                Landing::Reverted => {
                    tracing::warn!(tx_hash = %in_flight.tx_hash, "Transfer reverted");
                    in_flight = self.replace_in_flight(job, InFlight::default()).await?;
                    last_error = "transaction reverted".to_string();
                }
                Landing::Unseen => {
                    last_error = format!("no receipt for {}", in_flight.tx_hash);
                }
                Landing::ClaimLost => return Ok(claim_lost()),
            }
        }

        let keep = !in_flight.tx_hash.is_empty();
        let mut conn = self.store.acquire().await?;
        let recorded = TransferJobRepository::record_exhausted(
            &mut conn,
            job.id,
            &self.worker_id,
            i64::from(self.config.retry_cap),
            &last_error,
            keep,
        )
        .await?;
        if !recorded {
            return Ok(JobOutcome::ClaimLost);
        }

        metrics::record_job_exhausted();
        tracing::warn!(
            retry_count = (job.retry_count + 1).min(i64::from(self.config.retry_cap)),
            in_flight = keep,
            error = %last_error,
            "Transfer attempts exhausted for this tick"
        );
        Ok(JobOutcome::Exhausted { in_flight: keep })
    }

    async fn resolve_target(&self, job: &TransferJob) -> DisburseResult<TransferTarget> {
        let mut conn = self.store.acquire().await?;
        let intent = IntentRepository::find(&mut conn, job.intent_id)
            .await?
            .ok_or_else(|| DisburseError::NotFound(format!("intent {}", job.intent_id)))?;
        let token = TokenRepository::find(&mut conn, intent.token_id)
            .await?
            .ok_or_else(|| DisburseError::NotFound(format!("token {}", intent.token_id)))?;

        let recipient = intent.destination.parse::<Address>().map_err(|_| {
            DisburseError::Validation(format!("bad destination '{}'", intent.destination))
        })?;
        let contract = token.contract_address.parse::<Address>().map_err(|_| {
            DisburseError::Validation(format!("bad contract '{}'", token.contract_address))
        })?;
        let amount = U256::from_str_radix(&job.amount, 10)
            .map_err(|_| DisburseError::Validation(format!("bad amount '{}'", job.amount)))?;

        Ok(TransferTarget {
            contract,
            recipient,
            amount,
        })
    }

    async fn renew_claim(&self, job: &TransferJob) -> DisburseResult<bool> {
        let mut conn = self.store.acquire().await?;
        TransferJobRepository::renew_claim(
            &mut conn,
            job.id,
            &self.worker_id,
            Utc::now().timestamp_millis(),
        )
        .await
    }

    /// Write-ahead record: the job's in-flight columns and the attempt row
    /// commit together, or not at all if the claim was lost.
    async fn record(
        &self,
        job: &TransferJob,
        sender: &str,
        next: &InFlight,
        prepared: &PreparedTransfer,
    ) -> DisburseResult<bool> {
        let mut tx = self.store.begin().await?;
        let recorded = TransferJobRepository::record_submission(
            &mut tx,
            job.id,
            &self.worker_id,
            sender,
            next,
            &hex::encode_prefixed(&prepared.call_data),
        )
        .await?;
        if !recorded {
            return Ok(false);
        }

        TransferAttemptRepository::insert(
            &mut tx,
            job.id,
            &next.tx_hash,
            next.tx_nonce.unwrap_or_default(),
            &next.signed_tx,
            &self.worker_id,
        )
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Receipt state across every transaction signed for the outstanding
    /// nonce. The claim is renewed before each lookup; lookup errors read as
    /// not visible.
    async fn check_landed(
        &self,
        job: &TransferJob,
        in_flight: &InFlight,
    ) -> DisburseResult<Landing> {
        let mut hashes = vec![in_flight.tx_hash.clone()];
        if let Some(nonce) = in_flight.tx_nonce {
            let mut conn = self.store.acquire().await?;
            let signed = TransferAttemptRepository::list_for_nonce(&mut conn, job.id, nonce).await?;
            for attempt in signed {
                if !hashes.contains(&attempt.tx_hash) {
                    hashes.push(attempt.tx_hash);
                }
            }
        }

        let mut reverted = false;
        for hash in hashes.iter().filter(|hash| !hash.is_empty()) {
            if !self.renew_claim(job).await? {
                return Ok(Landing::ClaimLost);
            }
            let Ok(parsed) = hash.parse::<TxHash>() else {
                continue;
            };
            match self.client.transaction_receipt(parsed).await {
                Ok(Some(receipt)) if receipt.success => {
                    tracing::info!(tx_hash = %hash, block_number = ?receipt.block_number, "Transfer confirmed");
                    return Ok(Landing::Mined(hash.clone()));
                }
                Ok(Some(_)) => reverted = true,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(tx_hash = %hash, error = %e, "Receipt lookup failed");
                }
            }
        }

        Ok(if reverted { Landing::Reverted } else { Landing::Unseen })
    }

    /// Poll until something lands or the polls run out.
    async fn await_landing(
        &self,
        job: &TransferJob,
        in_flight: &InFlight,
    ) -> DisburseResult<Landing> {
        for poll in 0..self.config.receipt_poll_attempts {
            if poll > 0 {
                time::sleep(Duration::from_millis(self.config.receipt_poll_interval_ms)).await;
            }
            match self.check_landed(job, in_flight).await? {
                Landing::Unseen => {
                    tracing::debug!(tx_hash = %in_flight.tx_hash, poll = poll, "Receipt not yet visible");
                }
                landing => return Ok(landing),
            }
        }
        Ok(Landing::Unseen)
    }

    /// Sender and recipient token balances, logged only.
    async fn log_balances(&self, target: &TransferTarget, stage: &'static str) {
        let (sender, recipient) = tokio::join!(
            self.client.token_balance_of(target.contract, self.builder.sender()),
            self.client.token_balance_of(target.contract, target.recipient),
        );
        match (sender, recipient) {
            (Ok(sender), Ok(recipient)) => tracing::info!(
                stage = stage,
                sender_balance = %sender,
                recipient_balance = %recipient,
                "Token balances"
            ),
            (Err(e), _) | (_, Err(e)) => {
                tracing::debug!(stage = stage, error = %e, "Token balance lookup failed");
            }
        }
    }

    async fn replace_in_flight(
        &self,
        job: &TransferJob,
        in_flight: InFlight,
    ) -> DisburseResult<InFlight> {
        let mut conn = self.store.acquire().await?;
        TransferJobRepository::set_in_flight(&mut conn, job.id, &self.worker_id, &in_flight)
            .await?;
        Ok(in_flight)
    }

    async fn settle(
        &self,
        job: &TransferJob,
        target: &TransferTarget,
        tx_hash: &str,
    ) -> DisburseResult<JobOutcome> {
        let settled = {
            let mut conn = self.store.acquire().await?;
            TransferJobRepository::mark_success(&mut conn, job.id, tx_hash, &self.worker_id).await?
        };
        if settled {
            metrics::record_job_settled("outbox");
            tracing::info!(tx_hash = %tx_hash, "Transfer job settled");
            self.log_balances(target, "after").await;
        }
        Ok(JobOutcome::Settled)
    }
}

fn claim_lost() -> JobOutcome {
    tracing::warn!("Job is no longer held by this worker, abandoning it");
    JobOutcome::ClaimLost
}
