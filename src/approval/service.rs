//! Approval state machine.
//!
//! Intents move Pending → Approved once enough distinct addresses vote for
//! them, or immediately when the creator holds full permission. Approval and
//! job enqueue always commit together.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use crate::config::ApprovalConfig;
use crate::error::{DisburseError, DisburseResult};
use crate::observability::metrics;
use crate::store::{
    address_key, Approval, ApprovalRepository, ApproverRepository, Intent, IntentRepository,
    IntentStatus, LedgerStore, NewIntent, NewTransferJob, Page, PageRequest, TokenRepository,
    TransferJob, TransferJobRepository, Vote,
};

pub const MAX_DESCRIPTION_LEN: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub destination: String,
    #[serde(alias = "token")]
    pub token_id: i64,
    /// Base units as a decimal string.
    pub amount: String,
    #[serde(default)]
    pub description: String,
    pub creator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub intent_id: i64,
    pub approver_id: String,
    #[serde(alias = "approverAddr")]
    pub approver_address: String,
    pub vote: Vote,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub intent: Intent,
    pub approvals: i64,
    pub quorum: u32,
    /// True only for the vote that crossed the quorum.
    pub approved_now: bool,
    pub transfer: Option<TransferJob>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentDetail {
    pub intent: Intent,
    pub approvals: Vec<Approval>,
    pub transfer: Option<TransferJob>,
}

#[derive(Clone)]
pub struct ApprovalService {
    store: LedgerStore,
    config: ApprovalConfig,
}

impl ApprovalService {
    pub fn new(store: LedgerStore, config: ApprovalConfig) -> Self {
        Self { store, config }
    }

    pub fn quorum(&self) -> u32 {
        self.config.quorum
    }

    /// Record a new intent. A creator with full permission approves it outright
    /// and its transfer job is enqueued in the same transaction.
    pub async fn create_intent(&self, request: CreateIntentRequest) -> DisburseResult<Intent> {
        let destination = parse_address("destination", &request.destination)?;
        if destination == Address::ZERO {
            return Err(DisburseError::Validation(
                "destination must not be the zero address".to_string(),
            ));
        }
        let amount = parse_amount(&request.amount)?;
        if request.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(DisburseError::Validation(format!(
                "description exceeds {MAX_DESCRIPTION_LEN} characters"
            )));
        }
        let creator = request.creator.trim();
        if creator.is_empty() {
            return Err(DisburseError::Validation("creator is required".to_string()));
        }

        let mut tx = self.store.begin().await?;

        let token = TokenRepository::find(&mut tx, request.token_id)
            .await?
            .ok_or_else(|| DisburseError::NotFound(format!("token {}", request.token_id)))?;

        let privileged = ApproverRepository::has_full_permission(&mut tx, creator).await?;
        let status = if privileged {
            IntentStatus::Approved
        } else {
            IntentStatus::Pending
        };

        let intent = IntentRepository::insert(
            &mut tx,
            &NewIntent {
                destination: address_key(&destination),
                token_id: token.id,
                amount: amount.to_string(),
                description: request.description.clone(),
                status,
                created_by: creator.to_string(),
            },
        )
        .await?;

        if privileged {
            let job = TransferJobRepository::insert(
                &mut tx,
                &NewTransferJob::for_intent(&intent, &token, creator),
            )
            .await?;
            tracing::info!(
                intent_id = intent.id,
                job_id = job.as_ref().map(|j| j.id),
                creator = %creator,
                "Intent auto-approved by privileged creator"
            );
            metrics::record_intent_approved();
        }

        tx.commit().await?;

        tracing::info!(
            intent_id = intent.id,
            status = ?intent.status,
            token = %token.symbol,
            amount = %intent.amount,
            "Intent created"
        );
        Ok(intent)
    }

    /// Append a vote and approve the intent once distinct approvals reach quorum.
    ///
    /// Everything happens in one transaction; a failure leaves no trace.
    pub async fn cast_vote(&self, request: VoteRequest) -> DisburseResult<VoteOutcome> {
        let approver_address = parse_address("approverAddress", &request.approver_address)?;
        let approver_id = request.approver_id.trim();
        if approver_id.is_empty() {
            return Err(DisburseError::Validation("approverId is required".to_string()));
        }

        let mut tx = self.store.begin().await?;

        let intent = IntentRepository::find(&mut tx, request.intent_id)
            .await?
            .ok_or_else(|| DisburseError::NotFound(format!("intent {}", request.intent_id)))?;

        ApprovalRepository::insert(
            &mut tx,
            intent.id,
            approver_id,
            &address_key(&approver_address),
            request.vote,
        )
        .await?;

        let approvals = ApprovalRepository::count_distinct_approved(&mut tx, intent.id).await?;
        let mut approved_now = false;

        if approvals >= i64::from(self.config.quorum) && intent.status != IntentStatus::Approved {
            approved_now = self.approve(&mut tx, &intent, approver_id).await?;
        }

        let intent = IntentRepository::find(&mut tx, intent.id)
            .await?
            .ok_or_else(|| DisburseError::NotFound(format!("intent {}", request.intent_id)))?;
        let transfer = TransferJobRepository::find_by_intent(&mut tx, intent.id).await?;

        tx.commit().await?;

        metrics::record_vote(request.vote.as_str());
        tracing::info!(
            intent_id = intent.id,
            approver = %approver_id,
            vote = request.vote.as_str(),
            approvals = approvals,
            quorum = self.config.quorum,
            approved_now = approved_now,
            "Vote recorded"
        );

        Ok(VoteOutcome {
            intent,
            approvals,
            quorum: self.config.quorum,
            approved_now,
            transfer,
        })
    }

    /// Flip to Approved and enqueue the job. Returns false if another vote
    /// got there first.
    async fn approve(
        &self,
        conn: &mut SqliteConnection,
        intent: &Intent,
        approver_id: &str,
    ) -> DisburseResult<bool> {
        if !IntentRepository::mark_approved(conn, intent.id, approver_id).await? {
            return Ok(false);
        }

        let token = TokenRepository::find(conn, intent.token_id)
            .await?
            .ok_or_else(|| DisburseError::NotFound(format!("token {}", intent.token_id)))?;

        let job = TransferJobRepository::insert(
            conn,
            &NewTransferJob::for_intent(intent, &token, approver_id),
        )
        .await?;

        match job {
            Some(job) => {
                tracing::info!(intent_id = intent.id, job_id = job.id, "Quorum reached, transfer enqueued");
            }
            None => {
                tracing::warn!(intent_id = intent.id, "Quorum reached but a transfer job already exists");
            }
        }
        metrics::record_intent_approved();
        Ok(true)
    }

    pub async fn page_intents(&self, request: PageRequest) -> DisburseResult<Page<Intent>> {
        let mut conn = self.store.acquire().await?;
        let total = IntentRepository::count(&mut conn).await?;
        let list = IntentRepository::page(&mut conn, request.limit(), request.offset()).await?;
        Ok(Page::new(request, total, list))
    }

    pub async fn intent_detail(&self, id: i64) -> DisburseResult<IntentDetail> {
        let mut conn = self.store.acquire().await?;
        let intent = IntentRepository::find(&mut conn, id)
            .await?
            .ok_or_else(|| DisburseError::NotFound(format!("intent {id}")))?;
        let approvals = ApprovalRepository::list_for_intent(&mut conn, id).await?;
        let transfer = TransferJobRepository::find_by_intent(&mut conn, id).await?;
        Ok(IntentDetail {
            intent,
            approvals,
            transfer,
        })
    }
}

fn parse_address(field: &str, raw: &str) -> DisburseResult<Address> {
    raw.trim()
        .parse()
        .map_err(|_| DisburseError::Validation(format!("{field} '{raw}' is not a valid address")))
}

/// Positive 256-bit integer in base 10.
fn parse_amount(raw: &str) -> DisburseResult<U256> {
    let amount = U256::from_str_radix(raw.trim(), 10)
        .map_err(|_| DisburseError::Validation(format!("amount '{raw}' is not an integer")))?;
    if amount.is_zero() {
        return Err(DisburseError::Validation("amount must be positive".to_string()));
    }
    Ok(amount)
}
