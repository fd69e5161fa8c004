//! Approval state machine: quorum counting, privileged creators and input
//! validation.

mod common;

use quorum_disburser::approval::{ApprovalService, VoteRequest};
use quorum_disburser::config::ApprovalConfig;
use quorum_disburser::store::{
    IntentStatus, PageRequest, TransferJobRepository, TransferStatus, Vote,
};
use quorum_disburser::DisburseError;

use common::*;

fn vote(intent_id: i64, approver: &str, address: &str, vote: Vote) -> VoteRequest {
    VoteRequest {
        intent_id,
        approver_id: approver.to_string(),
        approver_address: address.to_string(),
        vote,
    }
}

async fn job_count(store: &quorum_disburser::LedgerStore) -> i64 {
    let mut conn = store.acquire().await.unwrap();
    TransferJobRepository::count(&mut conn, None).await.unwrap()
}

#[tokio::test]
async fn test_partial_creator_leaves_intent_pending() {
    let store = seeded_store().await;
    let service = approval_service(&store);

    let intent = service
        .create_intent(intent_request(&store, "1000", FINANCE).await)
        .await
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Pending);
    assert_eq!(intent.destination, RECIPIENT.to_lowercase());
    assert_eq!(intent.amount, "1000");
    assert_eq!(job_count(&store).await, 0);
}

#[tokio::test]
async fn test_quorum_of_distinct_addresses_approves_once() {
    let store = seeded_store().await;
    let service = approval_service(&store);
    let intent = service
        .create_intent(intent_request(&store, "1000", "alice").await)
        .await
        .unwrap();

    let first = service
        .cast_vote(vote(intent.id, "finance", FINANCE, Vote::Approved))
        .await
        .unwrap();
    assert_eq!(first.approvals, 1);
    assert!(!first.approved_now);
    assert!(first.transfer.is_none());
    assert_eq!(first.intent.status, IntentStatus::Pending);

    // Same address again, different casing: still one distinct approver.
    let repeat = service
        .cast_vote(vote(intent.id, "finance", &FINANCE.to_lowercase(), Vote::Approved))
        .await
        .unwrap();
    assert_eq!(repeat.approvals, 1);
    assert!(!repeat.approved_now);

    let second = service
        .cast_vote(vote(intent.id, "ops", OPS, Vote::Approved))
        .await
        .unwrap();
    assert_eq!(second.approvals, 2);
    assert!(second.approved_now);
    assert_eq!(second.intent.status, IntentStatus::Approved);
    assert_eq!(second.intent.updated_by.as_deref(), Some("ops"));

    let transfer = second.transfer.unwrap();
    assert_eq!(transfer.status, TransferStatus::Pending);
    assert_eq!(transfer.amount, "1000");
    assert_eq!(transfer.to_address, RECIPIENT.to_lowercase());
    assert_eq!(transfer.contract_address, TOKEN.to_lowercase());
    assert_eq!(transfer.retry_count, 0);

    let third = service
        .cast_vote(vote(intent.id, "treasury", TREASURY, Vote::Approved))
        .await
        .unwrap();
    assert_eq!(third.approvals, 3);
    assert!(!third.approved_now);
    assert_eq!(third.transfer.map(|t| t.id), Some(transfer.id));
    assert_eq!(job_count(&store).await, 1);
}

#[tokio::test]
async fn test_rejections_do_not_count_toward_quorum() {
    let store = seeded_store().await;
    let service = approval_service(&store);
    let intent = service
        .create_intent(intent_request(&store, "5", "alice").await)
        .await
        .unwrap();

    service
        .cast_vote(vote(intent.id, "finance", FINANCE, Vote::Rejected))
        .await
        .unwrap();
    let outcome = service
        .cast_vote(vote(intent.id, "ops", OPS, Vote::Rejected))
        .await
        .unwrap();
    assert_eq!(outcome.approvals, 0);
    assert_eq!(outcome.intent.status, IntentStatus::Pending);

    let detail = service.intent_detail(intent.id).await.unwrap();
    assert_eq!(detail.approvals.len(), 2);
    assert!(detail.transfer.is_none());
}

#[tokio::test]
async fn test_full_permission_creator_approves_immediately() {
    let store = seeded_store().await;
    let service = approval_service(&store);

    // Matched case-insensitively against the registry.
    let intent = service
        .create_intent(intent_request(&store, "12", &TREASURY.to_lowercase()).await)
        .await
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Approved);

    let detail = service.intent_detail(intent.id).await.unwrap();
    assert!(detail.approvals.is_empty());
    let job = detail.transfer.unwrap();
    assert_eq!(job.intent_id, intent.id);
    assert_eq!(job.status, TransferStatus::Pending);
}

#[tokio::test]
async fn test_single_vote_quorum() {
    let store = seeded_store().await;
    let service = ApprovalService::new(store.clone(), ApprovalConfig { quorum: 1 });
    let intent = service
        .create_intent(intent_request(&store, "3", "alice").await)
        .await
        .unwrap();

    let outcome = service
        .cast_vote(vote(intent.id, "ops", OPS, Vote::Approved))
        .await
        .unwrap();
    assert!(outcome.approved_now);
    assert!(outcome.transfer.is_some());
}

#[tokio::test]
async fn test_concurrent_votes_enqueue_one_job() {
    let store = seeded_store().await;
    let service = ApprovalService::new(store.clone(), ApprovalConfig { quorum: 1 });
    let intent = service
        .create_intent(intent_request(&store, "3", "alice").await)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        service.cast_vote(vote(intent.id, "finance", FINANCE, Vote::Approved)),
        service.cast_vote(vote(intent.id, "ops", OPS, Vote::Approved)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.approved_now ^ b.approved_now);
    assert_eq!(job_count(&store).await, 1);
}

#[tokio::test]
async fn test_vote_on_unknown_intent_leaves_no_trace() {
    let store = seeded_store().await;
    let service = approval_service(&store);

    let err = service
        .cast_vote(vote(404, "ops", OPS, Vote::Approved))
        .await
        .unwrap_err();
    assert!(matches!(err, DisburseError::NotFound(_)));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM approvals")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_vote_requires_valid_approver() {
    let store = seeded_store().await;
    let service = approval_service(&store);
    let intent = service
        .create_intent(intent_request(&store, "3", "alice").await)
        .await
        .unwrap();

    let err = service
        .cast_vote(vote(intent.id, "ops", "0xnope", Vote::Approved))
        .await
        .unwrap_err();
    assert!(matches!(err, DisburseError::Validation(_)));

    let err = service
        .cast_vote(vote(intent.id, "  ", OPS, Vote::Approved))
        .await
        .unwrap_err();
    assert!(matches!(err, DisburseError::Validation(_)));
}

#[tokio::test]
async fn test_create_intent_validation() {
    let store = seeded_store().await;
    let service = approval_service(&store);

    let mut zero = intent_request(&store, "1", "alice").await;
    zero.destination = format!("0x{}", "0".repeat(40));
    assert!(matches!(
        service.create_intent(zero).await.unwrap_err(),
        DisburseError::Validation(_)
    ));

    for amount in ["0", "-1", "1.5", "ten", ""] {
        let request = intent_request(&store, amount, "alice").await;
        assert!(
            matches!(
                service.create_intent(request).await.unwrap_err(),
                DisburseError::Validation(_)
            ),
            "amount {amount:?} accepted"
        );
    }

    let mut long = intent_request(&store, "1", "alice").await;
    long.description = "x".repeat(1025);
    assert!(matches!(
        service.create_intent(long).await.unwrap_err(),
        DisburseError::Validation(_)
    ));

    let mut anonymous = intent_request(&store, "1", "alice").await;
    anonymous.creator = " ".to_string();
    assert!(matches!(
        service.create_intent(anonymous).await.unwrap_err(),
        DisburseError::Validation(_)
    ));

    let mut unknown_token = intent_request(&store, "1", "alice").await;
    unknown_token.token_id = 999;
    assert!(matches!(
        service.create_intent(unknown_token).await.unwrap_err(),
        DisburseError::NotFound(_)
    ));

    let page = service.page_intents(PageRequest::default()).await.unwrap();
    assert!(page.list.is_empty());
}

#[tokio::test]
async fn test_intents_page_newest_first() {
    let store = seeded_store().await;
    let service = approval_service(&store);
    for amount in ["1", "2", "3"] {
        service
            .create_intent(intent_request(&store, amount, "alice").await)
            .await
            .unwrap();
    }

    let page = service.page_intents(PageRequest::new(1, 2)).await.unwrap();
    assert_eq!(page.total_page, 2);
    assert_eq!(page.list.len(), 2);
    assert_eq!(page.list[0].amount, "3");

    let page = service.page_intents(PageRequest::new(2, 2)).await.unwrap();
    assert_eq!(page.list.len(), 1);
    assert_eq!(page.list[0].amount, "1");
}
