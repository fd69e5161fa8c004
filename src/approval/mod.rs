//! Multi-party approval of disbursement intents.

pub mod service;

pub use service::{
    ApprovalService, CreateIntentRequest, IntentDetail, VoteOutcome, VoteRequest,
};
