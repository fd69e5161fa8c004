//! Transfer outbox: turns approved intents into submitted transactions.

pub mod engine;

pub use engine::{JobOutcome, OutboxEngine, TickSummary};
