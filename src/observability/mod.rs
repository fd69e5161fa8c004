//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Approval handlers, outbox, scanner:
//!     → logging.rs (structured tracing events under per-worker spans)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint
//! ```

pub mod logging;
pub mod metrics;
