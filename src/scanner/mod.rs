//! Chain reconciliation: independent confirmation of settlement from the ledger.

pub mod reconciler;

pub use reconciler::{scan_window, ChainScanner, ScanSummary};
