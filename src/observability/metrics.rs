//! Metrics collection and exposition.
//!
//! # Metrics
//! - `disburser_votes_total` (counter): votes by outcome
//! - `disburser_intents_approved_total` (counter)
//! - `disburser_submissions_total` (counter): broadcasts by result
//! - `disburser_jobs_settled_total` (counter): settled jobs by path (outbox, scanner)
//! - `disburser_jobs_exhausted_total` (counter)
//! - `disburser_blocks_scanned_total` / `disburser_transactions_scanned_total` (counters)
//! - `disburser_scanner_high_water_mark` (gauge)

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_vote(vote: &'static str) {
    ::metrics::counter!("disburser_votes_total", "vote" => vote).increment(1);
}

pub fn record_intent_approved() {
    ::metrics::counter!("disburser_intents_approved_total").increment(1);
}

pub fn record_submission(result: &'static str) {
    ::metrics::counter!("disburser_submissions_total", "result" => result).increment(1);
}

pub fn record_job_settled(path: &'static str) {
    ::metrics::counter!("disburser_jobs_settled_total", "path" => path).increment(1);
}

pub fn record_job_exhausted() {
    ::metrics::counter!("disburser_jobs_exhausted_total").increment(1);
}

pub fn record_blocks_scanned(blocks: u64, transactions: u64, high_water_mark: u64) {
    ::metrics::counter!("disburser_blocks_scanned_total").increment(blocks);
    ::metrics::counter!("disburser_transactions_scanned_total").increment(transactions);
    ::metrics::gauge!("disburser_scanner_high_water_mark").set(high_water_mark as f64);
}
