//! launch-sniper: detect newly launched tokens and buy each qualifying one at most once
//!
//! This library provides the core components for:
//! - Launch feed ingestion over WebSocket with reconnect and dedup
//! - A lease-based evaluation ledger shared across processes (SQLite)
//! - An ordered eligibility filter chain with deferral
//! - Execution coordination with at-most-once venue submission
//! - A concurrent ingestion pipeline and operator retry worker
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod filter;
pub mod ledger;
pub mod notify;
pub mod pipeline;
pub mod sentiment;
pub mod source;
pub mod telemetry;
pub mod venue;
pub mod worker;
pub mod ws;
