//! Integration tests for launch-sniper

mod common;
mod config_test;
mod e2e_test;
mod ledger_test;
mod source_test;
