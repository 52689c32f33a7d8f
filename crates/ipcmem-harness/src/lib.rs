//! Stress harness for the ipcmem allocation engine.
//!
//! This crate provides:
//! - Stress runs: drive one dispatcher from many threads, in waves, and check
//!   every block's contents before it is freed
//! - Size-class tables: render the routing table as markdown or JSON
//! - Report generation: human-readable + machine-readable run reports

pub mod config;
pub mod error;
pub mod logging;
pub mod report;
pub mod runner;
pub mod table;

pub use error::HarnessError;
pub use report::StressReport;
pub use runner::StressRunner;
pub use table::TableReport;
