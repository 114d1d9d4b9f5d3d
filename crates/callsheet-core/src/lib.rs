//! callsheet-core library.
//!
//! # Conventions
//!
//! - **Errors**: engines return [`error::LedgerResult`]; infrastructure
//!   helpers (config, opening the database) return `anyhow::Result`.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `debug!`).
//! - **Atomicity**: every state change goes through
//!   [`store::Ledger::transact`].

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod lock;
pub mod model;
pub mod report;
pub mod store;
