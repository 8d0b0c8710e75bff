//! PIX deposit and withdrawal backend.
//!
//! Deposits are confirmed by the provider's webhook or, as a fallback, by a
//! periodic status poll; both paths converge on one idempotent finalize that
//! posts the ledger effects exactly once.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
pub mod workers;
