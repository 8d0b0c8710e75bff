//! Persistence for deposits, withdrawals and the accounts they touch
//!
//! Two backends implement the [`Store`] traits: [`PgStore`] on Postgres and
//! [`MemoryStore`] for tests and database-less runs. Both serialize every
//! check-and-set per record.

pub mod error;
pub mod memory;
pub mod models;
#[cfg(feature = "database")]
pub mod postgres;
pub mod store;

pub use error::DatabaseError;
pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgStore;
pub use store::{AccountStore, Store, StoreResult, TransactionStore, WithdrawalStore};
