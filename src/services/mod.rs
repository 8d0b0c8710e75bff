//! Services module for business logic

pub mod deposit;
pub mod ledger;
pub mod notification;
pub mod withdrawal;

pub use deposit::DepositService;
pub use ledger::LedgerPoster;
pub use notification::{LogNotifier, Notifier};
pub use withdrawal::WithdrawalService;
