//! Background workers

pub mod reconciliation;

pub use reconciliation::{PollReport, ReconcileError, ReconciliationEngine, WebhookDisposition};
