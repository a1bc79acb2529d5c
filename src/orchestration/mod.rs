//! Orchestration: multi-step ledger mutations behind the HTTP surface.
//!
//! The services here compose the pure engines with the repository and the
//! external collaborators (oracle, wallet directory). Each public method is
//! one unit of work for the idempotency layer: it either completes entirely
//! or reports a failure that is safe to retry or replay.

pub mod reconcile;
pub mod trader;

pub use reconcile::{ImportedLot, Reconciler};
pub use trader::{TradeError, TradeService};
