//! Application layer containing the payment workflow orchestration.
//!
//! [`engine::PaymentEngine`] is the primary entry point. It delegates to one
//! processor per workflow and reads balances through
//! [`history::PaymentHistory`], a pure projection over a ledger snapshot.

pub mod engine;
pub mod history;
pub mod processor;

#[cfg(test)]
pub(crate) mod fixtures;
