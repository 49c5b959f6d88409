//! Domain layer: money, payment events, the ledger and the provider ports.

pub mod event;
pub mod instrument;
pub mod ledger;
pub mod money;
pub mod ports;
