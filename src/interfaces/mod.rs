//! Outer surfaces: file formats the ledger is read from and reported to.

pub mod csv;
