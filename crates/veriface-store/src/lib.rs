//! veriface-store — bounded, persisted audit ledger for verification attempts.

pub mod ledger;

pub use ledger::{Ledger, LedgerError, LEDGER_CAP};
