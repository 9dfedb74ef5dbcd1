// Thin re-export module: implementation is split across `ledger/` to keep
// chain management, balance state, and block validation separable.

pub mod chain;
pub mod state;
pub mod validation;

pub use chain::{ApplyOutcome, Block, Ledger, GENESIS_TIMESTAMP};
pub use state::{Balances, INITIAL_BALANCE};
