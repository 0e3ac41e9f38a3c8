//! Debt statements (sub-ledgers) of receivable and payable control accounts

pub mod reconstructor;

pub use reconstructor::*;
