//! # Journal Core
//!
//! Double-entry journal entries for business documents, and the debt
//! statements (receivable / payable sub-ledgers) rebuilt from them.
//!
//! ## Features
//!
//! - **Journal engine**: create, replace, delete and confirm the journal entry
//!   of a sales receipt, purchase receipt or voucher, with the debit = credit
//!   check and `JE_YYYYMMDD_NNN` codes
//! - **Debt statements**: running-balance sub-ledger of a control account
//!   (131, 331) for one customer or supplier over a period
//! - **Storage abstraction**: database-agnostic design with trait-based,
//!   transactional storage
//!
//! ## Quick Start
//!
//! ```rust
//! use journal_core::{AccountRef, EntryOptions, JournalEngine, LineSpec, SourceReference};
//! use journal_core::utils::MemoryStorage;
//! use bigdecimal::BigDecimal;
//!
//! # async fn run() -> journal_core::JournalResult<()> {
//! let storage = MemoryStorage::new();
//! let engine = JournalEngine::new(storage);
//! let sale = SourceReference::new("sales_receipt", 12);
//! let lines = vec![
//!     LineSpec::debit(AccountRef::code("131"), BigDecimal::from(1_000_000)),
//!     LineSpec::credit(AccountRef::code("511"), BigDecimal::from(1_000_000)),
//! ];
//! // Accounts "131" and "511" must exist in storage for this to succeed.
//! let _entry = engine.create_from_source(&sale, &lines, EntryOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod journal;
pub mod statement;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use crate::config::JournalConfig;
pub use journal::*;
pub use statement::*;
pub use traits::*;
pub use types::*;
