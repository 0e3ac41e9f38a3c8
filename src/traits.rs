//! Traits for storage abstraction and time

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::types::*;

/// Storage abstraction for the journal engine
///
/// Reads that do not need isolation go through the storage handle directly.
/// Every write happens inside a [`JournalTransaction`] obtained from
/// [`JournalStorage::begin`], so a backend (PostgreSQL, MySQL, SQLite,
/// in-memory, ...) only has to map these methods onto its own rows.
#[async_trait]
pub trait JournalStorage: Send + Sync {
    /// Transaction handle returned by [`JournalStorage::begin`]
    type Tx: JournalTransaction;

    /// Open an atomic transaction scope
    async fn begin(&self) -> JournalResult<Self::Tx>;

    /// Find an account by its chart-of-accounts code
    async fn find_account_by_code(&self, account_code: &str) -> JournalResult<Option<Account>>;

    /// Get an account by ID
    async fn get_account(&self, account_id: AccountId) -> JournalResult<Option<Account>>;

    /// All entries posted for a source document, newest first
    async fn list_entries_by_reference(
        &self,
        reference: &SourceReference,
    ) -> JournalResult<Vec<JournalEntry>>;

    /// All lines of an entry, in insertion order
    async fn list_lines(&self, entry_id: JournalEntryId) -> JournalResult<Vec<JournalLine>>;

    /// Lines of every journal entry whose source document belongs to the
    /// counterparty and whose entry date falls in the range, joined with the
    /// entry header, the source document and the line's account.
    ///
    /// Only entries carrying at least one line on the control account need
    /// to be returned, but returning more is harmless.
    async fn query_ledger_rows(&self, query: &LedgerQuery) -> JournalResult<Vec<RawLedgerRow>>;
}

/// Writes (and isolated reads) within one atomic scope
///
/// Dropping a transaction without calling [`commit`](JournalTransaction::commit)
/// must discard its writes.
#[async_trait]
pub trait JournalTransaction: Send {
    /// The entry posted for a source document, if any
    async fn find_entry_by_reference(
        &mut self,
        reference: &SourceReference,
    ) -> JournalResult<Option<JournalEntry>>;

    /// All entries posted for a source document, newest first
    async fn list_entries_by_reference(
        &mut self,
        reference: &SourceReference,
    ) -> JournalResult<Vec<JournalEntry>>;

    /// Code of the most recent entry (highest id) whose code starts with `prefix`
    async fn latest_code_with_prefix(&mut self, prefix: &str) -> JournalResult<Option<String>>;

    /// Insert a header; fails with [`JournalError::DuplicateCode`] when the
    /// code is already taken
    async fn create_entry(&mut self, entry: &NewJournalEntry) -> JournalResult<JournalEntry>;

    /// Rewrite header fields, returning whether the entry existed
    async fn update_entry(
        &mut self,
        entry_id: JournalEntryId,
        changes: &JournalEntryChanges,
    ) -> JournalResult<bool>;

    /// Delete a header, returning whether it existed
    async fn delete_entry(&mut self, entry_id: JournalEntryId) -> JournalResult<bool>;

    /// Insert a line
    async fn create_line(&mut self, line: &NewJournalLine) -> JournalResult<JournalLine>;

    /// Delete a line, returning whether it existed
    async fn delete_line(&mut self, line_id: JournalLineId) -> JournalResult<bool>;

    /// All lines of an entry as seen by this transaction
    async fn list_lines(&mut self, entry_id: JournalEntryId) -> JournalResult<Vec<JournalLine>>;

    /// Make every write of this scope visible
    async fn commit(self) -> JournalResult<()>;

    /// Discard every write of this scope
    async fn rollback(self) -> JournalResult<()>;
}

/// Source of "now" for code generation and default entry dates
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}
