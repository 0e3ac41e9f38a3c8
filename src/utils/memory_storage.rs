//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::traits::*;
use crate::types::*;
use crate::utils::validation::is_sub_account;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    documents: HashMap<SourceReference, SourceDocument>,
    entries: BTreeMap<JournalEntryId, JournalEntry>,
    lines: BTreeMap<JournalLineId, JournalLine>,
    last_entry_id: i64,
    last_line_id: i64,
}

impl MemoryState {
    fn entries_by_reference(&self, reference: &SourceReference) -> Vec<JournalEntry> {
        self.entries
            .values()
            .rev()
            .filter(|entry| {
                entry.reference_type == reference.reference_type
                    && entry.reference_id == reference.reference_id
            })
            .cloned()
            .collect()
    }

    fn lines_of(&self, entry_id: JournalEntryId) -> Vec<JournalLine> {
        self.lines
            .values()
            .filter(|line| line.journal_entry_id == entry_id)
            .cloned()
            .collect()
    }
}

/// In-memory storage implementation for testing and development
///
/// Transactions are serialized: a transaction holds the store lock from
/// `begin` until `commit`/`rollback` and works on a staged copy, so
/// concurrent writers never observe each other's partial state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
    line_inserts_before_failure: Arc<AtomicUsize>,
    entry_code_collisions: Arc<AtomicUsize>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account of the chart of accounts
    pub async fn add_account(&self, account: Account) {
        let mut state = self.state.lock().await;
        state.accounts.insert(account.id, account);
    }

    /// Remove an account, leaving any line that points at it dangling
    pub async fn remove_account(&self, account_id: AccountId) -> bool {
        self.state
            .lock()
            .await
            .accounts
            .remove(&account_id)
            .is_some()
    }

    /// Register the business document a reference points at
    pub async fn register_document(&self, document: SourceDocument) {
        let mut state = self.state.lock().await;
        state.documents.insert(document.reference.clone(), document);
    }

    /// Make the `n`-th line insert from now on fail with a storage error
    /// (1-based; 0 disables the fault)
    pub fn fail_line_insert_after(&self, n: usize) {
        self.line_inserts_before_failure.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` header inserts fail as if another writer had just
    /// taken their code
    pub fn collide_next_entry_codes(&self, n: usize) {
        self.entry_code_collisions.store(n, Ordering::SeqCst);
    }

    /// Number of entry headers currently stored
    pub async fn entry_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Number of journal lines currently stored
    pub async fn line_count(&self) -> usize {
        self.state.lock().await.lines.len()
    }
}

/// Transaction over [`MemoryStorage`]
#[derive(Debug)]
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    line_inserts_before_failure: Arc<AtomicUsize>,
    entry_code_collisions: Arc<AtomicUsize>,
}

#[async_trait]
impl JournalStorage for MemoryStorage {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> JournalResult<MemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTransaction {
            guard,
            staged,
            line_inserts_before_failure: self.line_inserts_before_failure.clone(),
            entry_code_collisions: self.entry_code_collisions.clone(),
        })
    }

    async fn find_account_by_code(&self, account_code: &str) -> JournalResult<Option<Account>> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .values()
            .find(|account| account.account_code == account_code)
            .cloned())
    }

    async fn get_account(&self, account_id: AccountId) -> JournalResult<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(&account_id).cloned())
    }

    async fn list_entries_by_reference(
        &self,
        reference: &SourceReference,
    ) -> JournalResult<Vec<JournalEntry>> {
        Ok(self.state.lock().await.entries_by_reference(reference))
    }

    async fn list_lines(&self, entry_id: JournalEntryId) -> JournalResult<Vec<JournalLine>> {
        Ok(self.state.lock().await.lines_of(entry_id))
    }

    async fn query_ledger_rows(&self, query: &LedgerQuery) -> JournalResult<Vec<RawLedgerRow>> {
        let state = self.state.lock().await;
        let mut rows = Vec::new();

        for entry in state.entries.values() {
            let Some(document) = state.documents.get(&entry.reference()) else {
                continue;
            };
            if document.counterparty_id != query.counterparty_id {
                continue;
            }
            let transaction_date = entry.entry_date.date();
            if !query.date_range.contains(transaction_date) {
                continue;
            }

            let lines = state.lines_of(entry.id);
            let account_of = |line: &JournalLine| state.accounts.get(&line.account_id);
            let touches_control = lines.iter().any(|line| {
                account_of(line).is_some_and(|account| {
                    is_sub_account(&account.account_code, &query.control_account_code)
                })
            });
            if !touches_control {
                continue;
            }

            for line in lines {
                let (account_code, account_name) = account_of(&line)
                    .map(|account| (account.account_code.clone(), account.name.clone()))
                    .unwrap_or_default();
                rows.push(RawLedgerRow {
                    journal_entry_id: entry.id,
                    line_id: line.id,
                    transaction_date,
                    reference_code: document.code.clone(),
                    reference_type: entry.reference_type.clone(),
                    account_code,
                    account_name,
                    debit: line.debit,
                    credit: line.credit,
                    sort_key: LedgerSortKey {
                        document_rank: entry.reference_type.sort_rank(),
                        sequence: entry.id.0,
                    },
                });
            }
        }

        Ok(rows)
    }
}

#[async_trait]
impl JournalTransaction for MemoryTransaction {
    async fn find_entry_by_reference(
        &mut self,
        reference: &SourceReference,
    ) -> JournalResult<Option<JournalEntry>> {
        Ok(self.staged.entries_by_reference(reference).into_iter().next())
    }

    async fn list_entries_by_reference(
        &mut self,
        reference: &SourceReference,
    ) -> JournalResult<Vec<JournalEntry>> {
        Ok(self.staged.entries_by_reference(reference))
    }

    async fn latest_code_with_prefix(&mut self, prefix: &str) -> JournalResult<Option<String>> {
        Ok(self
            .staged
            .entries
            .values()
            .rev()
            .find(|entry| entry.code.starts_with(prefix))
            .map(|entry| entry.code.clone()))
    }

    async fn create_entry(&mut self, entry: &NewJournalEntry) -> JournalResult<JournalEntry> {
        let collisions = self.entry_code_collisions.load(Ordering::SeqCst);
        if collisions > 0 {
            self.entry_code_collisions
                .store(collisions - 1, Ordering::SeqCst);
            return Err(JournalError::DuplicateCode(entry.code.clone()));
        }
        if self.staged.entries.values().any(|e| e.code == entry.code) {
            return Err(JournalError::DuplicateCode(entry.code.clone()));
        }

        self.staged.last_entry_id += 1;
        let created = JournalEntry {
            id: JournalEntryId(self.staged.last_entry_id),
            code: entry.code.clone(),
            reference_type: entry.reference.reference_type.clone(),
            reference_id: entry.reference.reference_id,
            entry_date: entry.entry_date,
            note: entry.note.clone(),
            created_by: entry.created_by,
            status: entry.status,
            created_at: entry.created_at,
            updated_at: entry.created_at,
        };
        self.staged.entries.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_entry(
        &mut self,
        entry_id: JournalEntryId,
        changes: &JournalEntryChanges,
    ) -> JournalResult<bool> {
        let Some(entry) = self.staged.entries.get_mut(&entry_id) else {
            return Ok(false);
        };
        if let Some(note) = &changes.note {
            entry.note = note.clone();
        }
        if let Some(entry_date) = changes.entry_date {
            entry.entry_date = entry_date;
        }
        if let Some(status) = changes.status {
            entry.status = status;
        }
        entry.updated_at = changes.updated_at;
        Ok(true)
    }

    async fn delete_entry(&mut self, entry_id: JournalEntryId) -> JournalResult<bool> {
        Ok(self.staged.entries.remove(&entry_id).is_some())
    }

    async fn create_line(&mut self, line: &NewJournalLine) -> JournalResult<JournalLine> {
        let remaining = self.line_inserts_before_failure.load(Ordering::SeqCst);
        if remaining > 0 {
            self.line_inserts_before_failure
                .store(remaining - 1, Ordering::SeqCst);
            if remaining == 1 {
                return Err(JournalError::Storage(
                    "injected failure writing journal line".to_string(),
                ));
            }
        }

        if !self.staged.entries.contains_key(&line.journal_entry_id) {
            return Err(JournalError::EntryNotFound(line.journal_entry_id.to_string()));
        }

        self.staged.last_line_id += 1;
        let created = JournalLine {
            id: JournalLineId(self.staged.last_line_id),
            journal_entry_id: line.journal_entry_id,
            account_id: line.account_id,
            debit: line.debit.clone(),
            credit: line.credit.clone(),
        };
        self.staged.lines.insert(created.id, created.clone());
        Ok(created)
    }

    async fn delete_line(&mut self, line_id: JournalLineId) -> JournalResult<bool> {
        Ok(self.staged.lines.remove(&line_id).is_some())
    }

    async fn list_lines(&mut self, entry_id: JournalEntryId) -> JournalResult<Vec<JournalLine>> {
        Ok(self.staged.lines_of(entry_id))
    }

    async fn commit(mut self) -> JournalResult<()> {
        *self.guard = self.staged;
        Ok(())
    }

    async fn rollback(self) -> JournalResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn header(code: &str) -> NewJournalEntry {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        NewJournalEntry {
            code: code.to_string(),
            reference: SourceReference::new(ReferenceType::SalesReceipt, 1),
            entry_date: at,
            note: "test".to_string(),
            created_by: UserId(1),
            status: EntryStatus::Draft,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let storage = MemoryStorage::new();

        let mut tx = storage.begin().await.unwrap();
        tx.create_entry(&header("JE_20240101_001")).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(storage.entry_count().await, 0);

        let mut tx = storage.begin().await.unwrap();
        tx.create_entry(&header("JE_20240101_001")).await.unwrap();
        drop(tx);
        assert_eq!(storage.entry_count().await, 0);

        let mut tx = storage.begin().await.unwrap();
        tx.create_entry(&header("JE_20240101_001")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(storage.entry_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_codes_are_rejected() {
        let storage = MemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        tx.create_entry(&header("JE_20240101_001")).await.unwrap();

        let err = tx
            .create_entry(&header("JE_20240101_001"))
            .await
            .unwrap_err();
        assert!(matches!(err, JournalError::DuplicateCode(code) if code == "JE_20240101_001"));
    }

    #[tokio::test]
    async fn latest_code_follows_insertion_order() {
        let storage = MemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        tx.create_entry(&header("JE_20240101_001")).await.unwrap();
        tx.create_entry(&header("JE_20240101_002")).await.unwrap();
        tx.create_entry(&header("JE_20240102_001")).await.unwrap();

        assert_eq!(
            tx.latest_code_with_prefix("JE_20240101_").await.unwrap(),
            Some("JE_20240101_002".to_string())
        );
        assert_eq!(tx.latest_code_with_prefix("JE_20240103_").await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_line_failure_fires_once() {
        let storage = MemoryStorage::new();
        storage.fail_line_insert_after(2);

        let mut tx = storage.begin().await.unwrap();
        let entry = tx.create_entry(&header("JE_20240101_001")).await.unwrap();
        let line = NewJournalLine {
            journal_entry_id: entry.id,
            account_id: AccountId(1),
            debit: BigDecimal::from(10),
            credit: BigDecimal::from(0),
        };
        assert!(tx.create_line(&line).await.is_ok());
        assert!(matches!(
            tx.create_line(&line).await,
            Err(JournalError::Storage(_))
        ));
        assert!(tx.create_line(&line).await.is_ok());
    }
}
