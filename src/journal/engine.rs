//! Journal entry creation, replacement and removal

use bigdecimal::BigDecimal;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

use crate::config::JournalConfig;
use crate::journal::code;
use crate::traits::*;
use crate::types::*;
use crate::utils::clock::SystemClock;
use crate::utils::validation::{check_balance, line_totals, validate_line_shape, within_tolerance};

/// A line whose account reference has been resolved
#[derive(Debug, Clone)]
struct ResolvedLine {
    account: Account,
    debit: BigDecimal,
    credit: BigDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Create,
    Upsert,
}

/// Journal engine posting double-entry entries for business documents
pub struct JournalEngine<S: JournalStorage> {
    storage: S,
    clock: Box<dyn Clock>,
    config: JournalConfig,
}

impl<S: JournalStorage> JournalEngine<S> {
    /// Create an engine with the system clock and default configuration
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, JournalConfig::default())
    }

    pub fn with_config(storage: S, config: JournalConfig) -> Self {
        Self {
            storage,
            clock: Box::new(SystemClock),
            config,
        }
    }

    /// Replace the clock that drives codes and default entry dates
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Whether the lines balance within the configured tolerance
    pub fn validate_balance(&self, lines: &[LineSpec]) -> bool {
        let (debit, credit) = line_totals(lines);
        within_tolerance(&debit, &credit, &self.config.balance_tolerance)
    }

    /// Post a new journal entry for a source document
    #[instrument(
        name = "journal_core.journals.create_from_source",
        skip(self, lines, options),
        fields(reference = %reference, lines = lines.len()),
        err
    )]
    pub async fn create_from_source(
        &self,
        reference: &SourceReference,
        lines: &[LineSpec],
        options: EntryOptions,
    ) -> JournalResult<JournalEntryDetail> {
        let resolved = self.checked_lines(lines).await?;
        self.write_entry(reference, &resolved, &options, WriteMode::Create)
            .await
    }

    /// Replace the lines of the entry posted for a source document.
    ///
    /// An empty line set removes the entry and returns `None`; a missing
    /// entry is created.
    #[instrument(
        name = "journal_core.journals.update_by_source",
        skip(self, lines, options),
        fields(reference = %reference, lines = lines.len()),
        err
    )]
    pub async fn update_by_source(
        &self,
        reference: &SourceReference,
        lines: &[LineSpec],
        options: EntryOptions,
    ) -> JournalResult<Option<JournalEntryDetail>> {
        if lines.is_empty() {
            self.delete_by_source(reference).await?;
            return Ok(None);
        }

        let resolved = self.checked_lines(lines).await?;
        self.write_entry(reference, &resolved, &options, WriteMode::Upsert)
            .await
            .map(Some)
    }

    /// Remove every entry (and its lines) posted for a source document.
    ///
    /// Returns `false` when there was nothing to delete.
    #[instrument(
        name = "journal_core.journals.delete_by_source",
        skip(self),
        fields(reference = %reference),
        err
    )]
    pub async fn delete_by_source(&self, reference: &SourceReference) -> JournalResult<bool> {
        let mut tx = self.storage.begin().await?;
        let result = Self::delete_in_tx(&mut tx, reference).await;
        let deleted = commit_or_rollback(tx, result).await?;

        if deleted > 0 {
            info!(entries = deleted, "journal entries deleted");
        } else {
            debug!("no journal entry to delete");
        }
        Ok(deleted > 0)
    }

    /// Entries posted for a source document, newest first, with their lines
    /// expanded to account code and name
    #[instrument(
        name = "journal_core.journals.get_by_source",
        skip(self),
        fields(reference = %reference),
        err
    )]
    pub async fn get_by_source(
        &self,
        reference: &SourceReference,
    ) -> JournalResult<Vec<JournalEntryView>> {
        let entries = self.storage.list_entries_by_reference(reference).await?;
        let mut accounts: HashMap<AccountId, Option<Account>> = HashMap::new();
        let mut views = Vec::with_capacity(entries.len());

        for entry in entries {
            let mut lines = Vec::new();
            for line in self.storage.list_lines(entry.id).await? {
                if !accounts.contains_key(&line.account_id) {
                    let account = self.storage.get_account(line.account_id).await?;
                    accounts.insert(line.account_id, account);
                }
                let (account_code, account_name) = match accounts.get(&line.account_id) {
                    Some(Some(account)) => (account.account_code.clone(), account.name.clone()),
                    _ => (String::new(), String::new()),
                };
                lines.push(JournalLineView {
                    id: line.id,
                    account_id: line.account_id,
                    account_code,
                    account_name,
                    debit: line.debit,
                    credit: line.credit,
                });
            }

            views.push(JournalEntryView {
                id: entry.id,
                code: entry.code,
                reference_type: entry.reference_type,
                reference_id: entry.reference_id,
                entry_date: entry.entry_date,
                note: entry.note,
                status: entry.status,
                lines,
            });
        }

        Ok(views)
    }

    /// Mark the entry of a source document as posted.
    ///
    /// A document without an entry is logged as a consistency warning and
    /// yields `None`.
    #[instrument(
        name = "journal_core.journals.confirm_by_source",
        skip(self),
        fields(reference = %reference),
        err
    )]
    pub async fn confirm_by_source(
        &self,
        reference: &SourceReference,
    ) -> JournalResult<Option<JournalEntry>> {
        let mut tx = self.storage.begin().await?;
        let result = self.confirm_in_tx(&mut tx, reference).await;
        let confirmed = commit_or_rollback(tx, result).await?;

        match &confirmed {
            Some(entry) => info!(code = %entry.code, "journal entry posted"),
            None => warn!("no journal entry to confirm for this document"),
        }
        Ok(confirmed)
    }

    /// Line checks, then account resolution, then the balance check; all of
    /// it before a transaction is opened
    async fn checked_lines(&self, lines: &[LineSpec]) -> JournalResult<Vec<ResolvedLine>> {
        validate_line_shape(lines)?;
        let resolved = self.resolve_lines(lines).await?;
        check_balance(lines, &self.config.balance_tolerance)?;
        Ok(resolved)
    }

    async fn resolve_lines(&self, lines: &[LineSpec]) -> JournalResult<Vec<ResolvedLine>> {
        let mut by_code: HashMap<&str, Account> = HashMap::new();
        let mut resolved = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            let account = match &line.account {
                Some(AccountRef::ByCode { account_code }) => {
                    match by_code.get(account_code.as_str()) {
                        Some(account) => account.clone(),
                        None => {
                            let account = self
                                .storage
                                .find_account_by_code(account_code)
                                .await?
                                .ok_or_else(|| {
                                    JournalError::AccountNotFound(account_code.clone())
                                })?;
                            by_code.insert(account_code.as_str(), account.clone());
                            account
                        }
                    }
                }
                Some(AccountRef::ById { account_id }) => self
                    .storage
                    .get_account(*account_id)
                    .await?
                    .ok_or_else(|| JournalError::AccountNotFound(account_id.to_string()))?,
                None => return Err(ValidationError::MissingAccount { line: index + 1 }.into()),
            };

            resolved.push(ResolvedLine {
                account,
                debit: line.debit.clone(),
                credit: line.credit.clone(),
            });
        }

        Ok(resolved)
    }

    /// Run one write in its own transaction, retrying when the generated
    /// code collides with a concurrently created entry
    async fn write_entry(
        &self,
        reference: &SourceReference,
        lines: &[ResolvedLine],
        options: &EntryOptions,
        mode: WriteMode,
    ) -> JournalResult<JournalEntryDetail> {
        let attempts = self.config.code_retry_attempts.max(1);
        let mut attempt = 1;

        loop {
            let mut tx = self.storage.begin().await?;
            let result = self
                .write_in_tx(&mut tx, reference, lines, options, mode)
                .await;

            match commit_or_rollback(tx, result).await {
                Err(JournalError::DuplicateCode(code)) if attempt < attempts => {
                    warn!(%code, attempt, "journal entry code already taken, retrying");
                    attempt += 1;
                }
                Ok(detail) => {
                    info!(
                        code = %detail.entry.code,
                        id = %detail.entry.id,
                        lines = detail.lines.len(),
                        "journal entry saved"
                    );
                    return Ok(detail);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn write_in_tx(
        &self,
        tx: &mut S::Tx,
        reference: &SourceReference,
        lines: &[ResolvedLine],
        options: &EntryOptions,
        mode: WriteMode,
    ) -> JournalResult<JournalEntryDetail> {
        let existing = tx.find_entry_by_reference(reference).await?;

        match (mode, existing) {
            (WriteMode::Upsert, Some(entry)) => {
                self.replace_in_tx(tx, entry, reference, lines, options)
                    .await
            }
            (WriteMode::Create, Some(entry)) => {
                warn!(
                    existing = %entry.code,
                    "document already has a journal entry, posting another one"
                );
                self.create_in_tx(tx, reference, lines, options).await
            }
            (_, None) => self.create_in_tx(tx, reference, lines, options).await,
        }
    }

    async fn create_in_tx(
        &self,
        tx: &mut S::Tx,
        reference: &SourceReference,
        lines: &[ResolvedLine],
        options: &EntryOptions,
    ) -> JournalResult<JournalEntryDetail> {
        let now = self.clock.now();
        let header = NewJournalEntry {
            code: code::next_code(tx, self.clock.today()).await?,
            reference: reference.clone(),
            entry_date: options.entry_date.unwrap_or(now),
            note: note_for(reference, options),
            created_by: options.acting_user.unwrap_or(self.config.default_user_id),
            status: EntryStatus::Draft,
            created_at: now,
        };

        let entry = tx.create_entry(&header).await?;
        let lines = insert_lines(tx, entry.id, lines).await?;
        Ok(JournalEntryDetail { entry, lines })
    }

    async fn replace_in_tx(
        &self,
        tx: &mut S::Tx,
        existing: JournalEntry,
        reference: &SourceReference,
        lines: &[ResolvedLine],
        options: &EntryOptions,
    ) -> JournalResult<JournalEntryDetail> {
        let changes = JournalEntryChanges {
            note: Some(note_for(reference, options)),
            entry_date: options.entry_date,
            status: None,
            updated_at: self.clock.now(),
        };
        if !tx.update_entry(existing.id, &changes).await? {
            return Err(JournalError::EntryNotFound(existing.code));
        }

        let old_lines = tx.list_lines(existing.id).await?;
        debug!(
            code = %existing.code,
            removed = old_lines.len(),
            added = lines.len(),
            "replacing journal lines"
        );
        for line in old_lines {
            tx.delete_line(line.id).await?;
        }
        let lines = insert_lines(tx, existing.id, lines).await?;

        let entry = tx
            .find_entry_by_reference(reference)
            .await?
            .ok_or_else(|| JournalError::EntryNotFound(existing.code.clone()))?;
        Ok(JournalEntryDetail { entry, lines })
    }

    async fn delete_in_tx(tx: &mut S::Tx, reference: &SourceReference) -> JournalResult<usize> {
        let entries = tx.list_entries_by_reference(reference).await?;
        for entry in &entries {
            for line in tx.list_lines(entry.id).await? {
                tx.delete_line(line.id).await?;
            }
            tx.delete_entry(entry.id).await?;
        }
        Ok(entries.len())
    }

    async fn confirm_in_tx(
        &self,
        tx: &mut S::Tx,
        reference: &SourceReference,
    ) -> JournalResult<Option<JournalEntry>> {
        let Some(entry) = tx.find_entry_by_reference(reference).await? else {
            return Ok(None);
        };

        let changes = JournalEntryChanges {
            note: None,
            entry_date: None,
            status: Some(EntryStatus::Posted),
            updated_at: self.clock.now(),
        };
        tx.update_entry(entry.id, &changes).await?;
        tx.find_entry_by_reference(reference).await
    }
}

fn note_for(reference: &SourceReference, options: &EntryOptions) -> String {
    options
        .note
        .clone()
        .unwrap_or_else(|| format!("Bút toán từ {}", reference.reference_type))
}

async fn insert_lines<T: JournalTransaction>(
    tx: &mut T,
    entry_id: JournalEntryId,
    lines: &[ResolvedLine],
) -> JournalResult<Vec<JournalLineDetail>> {
    let mut details = Vec::with_capacity(lines.len());
    for line in lines {
        let created = tx
            .create_line(&NewJournalLine {
                journal_entry_id: entry_id,
                account_id: line.account.id,
                debit: line.debit.clone(),
                credit: line.credit.clone(),
            })
            .await?;
        details.push(JournalLineDetail {
            line: created,
            account: line.account.clone(),
        });
    }
    Ok(details)
}

/// Commit on success; roll back and hand back the original error otherwise
async fn commit_or_rollback<T, Tx: JournalTransaction>(
    tx: Tx,
    result: JournalResult<T>,
) -> JournalResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
