//! Running-balance debt statements rebuilt from journal lines

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

use crate::config::JournalConfig;
use crate::traits::JournalStorage;
use crate::types::*;
use crate::utils::validation::is_sub_account;

/// Side on which an account's balance grows, from the class digit of its
/// code in the Vietnamese chart of accounts (1, 2, 6, 8 debit; 3, 4, 5, 7
/// credit)
pub fn normal_balance(account_code: &str) -> EntryType {
    match account_code.chars().next() {
        Some('3' | '4' | '5' | '7') => EntryType::Credit,
        _ => EntryType::Debit,
    }
}

/// Builds sub-ledger statements of a control account (131, 331, ...)
pub struct LedgerReconstructor<S: JournalStorage> {
    storage: S,
    config: JournalConfig,
}

impl<S: JournalStorage> LedgerReconstructor<S> {
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, JournalConfig::default())
    }

    pub fn with_config(storage: S, config: JournalConfig) -> Self {
        Self { storage, config }
    }

    /// Statement of `control_account_code` for one counterparty over
    /// `date_range`, starting from `opening_balance`
    #[instrument(
        name = "journal_core.ledger.build_statement",
        skip(self, opening_balance),
        err
    )]
    pub async fn build_statement(
        &self,
        control_account_code: &str,
        counterparty_id: CounterpartyId,
        date_range: DateRange,
        opening_balance: BigDecimal,
    ) -> JournalResult<LedgerStatement> {
        let query = LedgerQuery {
            control_account_code: control_account_code.to_string(),
            counterparty_id,
            date_range,
        };
        let rows = self.storage.query_ledger_rows(&query).await?;
        debug!(raw_rows = rows.len(), "ledger rows fetched");
        Ok(reconstruct(&query, rows, opening_balance, &self.config))
    }

    /// Balance of the control account for one counterparty from all
    /// movements strictly before `date`
    #[instrument(name = "journal_core.ledger.opening_balance", skip(self), err)]
    pub async fn opening_balance(
        &self,
        control_account_code: &str,
        counterparty_id: CounterpartyId,
        date: NaiveDate,
    ) -> JournalResult<BigDecimal> {
        let Some(date_range) = DateRange::before(date) else {
            return Ok(BigDecimal::from(0));
        };
        let query = LedgerQuery {
            control_account_code: control_account_code.to_string(),
            counterparty_id,
            date_range,
        };
        let rows = self.storage.query_ledger_rows(&query).await?;

        let side = normal_balance(control_account_code);
        let balance = rows
            .iter()
            .filter(|row| is_sub_account(&row.account_code, control_account_code))
            .fold(BigDecimal::from(0), |balance, row| match side {
                EntryType::Debit => balance + &row.debit - &row.credit,
                EntryType::Credit => balance + &row.credit - &row.debit,
            });
        Ok(balance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    date: NaiveDate,
    reference_code: String,
    reference_type: ReferenceType,
    account_code: String,
}

/// Turn joined journal lines into a running-balance statement.
///
/// The control-account legs are not displayed: each entry balances, so the
/// control leg always moves by the negated net of its counter legs. Rows are
/// therefore walked in the counter-account frame, while the period totals are
/// taken from the control legs themselves.
pub fn reconstruct(
    query: &LedgerQuery,
    rows: Vec<RawLedgerRow>,
    opening_balance: BigDecimal,
    config: &JournalConfig,
) -> LedgerStatement {
    let control = query.control_account_code.as_str();

    let mut by_entry: BTreeMap<JournalEntryId, Vec<RawLedgerRow>> = BTreeMap::new();
    for row in rows {
        by_entry.entry(row.journal_entry_id).or_default().push(row);
    }

    let mut totals = LedgerTotals {
        debit: BigDecimal::from(0),
        credit: BigDecimal::from(0),
    };
    let mut counter_rows = Vec::new();

    for (entry_id, lines) in by_entry {
        let classified: Vec<LedgerRow> = lines
            .into_iter()
            .map(|line| to_ledger_row(line, control, config))
            .collect();

        if !classified.iter().any(|row| row.is_control_account) {
            debug!(%entry_id, "entry has no control-account leg, skipped");
            continue;
        }

        for row in classified {
            if row.is_control_account {
                totals.debit += &row.debit;
                totals.credit += &row.credit;
            } else {
                counter_rows.push(row);
            }
        }
    }

    let mut rows = merge_by_document(counter_rows);
    rows.sort_by(|a, b| {
        a.transaction_date
            .cmp(&b.transaction_date)
            .then(a.sort_key.cmp(&b.sort_key))
            .then_with(|| a.account_code.cmp(&b.account_code))
    });

    let side = normal_balance(control);
    let mut balance = opening_balance.clone();
    for row in &mut rows {
        match side {
            EntryType::Debit => balance += &row.credit - &row.debit,
            EntryType::Credit => balance += &row.debit - &row.credit,
        }
        row.running_balance = balance.clone();
    }

    LedgerStatement {
        control_account_code: query.control_account_code.clone(),
        counterparty_id: query.counterparty_id,
        date_range: query.date_range,
        rows,
        opening_balance,
        closing_balance: balance,
        totals,
    }
}

fn to_ledger_row(line: RawLedgerRow, control: &str, config: &JournalConfig) -> LedgerRow {
    let is_control_account = is_sub_account(&line.account_code, control);
    let is_tax_account = !is_control_account && config.is_tax_account(&line.account_code);
    LedgerRow {
        transaction_date: line.transaction_date,
        reference_code: line.reference_code,
        reference_type_label: line.reference_type.label().to_string(),
        reference_type: line.reference_type,
        account_code: line.account_code,
        account_name: line.account_name,
        debit: line.debit,
        credit: line.credit,
        is_tax_account,
        is_control_account,
        running_balance: BigDecimal::from(0),
        sort_key: line.sort_key,
    }
}

/// Collapse counter rows of one document on the same account into one row
fn merge_by_document(rows: Vec<LedgerRow>) -> Vec<LedgerRow> {
    let mut merged: Vec<LedgerRow> = Vec::with_capacity(rows.len());
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for row in rows {
        let key = GroupKey {
            date: row.transaction_date,
            reference_code: row.reference_code.clone(),
            reference_type: row.reference_type.clone(),
            account_code: row.account_code.clone(),
        };
        match index.get(&key) {
            Some(&position) => {
                let target = &mut merged[position];
                target.debit += &row.debit;
                target.credit += &row.credit;
                target.sort_key = target.sort_key.min(row.sort_key);
            }
            None => {
                index.insert(key, merged.len());
                merged.push(row);
            }
        }
    }

    merged
}
