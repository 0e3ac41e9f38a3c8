//! Core types and data structures for the journal engine and debt ledgers

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// Storage-assigned identifier of a journal entry header
    JournalEntryId
);
entity_id!(
    /// Storage-assigned identifier of a journal line
    JournalLineId
);
entity_id!(
    /// Identifier of an accounting account
    AccountId
);
entity_id!(
    /// Identifier of the acting user
    UserId
);
entity_id!(
    /// Identifier of a customer or supplier
    CounterpartyId
);

/// Sides of a double-entry posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Debit side
    Debit,
    /// Credit side
    Credit,
}

/// Kind of business document a journal entry was posted from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReferenceType {
    SalesReceipt,
    PurchaseReceipt,
    PaymentVoucher,
    ReceiptVoucher,
    /// Any other document kind, stored by its raw tag
    Other(String),
}

impl ReferenceType {
    /// Storage tag of the document kind
    pub fn as_str(&self) -> &str {
        match self {
            ReferenceType::SalesReceipt => "sales_receipt",
            ReferenceType::PurchaseReceipt => "purchase_receipt",
            ReferenceType::PaymentVoucher => "payment_voucher",
            ReferenceType::ReceiptVoucher => "receipt_voucher",
            ReferenceType::Other(tag) => tag,
        }
    }

    /// Label printed in the debt statement
    pub fn label(&self) -> &str {
        match self {
            ReferenceType::SalesReceipt => "Phiếu bán hàng",
            ReferenceType::PurchaseReceipt => "Phiếu nhập hàng",
            ReferenceType::PaymentVoucher => "Phiếu chi",
            ReferenceType::ReceiptVoucher => "Phiếu thu",
            ReferenceType::Other(tag) => tag,
        }
    }

    /// Rank used to order documents posted on the same day
    pub fn sort_rank(&self) -> u8 {
        match self {
            ReferenceType::SalesReceipt => 1,
            ReferenceType::PurchaseReceipt => 2,
            ReferenceType::ReceiptVoucher => 3,
            ReferenceType::PaymentVoucher => 4,
            ReferenceType::Other(_) => 9,
        }
    }
}

impl From<String> for ReferenceType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "sales_receipt" => ReferenceType::SalesReceipt,
            "purchase_receipt" => ReferenceType::PurchaseReceipt,
            "payment_voucher" => ReferenceType::PaymentVoucher,
            "receipt_voucher" => ReferenceType::ReceiptVoucher,
            _ => ReferenceType::Other(tag),
        }
    }
}

impl From<&str> for ReferenceType {
    fn from(tag: &str) -> Self {
        ReferenceType::from(tag.to_string())
    }
}

impl From<ReferenceType> for String {
    fn from(reference_type: ReferenceType) -> Self {
        reference_type.as_str().to_string()
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The business document a journal entry belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceReference {
    pub reference_type: ReferenceType,
    pub reference_id: i64,
}

impl SourceReference {
    pub fn new(reference_type: impl Into<ReferenceType>, reference_id: i64) -> Self {
        Self {
            reference_type: reference_type.into(),
            reference_id,
        }
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.reference_type, self.reference_id)
    }
}

/// Accounting account as seen by the journal engine (read-only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Chart-of-accounts code, e.g. "131" or "3331"
    pub account_code: String,
    pub name: String,
}

impl Account {
    pub fn new(id: AccountId, account_code: &str, name: &str) -> Self {
        Self {
            id,
            account_code: account_code.to_string(),
            name: name.to_string(),
        }
    }
}

/// How a proposed line names its account
///
/// Payloads carry either an `account_code` or an `account_id` field; when both
/// are present the code wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountRef {
    ByCode { account_code: String },
    ById { account_id: AccountId },
}

impl AccountRef {
    pub fn code(account_code: &str) -> Self {
        AccountRef::ByCode {
            account_code: account_code.to_string(),
        }
    }

    pub fn id(account_id: AccountId) -> Self {
        AccountRef::ById { account_id }
    }

    /// A code reference with nothing but whitespace in it
    pub fn is_blank(&self) -> bool {
        matches!(self, AccountRef::ByCode { account_code } if account_code.trim().is_empty())
    }
}

/// A proposed journal line, as submitted by business operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSpec {
    #[serde(flatten)]
    pub account: Option<AccountRef>,
    #[serde(default = "zero", deserialize_with = "amount::deserialize")]
    pub debit: BigDecimal,
    #[serde(default = "zero", deserialize_with = "amount::deserialize")]
    pub credit: BigDecimal,
}

fn zero() -> BigDecimal {
    BigDecimal::from(0)
}

/// Amounts arriving as JSON numbers are read through their shortest decimal
/// text, so `0.1` stays `0.1` instead of its binary expansion.
mod amount {
    use bigdecimal::BigDecimal;
    use serde::de::{self, Deserializer, Visitor};
    use std::fmt;
    use std::str::FromStr;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = BigDecimal;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a decimal amount as a number or a string")
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<BigDecimal, E> {
            Ok(BigDecimal::from(value))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<BigDecimal, E> {
            Ok(BigDecimal::from(value))
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<BigDecimal, E> {
            if !value.is_finite() {
                return Err(E::custom(format!("amount {value} is not finite")));
            }
            self.visit_str(&value.to_string())
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<BigDecimal, E> {
            BigDecimal::from_str(value.trim()).map_err(E::custom)
        }
    }
}

impl LineSpec {
    /// Create a pure debit line
    pub fn debit(account: AccountRef, amount: BigDecimal) -> Self {
        Self {
            account: Some(account),
            debit: amount,
            credit: zero(),
        }
    }

    /// Create a pure credit line
    pub fn credit(account: AccountRef, amount: BigDecimal) -> Self {
        Self {
            account: Some(account),
            debit: zero(),
            credit: amount,
        }
    }
}

/// Optional header fields supplied alongside a line set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryOptions {
    /// Accounting date; creation time when absent
    pub entry_date: Option<NaiveDateTime>,
    /// Free-text description; "Bút toán từ <reference_type>" when absent
    pub note: Option<String>,
    /// Acting user; the configured system user when absent
    pub acting_user: Option<UserId>,
}

impl EntryOptions {
    pub fn dated(entry_date: NaiveDateTime) -> Self {
        Self {
            entry_date: Some(entry_date),
            ..Self::default()
        }
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    pub fn by(mut self, user: UserId) -> Self {
        self.acting_user = Some(user);
        self
    }
}

/// Posting status of a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Draft,
    Posted,
}

/// Persisted journal entry header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    /// `JE_YYYYMMDD_NNN`
    pub code: String,
    pub reference_type: ReferenceType,
    pub reference_id: i64,
    pub entry_date: NaiveDateTime,
    pub note: String,
    pub created_by: UserId,
    pub status: EntryStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl JournalEntry {
    pub fn reference(&self) -> SourceReference {
        SourceReference::new(self.reference_type.clone(), self.reference_id)
    }
}

/// Header fields written when a journal entry is created
#[derive(Debug, Clone, PartialEq)]
pub struct NewJournalEntry {
    pub code: String,
    pub reference: SourceReference,
    pub entry_date: NaiveDateTime,
    pub note: String,
    pub created_by: UserId,
    pub status: EntryStatus,
    pub created_at: NaiveDateTime,
}

/// Header fields rewritten on update
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntryChanges {
    pub note: Option<String>,
    /// Only touched when explicitly supplied by the caller
    pub entry_date: Option<NaiveDateTime>,
    pub status: Option<EntryStatus>,
    pub updated_at: NaiveDateTime,
}

/// Persisted journal line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub id: JournalLineId,
    pub journal_entry_id: JournalEntryId,
    pub account_id: AccountId,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
}

/// Line fields written on insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewJournalLine {
    pub journal_entry_id: JournalEntryId,
    pub account_id: AccountId,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
}

/// Journal line with its resolved account attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLineDetail {
    #[serde(flatten)]
    pub line: JournalLine,
    pub account: Account,
}

/// A journal entry as returned by the write operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryDetail {
    #[serde(flatten)]
    pub entry: JournalEntry,
    pub lines: Vec<JournalLineDetail>,
}

impl JournalEntryDetail {
    pub fn total_debit(&self) -> BigDecimal {
        self.lines.iter().map(|l| &l.line.debit).sum()
    }

    pub fn total_credit(&self) -> BigDecimal {
        self.lines.iter().map(|l| &l.line.credit).sum()
    }
}

/// Simplified line used by read views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLineView {
    pub id: JournalLineId,
    pub account_id: AccountId,
    /// Empty when the account no longer resolves
    pub account_code: String,
    pub account_name: String,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
}

/// Simplified journal entry used by read views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryView {
    pub id: JournalEntryId,
    pub code: String,
    pub reference_type: ReferenceType,
    pub reference_id: i64,
    pub entry_date: NaiveDateTime,
    pub note: String,
    pub status: EntryStatus,
    pub lines: Vec<JournalLineView>,
}

/// Inclusive date range; open ends are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Everything strictly before `date`; `None` when no date precedes it
    pub fn before(date: NaiveDate) -> Option<Self> {
        date.pred_opt().map(|end| Self {
            start: None,
            end: Some(end),
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }
}

/// Business document metadata the ledger query joins through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub reference: SourceReference,
    /// Human-readable document number, e.g. "PBH00012"
    pub code: String,
    pub counterparty_id: CounterpartyId,
}

/// Parameters of a sub-ledger row query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerQuery {
    pub control_account_code: String,
    pub counterparty_id: CounterpartyId,
    pub date_range: DateRange,
}

/// Same-day ordering key assigned at query time
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LedgerSortKey {
    pub document_rank: u8,
    pub sequence: i64,
}

/// Journal line joined with its entry header, source document and account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLedgerRow {
    pub journal_entry_id: JournalEntryId,
    pub line_id: JournalLineId,
    pub transaction_date: NaiveDate,
    pub reference_code: String,
    pub reference_type: ReferenceType,
    /// Empty when the account no longer resolves
    pub account_code: String,
    pub account_name: String,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
    pub sort_key: LedgerSortKey,
}

/// One displayed line of a debt statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub transaction_date: NaiveDate,
    pub reference_code: String,
    pub reference_type: ReferenceType,
    pub reference_type_label: String,
    /// Counter-account code
    pub account_code: String,
    pub account_name: String,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
    pub is_tax_account: bool,
    pub is_control_account: bool,
    pub running_balance: BigDecimal,
    #[serde(skip)]
    pub(crate) sort_key: LedgerSortKey,
}

/// Period movement of the control account, in its own frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub debit: BigDecimal,
    pub credit: BigDecimal,
}

/// Running-balance statement of a control account for one counterparty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerStatement {
    pub control_account_code: String,
    pub counterparty_id: CounterpartyId,
    pub date_range: DateRange,
    pub rows: Vec<LedgerRow>,
    pub opening_balance: BigDecimal,
    pub closing_balance: BigDecimal,
    pub totals: LedgerTotals,
}

impl LedgerStatement {
    /// Copy of the statement with every amount rounded for display
    pub fn rounded(&self, scale: i64) -> Self {
        let mut statement = self.clone();
        for row in &mut statement.rows {
            row.debit = row.debit.round(scale);
            row.credit = row.credit.round(scale);
            row.running_balance = row.running_balance.round(scale);
        }
        statement.opening_balance = statement.opening_balance.round(scale);
        statement.closing_balance = statement.closing_balance.round(scale);
        statement.totals.debit = statement.totals.debit.round(scale);
        statement.totals.credit = statement.totals.credit.round(scale);
        statement
    }
}

/// Input rejected before anything is written
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("no entries")]
    NoEntries,
    #[error("missing account on line {line}")]
    MissingAccount { line: usize },
    #[error("negative amount on line {line}")]
    NegativeAmount { line: usize },
    #[error("unbalanced: debit = {debit}, credit = {credit}")]
    Unbalanced { debit: BigDecimal, credit: BigDecimal },
}

/// Errors that can occur in the journal engine
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Journal entry not found: {0}")]
    EntryNotFound(String),
    #[error("Duplicate journal entry code: {0}")]
    DuplicateCode(String),
    #[error("Journal entry codes exhausted after: {0}")]
    CodeSequenceExhausted(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Result type for journal operations
pub type JournalResult<T> = Result<T, JournalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_type_round_trips_through_tags() {
        assert_eq!(
            ReferenceType::from("sales_receipt"),
            ReferenceType::SalesReceipt
        );
        assert_eq!(
            ReferenceType::from("stock_transfer"),
            ReferenceType::Other("stock_transfer".to_string())
        );
        assert_eq!(ReferenceType::ReceiptVoucher.to_string(), "receipt_voucher");
    }

    #[test]
    fn line_spec_accepts_code_or_id_payloads() {
        let by_code: LineSpec =
            serde_json::from_str(r#"{"account_code": "131", "debit": "1000"}"#).unwrap();
        assert_eq!(by_code.account, Some(AccountRef::code("131")));
        assert_eq!(by_code.debit, BigDecimal::from(1000));
        assert_eq!(by_code.credit, BigDecimal::from(0));

        let by_id: LineSpec = serde_json::from_str(r#"{"account_id": 7, "credit": "5"}"#).unwrap();
        assert_eq!(by_id.account, Some(AccountRef::id(AccountId(7))));

        let missing: LineSpec = serde_json::from_str(r#"{"debit": "5"}"#).unwrap();
        assert_eq!(missing.account, None);
    }

    #[test]
    fn numeric_amounts_keep_their_decimal_text() {
        use std::str::FromStr;

        let lines: Vec<LineSpec> = serde_json::from_str(
            r#"[{"account_code": "131", "debit": 0.1}, {"account_code": "511", "credit": 1250000}]"#,
        )
        .unwrap();
        assert_eq!(lines[0].debit, BigDecimal::from_str("0.1").unwrap());
        assert_eq!(lines[0].debit.to_string(), "0.1");
        assert_eq!(lines[1].credit, BigDecimal::from(1_250_000));

        let sum: BigDecimal = serde_json::from_str::<Vec<LineSpec>>(
            r#"[{"account_code": "131", "debit": 0.1}, {"account_code": "131", "debit": 0.2}]"#,
        )
        .unwrap()
        .iter()
        .map(|line| &line.debit)
        .sum();
        assert_eq!(sum, BigDecimal::from_str("0.3").unwrap());

        assert!(serde_json::from_str::<LineSpec>(r#"{"account_code": "131", "debit": "abc"}"#)
            .is_err());
    }

    #[test]
    fn blank_account_codes_are_detected() {
        assert!(AccountRef::code("").is_blank());
        assert!(AccountRef::code("  ").is_blank());
        assert!(!AccountRef::code("131").is_blank());
        assert!(!AccountRef::id(AccountId(1)).is_blank());
    }

    #[test]
    fn date_range_bounds_are_inclusive() {
        let jan = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let range = DateRange::between(jan(5), jan(10));
        assert!(range.contains(jan(5)));
        assert!(range.contains(jan(10)));
        assert!(!range.contains(jan(11)));

        let before = DateRange::before(jan(5)).unwrap();
        assert!(before.contains(jan(4)));
        assert!(!before.contains(jan(5)));
        assert!(DateRange::default().contains(jan(1)));
        assert_eq!(DateRange::before(NaiveDate::MIN), None);
    }
}
