//! Debt statement example
//!
//! Posts a few documents for one customer and prints the receivable
//! statement for July 2024. Run with `RUST_LOG=journal_core=debug` to see
//! the engine spans.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use journal_core::utils::{FixedClock, MemoryStorage};
use journal_core::{
    Account, AccountId, AccountRef, CounterpartyId, DateRange, EntryOptions, JournalConfig,
    JournalEngine, LedgerReconstructor, LineSpec, ReferenceType, SourceDocument,
    SourceReference,
};
use tracing_subscriber::EnvFilter;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
}

fn vnd(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = JournalConfig::load()?;
    let storage = MemoryStorage::new();
    for (id, code, name) in [
        (1, "1111", "Tiền mặt"),
        (3, "131", "Phải thu của khách hàng"),
        (7, "3331", "Thuế GTGT phải nộp"),
        (8, "511", "Doanh thu bán hàng"),
    ] {
        storage
            .add_account(Account::new(AccountId(id), code, name))
            .await;
    }

    let clock = FixedClock::on(day(1));
    let engine =
        JournalEngine::with_config(storage.clone(), config.clone()).with_clock(clock.clone());
    let customer = CounterpartyId(100);

    println!("Posting documents for customer {customer}...\n");

    // Sale of 1,000,000 plus 10% VAT on July 1st
    let sale = SourceReference::new(ReferenceType::SalesReceipt, 1);
    storage
        .register_document(SourceDocument {
            reference: sale.clone(),
            code: "PBH00001".to_string(),
            counterparty_id: customer,
        })
        .await;
    let entry = engine
        .create_from_source(
            &sale,
            &[
                LineSpec::debit(AccountRef::code("131"), vnd("1100000")),
                LineSpec::credit(AccountRef::code("511"), vnd("1000000")),
                LineSpec::credit(AccountRef::code("3331"), vnd("100000")),
            ],
            EntryOptions::default(),
        )
        .await?;
    println!("  ✓ {} for {}", entry.entry.code, sale);

    // Partial payment on July 5th
    clock.advance_days(4);
    let receipt = SourceReference::new(ReferenceType::ReceiptVoucher, 1);
    storage
        .register_document(SourceDocument {
            reference: receipt.clone(),
            code: "PT00001".to_string(),
            counterparty_id: customer,
        })
        .await;
    let entry = engine
        .create_from_source(
            &receipt,
            &[
                LineSpec::debit(AccountRef::code("1111"), vnd("600000")),
                LineSpec::credit(AccountRef::code("131"), vnd("600000")),
            ],
            EntryOptions::default().with_note("Thu tiền khách hàng"),
        )
        .await?;
    println!("  ✓ {} for {}", entry.entry.code, receipt);

    // The payment was actually 500,000; the voucher is edited in place
    let entry = engine
        .update_by_source(
            &receipt,
            &[
                LineSpec::debit(AccountRef::code("1111"), vnd("500000")),
                LineSpec::credit(AccountRef::code("131"), vnd("500000")),
            ],
            EntryOptions::default(),
        )
        .await?;
    if let Some(entry) = entry {
        println!("  ✓ {} updated for {}", entry.entry.code, receipt);
    }
    engine.confirm_by_source(&receipt).await?;

    let reconstructor = LedgerReconstructor::with_config(storage, config.clone());
    let opening = reconstructor.opening_balance("131", customer, day(1)).await?;
    let statement = reconstructor
        .build_statement("131", customer, DateRange::between(day(1), day(31)), opening)
        .await?
        .rounded(config.display_scale);

    println!("\nStatement of 131 for customer {customer}, July 2024");
    println!("  Opening balance: {}", statement.opening_balance);
    for row in &statement.rows {
        println!(
            "  {} {:<10} {:<16} {:<5} {:>10} {:>10} {:>10}",
            row.transaction_date,
            row.reference_code,
            row.reference_type_label,
            row.account_code,
            row.debit,
            row.credit,
            row.running_balance,
        );
    }
    println!(
        "  Totals: debit {} credit {}",
        statement.totals.debit, statement.totals.credit
    );
    println!("  Closing balance: {}", statement.closing_balance);

    Ok(())
}
