//! Journal entry codes: `JE_YYYYMMDD_NNN`

use chrono::NaiveDate;
use std::num::IntErrorKind;

use crate::traits::JournalTransaction;
use crate::types::{JournalError, JournalResult};

/// Prefix shared by every code issued on `date`, e.g. `JE_20240115_`
pub fn day_prefix(date: NaiveDate) -> String {
    format!("JE_{}_", date.format("%Y%m%d"))
}

/// Code for the `sequence`-th entry of `date`, padded to three digits
pub fn format_code(date: NaiveDate, sequence: u64) -> String {
    format!("{}{:03}", day_prefix(date), sequence)
}

/// Sequence number carried by a code.
///
/// A third `_` token that is not a number counts as 0. A number too large
/// for `u64` is an error rather than a restart at 1.
pub fn parse_sequence(code: &str) -> JournalResult<u64> {
    let token = code.split('_').nth(2).unwrap_or_default();
    match token.parse::<u64>() {
        Ok(sequence) => Ok(sequence),
        Err(err) if *err.kind() == IntErrorKind::PosOverflow => {
            Err(JournalError::CodeSequenceExhausted(code.to_string()))
        }
        Err(_) => Ok(0),
    }
}

/// Next free code for `date`, read inside the caller's transaction.
///
/// Sequences are never reused: the latest code of the day is incremented
/// even if earlier ones were deleted.
pub async fn next_code<T: JournalTransaction>(tx: &mut T, date: NaiveDate) -> JournalResult<String> {
    let sequence = match tx.latest_code_with_prefix(&day_prefix(date)).await? {
        Some(latest) => parse_sequence(&latest)?
            .checked_add(1)
            .ok_or(JournalError::CodeSequenceExhausted(latest))?,
        None => 1,
    };
    Ok(format_code(date, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn codes_are_zero_padded() {
        assert_eq!(format_code(day(), 1), "JE_20240115_001");
        assert_eq!(format_code(day(), 42), "JE_20240115_042");
        assert_eq!(format_code(day(), 1234), "JE_20240115_1234");
    }

    #[test]
    fn sequence_parsing_falls_back_to_zero() {
        assert_eq!(parse_sequence("JE_20240115_007").unwrap(), 7);
        assert_eq!(parse_sequence("JE_20240115_1234").unwrap(), 1234);
        assert_eq!(parse_sequence("JE_20240115_4294967296").unwrap(), 4_294_967_296);
        assert_eq!(parse_sequence("JE_20240115_x1").unwrap(), 0);
        assert_eq!(parse_sequence("JE_20240115").unwrap(), 0);
    }

    #[test]
    fn oversized_sequence_is_an_error() {
        assert!(matches!(
            parse_sequence("JE_20240115_99999999999999999999999"),
            Err(JournalError::CodeSequenceExhausted(_))
        ));
    }
}
