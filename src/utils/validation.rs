//! Validation utilities

use bigdecimal::BigDecimal;

use crate::types::*;

/// Sum of debits and credits over a proposed line set
pub fn line_totals(lines: &[LineSpec]) -> (BigDecimal, BigDecimal) {
    let debit = lines.iter().map(|l| &l.debit).sum();
    let credit = lines.iter().map(|l| &l.credit).sum();
    (debit, credit)
}

/// Whether |debit − credit| stays within `tolerance`
pub fn within_tolerance(debit: &BigDecimal, credit: &BigDecimal, tolerance: &BigDecimal) -> bool {
    (debit - credit).abs() <= *tolerance
}

/// Per-line checks on a proposed line set.
///
/// Rejects an empty set, lines without a usable account reference (absent
/// or a blank code) and negative amounts, reporting the first bad line.
pub fn validate_line_shape(lines: &[LineSpec]) -> Result<(), ValidationError> {
    if lines.is_empty() {
        return Err(ValidationError::NoEntries);
    }

    let zero = BigDecimal::from(0);
    for (index, line) in lines.iter().enumerate() {
        if line.account.as_ref().is_none_or(AccountRef::is_blank) {
            return Err(ValidationError::MissingAccount { line: index + 1 });
        }
        if line.debit < zero || line.credit < zero {
            return Err(ValidationError::NegativeAmount { line: index + 1 });
        }
    }

    Ok(())
}

/// Debit = credit check, within `tolerance`
pub fn check_balance(lines: &[LineSpec], tolerance: &BigDecimal) -> Result<(), ValidationError> {
    let (debit, credit) = line_totals(lines);
    if !within_tolerance(&debit, &credit, tolerance) {
        return Err(ValidationError::Unbalanced { debit, credit });
    }
    Ok(())
}

/// Whether `account_code` is `parent_code` or one of its sub-accounts
/// ("1311" belongs to "131")
pub fn is_sub_account(account_code: &str, parent_code: &str) -> bool {
    !parent_code.is_empty() && account_code.starts_with(parent_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn tolerance() -> BigDecimal {
        BigDecimal::from_str("0.01").unwrap()
    }

    fn amount(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    #[test]
    fn empty_line_set_is_rejected() {
        assert_eq!(validate_line_shape(&[]), Err(ValidationError::NoEntries));
    }

    #[test]
    fn line_without_account_is_rejected() {
        let lines = vec![
            LineSpec::debit(AccountRef::code("131"), amount("100")),
            LineSpec {
                account: None,
                debit: amount("0"),
                credit: amount("100"),
            },
        ];
        assert_eq!(
            validate_line_shape(&lines),
            Err(ValidationError::MissingAccount { line: 2 })
        );
    }

    #[test]
    fn blank_account_code_counts_as_missing() {
        let lines = vec![
            LineSpec::debit(AccountRef::code(" "), amount("100")),
            LineSpec::credit(AccountRef::code("511"), amount("100")),
        ];
        assert_eq!(
            validate_line_shape(&lines),
            Err(ValidationError::MissingAccount { line: 1 })
        );
    }

    #[test]
    fn rounding_noise_is_tolerated() {
        let lines = vec![
            LineSpec::debit(AccountRef::code("131"), amount("100.005")),
            LineSpec::credit(AccountRef::code("511"), amount("100")),
        ];
        assert!(check_balance(&lines, &tolerance()).is_ok());

        let lines = vec![
            LineSpec::debit(AccountRef::code("131"), amount("100.02")),
            LineSpec::credit(AccountRef::code("511"), amount("100")),
        ];
        assert_eq!(
            check_balance(&lines, &tolerance()),
            Err(ValidationError::Unbalanced {
                debit: amount("100.02"),
                credit: amount("100"),
            })
        );
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let lines = vec![
            LineSpec::debit(AccountRef::code("131"), amount("-5")),
            LineSpec::credit(AccountRef::code("511"), amount("-5")),
        ];
        assert_eq!(
            validate_line_shape(&lines),
            Err(ValidationError::NegativeAmount { line: 1 })
        );
    }

    #[test]
    fn sub_accounts_match_their_parent() {
        assert!(is_sub_account("131", "131"));
        assert!(is_sub_account("1311", "131"));
        assert!(!is_sub_account("1331", "131"));
        assert!(!is_sub_account("131", ""));
    }
}
