// 💳 Credit Card Entity - The account a balance timeline belongs to

use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCard {
    pub id: i64,
    pub user_id: i64,
    pub issuance_bank: String,

    /// Full card number; doubles as the account reference
    pub number: String,

    pub created_at: DateTime<Utc>,
}

impl CreditCard {
    /// Check a register-card payload; returns the number in stored form
    pub fn validate_new(issuance_bank: &str, number: &str) -> Result<String> {
        if issuance_bank.trim().is_empty() {
            return Err(LedgerError::Validation("issuance bank is empty".to_string()));
        }
        if !number.chars().all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-')) {
            return Err(LedgerError::Validation(format!(
                "card number may only contain digits, spaces and dashes: {:?}",
                number
            )));
        }
        let normalized = Self::normalize_number(number);
        if normalized.is_empty() {
            return Err(LedgerError::Validation("card number is empty".to_string()));
        }
        Ok(normalized)
    }

    /// Stored form of a card number: separators stripped
    ///
    /// Example: "4111-1111 1111" → "411111111111"
    pub fn normalize_number(raw: &str) -> String {
        raw.chars().filter(|c| !matches!(c, ' ' | '-')).collect()
    }

    /// Masked form for logs and listings
    pub fn masked_number(&self) -> String {
        Self::mask_number(&self.number)
    }

    /// Mask a card number (show only last 4 digits)
    ///
    /// Example: "4111111111111111" → "*1111"
    pub fn mask_number(full_number: &str) -> String {
        let chars: Vec<char> = full_number.chars().collect();
        if chars.len() <= 4 {
            return full_number.to_string();
        }
        let last4: String = chars[chars.len() - 4..].iter().collect();
        format!("*{}", last4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_number() {
        assert_eq!(CreditCard::mask_number("4111111111111111"), "*1111");
        assert_eq!(CreditCard::mask_number("1234"), "1234");
        assert_eq!(CreditCard::mask_number(""), "");
        assert_eq!(CreditCard::mask_number("4111€€€€"), "*€€€€");
    }

    #[test]
    fn test_validate_new() {
        assert_eq!(
            CreditCard::validate_new("Chase", " 4111-1111 1111 ").unwrap(),
            "411111111111"
        );
        assert!(CreditCard::validate_new("", "4111").is_err());
        assert!(CreditCard::validate_new("Chase", " - ").is_err());
        assert!(CreditCard::validate_new("Chase", "4111x").is_err());
    }

    #[test]
    fn test_normalize_number() {
        assert_eq!(CreditCard::normalize_number("4111 1111"), "41111111");
        assert_eq!(CreditCard::normalize_number("4111-1111"), "41111111");
        assert_eq!(CreditCard::normalize_number("41111111"), "41111111");
    }
}
