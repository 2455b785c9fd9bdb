// 👤 User Entity - Owner of credit cards
//
// Email is the natural key: two users may share a name, never an email.

use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Check a create-user payload before it reaches the database
    pub fn validate_new(name: &str, email: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(LedgerError::Validation("user name is empty".to_string()));
        }

        let email = email.trim();
        let well_formed = match email.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
            None => false,
        };
        if !well_formed {
            return Err(LedgerError::Validation(format!("invalid email: {:?}", email)));
        }

        Ok(())
    }

    /// Emails compare case-insensitively
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_new() {
        assert!(User::validate_new("Ada", "ada@example.com").is_ok());
        assert!(User::validate_new("  ", "ada@example.com").is_err());
        assert!(User::validate_new("Ada", "ada.example.com").is_err());
        assert!(User::validate_new("Ada", "@example.com").is_err());
        assert!(User::validate_new("Ada", "ada@localhost").is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(User::normalize_email(" Ada@Example.COM "), "ada@example.com");
    }
}
