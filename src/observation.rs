// 📥 Observations - Externally reported balances
//
// Raw payloads (JSON or CSV rows) are validated here into well-typed
// observations. Nothing malformed ever reaches the reconciler.

use crate::entities::CreditCard;
use crate::error::{LedgerError, Result};
use crate::money::Amount;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Date formats accepted on input (ISO first, then US statement style)
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

// ============================================================================
// OBSERVATION
// ============================================================================

/// A reported (account, date, balance) triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Account reference: the credit card number
    pub account_ref: String,
    pub date: NaiveDate,
    pub balance: Amount,
}

impl Observation {
    /// Card number separators are stripped so every spelling names one account
    pub fn new(account_ref: impl AsRef<str>, date: NaiveDate, balance: Amount) -> Self {
        Observation {
            account_ref: CreditCard::normalize_number(account_ref.as_ref()),
            date,
            balance,
        }
    }
}

// ============================================================================
// RAW PAYLOADS
// ============================================================================

/// Balance update payload as sent by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    pub credit_card_number: String,
    pub balance_date: String,
    pub balance_amount: f64,
}

impl RawObservation {
    /// Validate into an observation; dates after `today` are rejected
    pub fn validate(&self, today: NaiveDate) -> Result<Observation> {
        let account_ref = CreditCard::normalize_number(self.credit_card_number.trim());
        if account_ref.is_empty() {
            return Err(LedgerError::InvalidObservation(
                "credit card number is empty".to_string(),
            ));
        }

        let date = parse_date(&self.balance_date)?;
        if date > today {
            return Err(LedgerError::InvalidObservation(format!(
                "balance date {} is after today ({})",
                date, today
            )));
        }

        let balance = Amount::from_f64(self.balance_amount).ok_or_else(|| {
            LedgerError::InvalidObservation(format!(
                "balance amount {} is not a finite amount within range",
                self.balance_amount
            ))
        })?;

        Ok(Observation::new(account_ref, date, balance))
    }
}

/// CSV row: `card_number,date,balance`
#[derive(Debug, Clone, Deserialize)]
struct CsvRow {
    card_number: String,
    date: String,
    balance: String,
}

/// Validate a whole batch; the first bad entry fails the batch
pub fn validate_batch(raw: &[RawObservation], today: NaiveDate) -> Result<Vec<Observation>> {
    raw.iter()
        .enumerate()
        .map(|(i, r)| {
            r.validate(today).map_err(|e| match e {
                LedgerError::InvalidObservation(msg) => {
                    LedgerError::InvalidObservation(format!("entry {}: {}", i, msg))
                }
                other => other,
            })
        })
        .collect()
}

/// Parse a calendar date in any accepted format
///
/// Only four-digit years are accepted.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .filter(|date| (1000..=9999).contains(&date.year()))
        .ok_or_else(|| LedgerError::InvalidObservation(format!("unparseable date: {:?}", input)))
}

/// Load observations from a CSV file with a `card_number,date,balance` header
pub fn load_csv(csv_path: &Path, today: NaiveDate) -> Result<Vec<Observation>> {
    let mut rdr = csv::Reader::from_path(csv_path)?;
    read_csv(&mut rdr, today)
}

fn read_csv<R: std::io::Read>(rdr: &mut csv::Reader<R>, today: NaiveDate) -> Result<Vec<Observation>> {
    let mut observations = Vec::new();

    for (line, result) in rdr.deserialize().enumerate() {
        let row: CsvRow = result?;
        // header is line 1
        let line = line + 2;

        let balance = Amount::parse(&row.balance).ok_or_else(|| {
            LedgerError::InvalidObservation(format!(
                "line {}: bad or out-of-range balance {:?}",
                line, row.balance
            ))
        })?;
        let date = parse_date(&row.date).map_err(|_| {
            LedgerError::InvalidObservation(format!("line {}: unparseable date {:?}", line, row.date))
        })?;
        if date > today {
            return Err(LedgerError::InvalidObservation(format!(
                "line {}: balance date {} is after today",
                line, date
            )));
        }
        let card = CreditCard::normalize_number(row.card_number.trim());
        if card.is_empty() {
            return Err(LedgerError::InvalidObservation(format!(
                "line {}: empty card number",
                line
            )));
        }

        observations.push(Observation::new(card, date, balance));
    }

    Ok(observations)
}

/// SHA-256 over the observations in application order (date ascending, ties in input order)
///
/// Recorded in the audit trail so replays of the same batch are recognisable.
pub fn fingerprint(observations: &[Observation]) -> String {
    let mut ordered: Vec<&Observation> = observations.iter().collect();
    ordered.sort_by_key(|o| o.date);

    let mut hasher = Sha256::new();
    for o in ordered {
        hasher.update(format!("{}|{}|{};", o.account_ref, o.date, o.balance.cents()));
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 12).unwrap()
    }

    fn raw(card: &str, date: &str, amount: f64) -> RawObservation {
        RawObservation {
            credit_card_number: card.to_string(),
            balance_date: date.to_string(),
            balance_amount: amount,
        }
    }

    #[test]
    fn test_validate_ok() {
        let obs = raw(" 4111 ", "2024-04-10", 100.5).validate(today()).unwrap();
        assert_eq!(obs.account_ref, "4111");
        assert_eq!(obs.date, NaiveDate::from_ymd_opt(2024, 4, 10).unwrap());
        assert_eq!(obs.balance, Amount::from_cents(10050));
    }

    #[test]
    fn test_validate_us_date_format() {
        let obs = raw("4111", "04/11/2024", 1.0).validate(today()).unwrap();
        assert_eq!(obs.date, NaiveDate::from_ymd_opt(2024, 4, 11).unwrap());
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert!(matches!(
            raw("", "2024-04-10", 1.0).validate(today()),
            Err(LedgerError::InvalidObservation(_))
        ));
        assert!(matches!(
            raw("4111", "yesterday", 1.0).validate(today()),
            Err(LedgerError::InvalidObservation(_))
        ));
        assert!(matches!(
            raw("4111", "2024-04-10", f64::NAN).validate(today()),
            Err(LedgerError::InvalidObservation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_amount() {
        let err = raw("4111", "2024-04-10", 9.0e16).validate(today()).unwrap_err();
        assert!(err.to_string().contains("within range"));
        assert!(raw("4111", "2024-04-11", -9.0e16).validate(today()).is_err());
        assert!(raw("4111", "2024-04-11", -9.0e13).validate(today()).is_ok());
    }

    #[test]
    fn test_validate_normalizes_card_number() {
        let obs = raw("4111-1111 1111", "2024-04-10", 1.0).validate(today()).unwrap();
        assert_eq!(obs.account_ref, "411111111111");

        let d = NaiveDate::from_ymd_opt(2024, 4, 10).unwrap();
        assert_eq!(Observation::new("4111 1111", d, Amount::ZERO).account_ref, "41111111");
    }

    #[test]
    fn test_parse_date_rejects_extended_years() {
        assert!(parse_date("+20000-01-01").is_err());
        assert!(parse_date("0001-01-01").is_err());
        assert!(parse_date("9999-12-31").is_ok());
    }

    #[test]
    fn test_validate_rejects_future_date() {
        let err = raw("4111", "2024-04-13", 1.0).validate(today()).unwrap_err();
        assert!(err.to_string().contains("after today"));

        // today itself is fine
        assert!(raw("4111", "2024-04-12", 1.0).validate(today()).is_ok());
    }

    #[test]
    fn test_validate_batch_reports_entry() {
        let batch = vec![raw("4111", "2024-04-10", 1.0), raw("4111", "bad", 1.0)];
        let err = validate_batch(&batch, today()).unwrap_err();
        assert!(err.to_string().contains("entry 1"));
    }

    #[test]
    fn test_payload_field_names() {
        let json = r#"[{"creditCardNumber":"4111","balanceDate":"2024-04-11","balanceAmount":110}]"#;
        let parsed: Vec<RawObservation> = serde_json::from_str(json).unwrap();
        let obs = validate_batch(&parsed, today()).unwrap();
        assert_eq!(obs[0].balance, Amount::from_cents(11000));
    }

    #[test]
    fn test_read_csv() {
        let data = "card_number,date,balance\n4111,2024-04-10,100.00\n5500,04/11/2024,-12.5\n";
        let mut rdr = csv::Reader::from_reader(data.as_bytes());
        let obs = read_csv(&mut rdr, today()).unwrap();

        assert_eq!(obs.len(), 2);
        assert_eq!(obs[1].account_ref, "5500");
        assert_eq!(obs[1].balance, Amount::from_cents(-1250));
    }

    #[test]
    fn test_read_csv_reports_line() {
        let data = "card_number,date,balance\n4111,2024-04-10,100.00\n4111,2024-04-11,oops\n";
        let mut rdr = csv::Reader::from_reader(data.as_bytes());
        let err = read_csv(&mut rdr, today()).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_fingerprint_ignores_distinct_date_order() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 4, day).unwrap();
        let a = Observation::new("4111", d(10), Amount::from_cents(100));
        let b = Observation::new("4111", d(11), Amount::from_cents(110));

        let f1 = fingerprint(&[a.clone(), b.clone()]);
        let f2 = fingerprint(&[b, a]);
        assert_eq!(f1, f2);
        assert_eq!(f1.len(), 64);
    }
}
