// 💵 Money - Signed fixed-point amounts in integer cents
//
// Balances are never stored as floats. Payloads may still carry floats
// (JSON numbers), so conversion rounds to the nearest cent exactly once.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Amount in cents (e.g. 12345 = 123.45)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Largest magnitude accepted from payloads: 2^53 cents, exact as an f64
    pub const MAX_INPUT_CENTS: i64 = 1 << 53;

    pub const fn from_cents(cents: i64) -> Self {
        Amount(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Convert a floating payload value, rounding to the nearest cent
    ///
    /// Returns None for NaN, infinities and magnitudes above `MAX_INPUT_CENTS`.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let cents = (value * 100.0).round();
        if cents.abs() > Self::MAX_INPUT_CENTS as f64 {
            return None;
        }
        Some(Amount(cents as i64))
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Parse a decimal string such as "123.45", "-7", "+0.5" or "1,250.00"
    pub fn parse(input: &str) -> Option<Self> {
        let cleaned: String = input.trim().chars().filter(|c| *c != ',' && *c != '$').collect();
        if cleaned.is_empty() {
            return None;
        }

        let (negative, digits) = match cleaned.as_bytes()[0] {
            b'-' => (true, &cleaned[1..]),
            b'+' => (false, &cleaned[1..]),
            _ => (false, cleaned.as_str()),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        if frac.len() > 2 || !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().ok()? * 10,
            _ => frac.parse().ok()?,
        };

        let cents = whole.checked_mul(100)?.checked_add(frac)?;
        if cents > Self::MAX_INPUT_CENTS {
            return None;
        }
        Some(Amount(if negative { -cents } else { cents }))
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_strings() {
        assert_eq!(Amount::parse("123.45"), Some(Amount::from_cents(12345)));
        assert_eq!(Amount::parse("-7"), Some(Amount::from_cents(-700)));
        assert_eq!(Amount::parse("+0.5"), Some(Amount::from_cents(50)));
        assert_eq!(Amount::parse(".25"), Some(Amount::from_cents(25)));
        assert_eq!(Amount::parse("$1,250.00"), Some(Amount::from_cents(125000)));
        assert_eq!(Amount::parse(" 42 "), Some(Amount::from_cents(4200)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Amount::parse(""), None);
        assert_eq!(Amount::parse("-"), None);
        assert_eq!(Amount::parse("."), None);
        assert_eq!(Amount::parse("12.345"), None);
        assert_eq!(Amount::parse("abc"), None);
        assert_eq!(Amount::parse("1.2.3"), None);
    }

    #[test]
    fn test_from_f64_rounds_to_cent() {
        assert_eq!(Amount::from_f64(110.0), Some(Amount::from_cents(11000)));
        assert_eq!(Amount::from_f64(0.1 + 0.2), Some(Amount::from_cents(30)));
        assert_eq!(Amount::from_f64(-19.999), Some(Amount::from_cents(-2000)));
        assert_eq!(Amount::from_f64(f64::NAN), None);
        assert_eq!(Amount::from_f64(f64::INFINITY), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::from_cents(12345).to_string(), "123.45");
        assert_eq!(Amount::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Amount::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Amount::from_cents(11000);
        let b = Amount::from_cents(10000);
        assert_eq!(a - b, Amount::from_cents(1000));
        assert_eq!(-(a - b), Amount::from_cents(-1000));
        assert_eq!(a + b, Amount::from_cents(21000));
    }

    #[test]
    fn test_checked_arithmetic_reports_overflow() {
        let max = Amount::from_cents(i64::MAX);
        assert_eq!(max.checked_add(Amount::from_cents(1)), None);
        assert_eq!(Amount::from_cents(i64::MIN).checked_sub(Amount::from_cents(1)), None);
        assert_eq!(
            Amount::from_cents(5).checked_sub(Amount::from_cents(7)),
            Some(Amount::from_cents(-2))
        );
    }

    #[test]
    fn test_payload_magnitude_is_bounded() {
        let limit = Amount::MAX_INPUT_CENTS;
        assert_eq!(
            Amount::from_f64(-90_000_000_000_000.0),
            Some(Amount::from_cents(-9_000_000_000_000_000))
        );
        assert_eq!(Amount::from_f64(9.0e16), None);
        assert_eq!(Amount::from_f64(-9.0e16), None);
        assert_eq!(Amount::parse("90071992547409.93"), None);
        assert_eq!(Amount::parse("-90071992547409.92"), Some(Amount::from_cents(-limit)));
        assert_eq!(Amount::parse("99999999999999999"), None);
    }
}
