// 📈 Timeline - Sparse per-account balance history
//
// A timeline stores only the days on which the balance was asserted.
// Any other day carries forward the balance of the most recent earlier
// checkpoint, so a long-lived account costs one row per observation rather
// than one row per calendar day.

use crate::error::{LedgerError, Result};
use crate::money::Amount;
use crate::search::first_not_before;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Widest range the dense per-day projection will materialize
pub const MAX_DAILY_SPAN_DAYS: i64 = 3_660;

// ============================================================================
// CHECKPOINT
// ============================================================================

/// True balance of an account as of one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub date: NaiveDate,
    pub balance: Amount,
}

impl Checkpoint {
    pub fn new(date: NaiveDate, balance: Amount) -> Self {
        Checkpoint { date, balance }
    }
}

// ============================================================================
// TIMELINE
// ============================================================================

/// Ordered checkpoints of one account
///
/// Invariant: dates strictly increasing. Every constructor normalizes, and
/// the mutators used by the reconciler only insert at the searched position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline {
    checkpoints: Vec<Checkpoint>,
}

impl Timeline {
    pub fn new() -> Self {
        Timeline { checkpoints: Vec::new() }
    }

    /// Build from checkpoints in any order (see `normalize`)
    pub fn from_checkpoints(checkpoints: Vec<Checkpoint>) -> Self {
        let mut timeline = Timeline { checkpoints };
        timeline.normalize();
        timeline
    }

    /// Sort by date and collapse duplicate dates
    ///
    /// The sort is stable, so for a repeated date the checkpoint that came
    /// last in the input survives.
    pub fn normalize(&mut self) {
        self.checkpoints.sort_by_key(|c| c.date);

        let mut deduped: Vec<Checkpoint> = Vec::with_capacity(self.checkpoints.len());
        for checkpoint in self.checkpoints.drain(..) {
            match deduped.last_mut() {
                Some(last) if last.date == checkpoint.date => *last = checkpoint,
                _ => deduped.push(checkpoint),
            }
        }
        self.checkpoints = deduped;
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn into_checkpoints(self) -> Vec<Checkpoint> {
        self.checkpoints
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn first(&self) -> Option<&Checkpoint> {
        self.checkpoints.first()
    }

    pub fn last(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    /// Index of the first checkpoint dated on or after `date`
    pub fn position_of(&self, date: NaiveDate) -> Option<usize> {
        first_not_before(&self.checkpoints, &date, |c| c.date)
    }

    /// Explicit checkpoint on exactly `date`, if any
    pub fn get(&self, date: NaiveDate) -> Option<&Checkpoint> {
        self.position_of(date)
            .map(|idx| &self.checkpoints[idx])
            .filter(|c| c.date == date)
    }

    /// Carry-forward balance on `date`
    ///
    /// None when `date` is before the first checkpoint (nothing was known yet).
    pub fn balance_at(&self, date: NaiveDate) -> Option<Amount> {
        match self.position_of(date) {
            Some(idx) if self.checkpoints[idx].date == date => Some(self.checkpoints[idx].balance),
            Some(0) => None,
            Some(idx) => Some(self.checkpoints[idx - 1].balance),
            None => self.last().map(|c| c.balance),
        }
    }

    /// One balance per calendar day over `[from, to]`
    ///
    /// Days before the first checkpoint are skipped. Read-side projection only;
    /// nothing is ever stored in this dense form. Ranges longer than
    /// `MAX_DAILY_SPAN_DAYS` are rejected.
    pub fn daily_balances(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<(NaiveDate, Amount)>> {
        let span = (to - from).num_days() + 1;
        if span > MAX_DAILY_SPAN_DAYS {
            return Err(LedgerError::Validation(format!(
                "range {}..{} spans {} days, at most {} allowed",
                from, to, span, MAX_DAILY_SPAN_DAYS
            )));
        }

        let mut days = Vec::new();
        let Some(first) = self.first() else {
            return Ok(days);
        };
        if from > to {
            return Ok(days);
        }

        let start = from.max(first.date);
        let mut current = match self.balance_at(start) {
            Some(balance) => balance,
            None => return Ok(days),
        };
        let mut next_idx = match self.position_of(start) {
            Some(idx) if self.checkpoints[idx].date == start => idx + 1,
            Some(idx) => idx,
            None => self.checkpoints.len(),
        };

        for day in start.iter_days().take_while(|d| *d <= to) {
            if let Some(checkpoint) = self.checkpoints.get(next_idx) {
                if checkpoint.date == day {
                    current = checkpoint.balance;
                    next_idx += 1;
                }
            }
            days.push((day, current));
        }

        Ok(days)
    }

    /// Dates strictly increasing
    pub fn is_well_ordered(&self) -> bool {
        self.checkpoints.windows(2).all(|w| w[0].date < w[1].date)
    }

    // ------------------------------------------------------------------------
    // Mutators (reconciler only)
    // ------------------------------------------------------------------------

    pub(crate) fn insert_at(&mut self, idx: usize, checkpoint: Checkpoint) {
        self.checkpoints.insert(idx, checkpoint);
    }

    pub(crate) fn push(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.push(checkpoint);
    }

    /// Add `delta` to every checkpoint from `idx` to the end; returns how many moved
    ///
    /// None if any shifted balance would overflow, in which case nothing moves.
    pub(crate) fn shift_from(&mut self, idx: usize, delta: Amount) -> Option<usize> {
        if delta == Amount::ZERO || idx >= self.checkpoints.len() {
            return Some(0);
        }
        let shifted = self.checkpoints[idx..]
            .iter()
            .map(|c| c.balance.checked_add(delta))
            .collect::<Option<Vec<Amount>>>()?;
        for (checkpoint, balance) in self.checkpoints[idx..].iter_mut().zip(shifted) {
            checkpoint.balance = balance;
        }
        Some(self.checkpoints.len() - idx)
    }
}

impl From<Vec<Checkpoint>> for Timeline {
    fn from(checkpoints: Vec<Checkpoint>) -> Self {
        Timeline::from_checkpoints(checkpoints)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn d(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    fn cp(month: u32, day: u32, cents: i64) -> Checkpoint {
        Checkpoint::new(d(month, day), Amount::from_cents(cents))
    }

    #[test]
    fn test_from_checkpoints_sorts_and_dedups() {
        let timeline = Timeline::from_checkpoints(vec![cp(4, 12, 110), cp(4, 10, 100), cp(4, 12, 999)]);

        assert_eq!(timeline.checkpoints(), &[cp(4, 10, 100), cp(4, 12, 999)]);
        assert!(timeline.is_well_ordered());
    }

    #[test]
    fn test_balance_at_carries_forward() {
        let timeline = Timeline::from_checkpoints(vec![cp(4, 10, 100), cp(4, 12, 110)]);

        assert_eq!(timeline.balance_at(d(4, 9)), None);
        assert_eq!(timeline.balance_at(d(4, 10)), Some(Amount::from_cents(100)));
        assert_eq!(timeline.balance_at(d(4, 11)), Some(Amount::from_cents(100)));
        assert_eq!(timeline.balance_at(d(4, 12)), Some(Amount::from_cents(110)));
        assert_eq!(timeline.balance_at(d(5, 30)), Some(Amount::from_cents(110)));
    }

    #[test]
    fn test_balance_at_empty() {
        assert_eq!(Timeline::new().balance_at(d(4, 10)), None);
    }

    #[test]
    fn test_get_exact_only() {
        let timeline = Timeline::from_checkpoints(vec![cp(4, 10, 100), cp(4, 12, 110)]);

        assert_eq!(timeline.get(d(4, 12)), Some(&cp(4, 12, 110)));
        assert_eq!(timeline.get(d(4, 11)), None);
        assert_eq!(timeline.get(d(4, 13)), None);
    }

    #[test]
    fn test_daily_balances_fills_gaps() {
        let timeline = Timeline::from_checkpoints(vec![cp(4, 10, 100), cp(4, 13, 130)]);

        let days = timeline.daily_balances(d(4, 8), d(4, 14)).unwrap();
        let cents: Vec<(u32, i64)> = days.iter().map(|(date, b)| (chrono::Datelike::day(date), b.cents())).collect();

        assert_eq!(cents, vec![(10, 100), (11, 100), (12, 100), (13, 130), (14, 130)]);
    }

    #[test]
    fn test_daily_balances_starting_mid_gap() {
        let timeline = Timeline::from_checkpoints(vec![cp(4, 10, 100), cp(4, 13, 130)]);

        let days = timeline.daily_balances(d(4, 12), d(4, 13)).unwrap();
        assert_eq!(days, vec![(d(4, 12), Amount::from_cents(100)), (d(4, 13), Amount::from_cents(130))]);
    }

    #[test]
    fn test_daily_balances_inverted_range() {
        let timeline = Timeline::from_checkpoints(vec![cp(4, 10, 100)]);
        assert!(timeline.daily_balances(d(4, 12), d(4, 11)).unwrap().is_empty());
    }

    #[test]
    fn test_shift_from() {
        let mut timeline = Timeline::from_checkpoints(vec![cp(4, 10, 100), cp(4, 11, 105), cp(4, 12, 110)]);

        let moved = timeline.shift_from(1, Amount::from_cents(10));
        assert_eq!(moved, Some(2));
        assert_eq!(timeline.checkpoints(), &[cp(4, 10, 100), cp(4, 11, 115), cp(4, 12, 120)]);

        assert_eq!(timeline.shift_from(3, Amount::from_cents(10)), Some(0));
        assert_eq!(timeline.shift_from(0, Amount::ZERO), Some(0));
    }

    #[test]
    fn test_shift_from_overflow_leaves_timeline_untouched() {
        let start = vec![cp(4, 10, 0), cp(4, 11, 0), cp(4, 12, i64::MAX - 5)];
        let mut timeline = Timeline::from_checkpoints(start.clone());

        assert_eq!(timeline.shift_from(1, Amount::from_cents(10)), None);
        assert_eq!(timeline.checkpoints(), start.as_slice());
    }

    #[test]
    fn test_daily_balances_span_is_capped() {
        let timeline = Timeline::from_checkpoints(vec![cp(4, 10, 100)]);
        let from = NaiveDate::from_ymd_opt(1, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap();

        assert!(matches!(
            timeline.daily_balances(from, to),
            Err(LedgerError::Validation(_))
        ));

        let last_allowed = from + chrono::Days::new(MAX_DAILY_SPAN_DAYS as u64 - 1);
        assert!(timeline.daily_balances(from, last_allowed).is_ok());
    }

    #[test]
    fn test_serde_is_plain_array() {
        let timeline = Timeline::from_checkpoints(vec![cp(4, 10, 100)]);
        let json = serde_json::to_string(&timeline).unwrap();
        assert_eq!(json, r#"[{"date":"2024-04-10","balance":100}]"#);

        let back: Timeline = serde_json::from_str(&json).unwrap();
        assert_eq!(back, timeline);
    }
}
