// ⚖️ Reconciliation Engine - Merge reported balances into a timeline
//
// Every observation is ground truth for its own date. When it disagrees with
// what the timeline assumed for that date, every later checkpoint was built
// on the wrong assumption and moves by the same delta:
//
//   delta = reported_balance - assumed_balance_on_that_date
//
// After all observations are applied the timeline is topped up with a
// checkpoint for today.

use crate::error::{LedgerError, Result};
use crate::money::Amount;
use crate::observation::{fingerprint, Observation};
use crate::timeline::{Checkpoint, Timeline};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// ADJUSTMENT
// ============================================================================

/// Which branch an observation took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentKind {
    /// Timeline was empty
    Initial,

    /// Before the earliest checkpoint; nothing shifted
    Prepended,

    /// After the latest checkpoint; nothing shifted
    Appended,

    /// Same date as an existing checkpoint; it and everything after shift
    Updated,

    /// Between two checkpoints; everything after shifts
    Inserted,
}

/// What one observation did to the timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub date: NaiveDate,
    pub balance: Amount,
    pub kind: AdjustmentKind,

    /// reported - assumed (zero for branches without an assumption)
    pub delta: Amount,

    /// Number of later checkpoints moved by `delta`
    pub shifted: usize,
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub account_ref: String,

    /// Full replacement timeline
    pub timeline: Timeline,

    /// One entry per observation, in application order
    pub adjustments: Vec<Adjustment>,

    /// Whether a checkpoint for today was appended
    pub topped_up: bool,

    pub previous_len: usize,
    pub reconciled_on: NaiveDate,

    /// SHA-256 of the applied observations (see `observation::fingerprint`)
    pub fingerprint: String,
}

impl ReconciliationReport {
    pub fn inserted_count(&self) -> usize {
        self.adjustments
            .iter()
            .filter(|a| a.kind != AdjustmentKind::Updated)
            .count()
    }

    pub fn updated_count(&self) -> usize {
        self.adjustments
            .iter()
            .filter(|a| a.kind == AdjustmentKind::Updated)
            .count()
    }

    /// Total checkpoint moves caused by propagation
    pub fn shifted_count(&self) -> usize {
        self.adjustments.iter().map(|a| a.shifted).sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation for {}: {} observations ({} new, {} updated), {} shifts, {} -> {} checkpoints{}",
            self.account_ref,
            self.adjustments.len(),
            self.inserted_count(),
            self.updated_count(),
            self.shifted_count(),
            self.previous_len,
            self.timeline.len(),
            if self.topped_up { ", topped up to today" } else { "" }
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Date used for the top-up checkpoint
    pub today: NaiveDate,
}

impl ReconciliationEngine {
    pub fn new(today: NaiveDate) -> Self {
        ReconciliationEngine { today }
    }

    /// Engine dated with the local calendar day
    pub fn for_today() -> Self {
        ReconciliationEngine::new(Local::now().date_naive())
    }

    /// Reconcile one account's observations into its current timeline
    ///
    /// Observations are applied in ascending date order; observations sharing
    /// a date keep their input order, so the last one reported wins. Fails with
    /// `InvalidObservation` if a correction would push any balance out of range.
    ///
    /// Example:
    /// ```
    /// use balance_ledger::{Amount, Checkpoint, Observation, ReconciliationEngine, Timeline};
    /// use chrono::NaiveDate;
    ///
    /// let d = |day| NaiveDate::from_ymd_opt(2024, 4, day).unwrap();
    /// let engine = ReconciliationEngine::new(d(12));
    /// let timeline = Timeline::from_checkpoints(vec![
    ///     Checkpoint::new(d(10), Amount::from_cents(100)),
    ///     Checkpoint::new(d(12), Amount::from_cents(110)),
    /// ]);
    ///
    /// let report = engine.reconcile("4111", timeline, &[
    ///     Observation::new("4111", d(11), Amount::from_cents(110)),
    /// ]).unwrap();
    ///
    /// assert_eq!(report.timeline.balance_at(d(12)), Some(Amount::from_cents(120)));
    /// ```
    pub fn reconcile(
        &self,
        account_ref: &str,
        current: Timeline,
        observations: &[Observation],
    ) -> Result<ReconciliationReport> {
        let previous_len = current.len();

        // Callers keep timelines sorted; normalize anyway rather than trust it
        let mut timeline = current;
        timeline.normalize();

        let mut ordered: Vec<&Observation> = observations.iter().collect();
        ordered.sort_by_key(|o| o.date);

        let adjustments: Vec<Adjustment> = ordered
            .into_iter()
            .map(|o| {
                apply_observation(&mut timeline, o.date, o.balance).ok_or_else(|| {
                    LedgerError::InvalidObservation(format!(
                        "balance {} on {} for {} moves later checkpoints out of range",
                        o.balance, o.date, account_ref
                    ))
                })
            })
            .collect::<Result<_>>()?;

        let topped_up = top_up(&mut timeline, self.today);

        let report = ReconciliationReport {
            account_ref: account_ref.to_string(),
            timeline,
            adjustments,
            topped_up,
            previous_len,
            reconciled_on: self.today,
            fingerprint: fingerprint(observations),
        };
        debug!(account = account_ref, "{}", report.summary());
        Ok(report)
    }
}

/// Apply one observation in place
///
/// None when the delta or a shifted balance overflows; the timeline is then
/// left as it was.
pub fn apply_observation(timeline: &mut Timeline, date: NaiveDate, balance: Amount) -> Option<Adjustment> {
    let checkpoint = Checkpoint::new(date, balance);
    let adjustment = |kind, delta, shifted| Adjustment {
        date,
        balance,
        kind,
        delta,
        shifted,
    };

    if timeline.is_empty() {
        timeline.push(checkpoint);
        return Some(adjustment(AdjustmentKind::Initial, Amount::ZERO, 0));
    }

    let applied = match timeline.position_of(date) {
        // Exact match first, so a date equal to the earliest one is an update
        Some(idx) if timeline.checkpoints()[idx].date == date => {
            let old = timeline.checkpoints()[idx].balance;
            let delta = balance.checked_sub(old)?;
            // idx itself lands on `balance` because old + delta == balance
            let moved = timeline.shift_from(idx, delta)?;
            adjustment(AdjustmentKind::Updated, delta, moved.saturating_sub(1))
        }
        Some(0) => {
            timeline.insert_at(0, checkpoint);
            adjustment(AdjustmentKind::Prepended, Amount::ZERO, 0)
        }
        Some(idx) => {
            let assumed = timeline.checkpoints()[idx - 1].balance;
            let delta = balance.checked_sub(assumed)?;
            let shifted = timeline.shift_from(idx, delta)?;
            timeline.insert_at(idx, checkpoint);
            adjustment(AdjustmentKind::Inserted, delta, shifted)
        }
        None => {
            timeline.push(checkpoint);
            adjustment(AdjustmentKind::Appended, Amount::ZERO, 0)
        }
    };
    Some(applied)
}

/// Append a checkpoint for `today` carrying the latest balance forward
///
/// Empty timelines stay empty. A timeline already ending on (or, never in
/// practice, after) today is left alone so dates stay strictly increasing.
pub fn top_up(timeline: &mut Timeline, today: NaiveDate) -> bool {
    match timeline.last() {
        Some(last) if last.date < today => {
            let balance = last.balance;
            timeline.push(Checkpoint::new(today, balance));
            true
        }
        _ => false,
    }
}

// ============================================================================
// TESTS
// ============================================================================
