// 🔁 Ledger Service - read timeline → reconcile → write timeline
//
// The pipeline around the pure reconciler:
//   1. reject observations dated after today
//   2. group the batch by account
//   3. lock every touched account (sorted order, so batches never deadlock)
//   4. load every timeline before writing anything (unknown card fails the batch)
//   5. reconcile accounts in parallel
//   6. commit all replacements through the store

use crate::error::{LedgerError, Result};
use crate::grouping::{group_by_account, sorted_accounts, GroupedBatch};
use crate::money::Amount;
use crate::observation::Observation;
use crate::reconciliation::{ReconciliationEngine, ReconciliationReport};
use crate::store::SequenceStore;
use crate::timeline::Timeline;
use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

// ============================================================================
// ACCOUNT LOCKS
// ============================================================================

/// One mutex per account reference, created on first use and dropped again
/// once nobody holds or waits on it
#[derive(Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handles for `accounts`, in the order given
    pub fn handles(&self, accounts: &[String]) -> Vec<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock();
        accounts
            .iter()
            .map(|a| locks.entry(a.clone()).or_default().clone())
            .collect()
    }

    /// Forget idle locks for `accounts`; call after dropping their handles
    pub fn release(&self, accounts: &[String]) {
        let mut locks = self.locks.lock();
        for account in accounts {
            if locks.get(account).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(account);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// LEDGER SERVICE
// ============================================================================

pub struct LedgerService<S: SequenceStore> {
    store: S,
    locks: AccountLocks,
}

impl<S: SequenceStore> LedgerService<S> {
    pub fn new(store: S) -> Self {
        LedgerService {
            store,
            locks: AccountLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconcile `(date, balance)` observations into one account, dated today
    pub fn reconcile(&self, account_ref: &str, observations: &[(NaiveDate, Amount)]) -> Result<Timeline> {
        let today = Local::now().date_naive();
        let observations: Vec<Observation> = observations
            .iter()
            .map(|(date, balance)| Observation::new(account_ref, *date, *balance))
            .collect();

        let mut reports = self.reconcile_batch_on(&observations, today)?;
        match reports.pop() {
            Some(report) => Ok(report.timeline),
            // Nothing to apply: still surface UnknownAccount
            None => self.store.load_timeline(account_ref),
        }
    }

    /// Reconcile a flat, multi-account batch, dated today
    pub fn reconcile_batch(&self, observations: &[Observation]) -> Result<Vec<ReconciliationReport>> {
        self.reconcile_batch_on(observations, Local::now().date_naive())
    }

    /// Reconcile a flat batch with an explicit "today"
    ///
    /// Reports come back sorted by account reference.
    pub fn reconcile_batch_on(
        &self,
        observations: &[Observation],
        today: NaiveDate,
    ) -> Result<Vec<ReconciliationReport>> {
        if let Some(future) = observations.iter().find(|o| o.date > today) {
            return Err(LedgerError::InvalidObservation(format!(
                "date {} for {} is after today ({})",
                future.date, future.account_ref, today
            )));
        }

        let groups = group_by_account(observations);
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let accounts = sorted_accounts(&groups);

        let reports = {
            let handles = self.locks.handles(&accounts);
            let _guards: Vec<_> = handles.iter().map(|h| h.lock()).collect();
            self.reconcile_locked(&accounts, &groups, today)
        };
        self.locks.release(&accounts);
        let reports = reports?;

        info!(
            accounts = reports.len(),
            observations = observations.len(),
            "balance batch reconciled"
        );

        Ok(reports)
    }

    /// Load, reconcile and commit; caller holds every account's lock
    fn reconcile_locked(
        &self,
        accounts: &[String],
        groups: &GroupedBatch,
        today: NaiveDate,
    ) -> Result<Vec<ReconciliationReport>> {
        let current: Vec<(String, Timeline)> = accounts
            .iter()
            .map(|account| -> Result<(String, Timeline)> {
                Ok((account.clone(), self.store.load_timeline(account)?))
            })
            .collect::<Result<_>>()?;

        let engine = ReconciliationEngine::new(today);
        let reports: Vec<ReconciliationReport> = current
            .into_par_iter()
            .map(|(account, timeline)| {
                let batch = groups.get(&account).map(Vec::as_slice).unwrap_or(&[]);
                engine.reconcile(&account, timeline, batch)
            })
            .collect::<Result<_>>()?;

        self.store.commit(&reports)?;
        Ok(reports)
    }

    /// Current timeline of an account
    pub fn timeline(&self, account_ref: &str) -> Result<Timeline> {
        self.store.load_timeline(account_ref)
    }

    /// Carry-forward balance of an account on `date`
    pub fn balance_at(&self, account_ref: &str, date: NaiveDate) -> Result<Option<Amount>> {
        Ok(self.store.load_timeline(account_ref)?.balance_at(date))
    }

    /// Per-day balances of an account over `[from, to]`, at most
    /// `MAX_DAILY_SPAN_DAYS` days
    pub fn daily_balances(
        &self,
        account_ref: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(NaiveDate, Amount)>> {
        self.store.load_timeline(account_ref)?.daily_balances(from, to)
    }
}

// ============================================================================
// TESTS
// ============================================================================
