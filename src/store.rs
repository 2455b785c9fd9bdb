// 🗄️ Sequence Store - Where timelines live between reconciliations
//
// The reconciler never touches storage. A store hands out the current
// timeline of an account and takes back full replacements.

use crate::error::{LedgerError, Result};
use crate::reconciliation::ReconciliationReport;
use crate::timeline::Timeline;
use parking_lot::RwLock;
use std::collections::HashMap;

pub trait SequenceStore: Send + Sync {
    /// Current timeline of an account (empty if nothing recorded yet)
    ///
    /// Fails with `UnknownAccount` when the account does not exist.
    fn load_timeline(&self, account_ref: &str) -> Result<Timeline>;

    /// Replace an account's timeline in full
    fn store_timeline(&self, account_ref: &str, timeline: &Timeline) -> Result<()>;

    /// Persist the outcome of a whole batch
    ///
    /// Stores that can should make this all-or-nothing across accounts.
    fn commit(&self, reports: &[ReconciliationReport]) -> Result<()> {
        for report in reports {
            self.store_timeline(&report.account_ref, &report.timeline)?;
        }
        Ok(())
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-memory store; an account exists once registered
pub struct MemoryStore {
    timelines: RwLock<HashMap<String, Timeline>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            timelines: RwLock::new(HashMap::new()),
        }
    }

    /// Register an account with an empty timeline (no-op if already known)
    pub fn register_account(&self, account_ref: &str) {
        self.timelines
            .write()
            .entry(account_ref.to_string())
            .or_default();
    }

    pub fn contains(&self, account_ref: &str) -> bool {
        self.timelines.read().contains_key(account_ref)
    }

    pub fn account_count(&self) -> usize {
        self.timelines.read().len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceStore for MemoryStore {
    fn load_timeline(&self, account_ref: &str) -> Result<Timeline> {
        self.timelines
            .read()
            .get(account_ref)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownAccount(account_ref.to_string()))
    }

    fn store_timeline(&self, account_ref: &str, timeline: &Timeline) -> Result<()> {
        let mut timelines = self.timelines.write();
        match timelines.get_mut(account_ref) {
            Some(slot) => {
                *slot = timeline.clone();
                Ok(())
            }
            None => Err(LedgerError::UnknownAccount(account_ref.to_string())),
        }
    }

    fn commit(&self, reports: &[ReconciliationReport]) -> Result<()> {
        // One write lock for the batch, checked before anything changes
        let mut timelines = self.timelines.write();
        if let Some(missing) = reports.iter().find(|r| !timelines.contains_key(&r.account_ref)) {
            return Err(LedgerError::UnknownAccount(missing.account_ref.clone()));
        }
        for report in reports {
            timelines.insert(report.account_ref.clone(), report.timeline.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Amount;
    use crate::timeline::Checkpoint;
    use chrono::NaiveDate;

    fn single(cents: i64) -> Timeline {
        Timeline::from_checkpoints(vec![Checkpoint::new(
            NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
            Amount::from_cents(cents),
        )])
    }

    #[test]
    fn test_unknown_account() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load_timeline("4111"),
            Err(LedgerError::UnknownAccount(ref a)) if a == "4111"
        ));
        assert!(store.store_timeline("4111", &single(1)).is_err());
    }

    #[test]
    fn test_register_then_round_trip() {
        let store = MemoryStore::new();
        store.register_account("4111");

        assert!(store.load_timeline("4111").unwrap().is_empty());

        store.store_timeline("4111", &single(100)).unwrap();
        assert_eq!(store.load_timeline("4111").unwrap(), single(100));

        // registering again keeps the data
        store.register_account("4111");
        assert_eq!(store.load_timeline("4111").unwrap().len(), 1);
        assert_eq!(store.account_count(), 1);
    }

    #[test]
    fn test_commit_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.register_account("4111");

        let engine = crate::reconciliation::ReconciliationEngine::new(
            NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
        );
        let known = engine.reconcile("4111", Timeline::new(), &[]).unwrap();
        let mut unknown = known.clone();
        unknown.account_ref = "9999".to_string();
        let mut updated = known.clone();
        updated.timeline = single(5);

        assert!(store.commit(&[updated, unknown]).is_err());
        assert!(store.load_timeline("4111").unwrap().is_empty());
    }
}
