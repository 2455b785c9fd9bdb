// 🗂️ Batch Grouper - Split a flat batch into per-account batches
//
// Accounts never interact during reconciliation, so each group is an
// independent unit of work.

use crate::observation::Observation;
use std::collections::HashMap;

/// Observations of one batch, keyed by account reference
pub type GroupedBatch = HashMap<String, Vec<Observation>>;

/// Partition observations by account
///
/// Observations are copied, so the caller keeps ownership of its batch.
/// Within one account the input order is preserved; the reconciler relies
/// on that for same-date ties. Empty input yields an empty map.
pub fn group_by_account(observations: &[Observation]) -> GroupedBatch {
    let mut groups: GroupedBatch = HashMap::new();

    for observation in observations {
        groups
            .entry(observation.account_ref.clone())
            .or_default()
            .push(observation.clone());
    }

    groups
}

/// Account references of a grouped batch in sorted order
///
/// Sorted order gives a deterministic lock acquisition order across accounts.
pub fn sorted_accounts(groups: &GroupedBatch) -> Vec<String> {
    let mut accounts: Vec<String> = groups.keys().cloned().collect();
    accounts.sort();
    accounts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Amount;
    use chrono::NaiveDate;

    fn obs(card: &str, day: u32, cents: i64) -> Observation {
        Observation::new(
            card,
            NaiveDate::from_ymd_opt(2024, 4, day).unwrap(),
            Amount::from_cents(cents),
        )
    }

    #[test]
    fn test_empty_batch() {
        assert!(group_by_account(&[]).is_empty());
    }

    #[test]
    fn test_groups_by_card() {
        let batch = vec![
            obs("4111", 10, 100),
            obs("5500", 10, 900),
            obs("4111", 11, 110),
            obs("3700", 9, 50),
        ];

        let groups = group_by_account(&batch);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups["4111"].len(), 2);
        assert_eq!(groups["5500"].len(), 1);
        assert_eq!(groups["3700"][0].balance, Amount::from_cents(50));

        let total: usize = groups.values().map(Vec::len).sum();
        assert_eq!(total, batch.len());
    }

    #[test]
    fn test_preserves_input_order_within_account() {
        let batch = vec![obs("4111", 12, 1), obs("5500", 1, 0), obs("4111", 10, 2), obs("4111", 12, 3)];

        let groups = group_by_account(&batch);
        let balances: Vec<i64> = groups["4111"].iter().map(|o| o.balance.cents()).collect();

        assert_eq!(balances, vec![1, 2, 3]);
    }

    #[test]
    fn test_input_untouched() {
        let batch = vec![obs("4111", 10, 100)];
        let mut groups = group_by_account(&batch);
        groups.get_mut("4111").unwrap()[0].balance = Amount::from_cents(1);

        assert_eq!(batch[0].balance, Amount::from_cents(100));
    }

    #[test]
    fn test_sorted_accounts() {
        let batch = vec![obs("5500", 10, 1), obs("3700", 10, 1), obs("4111", 10, 1)];
        let groups = group_by_account(&batch);
        assert_eq!(sorted_accounts(&groups), vec!["3700", "4111", "5500"]);
    }
}
