// 🔎 Ordered search primitive
//
// One lower-bound search shared by the reconciler and the carry-forward
// query, so every "where does this date go" question is answered the same way.

/// Find the first index whose key is not before `key`
///
/// Contract:
/// - `items` must be sorted ascending by `key_fn`
/// - returns `Some(i)` for the smallest `i` with `key_fn(&items[i]) >= key`
/// - returns `None` when every key is strictly before `key` (including empty input)
pub fn first_not_before<T, K, F>(items: &[T], key: &K, key_fn: F) -> Option<usize>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let idx = items.partition_point(|item| key_fn(item) < *key);
    (idx < items.len()).then_some(idx)
}
