//! Sibling placement math over fractional order keys.

use crate::properties::{OrderKey, ORDER_STEP};

/// Key for inserting at `index` among `siblings` (keys ascending) without
/// touching any existing key. `None` when midpoint precision between the two
/// neighbors is exhausted and the range must be renumbered first.
pub(crate) fn insertion_key(siblings: &[OrderKey], index: usize) -> Option<OrderKey> {
    let prev = index.checked_sub(1).and_then(|i| siblings.get(i)).copied();
    let next = siblings.get(index).copied();
    match (prev, next) {
        (None, None) => Some(OrderKey::zero()),
        (Some(p), None) => Some(p.after()),
        (None, Some(n)) => Some(n.before()),
        (Some(p), Some(n)) => OrderKey::midpoint(p, n),
    }
}

/// Evenly spaced keys for `count` blocks landing contiguously between two
/// existing neighbors. `None` when the gap cannot host that many distinct
/// keys.
pub(crate) fn spread_keys(
    prev: Option<OrderKey>,
    next: Option<OrderKey>,
    count: usize,
) -> Option<Vec<OrderKey>> {
    if count == 0 {
        return Some(Vec::new());
    }
    match (prev, next) {
        (None, None) => Some(rebalanced_keys(count)),
        (Some(p), None) => Some(
            (1..=count)
                .map(|i| OrderKey::new(p.value() + i as f64 * ORDER_STEP))
                .collect(),
        ),
        (None, Some(n)) => {
            let base = n.value() - count as f64 * ORDER_STEP;
            Some(
                (0..count)
                    .map(|i| OrderKey::new(base + i as f64 * ORDER_STEP))
                    .collect(),
            )
        }
        (Some(p), Some(n)) => {
            let step = (n.value() - p.value()) / (count as f64 + 1.0);
            let keys: Vec<OrderKey> = (1..=count)
                .map(|i| OrderKey::new(p.value() + step * i as f64))
                .collect();
            let mut ok = keys[0] > p && keys[count - 1] < n;
            for pair in keys.windows(2) {
                ok &= pair[0] < pair[1];
            }
            ok.then_some(keys)
        }
    }
}

/// Fresh evenly spaced keys for a full sibling list.
pub(crate) fn rebalanced_keys(count: usize) -> Vec<OrderKey> {
    (0..count)
        .map(|i| OrderKey::new(i as f64 * ORDER_STEP))
        .collect()
}
