//! How much of the ring is physically held by at least one node.
//!
//! Disabled nodes still count: coverage answers whether redundancy capacity
//! exists for a position, not who should serve it right now.

use std::borrow::Borrow;

use crate::keyspace::{KeyRange, KeySpace};
use crate::topology::{NodeTopology, topology_of};

/// Number of distinct ring positions covered by the total ranges of `nodes`.
///
/// Returns 0 for no nodes and never more than the ring size.
///
/// # Panics
///
/// If the nodes do not all share one key space.
pub fn coverage<I, T>(nodes: I) -> u32
where
    I: IntoIterator<Item = T>,
    T: Borrow<NodeTopology>,
{
    match merged_intervals(nodes) {
        Some((_, merged)) => merged.iter().map(|(start, end)| end - start).sum::<i64>() as u32,
        None => 0,
    }
}

/// Arcs of the ring not covered by any node, in ring order.
///
/// A gap spanning the wrap point is reported as a single arc. Without any
/// nodes there is no key space to report on, so the result is empty.
pub fn gaps<I, T>(nodes: I) -> Vec<KeyRange>
where
    I: IntoIterator<Item = T>,
    T: Borrow<NodeTopology>,
{
    let Some((keyspace, merged)) = merged_intervals(nodes) else {
        return vec![];
    };
    let n = i64::from(keyspace.length());

    let mut holes = vec![];
    let mut cursor = 0;
    for (start, end) in merged {
        if start > cursor {
            holes.push((cursor, start));
        }
        cursor = end;
    }
    if cursor < n {
        holes.push((cursor, n));
    }

    // join the hole ending at N with the one starting at 0
    if holes.len() > 1 {
        let first = holes[0];
        let last = holes[holes.len() - 1];
        if first.0 == 0 && last.1 == n {
            holes.remove(0);
            let joined = holes.len() - 1;
            holes[joined] = (last.0, n + first.1);
        }
    }

    holes
        .into_iter()
        .map(|(start, end)| keyspace.range(start as u32, (end - start) as u32))
        .collect()
}

/// Sweep-merge of all total ranges, clipped to `[0, N)`.
///
/// Each arc becomes the half-open interval `[start, start + length)`, which
/// may extend past `N`; a copy shifted by `-N` makes the wrapped part line up
/// with the beginning of the ring. After merging, intervals are disjoint, so
/// clipping them to `[0, N)` counts every position at most once.
fn merged_intervals<I, T>(nodes: I) -> Option<(KeySpace, Vec<(i64, i64)>)>
where
    I: IntoIterator<Item = T>,
    T: Borrow<NodeTopology>,
{
    let mut keyspace: Option<KeySpace> = None;
    let mut intervals: Vec<(i64, i64)> = vec![];

    for node in nodes {
        let node = topology_of(&node);
        let total = node.total_range();
        let ks = *keyspace.get_or_insert(total.keyspace());
        assert_eq!(
            ks,
            total.keyspace(),
            "node {} belongs to a different key space",
            node.address()
        );

        let n = i64::from(ks.length());
        let start = i64::from(total.start());
        let end = start + i64::from(total.length());
        intervals.push((start, end));
        intervals.push((start - n, end - n));
    }

    let keyspace = keyspace?;
    let n = i64::from(keyspace.length());
    intervals.sort_unstable();

    let mut merged: Vec<(i64, i64)> = Vec::with_capacity(intervals.len());
    for (start, end) in intervals {
        match merged.last_mut() {
            Some(current) if start <= current.1 => current.1 = current.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let clipped = merged
        .into_iter()
        .filter_map(|(start, end)| {
            let (start, end) = (start.max(0), end.min(n));
            (start < end).then_some((start, end))
        })
        .collect();

    Some((keyspace, clipped))
}
