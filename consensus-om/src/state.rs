//! Round bookkeeping for in-flight OM consensus.
//!
//! Rounds live in a flat table keyed by round id; parent linkage is by
//! `parentid` only, which keeps garbage collection a simple sweep.  A
//! round records one vote slot per expected child; slots transition from
//! pending to filled exactly once, on the first matching report (or on
//! deadline expiry, when the engine substitutes the default sentinel).

use {
    crate::{
        policy::DEFAULT_SENTINEL,
        types::{PeerKey, RoundId},
    },
    log::debug,
    std::{
        collections::HashMap,
        time::{Duration, Instant},
    },
};

/// One in-flight (or recently resolved) consensus round.
#[derive(Debug, Clone)]
pub struct RoundNode {
    /// Unique round id.
    pub id: RoundId,
    /// Id of the round that spawned this one; empty for a root.
    pub parentid: String,
    /// Recursion levels remaining below this round.
    pub om: u32,
    /// Database index targeted by the root.
    pub index: usize,
    /// The value this node received (or proposed) at this level.
    pub value_received: String,
    /// Peer key of the root initiator.
    pub origin: PeerKey,
    /// Peers already visited on this branch.
    pub path: Vec<PeerKey>,
    /// The peer that forwarded this round here; `None` when this node
    /// originated it (root start or own sub-round broadcast).
    pub forwarder: Option<PeerKey>,
    /// Expected child votes: `None` until the child reports.
    pub children: HashMap<PeerKey, Option<String>>,
    /// Wall time after which missing votes default to the sentinel.
    pub deadline: Instant,
    /// Populated exactly once, on resolution.
    pub result: Option<String>,
}

impl RoundNode {
    /// Whether this is a root-shaped round (resolution writes the store).
    pub fn is_root(&self) -> bool {
        self.parentid.is_empty()
    }

    /// Whether this round has already resolved.
    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }

    /// Children that have not reported yet.
    pub fn pending_children(&self) -> Vec<&PeerKey> {
        self.children
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k)
            .collect()
    }

    /// Strict majority over the received value plus all filled child
    /// votes.  With no strict majority the fixed default sentinel wins;
    /// substituted defaults participate on equal terms.
    pub fn decide(&self) -> String {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        counts.insert(self.value_received.as_str(), 1);
        let mut total = 1usize;
        for vote in self.children.values().flatten() {
            *counts.entry(vote.as_str()).or_default() += 1;
            total += 1;
        }
        let (winner, best) = counts
            .into_iter()
            .max_by_key(|(_, n)| *n)
            .unwrap_or((DEFAULT_SENTINEL, 0));
        if best.saturating_mul(2) > total {
            winner.to_string()
        } else {
            DEFAULT_SENTINEL.to_string()
        }
    }
}

/// Outcome of recording a child vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordChild {
    /// Recorded, and every child of the round has now reported.
    Complete,
    /// Recorded; other children are still pending.
    Incomplete,
    /// Dropped: unknown round, resolved round, unknown child, or a child
    /// that already reported.
    Rejected,
}

/// The set of in-flight rounds on this node.
#[derive(Debug, Default)]
pub struct RoundTable {
    rounds: HashMap<RoundId, RoundNode>,
}

impl RoundTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rounds currently tracked.
    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rounds.contains_key(id)
    }

    pub fn find_round(&self, id: &str) -> Option<&RoundNode> {
        self.rounds.get(id)
    }

    pub fn find_round_mut(&mut self, id: &str) -> Option<&mut RoundNode> {
        self.rounds.get_mut(id)
    }

    /// Insert a new round.  Returns `false` (and leaves the table
    /// untouched) when the id is already present: a round id appears at
    /// most once on a given node.
    pub fn add_round(&mut self, node: RoundNode) -> bool {
        if self.rounds.contains_key(&node.id) {
            return false;
        }
        self.rounds.insert(node.id.clone(), node);
        true
    }

    /// Record a child vote.  The first matching report wins; anything
    /// else is rejected.
    pub fn record_child(&mut self, id: &str, child: &str, value: String) -> RecordChild {
        let Some(round) = self.rounds.get_mut(id) else {
            return RecordChild::Rejected;
        };
        if round.is_resolved() {
            return RecordChild::Rejected;
        }
        let Some(slot) = round.children.get_mut(child) else {
            return RecordChild::Rejected;
        };
        if slot.is_some() {
            return RecordChild::Rejected;
        }
        *slot = Some(value);
        if round.children.values().all(|v| v.is_some()) {
            RecordChild::Complete
        } else {
            RecordChild::Incomplete
        }
    }

    /// Ids of unresolved rounds whose deadline has passed.
    pub fn deadline_expired(&self, now: Instant) -> Vec<RoundId> {
        self.rounds
            .values()
            .filter(|r| !r.is_resolved() && r.deadline < now)
            .map(|r| r.id.clone())
            .collect()
    }

    /// Drop rounds older than `deadline + grace`.  Returns how many were
    /// collected.
    pub fn sweep_expired(&mut self, now: Instant, grace: Duration) -> usize {
        let before = self.rounds.len();
        self.rounds.retain(|id, r| {
            let keep = now <= r.deadline + grace;
            if !keep {
                debug!("collecting round {id} (resolved={})", r.is_resolved());
            }
            keep
        });
        before.saturating_sub(self.rounds.len())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round(id: &str, children: &[&str]) -> RoundNode {
        RoundNode {
            id: id.to_string(),
            parentid: String::new(),
            om: 0,
            index: 0,
            value_received: "apple".to_string(),
            origin: "10.0.0.1:9000".to_string(),
            path: vec!["10.0.0.1:9000".to_string()],
            forwarder: None,
            children: children
                .iter()
                .map(|c| (c.to_string(), None))
                .collect(),
            deadline: Instant::now() + Duration::from_secs(5),
            result: None,
        }
    }

    #[test]
    fn test_duplicate_round_id_rejected() {
        let mut table = RoundTable::new();
        assert!(table.add_round(round("r1", &[])));
        assert!(!table.add_round(round("r1", &[])));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_record_child_transitions() {
        let mut table = RoundTable::new();
        table.add_round(round("r1", &["a:1", "b:1"]));

        assert_eq!(
            table.record_child("r1", "a:1", "apple".to_string()),
            RecordChild::Incomplete
        );
        // Second report from the same child is dropped.
        assert_eq!(
            table.record_child("r1", "a:1", "pear".to_string()),
            RecordChild::Rejected
        );
        // Unknown child is dropped.
        assert_eq!(
            table.record_child("r1", "c:1", "pear".to_string()),
            RecordChild::Rejected
        );
        assert_eq!(
            table.record_child("r1", "b:1", "apple".to_string()),
            RecordChild::Complete
        );
        assert_eq!(table.find_round("r1").unwrap().pending_children().len(), 0);
    }

    #[test]
    fn test_record_after_resolution_rejected() {
        let mut table = RoundTable::new();
        table.add_round(round("r1", &["a:1"]));
        table.find_round_mut("r1").unwrap().result = Some("apple".to_string());
        assert_eq!(
            table.record_child("r1", "a:1", "pear".to_string()),
            RecordChild::Rejected
        );
    }

    #[test]
    fn test_decide_strict_majority() {
        let mut r = round("r1", &["a:1", "b:1"]);
        r.children.insert("a:1".to_string(), Some("apple".to_string()));
        r.children.insert("b:1".to_string(), Some("pear".to_string()));
        // apple: 2 (own + a), pear: 1 → strict majority.
        assert_eq!(r.decide(), "apple");
    }

    #[test]
    fn test_decide_tie_yields_default() {
        let mut r = round("r1", &["a:1"]);
        r.children.insert("a:1".to_string(), Some("pear".to_string()));
        assert_eq!(r.decide(), DEFAULT_SENTINEL);
    }

    #[test]
    fn test_decide_default_votes_count() {
        // own=apple, two substituted defaults → no strict majority for
        // apple, defaults win 2 of 3.
        let mut r = round("r1", &["a:1", "b:1"]);
        r.children
            .insert("a:1".to_string(), Some(DEFAULT_SENTINEL.to_string()));
        r.children
            .insert("b:1".to_string(), Some(DEFAULT_SENTINEL.to_string()));
        assert_eq!(r.decide(), DEFAULT_SENTINEL);
    }

    #[test]
    fn test_deadline_scan_and_sweep() {
        let mut table = RoundTable::new();
        let mut r = round("r1", &["a:1"]);
        let start = Instant::now();
        r.deadline = start;
        table.add_round(r);

        let later = start + Duration::from_millis(10);
        assert_eq!(table.deadline_expired(later), vec!["r1".to_string()]);

        // Within grace the round is retained.
        assert_eq!(table.sweep_expired(later, Duration::from_secs(1)), 0);
        assert!(table.contains("r1"));

        let much_later = start + Duration::from_secs(2);
        assert_eq!(table.sweep_expired(much_later, Duration::from_secs(1)), 1);
        assert!(table.is_empty());
    }
}
