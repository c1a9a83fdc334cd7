//! Doubly-linked list of troves ordered by nominal collateral ratio.
//!
//! The list is arena-keyed: nodes live in a map keyed by owner and link to
//! neighbors by key, head holds the highest NICR and tail the lowest. Because
//! NICR is price-independent, price moves never reorder the list; only
//! operations that change a trove's own collateral or debt require a
//! re-insert.
//!
//! Insert positions are located from caller-supplied hints with a bounded
//! walk. Equal keys preserve insertion order: a new node never lands in
//! front of an existing node with the same NICR.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::utils::constants::DEFAULT_HINT_WALK_BUDGET;
use crate::utils::crypto::PublicKey;

// ═══════════════════════════════════════════════════════════════════════════════
// NODE
// ═══════════════════════════════════════════════════════════════════════════════

/// A single list node. The stored NICR is the sort key captured at the last
/// insert or re-insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    nicr: u128,
    prev: Option<PublicKey>,
    next: Option<PublicKey>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SORTED TROVES
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered index over active troves, descending by NICR
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortedTroves {
    nodes: HashMap<PublicKey, Node>,
    head: Option<PublicKey>,
    tail: Option<PublicKey>,
    /// Maximum nodes visited while locating an insert position
    walk_budget: usize,
}

impl Default for SortedTroves {
    fn default() -> Self {
        Self::new(DEFAULT_HINT_WALK_BUDGET)
    }
}

impl SortedTroves {
    /// Create an empty index with the given hint-walk budget
    pub fn new(walk_budget: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            head: None,
            tail: None,
            walk_budget,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Whether the owner is in the index
    pub fn contains(&self, owner: &PublicKey) -> bool {
        self.nodes.contains_key(owner)
    }

    /// Number of indexed troves
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Owner with the highest NICR
    pub fn first(&self) -> Option<PublicKey> {
        self.head
    }

    /// Owner with the lowest NICR
    pub fn last(&self) -> Option<PublicKey> {
        self.tail
    }

    /// Neighbor with the next-lower NICR
    pub fn next(&self, owner: &PublicKey) -> Option<PublicKey> {
        self.nodes.get(owner).and_then(|n| n.next)
    }

    /// Neighbor with the next-higher NICR
    pub fn prev(&self, owner: &PublicKey) -> Option<PublicKey> {
        self.nodes.get(owner).and_then(|n| n.prev)
    }

    /// Stored sort key for the owner
    pub fn nicr_of(&self, owner: &PublicKey) -> Option<u128> {
        self.nodes.get(owner).map(|n| n.nicr)
    }

    /// Iterate owners from highest to lowest NICR
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MUTATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Insert an owner with the given sort key, locating the position from
    /// the supplied hints.
    pub fn insert(
        &mut self,
        owner: PublicKey,
        nicr: u128,
        prev_hint: Option<PublicKey>,
        next_hint: Option<PublicKey>,
    ) -> Result<()> {
        if self.contains(&owner) {
            return Err(Error::AlreadyInIndex {
                owner: owner.short(),
            });
        }
        if nicr == 0 {
            return Err(Error::InvalidParameter {
                name: "nicr".into(),
                reason: "sort key must be non-zero".into(),
            });
        }
        let (prev, next) = self.find_insert_position(nicr, prev_hint, next_hint)?;
        self.link_at(owner, nicr, prev, next);
        Ok(())
    }

    /// Remove an owner from the index
    pub fn remove(&mut self, owner: &PublicKey) -> Result<()> {
        let node = self.nodes.remove(owner).ok_or_else(|| Error::NotInIndex {
            owner: owner.short(),
        })?;

        match node.prev {
            Some(p) => {
                if let Some(prev_node) = self.nodes.get_mut(&p) {
                    prev_node.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => {
                if let Some(next_node) = self.nodes.get_mut(&n) {
                    next_node.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
        Ok(())
    }

    /// Move an owner to the position matching its new sort key.
    ///
    /// On a failed position search the node is relinked where it was, so the
    /// index is unchanged on error.
    pub fn re_insert(
        &mut self,
        owner: &PublicKey,
        new_nicr: u128,
        prev_hint: Option<PublicKey>,
        next_hint: Option<PublicKey>,
    ) -> Result<()> {
        if new_nicr == 0 {
            return Err(Error::InvalidParameter {
                name: "nicr".into(),
                reason: "sort key must be non-zero".into(),
            });
        }
        let old = self
            .nodes
            .get(owner)
            .cloned()
            .ok_or_else(|| Error::NotInIndex {
                owner: owner.short(),
            })?;
        self.remove(owner)?;

        match self.find_insert_position(new_nicr, prev_hint, next_hint) {
            Ok((prev, next)) => {
                self.link_at(*owner, new_nicr, prev, next);
                Ok(())
            }
            Err(err) => {
                self.link_at(*owner, old.nicr, old.prev, old.next);
                Err(err)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // POSITION SEARCH
    // ═══════════════════════════════════════════════════════════════════════════

    /// Find the (prev, next) pair the key belongs between, starting from the
    /// hints and walking at most `walk_budget` nodes.
    pub fn find_insert_position(
        &self,
        nicr: u128,
        prev_hint: Option<PublicKey>,
        next_hint: Option<PublicKey>,
    ) -> Result<(Option<PublicKey>, Option<PublicKey>)> {
        if self.is_empty() {
            return Ok((None, None));
        }

        // discard hints that are gone or on the wrong side of the key
        let prev = prev_hint.filter(|p| {
            self.nodes
                .get(p)
                .map(|node| node.nicr >= nicr)
                .unwrap_or(false)
        });
        let next = next_hint.filter(|n| {
            self.nodes
                .get(n)
                .map(|node| nicr > node.nicr)
                .unwrap_or(false)
        });

        match (prev, next) {
            (Some(p), _) => self.descend(nicr, p),
            (None, Some(n)) => self.ascend(nicr, n),
            (None, None) => {
                let head = self.head.ok_or_else(|| Error::Internal {
                    message: "non-empty list without head".into(),
                })?;
                self.descend(nicr, head)
            }
        }
    }

    /// Whether the key sits between the two neighbors. Equal keys order
    /// strictly before the `next` side, keeping ties in insertion order.
    fn valid_insert_position(
        &self,
        nicr: u128,
        prev: Option<&PublicKey>,
        next: Option<&PublicKey>,
    ) -> bool {
        match (prev, next) {
            (None, None) => self.is_empty(),
            (None, Some(n)) => {
                self.head.as_ref() == Some(n)
                    && self.nodes.get(n).map(|node| nicr > node.nicr).unwrap_or(false)
            }
            (Some(p), None) => {
                self.tail.as_ref() == Some(p)
                    && self.nodes.get(p).map(|node| node.nicr >= nicr).unwrap_or(false)
            }
            (Some(p), Some(n)) => {
                let Some(prev_node) = self.nodes.get(p) else {
                    return false;
                };
                let Some(next_node) = self.nodes.get(n) else {
                    return false;
                };
                prev_node.next.as_ref() == Some(n)
                    && prev_node.nicr >= nicr
                    && nicr > next_node.nicr
            }
        }
    }

    fn descend(
        &self,
        nicr: u128,
        start: PublicKey,
    ) -> Result<(Option<PublicKey>, Option<PublicKey>)> {
        if self.head == Some(start) && self.valid_insert_position(nicr, None, Some(&start)) {
            return Ok((None, Some(start)));
        }

        let mut steps = 0usize;
        let mut prev = Some(start);
        while let Some(p) = prev {
            let next = self.nodes.get(&p).and_then(|n| n.next);
            if self.valid_insert_position(nicr, Some(&p), next.as_ref()) {
                return Ok((Some(p), next));
            }
            steps += 1;
            if steps > self.walk_budget {
                return Err(Error::HintsTooStale {
                    budget: self.walk_budget,
                });
            }
            prev = next;
        }
        Err(Error::Internal {
            message: "descend walked off the tail".into(),
        })
    }

    fn ascend(
        &self,
        nicr: u128,
        start: PublicKey,
    ) -> Result<(Option<PublicKey>, Option<PublicKey>)> {
        if self.tail == Some(start) && self.valid_insert_position(nicr, Some(&start), None) {
            return Ok((Some(start), None));
        }

        let mut steps = 0usize;
        let mut next = Some(start);
        while let Some(n) = next {
            let prev = self.nodes.get(&n).and_then(|node| node.prev);
            if self.valid_insert_position(nicr, prev.as_ref(), Some(&n)) {
                return Ok((prev, Some(n)));
            }
            steps += 1;
            if steps > self.walk_budget {
                return Err(Error::HintsTooStale {
                    budget: self.walk_budget,
                });
            }
            next = prev;
        }
        Err(Error::Internal {
            message: "ascend walked off the head".into(),
        })
    }

    /// Link a node between two neighbors already known to be a valid position
    fn link_at(
        &mut self,
        owner: PublicKey,
        nicr: u128,
        prev: Option<PublicKey>,
        next: Option<PublicKey>,
    ) {
        self.nodes.insert(owner, Node { nicr, prev, next });

        match prev {
            Some(p) => {
                if let Some(prev_node) = self.nodes.get_mut(&p) {
                    prev_node.next = Some(owner);
                }
            }
            None => self.head = Some(owner),
        }
        match next {
            Some(n) => {
                if let Some(next_node) = self.nodes.get_mut(&n) {
                    next_node.prev = Some(owner);
                }
            }
            None => self.tail = Some(owner),
        }
    }

    /// Whether stored keys are non-increasing from head to tail and the
    /// back-links mirror the forward links
    pub fn is_well_ordered(&self) -> bool {
        let mut cursor = self.head;
        let mut previous: Option<(PublicKey, u128)> = None;
        let mut visited = 0usize;

        while let Some(key) = cursor {
            let Some(node) = self.nodes.get(&key) else {
                return false;
            };
            if let Some((prev_key, prev_nicr)) = previous {
                if node.prev != Some(prev_key) || node.nicr > prev_nicr {
                    return false;
                }
            } else if node.prev.is_some() {
                return false;
            }
            previous = Some((key, node.nicr));
            cursor = node.next;
            visited += 1;
            if visited > self.nodes.len() {
                return false;
            }
        }
        visited == self.nodes.len() && self.tail == previous.map(|(k, _)| k)
    }
}

/// Iterator over owners from highest to lowest NICR
pub struct Iter<'a> {
    list: &'a SortedTroves,
    cursor: Option<PublicKey>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = PublicKey;

    fn next(&mut self) -> Option<PublicKey> {
        let current = self.cursor?;
        self.cursor = self.list.next(&current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::{PRECISION, PUBKEY_LENGTH};

    fn test_pubkey(tag: u8) -> PublicKey {
        PublicKey::new([tag; PUBKEY_LENGTH])
    }

    fn ratio(percent: u128) -> u128 {
        percent * PRECISION / 100
    }

    #[test]
    fn test_insert_orders_descending() {
        let mut list = SortedTroves::default();
        list.insert(test_pubkey(2), ratio(200), None, None).unwrap();
        list.insert(test_pubkey(3), ratio(300), None, None).unwrap();
        list.insert(test_pubkey(4), ratio(150), None, None).unwrap();

        let order: Vec<PublicKey> = list.iter().collect();
        assert_eq!(order, vec![test_pubkey(3), test_pubkey(2), test_pubkey(4)]);
        assert_eq!(list.first(), Some(test_pubkey(3)));
        assert_eq!(list.last(), Some(test_pubkey(4)));
        assert!(list.is_well_ordered());
    }

    #[test]
    fn test_equal_keys_keep_insertion_order() {
        let mut list = SortedTroves::default();
        list.insert(test_pubkey(2), ratio(200), None, None).unwrap();
        list.insert(test_pubkey(3), ratio(200), None, None).unwrap();
        list.insert(test_pubkey(4), ratio(200), None, None).unwrap();

        let order: Vec<PublicKey> = list.iter().collect();
        assert_eq!(order, vec![test_pubkey(2), test_pubkey(3), test_pubkey(4)]);
        assert!(list.is_well_ordered());
    }

    #[test]
    fn test_remove_relinks_neighbors() {
        let mut list = SortedTroves::default();
        for (tag, pct) in [(2u8, 300u128), (3, 200), (4, 100)] {
            list.insert(test_pubkey(tag), ratio(pct), None, None).unwrap();
        }

        list.remove(&test_pubkey(3)).unwrap();
        let order: Vec<PublicKey> = list.iter().collect();
        assert_eq!(order, vec![test_pubkey(2), test_pubkey(4)]);
        assert!(list.is_well_ordered());

        list.remove(&test_pubkey(2)).unwrap();
        assert_eq!(list.first(), Some(test_pubkey(4)));
        assert_eq!(list.last(), Some(test_pubkey(4)));

        list.remove(&test_pubkey(4)).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.first(), None);

        let err = list.remove(&test_pubkey(4));
        assert!(matches!(err, Err(Error::NotInIndex { .. })));
    }

    #[test]
    fn test_re_insert_moves_node() {
        let mut list = SortedTroves::default();
        for (tag, pct) in [(2u8, 300u128), (3, 200), (4, 100)] {
            list.insert(test_pubkey(tag), ratio(pct), None, None).unwrap();
        }

        // drop the middle node below the tail
        list.re_insert(&test_pubkey(3), ratio(50), None, None).unwrap();
        let order: Vec<PublicKey> = list.iter().collect();
        assert_eq!(order, vec![test_pubkey(2), test_pubkey(4), test_pubkey(3)]);
        assert_eq!(list.nicr_of(&test_pubkey(3)), Some(ratio(50)));
        assert!(list.is_well_ordered());
    }

    #[test]
    fn test_hints_speed_up_insert() {
        let mut list = SortedTroves::new(2);
        // budget 2 cannot reach the tail of a long list from the head
        for tag in 0..16u8 {
            let key = test_pubkey(tag + 2);
            let nicr = ratio(400 - tag as u128 * 10);
            let prev_hint = list.last();
            list.insert(key, nicr, prev_hint, None).unwrap();
        }
        assert_eq!(list.len(), 16);
        assert!(list.is_well_ordered());

        // no hints: the walk budget runs out before the tail
        let err = list.insert(test_pubkey(99), ratio(10), None, None);
        assert!(matches!(err, Err(Error::HintsTooStale { budget: 2 })));

        // a tail hint makes the same insert O(1)
        let tail = list.last();
        list.insert(test_pubkey(99), ratio(10), tail, None).unwrap();
        assert_eq!(list.last(), Some(test_pubkey(99)));
    }

    #[test]
    fn test_stale_hints_recovered_within_budget() {
        let mut list = SortedTroves::default();
        for (tag, pct) in [(2u8, 300u128), (3, 250), (4, 200), (5, 150)] {
            list.insert(test_pubkey(tag), ratio(pct), None, None).unwrap();
        }

        // hint points too high in the list; the walk descends to the spot
        list.insert(
            test_pubkey(6),
            ratio(175),
            Some(test_pubkey(2)),
            Some(test_pubkey(3)),
        )
        .unwrap();
        let order: Vec<PublicKey> = list.iter().collect();
        assert_eq!(
            order,
            vec![
                test_pubkey(2),
                test_pubkey(3),
                test_pubkey(4),
                test_pubkey(6),
                test_pubkey(5)
            ]
        );

        // hints referencing removed nodes fall back to a head walk
        list.remove(&test_pubkey(3)).unwrap();
        list.insert(
            test_pubkey(7),
            ratio(225),
            Some(test_pubkey(3)),
            Some(test_pubkey(3)),
        )
        .unwrap();
        assert!(list.is_well_ordered());
        assert_eq!(list.nicr_of(&test_pubkey(7)), Some(ratio(225)));
    }

    #[test]
    fn test_next_hint_ascends() {
        let mut list = SortedTroves::default();
        for (tag, pct) in [(2u8, 300u128), (3, 200), (4, 100)] {
            list.insert(test_pubkey(tag), ratio(pct), None, None).unwrap();
        }

        // only a next hint below the target position: walk ascends
        list.insert(test_pubkey(5), ratio(250), None, Some(test_pubkey(4)))
            .unwrap();
        let order: Vec<PublicKey> = list.iter().collect();
        assert_eq!(
            order,
            vec![test_pubkey(2), test_pubkey(5), test_pubkey(3), test_pubkey(4)]
        );
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut list = SortedTroves::default();
        list.insert(test_pubkey(2), ratio(200), None, None).unwrap();
        let err = list.insert(test_pubkey(2), ratio(300), None, None);
        assert!(matches!(err, Err(Error::AlreadyInIndex { .. })));

        let err = list.insert(test_pubkey(3), 0, None, None);
        assert!(matches!(err, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_failed_re_insert_leaves_list_unchanged() {
        let mut list = SortedTroves::new(1);
        for tag in 0..8u8 {
            let key = test_pubkey(tag + 2);
            let prev_hint = list.last();
            list.insert(key, ratio(400 - tag as u128 * 10), prev_hint, None).unwrap();
        }
        let before: Vec<PublicKey> = list.iter().collect();

        // moving the head to the tail without hints exceeds budget 1
        let err = list.re_insert(&test_pubkey(2), ratio(5), None, None);
        assert!(matches!(err, Err(Error::HintsTooStale { .. })));
        let after: Vec<PublicKey> = list.iter().collect();
        assert_eq!(before, after);
        assert!(list.is_well_ordered());
    }
}
