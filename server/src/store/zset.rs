/*
 * This file is a part of kvd
*/

//! A sorted set: a hash index for O(1)-amortized lookup by member name,
//! composed with an order-statistic AVL tree ordered by `(score,
//! name)` for range queries. Ported from
//! `examples/original_source/src/zset.cpp` (`ZSet`/`ZNode`/`tree_add`/
//! `zset_add`/`zset_update`/`zset_lookup`/`zset_query`/`zset_pop`),
//! generalized onto the arena-based [`avl`]/[`hmap`] from this crate's
//! `idx` module (`spec.md` §4.3).
//!
//! Both indices address the *same* arena of `ZNode`s by `u32` slot id;
//! `spec.md`'s invariant "a node is present in the tree iff it is
//! present in the hash" holds by construction here, since `add`/
//! `remove` always touch both structures for the same id in the same
//! call.

use crate::idx::avl::{self, AvlId, AvlStore};
use crate::idx::hmap::{HMap, HashStore, NodeId};
use crate::util::hash::str_hash;

struct ZNode {
    parent: Option<AvlId>,
    left: Option<AvlId>,
    right: Option<AvlId>,
    height: u32,
    count: u32,
    hash_next: Option<NodeId>,
    hash_code: u64,
    score: f64,
    name: Vec<u8>,
}

/// A single (member name, score) pair, returned by range queries.
#[derive(Debug, Clone, PartialEq)]
pub struct ZEntry {
    pub name: Vec<u8>,
    pub score: f64,
}

#[derive(Default)]
pub struct ZSet {
    nodes: Vec<Option<ZNode>>,
    free: Vec<AvlId>,
    tree_root: Option<AvlId>,
    hash: HMap,
}

impl ZSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn node(&self, id: AvlId) -> &ZNode {
        self.nodes[id as usize].as_ref().expect("reference to a live znode id")
    }

    fn node_mut(&mut self, id: AvlId) -> &mut ZNode {
        self.nodes[id as usize].as_mut().expect("reference to a live znode id")
    }

    fn alloc(&mut self, name: Vec<u8>, score: f64) -> AvlId {
        let hash_code = str_hash(&name);
        let node = ZNode {
            parent: None,
            left: None,
            right: None,
            height: 0,
            count: 0,
            hash_next: None,
            hash_code,
            score,
            name,
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id as usize] = Some(node);
            id
        } else {
            self.nodes.push(Some(node));
            (self.nodes.len() - 1) as AvlId
        }
    }

    fn dealloc(&mut self, id: AvlId) {
        self.nodes[id as usize] = None;
        self.free.push(id);
    }

    fn key_less(score_a: f64, name_a: &[u8], score_b: f64, name_b: &[u8]) -> bool {
        if score_a != score_b {
            return score_a < score_b;
        }
        name_a < name_b
    }

    fn hash_insert(&mut self, id: AvlId) {
        let mut hash = std::mem::take(&mut self.hash);
        hash.insert(self, id);
        self.hash = hash;
    }

    fn hash_lookup(&mut self, name: &[u8]) -> Option<AvlId> {
        let hash_code = str_hash(name);
        let mut hash = std::mem::take(&mut self.hash);
        let found = hash.lookup(self, hash_code, |zset: &ZSet, id| zset.node(id).name.as_slice() == name);
        self.hash = hash;
        found
    }

    fn hash_pop(&mut self, name: &[u8]) -> Option<AvlId> {
        let hash_code = str_hash(name);
        let mut hash = std::mem::take(&mut self.hash);
        let found = hash.pop(self, hash_code, |zset: &ZSet, id| zset.node(id).name.as_slice() == name);
        self.hash = hash;
        found
    }

    /// Add `name` with `score`, or update its score if it already
    /// exists. Returns `true` iff a new member was added.
    pub fn add(&mut self, name: &[u8], score: f64) -> bool {
        if let Some(id) = self.hash_lookup(name) {
            self.update_score(id, score);
            false
        } else {
            let id = self.alloc(name.to_vec(), score);
            self.hash_insert(id);
            let new_root = avl::insert(self, self.tree_root, id);
            self.tree_root = Some(new_root);
            true
        }
    }

    fn update_score(&mut self, id: AvlId, score: f64) {
        if self.node(id).score == score {
            return;
        }
        self.tree_root = avl::delete(self, id);
        self.node_mut(id).score = score;
        let new_root = avl::insert(self, self.tree_root, id);
        self.tree_root = Some(new_root);
    }

    /// The score of `name`, if it's a member.
    pub fn score(&mut self, name: &[u8]) -> Option<f64> {
        self.hash_lookup(name).map(|id| self.node(id).score)
    }

    /// Remove `name`. Returns `true` iff it was a member.
    pub fn remove(&mut self, name: &[u8]) -> bool {
        match self.hash_pop(name) {
            Some(id) => {
                self.tree_root = avl::delete(self, id);
                self.dealloc(id);
                true
            }
            None => false,
        }
    }

    /// The smallest member `>= (score, name)` in the tree, as an
    /// internal node id.
    fn lower_bound(&self, score: f64, name: &[u8]) -> Option<AvlId> {
        let mut found = None;
        let mut curr = self.tree_root;
        while let Some(id) = curr {
            let n = self.node(id);
            if Self::key_less(n.score, &n.name, score, name) {
                curr = n.right;
            } else {
                found = Some(id);
                curr = n.left;
            }
        }
        found
    }

    /// `spec.md` §4.3 `zset_query`: find the lower bound of `(score,
    /// name)`, then move `offset` positions in-order from it.
    fn query(&self, score: f64, name: &[u8], offset: i64) -> Option<AvlId> {
        let found = self.lower_bound(score, name)?;
        avl::offset(self, found, offset)
    }

    /// `ZQUERY`: the range starting at the lower bound of `(score,
    /// name)` offset by `offset`, up to `limit` entries.
    pub fn range(&self, score: f64, name: &[u8], offset: i64, limit: usize) -> Vec<ZEntry> {
        let mut out = Vec::new();
        if limit == 0 {
            return out;
        }
        let Some(mut cur) = self.query(score, name, offset) else {
            return out;
        };
        loop {
            let n = self.node(cur);
            out.push(ZEntry {
                name: n.name.clone(),
                score: n.score,
            });
            if out.len() >= limit {
                break;
            }
            match avl::offset(self, cur, 1) {
                Some(next) => cur = next,
                None => break,
            }
        }
        out
    }
}

impl AvlStore for ZSet {
    fn parent(&self, id: AvlId) -> Option<AvlId> {
        self.node(id).parent
    }
    fn set_parent(&mut self, id: AvlId, p: Option<AvlId>) {
        self.node_mut(id).parent = p;
    }
    fn left(&self, id: AvlId) -> Option<AvlId> {
        self.node(id).left
    }
    fn set_left(&mut self, id: AvlId, l: Option<AvlId>) {
        self.node_mut(id).left = l;
    }
    fn right(&self, id: AvlId) -> Option<AvlId> {
        self.node(id).right
    }
    fn set_right(&mut self, id: AvlId, r: Option<AvlId>) {
        self.node_mut(id).right = r;
    }
    fn height(&self, id: AvlId) -> u32 {
        self.node(id).height
    }
    fn set_height(&mut self, id: AvlId, h: u32) {
        self.node_mut(id).height = h;
    }
    fn count(&self, id: AvlId) -> u32 {
        self.node(id).count
    }
    fn set_count(&mut self, id: AvlId, c: u32) {
        self.node_mut(id).count = c;
    }
    fn less(&self, a: AvlId, b: AvlId) -> bool {
        let na = self.node(a);
        let nb = self.node(b);
        Self::key_less(na.score, &na.name, nb.score, &nb.name)
    }
}

impl HashStore for ZSet {
    fn hash_code(&self, id: NodeId) -> u64 {
        self.node(id).hash_code
    }
    fn next(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).hash_next
    }
    fn set_next(&mut self, id: NodeId, next: Option<NodeId>) {
        self.node_mut(id).hash_next = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_score_round_trips() {
        let mut z = ZSet::new();
        assert!(z.add(b"a", 1.5));
        assert_eq!(z.score(b"a"), Some(1.5));
        assert_eq!(z.len(), 1);
    }

    #[test]
    fn re_add_updates_score_and_keeps_cardinality() {
        let mut z = ZSet::new();
        assert!(z.add(b"a", 1.0));
        assert!(!z.add(b"a", 2.0));
        assert_eq!(z.len(), 1);
        assert_eq!(z.score(b"a"), Some(2.0));
    }

    #[test]
    fn remove_then_relookup_misses() {
        let mut z = ZSet::new();
        z.add(b"a", 1.0);
        assert!(z.remove(b"a"));
        assert!(!z.remove(b"a"));
        assert_eq!(z.score(b"a"), None);
        assert_eq!(z.len(), 0);
    }

    #[test]
    fn range_orders_by_score_then_name_ties() {
        // the boundary scenario from spec.md §8 #2
        let mut z = ZSet::new();
        z.add(b"a", 1.5);
        z.add(b"b", 2.0);
        z.add(b"c", 1.5);
        let got = z.range(1.0, b"", 0, 10);
        assert_eq!(
            got,
            vec![
                ZEntry { name: b"a".to_vec(), score: 1.5 },
                ZEntry { name: b"c".to_vec(), score: 1.5 },
                ZEntry { name: b"b".to_vec(), score: 2.0 },
            ]
        );
    }

    #[test]
    fn range_respects_offset_and_limit() {
        let mut z = ZSet::new();
        for i in 0..10i64 {
            z.add(format!("m{i:02}").as_bytes(), i as f64);
        }
        let got = z.range(0.0, b"", 3, 2);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].name, b"m03");
        assert_eq!(got[1].name, b"m04");
    }

    #[test]
    fn range_against_missing_set_or_zero_limit_is_empty() {
        let z = ZSet::new();
        assert!(z.range(0.0, b"x", 0, 10).is_empty());
        let mut z2 = ZSet::new();
        z2.add(b"a", 1.0);
        assert!(z2.range(0.0, b"", 0, 0).is_empty());
    }

    #[test]
    fn many_members_stay_consistent_between_hash_and_tree() {
        let mut z = ZSet::new();
        for i in 0..5000i64 {
            z.add(format!("k{i}").as_bytes(), (i % 97) as f64);
        }
        assert_eq!(z.len(), 5000);
        let all = z.range(f64::MIN, b"", 0, 5000);
        assert_eq!(all.len(), 5000);
        for w in all.windows(2) {
            assert!(
                w[0].score < w[1].score || (w[0].score == w[1].score && w[0].name <= w[1].name)
            );
        }
    }
}
