/*
 * This file is a part of kvd
*/

//! An order-statistic AVL tree over an arena of caller-owned nodes,
//! addressed by `u32` slot id instead of pointers.
//!
//! Ported from `examples/original_source/src/avl.cpp` (the
//! `rollschild/redis-c` tutorial this spec was distilled from): the
//! rotation and rebalance algorithms below are a direct, field-by-field
//! translation of that file's `rotate_left`/`rotate_right`/
//! `avl_fix_left`/`avl_fix_right`/`avl_rebalance`/`avl_delete`/
//! `avl_offset`, generalized from raw pointers to an [`AvlStore`] that
//! the caller implements over its own arena (see `store::zset`, whose
//! `ZNode` arena implements it). `spec.md` §4.1 describes the same
//! algorithm in prose; §9 calls for exactly this arena/slot-id
//! substitution for the intrusive pointer tricks the original used.

pub type AvlId = u32;

/// Gives the AVL algorithms access to an arena of nodes without the
/// algorithms needing to know anything about the node's payload. A
/// type implementing this (e.g. the `ZNode` arena in `store::zset`)
/// gets `insert`/`delete`/`offset` for free.
pub trait AvlStore {
    fn parent(&self, id: AvlId) -> Option<AvlId>;
    fn set_parent(&mut self, id: AvlId, p: Option<AvlId>);
    fn left(&self, id: AvlId) -> Option<AvlId>;
    fn set_left(&mut self, id: AvlId, l: Option<AvlId>);
    fn right(&self, id: AvlId) -> Option<AvlId>;
    fn set_right(&mut self, id: AvlId, r: Option<AvlId>);
    fn height(&self, id: AvlId) -> u32;
    fn set_height(&mut self, id: AvlId, h: u32);
    fn count(&self, id: AvlId) -> u32;
    fn set_count(&mut self, id: AvlId, c: u32);
    /// Total order: is `a` strictly before `b`?
    fn less(&self, a: AvlId, b: AvlId) -> bool;
}

fn height_of<S: AvlStore + ?Sized>(store: &S, id: Option<AvlId>) -> u32 {
    id.map(|i| store.height(i)).unwrap_or(0)
}

fn count_of<S: AvlStore + ?Sized>(store: &S, id: Option<AvlId>) -> u32 {
    id.map(|i| store.count(i)).unwrap_or(0)
}

/// Reset a freshly-allocated node to a singleton leaf.
pub fn init<S: AvlStore + ?Sized>(store: &mut S, id: AvlId) {
    store.set_height(id, 1);
    store.set_count(id, 1);
    store.set_parent(id, None);
    store.set_left(id, None);
    store.set_right(id, None);
}

fn update<S: AvlStore + ?Sized>(store: &mut S, id: AvlId) {
    let h = 1 + height_of(store, store.left(id)).max(height_of(store, store.right(id)));
    let c = 1 + count_of(store, store.left(id)) + count_of(store, store.right(id));
    store.set_height(id, h);
    store.set_count(id, c);
}

fn rotate_left<S: AvlStore + ?Sized>(store: &mut S, node: AvlId) -> AvlId {
    let new_node = match store.right(node) {
        Some(n) => n,
        None => return node,
    };
    if let Some(nl) = store.left(new_node) {
        store.set_parent(nl, Some(node));
    }
    store.set_right(node, store.left(new_node));
    store.set_left(new_node, Some(node));
    store.set_parent(new_node, store.parent(node));
    store.set_parent(node, Some(new_node));
    update(store, node);
    update(store, new_node);
    new_node
}

fn rotate_right<S: AvlStore + ?Sized>(store: &mut S, node: AvlId) -> AvlId {
    let new_node = match store.left(node) {
        Some(n) => n,
        None => return node,
    };
    if let Some(nr) = store.right(new_node) {
        store.set_parent(nr, Some(node));
    }
    store.set_left(node, store.right(new_node));
    store.set_right(new_node, Some(node));
    store.set_parent(new_node, store.parent(node));
    store.set_parent(node, Some(new_node));
    update(store, node);
    update(store, new_node);
    new_node
}

/// Left subtree too deep.
fn fix_left<S: AvlStore + ?Sized>(store: &mut S, root: AvlId) -> AvlId {
    let left = store.left(root).expect("avl: l == r + 2 implies a left child exists");
    if height_of(store, store.left(left)) < height_of(store, store.right(left)) {
        let new_left = rotate_left(store, left);
        store.set_left(root, Some(new_left));
    }
    rotate_right(store, root)
}

/// Right subtree too deep.
fn fix_right<S: AvlStore + ?Sized>(store: &mut S, root: AvlId) -> AvlId {
    let right = store.right(root).expect("avl: l + 2 == r implies a right child exists");
    if height_of(store, store.right(right)) < height_of(store, store.left(right)) {
        let new_right = rotate_right(store, right);
        store.set_right(root, Some(new_right));
    }
    rotate_left(store, root)
}

/// Walk from `node` to the root, fixing heights/counts and rotating
/// away any |height(left) - height(right)| == 2 imbalance. Returns the
/// (possibly new) root of the whole tree.
pub fn rebalance<S: AvlStore + ?Sized>(store: &mut S, mut node: AvlId) -> AvlId {
    loop {
        update(store, node);
        let l = height_of(store, store.left(node));
        let r = height_of(store, store.right(node));
        let parent = store.parent(node);
        let was_left_child = parent.map(|p| store.left(p) == Some(node));

        let new_node = if l == r + 2 {
            fix_left(store, node)
        } else if l + 2 == r {
            fix_right(store, node)
        } else {
            node
        };

        match parent {
            None => return new_node,
            Some(p) => {
                if was_left_child == Some(true) {
                    store.set_left(p, Some(new_node));
                } else {
                    store.set_right(p, Some(new_node));
                }
                node = p;
            }
        }
    }
}

/// Attach `node` as a new leaf under `root` using `AvlStore::less` as
/// the comparator, then rebalance. Returns the new root. `node` must
/// not already be part of a tree.
pub fn insert<S: AvlStore + ?Sized>(store: &mut S, root: Option<AvlId>, node: AvlId) -> AvlId {
    init(store, node);
    let Some(top) = root else {
        return node;
    };
    let mut curr = top;
    loop {
        let go_left = store.less(node, curr);
        let slot = if go_left { store.left(curr) } else { store.right(curr) };
        match slot {
            Some(next) => curr = next,
            None => {
                if go_left {
                    store.set_left(curr, Some(node));
                } else {
                    store.set_right(curr, Some(node));
                }
                store.set_parent(node, Some(curr));
                return rebalance(store, node);
            }
        }
    }
}

/// Remove `node` from the tree it is part of. Returns the new root, or
/// `None` if the tree is now empty. `node`'s own fields are left in an
/// unspecified state afterwards — only read them again after
/// re-`init`-ing the slot for reuse.
pub fn delete<S: AvlStore + ?Sized>(store: &mut S, node: AvlId) -> Option<AvlId> {
    match store.right(node) {
        None => {
            let parent = store.parent(node);
            if let Some(l) = store.left(node) {
                store.set_parent(l, parent);
            }
            match parent {
                Some(p) => {
                    if store.left(p) == Some(node) {
                        store.set_left(p, store.left(node));
                    } else {
                        store.set_right(p, store.left(node));
                    }
                    Some(rebalance(store, p))
                }
                None => store.left(node),
            }
        }
        Some(right) => {
            let mut victim = right;
            while let Some(l) = store.left(victim) {
                victim = l;
            }
            // detach victim from its own spot first; this also rebalances
            // every ancestor between victim and the true root, `node` included
            let root_after = delete(store, victim);

            // transplant node's now-current structural fields onto victim
            let node_parent = store.parent(node);
            let node_left = store.left(node);
            let node_right = store.right(node);
            let node_height = store.height(node);
            let node_count = store.count(node);
            store.set_parent(victim, node_parent);
            store.set_left(victim, node_left);
            store.set_right(victim, node_right);
            store.set_height(victim, node_height);
            store.set_count(victim, node_count);
            if let Some(l) = node_left {
                store.set_parent(l, Some(victim));
            }
            if let Some(r) = node_right {
                store.set_parent(r, Some(victim));
            }

            match node_parent {
                Some(p) => {
                    if store.left(p) == Some(node) {
                        store.set_left(p, Some(victim));
                    } else {
                        store.set_right(p, Some(victim));
                    }
                    root_after
                }
                None => Some(victim),
            }
        }
    }
}

/// Move `offset` positions in in-order sequence from `node` (negative
/// walks backwards). `O(log n)` regardless of `|offset|`, using the
/// subtree counts to skip whole subtrees instead of single-stepping.
pub fn offset<S: AvlStore + ?Sized>(store: &S, node: AvlId, target: i64) -> Option<AvlId> {
    let mut pos: i64 = 0;
    let mut node = node;
    while target != pos {
        if pos < target && pos + count_of(store, store.right(node)) as i64 >= target {
            node = store.right(node)?;
            pos += count_of(store, store.left(node)) as i64 + 1;
        } else if pos > target && pos - count_of(store, store.left(node)) as i64 <= target {
            node = store.left(node)?;
            pos -= count_of(store, store.right(node)) as i64 + 1;
        } else {
            let parent = store.parent(node)?;
            if store.right(parent) == Some(node) {
                pos -= count_of(store, store.left(node)) as i64 + 1;
            } else {
                pos += count_of(store, store.right(node)) as i64 + 1;
            }
            node = parent;
        }
    }
    Some(node)
}

/// In-order traversal, for tests and for the hash-dispose walk in
/// `store::zset`.
pub fn in_order<S: AvlStore + ?Sized>(store: &S, root: Option<AvlId>, out: &mut Vec<AvlId>) {
    let Some(id) = root else { return };
    in_order(store, store.left(id), out);
    out.push(id);
    in_order(store, store.right(id), out);
}
