/*
 * This file is a part of kvd
*/

//! The database: a hash index from key to [`Entry`], plus the TTL
//! heap those entries share a back-reference with. `spec.md` §4.4 —
//! "memory is owned by whichever index logically contains the object:
//! db owns Entry; Entry owns ZSet". Destroying an Entry with a live
//! TTL first detaches it from the heap; destroying a ZSET entry drops
//! its `ZSet` (and with it every `ZNode`) for free, via `Drop`.

use crate::idx::hmap::{HMap, HashStore, NodeId};
use crate::store::entry::{Entry, Value};
use crate::store::ttlheap::{EntryId, HeapStore, TtlHeap};
use crate::store::zset::{ZEntry, ZSet};
use crate::util::error::CommandError;
use crate::util::hash::str_hash;
use crate::util::monotonic_now_us;

#[derive(Default)]
pub struct Database {
    entries: Vec<Option<Entry>>,
    free: Vec<u32>,
    hash: HMap,
    ttl: TtlHeap,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_entry(&self, id: u32) -> &Entry {
        self.entries[id as usize].as_ref().expect("reference to a live entry id")
    }

    fn get_entry_mut(&mut self, id: u32) -> &mut Entry {
        self.entries[id as usize].as_mut().expect("reference to a live entry id")
    }

    fn alloc(&mut self, entry: Entry) -> u32 {
        if let Some(id) = self.free.pop() {
            self.entries[id as usize] = Some(entry);
            id
        } else {
            self.entries.push(Some(entry));
            (self.entries.len() - 1) as u32
        }
    }

    fn dealloc(&mut self, id: u32) {
        self.entries[id as usize] = None;
        self.free.push(id);
    }

    fn hash_insert(&mut self, id: u32) {
        let mut hash = std::mem::take(&mut self.hash);
        hash.insert(self, id);
        self.hash = hash;
    }

    fn detach_from_hash(&mut self, id: u32) {
        let hash_code = self.get_entry(id).hash_code;
        let key = self.get_entry(id).key.clone();
        let mut hash = std::mem::take(&mut self.hash);
        hash.pop(self, hash_code, |db: &Database, eid| db.get_entry(eid).key == key);
        self.hash = hash;
    }

    fn detach_from_heap_if_present(&mut self, id: u32) {
        if let Some(idx) = self.get_entry(id).heap_index {
            let mut ttl = std::mem::take(&mut self.ttl);
            ttl.remove(self, idx as usize);
            self.ttl = ttl;
        }
    }

    /// Fully remove a live entry: detach from the TTL heap (if
    /// present), detach from the hash index, free its arena slot.
    fn remove_entry(&mut self, id: u32) {
        self.detach_from_heap_if_present(id);
        self.detach_from_hash(id);
        self.dealloc(id);
    }

    fn find(&mut self, key: &[u8]) -> Option<u32> {
        let hash_code = str_hash(key);
        let mut hash = std::mem::take(&mut self.hash);
        let found = hash.lookup(self, hash_code, |db: &Database, id| db.get_entry(id).key.as_slice() == key);
        self.hash = hash;
        found
    }

    /// `GET`.
    pub fn get_str(&mut self, key: &[u8]) -> Result<Option<&[u8]>, CommandError> {
        match self.find(key) {
            None => Ok(None),
            Some(id) => match &self.get_entry(id).value {
                Value::Str(s) => Ok(Some(s.as_slice())),
                Value::ZSet(_) => Err(CommandError::wrong_type()),
            },
        }
    }

    /// `SET`. Overwriting a ZSET entry drops its `ZSet` for free.
    /// Leaves any existing TTL on the key untouched, matching the
    /// upstream `redis-c` tutorial's `do_set`.
    pub fn set_str(&mut self, key: &[u8], value: Vec<u8>) {
        match self.find(key) {
            Some(id) => {
                self.get_entry_mut(id).value = Value::Str(value);
            }
            None => {
                let hash_code = str_hash(key);
                let entry = Entry::new(key.to_vec(), hash_code, Value::Str(value));
                let id = self.alloc(entry);
                self.hash_insert(id);
            }
        }
    }

    /// `DEL`. Returns `true` iff the key existed.
    pub fn del(&mut self, key: &[u8]) -> bool {
        match self.find(key) {
            Some(id) => {
                self.remove_entry(id);
                true
            }
            None => false,
        }
    }

    /// `KEYS`. Order is unspecified (`spec.md` §4.7).
    pub fn keys(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(self.hash.len());
        self.hash.for_each(self, |id| out.push(self.get_entry(id).key.clone()));
        out
    }

    /// `ZADD`. Creates the key as an empty zset if absent. Returns
    /// `true` iff `member` is new to the set.
    pub fn zadd(&mut self, key: &[u8], score: f64, member: &[u8]) -> Result<bool, CommandError> {
        let id = match self.find(key) {
            Some(id) => id,
            None => {
                let hash_code = str_hash(key);
                let entry = Entry::new(key.to_vec(), hash_code, Value::ZSet(ZSet::new()));
                let id = self.alloc(entry);
                self.hash_insert(id);
                id
            }
        };
        match &mut self.get_entry_mut(id).value {
            Value::ZSet(z) => Ok(z.add(member, score)),
            Value::Str(_) => Err(CommandError::wrong_type()),
        }
    }

    /// `ZREM`. Returns `false` if either the key or the member is
    /// absent.
    pub fn zrem(&mut self, key: &[u8], member: &[u8]) -> Result<bool, CommandError> {
        match self.find(key) {
            None => Ok(false),
            Some(id) => match &mut self.get_entry_mut(id).value {
                Value::ZSet(z) => Ok(z.remove(member)),
                Value::Str(_) => Err(CommandError::wrong_type()),
            },
        }
    }

    /// `ZSCORE`.
    pub fn zscore(&mut self, key: &[u8], member: &[u8]) -> Result<Option<f64>, CommandError> {
        match self.find(key) {
            None => Ok(None),
            Some(id) => match &mut self.get_entry_mut(id).value {
                Value::ZSet(z) => Ok(z.score(member)),
                Value::Str(_) => Err(CommandError::wrong_type()),
            },
        }
    }

    /// `ZQUERY`. A missing key behaves as an empty set.
    pub fn zquery(
        &mut self,
        key: &[u8],
        score: f64,
        member: &[u8],
        offset: i64,
        limit: usize,
    ) -> Result<Vec<ZEntry>, CommandError> {
        match self.find(key) {
            None => Ok(Vec::new()),
            Some(id) => match &self.get_entry(id).value {
                Value::ZSet(z) => Ok(z.range(score, member, offset, limit)),
                Value::Str(_) => Err(CommandError::wrong_type()),
            },
        }
    }

    /// `PEXPIRE`: `spec.md` §4.4 `entry_set_ttl`. `ttl_ms < 0` clears
    /// any existing TTL; otherwise sets/updates the deadline. Returns
    /// `false` if the key doesn't exist.
    pub fn pexpire(&mut self, key: &[u8], ttl_ms: i64) -> bool {
        match self.find(key) {
            None => false,
            Some(id) => {
                self.set_ttl(id, ttl_ms);
                true
            }
        }
    }

    fn set_ttl(&mut self, id: u32, ttl_ms: i64) {
        if ttl_ms < 0 {
            self.detach_from_heap_if_present(id);
            return;
        }
        let deadline_us = monotonic_now_us() + (ttl_ms as u64).saturating_mul(1000);
        match self.get_entry(id).heap_index {
            Some(idx) => {
                let mut ttl = std::mem::take(&mut self.ttl);
                ttl.update_deadline(self, idx as usize, deadline_us);
                self.ttl = ttl;
            }
            None => {
                let mut ttl = std::mem::take(&mut self.ttl);
                ttl.push(self, id, deadline_us);
                self.ttl = ttl;
            }
        }
    }

    /// `PTTL`: `-2` if the key is absent, `-1` if it has no
    /// expiration, else the remaining time to live in milliseconds.
    pub fn pttl(&mut self, key: &[u8]) -> i64 {
        match self.find(key) {
            None => -2,
            Some(id) => match self.get_entry(id).heap_index {
                None => -1,
                Some(idx) => {
                    let deadline_us = self.ttl.deadline_at(idx as usize);
                    let now_us = monotonic_now_us();
                    (deadline_us.saturating_sub(now_us) / 1000) as i64
                }
            },
        }
    }

    /// The earliest TTL-heap deadline, for the event loop's timeout
    /// computation (`spec.md` §4.8 step 2).
    pub fn next_ttl_deadline_us(&self) -> Option<u64> {
        self.ttl.peek_deadline()
    }

    /// Expire and delete up to `max` entries whose deadline is `<=
    /// now_us`. Returns the number actually expired. Bounds the work
    /// done on one event-loop tick (`spec.md` §4.8 step 5: "deleting at
    /// most 2,000 entries per tick to avoid stalls").
    pub fn expire_due(&mut self, now_us: u64, max: usize) -> usize {
        let mut expired = 0usize;
        while expired < max {
            let mut ttl = std::mem::take(&mut self.ttl);
            let popped = ttl.pop_expired(self, now_us);
            self.ttl = ttl;
            match popped {
                Some(id) => {
                    self.detach_from_hash(id);
                    self.dealloc(id);
                    expired += 1;
                }
                None => break,
            }
        }
        expired
    }
}

impl HashStore for Database {
    fn hash_code(&self, id: NodeId) -> u64 {
        self.get_entry(id).hash_code
    }
    fn next(&self, id: NodeId) -> Option<NodeId> {
        self.get_entry(id).hash_next
    }
    fn set_next(&mut self, id: NodeId, next: Option<NodeId>) {
        self.get_entry_mut(id).hash_next = next;
    }
}

impl HeapStore for Database {
    fn set_heap_index(&mut self, entry: EntryId, idx: Option<u32>) {
        self.get_entry_mut(entry).heap_index = idx;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut db = Database::new();
        db.set_str(b"k", b"v".to_vec());
        assert_eq!(db.get_str(b"k").unwrap(), Some(b"v".as_slice()));
    }

    #[test]
    fn get_on_missing_key_is_none() {
        let mut db = Database::new();
        assert_eq!(db.get_str(b"nope").unwrap(), None);
    }

    #[test]
    fn del_removes_and_frees_the_slot_for_reuse() {
        let mut db = Database::new();
        db.set_str(b"k", b"v".to_vec());
        assert!(db.del(b"k"));
        assert!(!db.del(b"k"));
        assert_eq!(db.get_str(b"k").unwrap(), None);
        db.set_str(b"k2", b"v2".to_vec());
        assert_eq!(db.get_str(b"k2").unwrap(), Some(b"v2".as_slice()));
    }

    #[test]
    fn type_mismatch_is_reported_both_ways() {
        let mut db = Database::new();
        db.set_str(b"s", b"v".to_vec());
        assert!(db.zadd(b"s", 1.0, b"m").is_err());

        db.zadd(b"z", 1.0, b"m").unwrap();
        assert!(db.get_str(b"z").is_err());
    }

    #[test]
    fn keys_lists_every_live_key_once() {
        let mut db = Database::new();
        db.set_str(b"a", b"1".to_vec());
        db.set_str(b"b", b"2".to_vec());
        db.zadd(b"c", 1.0, b"m").unwrap();
        let mut ks = db.keys();
        ks.sort();
        assert_eq!(ks, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn zset_roundtrip_through_db() {
        let mut db = Database::new();
        assert!(db.zadd(b"z", 1.0, b"a").unwrap());
        assert!(!db.zadd(b"z", 2.0, b"a").unwrap());
        assert_eq!(db.zscore(b"z", b"a").unwrap(), Some(2.0));
        let got = db.zquery(b"z", f64::MIN, b"", 0, 10).unwrap();
        assert_eq!(got.len(), 1);
        assert!(db.zrem(b"z", b"a").unwrap());
        assert!(!db.zrem(b"z", b"a").unwrap());
    }

    #[test]
    fn pexpire_missing_key_returns_false() {
        let mut db = Database::new();
        assert!(!db.pexpire(b"nope", 1000));
    }

    #[test]
    fn pttl_reports_absent_and_no_ttl_and_live() {
        let mut db = Database::new();
        assert_eq!(db.pttl(b"nope"), -2);
        db.set_str(b"k", b"v".to_vec());
        assert_eq!(db.pttl(b"k"), -1);
        assert!(db.pexpire(b"k", 60_000));
        let ttl = db.pttl(b"k");
        assert!(ttl > 0 && ttl <= 60_000);
    }

    #[test]
    fn negative_pexpire_clears_ttl() {
        let mut db = Database::new();
        db.set_str(b"k", b"v".to_vec());
        db.pexpire(b"k", 60_000);
        assert!(db.pexpire(b"k", -1));
        assert_eq!(db.pttl(b"k"), -1);
    }

    #[test]
    fn expire_due_deletes_expired_entries_only() {
        let mut db = Database::new();
        db.set_str(b"soon", b"v".to_vec());
        db.set_str(b"later", b"v".to_vec());
        let now = monotonic_now_us();
        db.pexpire(b"soon", 0);
        db.pexpire(b"later", 60_000);
        let expired = db.expire_due(now + 1_000, 2_000);
        assert_eq!(expired, 1);
        assert_eq!(db.get_str(b"soon").unwrap(), None);
        assert_eq!(db.get_str(b"later").unwrap(), Some(b"v".as_slice()));
    }

    #[test]
    fn expire_due_respects_the_per_tick_cap() {
        let mut db = Database::new();
        let now = monotonic_now_us();
        for i in 0..10 {
            let key = format!("k{i}");
            db.set_str(key.as_bytes(), b"v".to_vec());
            db.pexpire(key.as_bytes(), 0);
        }
        let expired = db.expire_due(now + 1_000, 4);
        assert_eq!(expired, 4);
        assert_eq!(db.len(), 6);
    }

    #[test]
    fn del_on_zset_entry_drops_it_without_leaking_an_api_surface() {
        let mut db = Database::new();
        db.zadd(b"z", 1.0, b"a").unwrap();
        db.zadd(b"z", 2.0, b"b").unwrap();
        assert!(db.del(b"z"));
        assert_eq!(db.len(), 0);
    }
}
