/*
 * This file is a part of kvd
*/

//! The idle-timer list: an intrusive doubly linked list of live
//! connections, kept in ascending order of `last_activity_us` by
//! always re-inserting a touched connection at the tail — `spec.md`
//! §4.5, ported from `examples/original_source/src/list.h`'s
//! `DList`/`dlist_insert_before`/`dlist_detach`.
//!
//! The original is a circular list with a sentinel node threaded
//! through the same struct as its payload (`offsetof` back to the
//! owning `Conn`). Here the list is addressed by the connection
//! table's own slot id instead of a pointer, and head/tail are plain
//! `Option`s rather than a sentinel — the arena already gives every
//! link a stable address, so a dummy node buys nothing in safe Rust.

pub type LinkId = u32;

pub trait IdleListStore {
    fn idle_prev(&self, id: LinkId) -> Option<LinkId>;
    fn set_idle_prev(&mut self, id: LinkId, p: Option<LinkId>);
    fn idle_next(&self, id: LinkId) -> Option<LinkId>;
    fn set_idle_next(&mut self, id: LinkId, n: Option<LinkId>);
    fn last_activity_us(&self, id: LinkId) -> u64;
}

#[derive(Default)]
pub struct IdleList {
    head: Option<LinkId>,
    tail: Option<LinkId>,
}

impl IdleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<LinkId> {
        self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Unlink `id` from wherever it currently sits. No-op if `id` is
    /// not linked.
    pub fn detach<S: IdleListStore + ?Sized>(&mut self, store: &mut S, id: LinkId) {
        let prev = store.idle_prev(id);
        let next = store.idle_next(id);
        match prev {
            Some(p) => store.set_idle_next(p, next),
            None => {
                if self.head == Some(id) {
                    self.head = next;
                }
            }
        }
        match next {
            Some(n) => store.set_idle_prev(n, prev),
            None => {
                if self.tail == Some(id) {
                    self.tail = prev;
                }
            }
        }
        store.set_idle_prev(id, None);
        store.set_idle_next(id, None);
    }

    /// Detach `id` if linked, then link it at the tail. Used both at
    /// accept time and on every activity touch (`spec.md` §4.5).
    pub fn touch<S: IdleListStore + ?Sized>(&mut self, store: &mut S, id: LinkId) {
        self.detach(store, id);
        store.set_idle_prev(id, self.tail);
        store.set_idle_next(id, None);
        match self.tail {
            Some(t) => store.set_idle_next(t, Some(id)),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }

    /// Pop and return ids from the head while `last_activity_us + idle_timeout_us
    /// < now_us`, for the event loop's `process_timers` step. Each popped id
    /// is already detached from the list before being returned.
    pub fn pop_expired<S: IdleListStore + ?Sized>(
        &mut self,
        store: &mut S,
        now_us: u64,
        idle_timeout_us: u64,
    ) -> Vec<LinkId> {
        let mut out = Vec::new();
        while let Some(id) = self.head {
            if store.last_activity_us(id) + idle_timeout_us >= now_us {
                break;
            }
            self.detach(store, id);
            out.push(id);
        }
        out
    }
}
