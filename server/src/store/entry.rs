/*
 * This file is a part of kvd
*/

//! `Entry`: the unit stored under a user key (`spec.md` §3). Owns its
//! value — a byte string or a [`ZSet`] — and knows its own slot in the
//! TTL heap, if it has a deadline.

use crate::idx::hmap::NodeId;
use crate::store::zset::ZSet;

/// The value held by an [`Entry`].
pub enum Value {
    Str(Vec<u8>),
    ZSet(ZSet),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::ZSet(_) => "zset",
        }
    }
}

pub struct Entry {
    pub key: Vec<u8>,
    pub hash_code: u64,
    pub value: Value,
    /// This entry's current slot in the database's TTL heap, or `None`
    /// if it carries no expiration.
    pub heap_index: Option<u32>,
    pub(crate) hash_next: Option<NodeId>,
}

impl Entry {
    pub fn new(key: Vec<u8>, hash_code: u64, value: Value) -> Self {
        Self {
            key,
            hash_code,
            value,
            heap_index: None,
            hash_next: None,
        }
    }
}
