/*
 * This file is a part of kvd
*/

//! `PEXPIRE`/`PTTL`: the TTL command surface `spec.md` §9 leaves as an
//! implementer's choice ("implementers may expose `pexpire K ms` /
//! `pttl K`"), exposed here per `SPEC_FULL.md`'s supplemented-features
//! section since the TTL heap (`store::ttlheap`) is already a
//! first-class subsystem.

use crate::net::protocol::Value;
use crate::store::Database;
use crate::util::error::{CommandError, CommandResult};

use super::parse_i64;

/// `pexpire K ttl_ms`: sets or clears `K`'s TTL. Returns `1` if the key
/// exists, `0` if not — a missing key is not an error.
pub fn pexpire(db: &mut Database, args: &[Vec<u8>]) -> CommandResult<Value> {
    if args.len() != 3 {
        return Err(CommandError::arity("pexpire"));
    }
    let ttl_ms = parse_i64(&args[2])?;
    Ok(Value::Int(db.pexpire(&args[1], ttl_ms) as i64))
}

/// `pttl K`: milliseconds remaining, `-1` if the key exists with no
/// TTL, `-2` if the key doesn't exist.
pub fn pttl(db: &mut Database, args: &[Vec<u8>]) -> CommandResult<Value> {
    if args.len() != 2 {
        return Err(CommandError::arity("pttl"));
    }
    Ok(Value::Int(db.pttl(&args[1])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&[u8]]) -> Vec<Vec<u8>> {
        v.iter().map(|s| s.to_vec()).collect()
    }

    #[test]
    fn pexpire_on_missing_key_returns_zero() {
        let mut db = Database::new();
        let v = pexpire(&mut db, &args(&[b"pexpire", b"nope", b"1000"])).unwrap();
        assert_eq!(v, Value::Int(0));
    }

    #[test]
    fn pttl_three_way_convention() {
        let mut db = Database::new();
        assert_eq!(pttl(&mut db, &args(&[b"pttl", b"nope"])).unwrap(), Value::Int(-2));
        db.set_str(b"k", b"v".to_vec());
        assert_eq!(pttl(&mut db, &args(&[b"pttl", b"k"])).unwrap(), Value::Int(-1));
        pexpire(&mut db, &args(&[b"pexpire", b"k", b"60000"])).unwrap();
        match pttl(&mut db, &args(&[b"pttl", b"k"])).unwrap() {
            Value::Int(ms) => assert!(ms > 0 && ms <= 60_000),
            other => panic!("expected Int, got {other:?}"),
        }
    }

    #[test]
    fn wrong_arity_is_an_arg_error() {
        let mut db = Database::new();
        assert!(pexpire(&mut db, &args(&[b"pexpire", b"k"])).is_err());
        assert!(pttl(&mut db, &args(&[b"pttl", b"k", b"extra"])).is_err());
    }
}
