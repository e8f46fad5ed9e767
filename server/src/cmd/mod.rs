/*
 * This file is a part of kvd
*/

//! Command dispatch (`spec.md` §4.7): parses the argv a request frame
//! decoded to, matches a case-insensitive command name, and runs the
//! matching handler against the database. A handler's `Err` becomes a
//! structured `ERR` response; it never tears down the connection.

pub mod strings;
pub mod ttl_cmds;
pub mod zset_cmds;

use crate::net::protocol::Value;
use crate::store::Database;
use crate::util::error::{CommandError, CommandResult};

pub fn dispatch(db: &mut Database, args: &[Vec<u8>]) -> Value {
    match dispatch_inner(db, args) {
        Ok(v) => v,
        Err(e) => Value::Err(e.code, e.message),
    }
}

fn dispatch_inner(db: &mut Database, args: &[Vec<u8>]) -> CommandResult<Value> {
    let name = args.first().ok_or_else(|| CommandError::bad_arg("empty request"))?;
    let name = String::from_utf8_lossy(name).to_ascii_lowercase();
    match name.as_str() {
        "get" => strings::get(db, args),
        "set" => strings::set(db, args),
        "del" => strings::del(db, args),
        "keys" => strings::keys(db, args),
        "zadd" => zset_cmds::zadd(db, args),
        "zrem" => zset_cmds::zrem(db, args),
        "zscore" => zset_cmds::zscore(db, args),
        "zquery" => zset_cmds::zquery(db, args),
        "pexpire" => ttl_cmds::pexpire(db, args),
        "pttl" => ttl_cmds::pttl(db, args),
        _ => Err(CommandError::unknown(&name)),
    }
}

/// Parse a command argument as a finite `f64`. Used by `ZADD`/`ZQUERY`
/// — `spec.md` §9: "define NaN as invalid input (reject with ARG
/// error)".
pub(crate) fn parse_score(b: &[u8]) -> CommandResult<f64> {
    let s = std::str::from_utf8(b).map_err(|_| CommandError::bad_arg("score must be valid utf-8"))?;
    let v: f64 = s.parse().map_err(|_| CommandError::bad_arg("score must be a number"))?;
    if v.is_nan() {
        return Err(CommandError::bad_arg("score must not be NaN"));
    }
    Ok(v)
}

pub(crate) fn parse_i64(b: &[u8]) -> CommandResult<i64> {
    let s = std::str::from_utf8(b).map_err(|_| CommandError::bad_arg("expected an integer"))?;
    s.parse().map_err(|_| CommandError::bad_arg("expected an integer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&[u8]]) -> Vec<Vec<u8>> {
        v.iter().map(|s| s.to_vec()).collect()
    }

    #[test]
    fn unknown_command_is_reported() {
        let mut db = Database::new();
        let v = dispatch(&mut db, &args(&[b"frobnicate"]));
        assert!(matches!(v, Value::Err(crate::util::error::ErrCode::Unknown, _)));
    }

    #[test]
    fn dispatch_is_case_insensitive() {
        let mut db = Database::new();
        dispatch(&mut db, &args(&[b"SeT", b"k", b"v"]));
        let v = dispatch(&mut db, &args(&[b"GET", b"k"]));
        assert_eq!(v, Value::Str(b"v".to_vec()));
    }

    #[test]
    fn boundary_scenario_set_get_del_get() {
        let mut db = Database::new();
        assert_eq!(dispatch(&mut db, &args(&[b"set", b"foo", b"bar"])), Value::Nil);
        assert_eq!(dispatch(&mut db, &args(&[b"get", b"foo"])), Value::Str(b"bar".to_vec()));
        assert_eq!(dispatch(&mut db, &args(&[b"del", b"foo"])), Value::Int(1));
        assert_eq!(dispatch(&mut db, &args(&[b"get", b"foo"])), Value::Nil);
    }

    #[test]
    fn boundary_scenario_zquery_orders_ties_by_name() {
        let mut db = Database::new();
        dispatch(&mut db, &args(&[b"zadd", b"s", b"1.5", b"a"]));
        dispatch(&mut db, &args(&[b"zadd", b"s", b"2.0", b"b"]));
        dispatch(&mut db, &args(&[b"zadd", b"s", b"1.5", b"c"]));
        let v = dispatch(&mut db, &args(&[b"zquery", b"s", b"1.0", b"", b"0", b"10"]));
        assert_eq!(
            v,
            Value::Arr(vec![
                Value::Str(b"a".to_vec()),
                Value::Dbl(1.5),
                Value::Str(b"c".to_vec()),
                Value::Dbl(1.5),
                Value::Str(b"b".to_vec()),
                Value::Dbl(2.0),
            ])
        );
    }

    #[test]
    fn boundary_scenario_zadd_twice_updates_score() {
        let mut db = Database::new();
        assert_eq!(dispatch(&mut db, &args(&[b"zadd", b"s", b"1", b"a"])), Value::Int(1));
        assert_eq!(dispatch(&mut db, &args(&[b"zadd", b"s", b"2", b"a"])), Value::Int(0));
        assert_eq!(dispatch(&mut db, &args(&[b"zscore", b"s", b"a"])), Value::Dbl(2.0));
    }

    #[test]
    fn nan_score_is_rejected() {
        let mut db = Database::new();
        let v = dispatch(&mut db, &args(&[b"zadd", b"s", b"nan", b"a"]));
        assert!(matches!(v, Value::Err(crate::util::error::ErrCode::Arg, _)));
    }

    #[test]
    fn wrong_arity_is_an_arg_error() {
        let mut db = Database::new();
        let v = dispatch(&mut db, &args(&[b"get"]));
        assert!(matches!(v, Value::Err(crate::util::error::ErrCode::Arg, _)));
    }

    #[test]
    fn wrong_type_is_a_type_error() {
        let mut db = Database::new();
        dispatch(&mut db, &args(&[b"set", b"s", b"v"]));
        let v = dispatch(&mut db, &args(&[b"zadd", b"s", b"1", b"a"]));
        assert!(matches!(v, Value::Err(crate::util::error::ErrCode::Type, _)));
    }

    #[test]
    fn zquery_with_non_positive_limit_is_empty() {
        let mut db = Database::new();
        dispatch(&mut db, &args(&[b"zadd", b"s", b"1", b"a"]));
        let v = dispatch(&mut db, &args(&[b"zquery", b"s", b"0", b"", b"0", b"0"]));
        assert_eq!(v, Value::Arr(vec![]));
    }

    #[test]
    fn pexpire_and_pttl_round_trip() {
        let mut db = Database::new();
        dispatch(&mut db, &args(&[b"set", b"k", b"v"]));
        assert_eq!(dispatch(&mut db, &args(&[b"pexpire", b"k", b"60000"])), Value::Int(1));
        let v = dispatch(&mut db, &args(&[b"pttl", b"k"]));
        match v {
            Value::Int(ms) => assert!(ms > 0 && ms <= 60_000),
            other => panic!("expected Int, got {other:?}"),
        }
    }
}
