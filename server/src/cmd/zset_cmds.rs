/*
 * This file is a part of kvd
*/

//! `ZADD`/`ZREM`/`ZSCORE`/`ZQUERY` (`spec.md` §4.7).

use crate::cmd::{parse_i64, parse_score};
use crate::net::protocol::Value;
use crate::store::Database;
use crate::util::error::{CommandError, CommandResult};

pub fn zadd(db: &mut Database, args: &[Vec<u8>]) -> CommandResult<Value> {
    if args.len() != 4 {
        return Err(CommandError::arity("zadd"));
    }
    let score = parse_score(&args[2])?;
    let added = db.zadd(&args[1], score, &args[3])?;
    Ok(Value::Int(added as i64))
}

pub fn zrem(db: &mut Database, args: &[Vec<u8>]) -> CommandResult<Value> {
    if args.len() != 3 {
        return Err(CommandError::arity("zrem"));
    }
    let removed = db.zrem(&args[1], &args[2])?;
    Ok(Value::Int(removed as i64))
}

pub fn zscore(db: &mut Database, args: &[Vec<u8>]) -> CommandResult<Value> {
    if args.len() != 3 {
        return Err(CommandError::arity("zscore"));
    }
    match db.zscore(&args[1], &args[2])? {
        Some(s) => Ok(Value::Dbl(s)),
        None => Ok(Value::Nil),
    }
}

/// `zquery Z S N off lim`: lower-bound of `(S, N)`, skip `off`, emit up
/// to `lim` `(name, score)` pairs flattened into an alternating `ARR`.
pub fn zquery(db: &mut Database, args: &[Vec<u8>]) -> CommandResult<Value> {
    if args.len() != 6 {
        return Err(CommandError::arity("zquery"));
    }
    let score = parse_score(&args[2])?;
    let offset = parse_i64(&args[4])?;
    let limit = parse_i64(&args[5])?;
    if limit <= 0 {
        return Ok(Value::Arr(Vec::new()));
    }
    let entries = db.zquery(&args[1], score, &args[3], offset, limit as usize)?;
    let mut out = Vec::with_capacity(entries.len() * 2);
    for e in entries {
        out.push(Value::Str(e.name));
        out.push(Value::Dbl(e.score));
    }
    Ok(Value::Arr(out))
}
