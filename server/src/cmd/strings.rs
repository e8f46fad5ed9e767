/*
 * This file is a part of kvd
*/

//! `GET`/`SET`/`DEL`/`KEYS` (`spec.md` §4.7).

use crate::net::protocol::Value;
use crate::store::Database;
use crate::util::error::{CommandError, CommandResult};

pub fn get(db: &mut Database, args: &[Vec<u8>]) -> CommandResult<Value> {
    if args.len() != 2 {
        return Err(CommandError::arity("get"));
    }
    match db.get_str(&args[1])? {
        Some(v) => Ok(Value::Str(v.to_vec())),
        None => Ok(Value::Nil),
    }
}

pub fn set(db: &mut Database, args: &[Vec<u8>]) -> CommandResult<Value> {
    if args.len() != 3 {
        return Err(CommandError::arity("set"));
    }
    db.set_str(&args[1], args[2].clone());
    Ok(Value::Nil)
}

pub fn del(db: &mut Database, args: &[Vec<u8>]) -> CommandResult<Value> {
    if args.len() != 2 {
        return Err(CommandError::arity("del"));
    }
    Ok(Value::Int(if db.del(&args[1]) { 1 } else { 0 }))
}

pub fn keys(db: &mut Database, args: &[Vec<u8>]) -> CommandResult<Value> {
    if args.len() != 1 {
        return Err(CommandError::arity("keys"));
    }
    Ok(Value::Arr(db.keys().into_iter().map(Value::Str).collect()))
}
