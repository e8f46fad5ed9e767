/*
 * This file is a part of kvd
 *
 * kvd is a from-scratch reimplementation of the core of a Redis-style
 * key-value server: a progressive-rehash hash index, an order-statistic
 * AVL tree, a sorted set built on the two, and a single-threaded
 * event-driven connection layer.
*/

//! Error types for the three tiers described by the design: fatal
//! startup errors, per-connection I/O errors, and command-level errors
//! that become a wire `ERR` response without touching the connection.

use std::{fmt, io};

pub type KvResult<T> = Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    IoExtra(io::Error, String),
    Other(String),
}

impl Error {
    pub fn io_extra(ioe: io::Error, extra: impl ToString) -> Self {
        Self::IoExtra(ioe, extra.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::IoExtra(e, extra) => write!(f, "I/O error while {extra}: {e}"),
            Self::Other(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// The wire-level error codes from the protocol (`spec.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrCode {
    Unknown = 1,
    TooBig = 2,
    Type = 3,
    Arg = 4,
}

/// A command-level failure: never tears down the connection, always
/// becomes a structured `ERR` frame.
#[derive(Debug, Clone)]
pub struct CommandError {
    pub code: ErrCode,
    pub message: String,
}

impl CommandError {
    pub fn new(code: ErrCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
    pub fn unknown(cmd: &str) -> Self {
        Self::new(ErrCode::Unknown, format!("unknown command '{cmd}'"))
    }
    pub fn arity(cmd: &str) -> Self {
        Self::new(ErrCode::Arg, format!("wrong number of arguments for '{cmd}'"))
    }
    pub fn wrong_type() -> Self {
        Self::new(ErrCode::Type, "operation against a key holding the wrong kind of value")
    }
    pub fn bad_arg(why: impl Into<String>) -> Self {
        Self::new(ErrCode::Arg, why.into())
    }
    pub fn too_big() -> Self {
        Self::new(ErrCode::TooBig, "response exceeds the maximum message size")
    }
}

pub type CommandResult<T> = Result<T, CommandError>;
