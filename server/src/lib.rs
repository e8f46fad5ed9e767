/*
 * This file is a part of kvd
 *
 * kvd is a from-scratch reimplementation of the core of a Redis-style
 * key-value server: a progressive-rehash hash index, an order-statistic
 * AVL tree, a sorted set built on the two, and a single-threaded
 * event-driven connection layer.
*/

//! `kvd`: a single-threaded, event-driven, in-memory key-value server.
//!
//! The binary (`src/main.rs`) is a thin shell around [`Server`]; this
//! library crate is where every data structure and protocol concern
//! from `spec.md` lives, so `server/tests/boundary.rs` can drive the
//! whole stack over a real loopback socket the way the teacher's
//! `harness` crate drives `skyd` (`examples/skytable-skytable/harness`).

pub mod cmd;
pub mod config;
pub mod idx;
pub mod net;
pub mod store;
pub mod util;

pub use net::{Server, ServerOptions};
