/*
 * Created on Mon Jul 20 2020
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2020, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! The core library, shared by both the `cli` and the `server` crates.
//!
//! Holds the wire constants and the small bits of text-munging the
//! command-line client needs; nothing here is specific to the storage
//! engine itself.

pub mod util;

use std::error::Error;

/// A generic result used at the edges (config, CLI) where a specific
/// error type isn't worth defining.
pub type TResult<T> = Result<T, Box<dyn Error>>;

/// Server version string, reported by the `whereami`-style banner on startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Project URL printed alongside the startup banner.
pub const URL: &str = "https://github.com/example/kvd";

/// The largest frame (length prefix + payload) either side will ever
/// send or accept. Mirrors `K_MAX_MSG` in the wire protocol.
pub const K_MAX_MSG: usize = 4096;
/// The largest number of strings a request argv may contain.
pub const K_MAX_ARGS: usize = 1024;

use std::str::FromStr;

lazy_static::lazy_static! {
    static ref RE: regex::Regex = regex::Regex::from_str(r#"("[^"]*"|'[^']*'|[\S]+)+"#).unwrap();
}

/// Split a human-typed command line into argv, honoring single and
/// double quoted spans the way a shell would.
pub fn split_into_args(q: &str) -> Vec<String> {
    RE.find_iter(q)
        .map(|val| val.as_str().replace('\'', "").replace('"', ""))
        .collect()
}
