/*
 * This file is a part of kvd
 *
 * kvd is a from-scratch reimplementation of the core of a Redis-style
 * key-value server: a progressive-rehash hash index, an order-statistic
 * AVL tree, a sorted set built on the two, and a single-threaded
 * event-driven connection layer.
*/

//! `kvd`'s entry point: parses argv into a [`kvd::config::Cli`], binds
//! the listening socket, and runs the event loop until a fatal I/O
//! error (`spec.md` §7 tier 3: "abort the process with a diagnostic").

use std::env;
use std::process;

use clap::Parser;
use env_logger::Builder;

use kvd::config::Cli;
use kvd::{Server, ServerOptions};
use libkvd::{URL, VERSION};

fn main() {
    Builder::new()
        .parse_filters(&env::var("KVD_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();

    let cli = Cli::parse();
    println!("kvd v{VERSION} | {URL}");

    let opts = ServerOptions {
        addr: cli.socket_addr(),
        idle_timeout_us: cli.idle_timeout_us(),
        max_timers_per_tick: cli.max_timers_per_tick,
    };

    let mut server = match Server::bind(opts) {
        Ok(s) => s,
        Err(e) => {
            log::error!("startup failure: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        log::error!("fatal event loop error: {e}");
        process::exit(1);
    }
}
