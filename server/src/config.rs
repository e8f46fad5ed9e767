/*
 * This file is a part of kvd
*/

//! Startup configuration. `spec.md` pins the listen address and every
//! timer constant outright (§6, §8); this module turns them into a
//! small `clap`-derived struct instead of hardcoding them, the way the
//! teacher's `sky-migrate` crate turns its own argv into a validated
//! `Cli` with `clap::Parser` (`examples/skytable-skytable/sky-migrate/src/cli.rs`).
//! No config file, no env var layer: `spec.md` §1 scopes those out
//! along with persistence, auth, and clustering.

use std::net::{IpAddr, SocketAddr};

use clap::Parser;

use libkvd::K_MAX_MSG;

const HELP_TEMPLATE: &str = r#"
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
"#;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, help_template = HELP_TEMPLATE)]
pub struct Cli {
    /// Address to bind the listening socket to.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,
    /// Port to bind the listening socket to.
    #[arg(long, default_value_t = 1234)]
    pub port: u16,
    /// Milliseconds of inactivity before a connection is closed
    /// (`spec.md` §6 `K_IDLE_TIMEOUT_MS`).
    #[arg(long = "idle-timeout-ms", default_value_t = 5_000)]
    pub idle_timeout_ms: u64,
    /// Upper bound on TTL expirations processed per event-loop tick
    /// (`spec.md` §4.8 step 5).
    #[arg(long = "max-timers-per-tick", default_value_t = 2_000)]
    pub max_timers_per_tick: usize,
}

impl Cli {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn idle_timeout_us(&self) -> u64 {
        self.idle_timeout_ms.saturating_mul(1_000)
    }
}

impl Default for Cli {
    fn default() -> Self {
        // mirrors the `#[arg(default_value...)]`s above for callers (tests,
        // `cargo run` with no args) that build a `Cli` without going through
        // argv at all
        Self {
            host: "0.0.0.0".parse().unwrap(),
            port: 1234,
            idle_timeout_ms: 5_000,
            max_timers_per_tick: 2_000,
        }
    }
}

/// `spec.md` §6: every request and response frame is capped at this
/// size regardless of what `Cli` configures, so it's surfaced here
/// rather than as a flag.
pub const MAX_MSG: usize = K_MAX_MSG;

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn defaults_match_spec_constants() {
        let cli = Cli::default();
        assert_eq!(cli.socket_addr(), "0.0.0.0:1234".parse().unwrap());
        assert_eq!(cli.idle_timeout_us(), 5_000_000);
        assert_eq!(cli.max_timers_per_tick, 2_000);
    }

    #[test]
    fn cli_definition_is_well_formed() {
        Cli::command().debug_assert();
    }
}
