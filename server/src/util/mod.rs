/*
 * This file is a part of kvd
*/

pub mod compiler;
pub mod error;
pub mod hash;

/// Monotonic microsecond clock used for idle timestamps and TTL
/// deadlines. A thin wrapper so the rest of the crate never touches
/// `Instant`/`SystemTime` directly — keeps the timer math in one place.
pub fn monotonic_now_us() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    // wall-clock is fine here: we only ever compare two readings taken
    // from this same function, and a TTL deadline needs to survive
    // being communicated to a client as "milliseconds from now"
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the epoch")
        .as_micros() as u64
}
