//! Spreading of sign attempts over time.
//!
//! Every transfer gets a fixed offset into a repeating cycle, derived from its hash. A shepherd
//! only attempts to sign when the wall clock second lands on that offset, so the signing rounds of
//! many concurrent transfers don't all start at once. Offsets are the same on every validator,
//! which is what lets co-signers meet in the same round.

use std::time::{SystemTime, UNIX_EPOCH};

use xbridge_primitives::buf::Buf32;

/// Source of wall clock seconds.
pub trait Clock: Send + Sync + 'static {
    fn unix_secs(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// Offset of a transfer within the cycle: the first hash byte modulo `cycle_secs`.
pub fn scheduling_offset(hash: &Buf32, cycle_secs: u64) -> u64 {
    u64::from(hash.as_bytes()[0]) % cycle_secs
}

/// Whether a sign attempt may start at `unix_secs`.
pub fn is_sign_slot(unix_secs: u64, offset: u64, cycle_secs: u64) -> bool {
    unix_secs % cycle_secs == offset % cycle_secs
}
