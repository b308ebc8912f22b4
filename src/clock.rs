/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Network-clock seam.
//!
//! Every timestamp in the node (capture timestamps, send timestamps, shaper
//! refill accounting) is read from one [`NetworkClock`]. On a deployed node
//! this is backed by the platform's gPTP service; the bundled
//! [`MonotonicClock`] stands in wherever a free-running monotonic source is
//! acceptable (tests, demo mode, bring-up before gPTP lock).

use std::time::Instant;

use tracing::debug;

// ── Trait ─────────────────────────────────────────────────────────────────────

/// A monotonic nanosecond timestamp source shared by the whole node.
pub trait NetworkClock: Send + Sync {
    /// Current time in nanoseconds. Monotonic, non-decreasing between calls.
    fn now_ns(&self) -> u64;
}

// ── Monotonic fallback ────────────────────────────────────────────────────────

/// Free-running monotonic clock, nanoseconds since construction.
#[derive(Debug)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkClock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

// ── Grandmaster observation ───────────────────────────────────────────────────

/// Tracks the gPTP grandmaster identity and logs when it changes.
///
/// The gPTP service invokes this from its phase-discontinuity callback; the
/// node itself only ever logs the change (a GM switch means timestamps before
/// and after are not directly comparable).
#[derive(Debug, Default)]
pub struct GrandmasterTracker {
    identity: [u8; 8],
}

impl GrandmasterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the currently observed grandmaster. Returns `true` (and emits a
    /// debug event) when the identity differs from the last observed one.
    pub fn observe(&mut self, identity: [u8; 8]) -> bool {
        if identity == self.identity {
            return false;
        }
        self.identity = identity;
        debug!(
            gm = %format_clock_id(&identity),
            "grandmaster identity changed"
        );
        true
    }
}

/// Format an 8-byte clock identity as `xx:xx:xx:xx:xx:xx:xx:xx`.
fn format_clock_id(id: &[u8; 8]) -> String {
    id.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_is_non_decreasing() {
        let clock = MonotonicClock::new();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }

    #[test]
    fn grandmaster_change_is_reported_once_per_identity() {
        let mut tracker = GrandmasterTracker::new();
        let gm = [0x00, 0x1b, 0x21, 0xff, 0xfe, 0xe4, 0x67, 0x07];

        assert!(tracker.observe(gm), "first identity is a change");
        assert!(!tracker.observe(gm), "same identity is not a change");
        assert!(tracker.observe([0xaa; 8]), "new identity is a change");
    }

    #[test]
    fn clock_id_formatting() {
        let id = [0x00, 0x1b, 0x21, 0xff, 0xfe, 0xe4, 0x67, 0x07];
        assert_eq!(format_clock_id(&id), "00:1b:21:ff:fe:e4:67:07");
    }
}
