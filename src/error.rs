/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types shared across the node.
//!
//! The taxonomy follows the propagation policy of the node:
//!
//! * [`RecordError::LockTimeout`] is **transient**: the caller skips the
//!   current cycle and retries on the next trigger. It is never escalated to
//!   shutdown.
//! * [`RecordError::NotReady`] is a **startup race**: the consumer ran before
//!   all producers finished first initialisation. Logged and ignored.
//! * [`RecordError::NotRunning`] is **terminal**: every long-running task
//!   must observe it and exit its loop.
//! * Transmit failures on the prioritised path flip the record's `running`
//!   flag, which other tasks observe opportunistically; there is no
//!   process-level abort once steady state has begun.
//!
//! Initialisation failures (before the main loops start) are aggregated in
//! `main` with `anyhow`; if any occurred the node never enters steady state.

use thiserror::Error;

// ── Shared sensor record ──────────────────────────────────────────────────────

/// Errors produced by the shared sensor record and the tasks built on it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The record lock could not be acquired within the configured per-attempt
    /// timeout, across all retry attempts. Transient: drop the sample or skip
    /// the cycle and retry on the next trigger.
    #[error("record lock not acquired after {attempts} attempts of {timeout_us} µs each")]
    LockTimeout { attempts: u32, timeout_us: u64 },

    /// The consumer observed the record before every producer group completed
    /// first initialisation. Startup race, not a failure; the credit slot is
    /// still released (with 0 transmitted bytes).
    #[error("sensor record not yet initialised by all producer groups")]
    NotReady,

    /// The record's `running` flag is false: a terminal transmit failure
    /// occurred or shutdown was requested. Terminal for every loop.
    #[error("sensor record is no longer running")]
    NotRunning,

    /// `wait_until_ready` elapsed before the record became ready.
    #[error("sensor record did not become ready within {timeout_ms} ms")]
    ReadyTimeout { timeout_ms: u64 },
}

impl RecordError {
    /// `true` for conditions a loop may absorb and retry; `false` for
    /// conditions that must end the loop.
    pub fn is_transient(&self) -> bool {
        !matches!(self, RecordError::NotRunning)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_running_is_terminal() {
        assert!(!RecordError::NotRunning.is_transient());
    }

    #[test]
    fn lock_timeout_and_not_ready_are_transient() {
        let lt = RecordError::LockTimeout {
            attempts: 3,
            timeout_us: 250,
        };
        assert!(lt.is_transient());
        assert!(RecordError::NotReady.is_transient());
        assert!(RecordError::ReadyTimeout { timeout_ms: 1000 }.is_transient());
    }

    #[test]
    fn lock_timeout_message_carries_retry_parameters() {
        let e = RecordError::LockTimeout {
            attempts: 3,
            timeout_us: 250,
        };
        let msg = e.to_string();
        assert!(msg.contains('3'), "message should name the attempt count");
        assert!(msg.contains("250"), "message should name the timeout");
    }
}
