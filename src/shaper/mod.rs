/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! 802.1Qav credit-based shaper.
//!
//! Three pieces cooperate:
//!
//! * [`ShaperParams`]: design-time derivation of `idleSlope` / `sendSlope` /
//!   credit bounds from the transmit interval, frame size and port rate.
//! * [`CreditAccount`]: the runtime account, a signed credit balance in bits
//!   plus an explicit queue counter and a single-permit transmit gate.
//! * [`run_refill`]: the periodic task that replenishes credit and wakes at
//!   most one waiting sender per tick.
//!
//! # Admission gate
//! `acquire()` + `release()` implement a single-slot admission gate, not a
//! counting resource. The queue counter and the notification permit are
//! deliberately separate primitives: the counter records how many tasks are
//! waiting (so refill can decide between waking a sender and clamping surplus
//! credit to zero), the permit grants exactly one transmit right at a time.
//!
//! # Credit bounds
//! `hiCredit` / `loCredit` are derived and logged at configure time but **not**
//! enforced against the balance at runtime. The only runtime clamp is
//! credit → 0 when nobody is waiting, so unclaimed credit never accumulates
//! into a burst allowance larger than one refill window.

use tokio::sync::{Mutex, Notify};
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, info, trace};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::avtp::AvtpStreamHeader;
use crate::clock::NetworkClock;

// ── Link overhead constants ───────────────────────────────────────────────────

/// Ethernet II header (dst + src + EtherType).
pub const ETH_HEADER_BYTES: usize = 14;
/// 802.1Q VLAN tag.
pub const VLAN_TAG_BYTES: usize = 4;
/// Frame check sequence.
pub const ETH_FCS_BYTES: usize = 4;
/// Preamble + start-of-frame delimiter.
pub const ETH_PREAMBLE_SFD_BYTES: usize = 8;
/// Minimum inter-packet gap.
pub const ETH_IPG_BYTES: usize = 12;

/// Per-frame link-layer cost beyond the AVTP PDU itself. All of it occupies
/// wire time, so all of it is charged against credit.
pub const LINK_OVERHEAD_BYTES: usize =
    ETH_HEADER_BYTES + VLAN_TAG_BYTES + ETH_FCS_BYTES + ETH_PREAMBLE_SFD_BYTES + ETH_IPG_BYTES;

/// Bits a transmitted PDU of `pdu_bytes` costs on the wire.
pub fn wire_bits(pdu_bytes: usize) -> i64 {
    ((pdu_bytes + LINK_OVERHEAD_BYTES) * 8) as i64
}

// ── Stream class ──────────────────────────────────────────────────────────────

/// SR stream class. Determines the VLAN priority code point of transmitted
/// frames; Class A is the higher tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamClass {
    A,
    B,
}

impl StreamClass {
    /// VLAN PCP value for this class.
    pub fn vlan_priority(self) -> u8 {
        match self {
            StreamClass::A => 3,
            StreamClass::B => 2,
        }
    }
}

impl fmt::Display for StreamClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamClass::A => write!(f, "A"),
            StreamClass::B => write!(f, "B"),
        }
    }
}

impl FromStr for StreamClass {
    type Err = ShaperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" | "a" => Ok(StreamClass::A),
            "B" | "b" => Ok(StreamClass::B),
            other => Err(ShaperError::UnknownStreamClass(other.to_string())),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Configuration-time shaper failures. The running shaper itself has no
/// permanent failure state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShaperError {
    #[error("transmit interval must be non-zero")]
    ZeroInterval,

    #[error("port transmit rate must be non-zero")]
    ZeroPortRate,

    #[error("frame of {frame_bytes} bytes exceeds interface MTU of {mtu} bytes")]
    FrameExceedsMtu { frame_bytes: usize, mtu: usize },

    #[error("unknown stream class: '{0}' (valid: A, B)")]
    UnknownStreamClass(String),
}

// ── ShaperParams ──────────────────────────────────────────────────────────────

/// Shaper parameters, derived once at configuration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaperParams {
    /// Transmission interval the stream is shaped to, nanoseconds.
    pub tx_interval_ns: u64,
    /// SR class of the stream, `None` for best-effort transmission.
    pub stream_class: Option<StreamClass>,
    /// Full wire cost of one maximal frame, bits (PDU + link overhead).
    pub max_frame_bits: i64,
    /// Credit replenishment rate, bits/second.
    pub idle_slope_bps: i64,
    /// Net rate while transmitting, bits/second (negative). Informational,
    /// for shaper-conformance accounting.
    pub send_slope_bps: i64,
    /// Theoretical upper credit bound, bits. Advisory, not enforced.
    pub hi_credit_bits: i64,
    /// Theoretical lower credit bound, bits (negative). Advisory.
    pub lo_credit_bits: i64,
    /// Port transmit rate, bits/second.
    pub port_rate_bps: i64,
}

impl ShaperParams {
    /// Derive the shaper parameters for a stream that sends one
    /// `payload_size`-byte record every `tx_interval_ns`.
    ///
    /// The maximal frame is the payload plus the AVTP stream header plus the
    /// full link-layer overhead; `idleSlope` is exactly the average rate that
    /// frame consumes at the configured cadence. Changing the payload size
    /// without reconfiguring silently breaks the shaping maths, which is why
    /// this is the only constructor.
    pub fn configure(
        tx_interval_ns: u64,
        payload_size: usize,
        stream_class: Option<StreamClass>,
        port_rate_bps: u64,
        max_mtu: usize,
    ) -> Result<Self, ShaperError> {
        if tx_interval_ns == 0 {
            return Err(ShaperError::ZeroInterval);
        }
        if port_rate_bps == 0 {
            return Err(ShaperError::ZeroPortRate);
        }

        let frame_bytes = payload_size + AvtpStreamHeader::LEN;
        if frame_bytes > max_mtu {
            return Err(ShaperError::FrameExceedsMtu {
                frame_bytes,
                mtu: max_mtu,
            });
        }

        let max_frame_bits = wire_bits(payload_size + AvtpStreamHeader::LEN);
        let idle_slope_bps =
            (max_frame_bits as i128 * 1_000_000_000 / tx_interval_ns as i128) as i64;
        let send_slope_bps = idle_slope_bps - port_rate_bps as i64;
        let lo_credit_bits =
            (max_frame_bits as i128 * send_slope_bps as i128 / port_rate_bps as i128) as i64;
        let hi_credit_bits =
            ((max_mtu * 8) as i128 * idle_slope_bps as i128 / port_rate_bps as i128) as i64;

        let params = Self {
            tx_interval_ns,
            stream_class,
            max_frame_bits,
            idle_slope_bps,
            send_slope_bps,
            hi_credit_bits,
            lo_credit_bits,
            port_rate_bps: port_rate_bps as i64,
        };

        info!(
            tx_interval_ns,
            max_frame_bits,
            idle_slope_bps,
            send_slope_bps,
            hi_credit_bits,
            lo_credit_bits,
            class = params
                .stream_class
                .map(|c| c.to_string())
                .unwrap_or_else(|| "best-effort".into()),
            "shaper configured"
        );

        Ok(params)
    }
}

// ── CreditAccount ─────────────────────────────────────────────────────────────

#[derive(Debug)]
struct CreditState {
    /// Signed balance in bits. Negative = debt from a transmitted frame.
    credit_bits: i64,
    /// Tasks currently between `acquire()` and `release()`.
    queue: u32,
    /// Timestamp of the previous replenishment; elapsed time is computed from
    /// this, so timer jitter never distorts the replenished amount.
    last_refill_at_ns: u64,
}

/// The shaping account shared by the refill task and the sender task.
#[derive(Debug)]
pub struct CreditAccount {
    params: ShaperParams,
    state: Mutex<CreditState>,
    /// Single-permit transmit gate. A stored permit survives until the next
    /// `acquire()`, but permits never stack.
    can_tx: Notify,
}

impl CreditAccount {
    pub fn new(params: ShaperParams, now_ns: u64) -> Self {
        Self {
            params,
            state: Mutex::new(CreditState {
                credit_bits: 0,
                queue: 0,
                last_refill_at_ns: now_ns,
            }),
            can_tx: Notify::new(),
        }
    }

    pub fn params(&self) -> &ShaperParams {
        &self.params
    }

    // ── Consumer side ─────────────────────────────────────────────────────────

    /// Join the queue, then block until a refill grants the transmit permit.
    /// On return the caller holds the exclusive right to transmit next and
    /// must call [`release`](Self::release) exactly once.
    pub async fn acquire(&self) {
        self.state.lock().await.queue += 1;
        self.can_tx.notified().await;
    }

    /// Leave the queue and charge the wire cost of the transmitted frame
    /// against the balance. `transmitted_bytes == 0` (a cycle that found no
    /// data) leaves the balance untouched.
    pub async fn release(&self, transmitted_bytes: usize) {
        let mut s = self.state.lock().await;
        s.queue = s.queue.saturating_sub(1);
        if transmitted_bytes > 0 {
            s.credit_bits -= wire_bits(transmitted_bytes);
            trace!(
                transmitted_bytes,
                credit_bits = s.credit_bits,
                "credit charged"
            );
        }
    }

    // ── Refill side ───────────────────────────────────────────────────────────

    /// One replenishment step at clock time `now_ns`.
    ///
    /// Credit grows by `idleSlope × dt` only while in debt; once
    /// non-negative and unclaimed it stops accumulating. When the balance is
    /// non-negative: wake exactly one waiter if any task is queued, otherwise
    /// clamp to zero.
    pub async fn refill(&self, now_ns: u64) {
        let mut s = self.state.lock().await;
        let dt_ns = now_ns.saturating_sub(s.last_refill_at_ns);

        if s.credit_bits < 0 {
            s.credit_bits +=
                (self.params.idle_slope_bps as i128 * dt_ns as i128 / 1_000_000_000) as i64;
        }

        if s.credit_bits >= 0 {
            if s.queue > 0 {
                self.can_tx.notify_one();
            } else {
                s.credit_bits = 0;
            }
        }

        s.last_refill_at_ns = now_ns;
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    /// Current balance in bits.
    pub async fn credit_bits(&self) -> i64 {
        self.state.lock().await.credit_bits
    }

    /// Tasks currently between `acquire()` and `release()`.
    pub async fn queue_depth(&self) -> u32 {
        self.state.lock().await.queue
    }

    #[cfg(test)]
    pub(crate) async fn set_credit_bits(&self, bits: i64) {
        self.state.lock().await.credit_bits = bits;
    }
}

// ── Refill task ───────────────────────────────────────────────────────────────

/// Periodic refill loop. Runs for the lifetime of the process; a sender
/// blocked on credit relies on this task never exiting.
pub async fn run_refill(account: Arc<CreditAccount>, clock: Arc<dyn NetworkClock>) {
    let period = Duration::from_nanos(account.params().tx_interval_ns);
    let mut ticker = time::interval(period);
    // Late ticks must not double-replenish; elapsed time is measured from the
    // clock, not counted in ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(period_ns = account.params().tx_interval_ns, "refill task started");
    loop {
        ticker.tick().await;
        account.refill(clock.now_ns()).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avtp::SensorSet;

    use std::sync::atomic::{AtomicU32, Ordering};

    const TEN_MS: u64 = 10_000_000;
    const PORT_100M: u64 = 100_000_000;

    fn params() -> ShaperParams {
        ShaperParams::configure(TEN_MS, SensorSet::LEN, Some(StreamClass::A), PORT_100M, 1500)
            .unwrap()
    }

    // ── Parameter derivation ──────────────────────────────────────────────────

    #[test]
    fn payload_size_invariant_holds() {
        // The shaping constants below are derived from this exact value.
        assert_eq!(SensorSet::LEN, 104);
    }

    #[test]
    fn idle_slope_at_10ms_is_frame_bits_times_100() {
        let p = params();
        // 10 ms interval → 100 refill windows per second.
        assert_eq!(p.idle_slope_bps, p.max_frame_bits * 100);
    }

    #[test]
    fn frame_bits_cover_pdu_and_link_overhead() {
        let p = params();
        let expected =
            ((SensorSet::LEN + AvtpStreamHeader::LEN + LINK_OVERHEAD_BYTES) * 8) as i64;
        assert_eq!(p.max_frame_bits, expected);
    }

    #[test]
    fn send_slope_is_idle_slope_minus_port_rate() {
        let p = params();
        assert_eq!(p.send_slope_bps, p.idle_slope_bps - PORT_100M as i64);
        assert!(p.send_slope_bps < 0, "sendSlope is negative on a sane port");
    }

    #[test]
    fn credit_bounds_have_expected_signs() {
        let p = params();
        assert!(p.lo_credit_bits < 0);
        assert!(p.hi_credit_bits > 0);
        // loCredit = frame_bits × sendSlope / portRate
        let expected_lo =
            (p.max_frame_bits as i128 * p.send_slope_bps as i128 / PORT_100M as i128) as i64;
        assert_eq!(p.lo_credit_bits, expected_lo);
    }

    #[test]
    fn configure_rejects_zero_interval_and_rate() {
        assert_eq!(
            ShaperParams::configure(0, 104, None, PORT_100M, 1500).unwrap_err(),
            ShaperError::ZeroInterval
        );
        assert_eq!(
            ShaperParams::configure(TEN_MS, 104, None, 0, 1500).unwrap_err(),
            ShaperError::ZeroPortRate
        );
    }

    #[test]
    fn configure_rejects_frame_larger_than_mtu() {
        let err = ShaperParams::configure(TEN_MS, 4000, None, PORT_100M, 1500).unwrap_err();
        assert!(matches!(err, ShaperError::FrameExceedsMtu { .. }));
    }

    #[test]
    fn stream_class_priorities() {
        assert_eq!(StreamClass::A.vlan_priority(), 3);
        assert_eq!(StreamClass::B.vlan_priority(), 2);
    }

    #[test]
    fn stream_class_parses_case_insensitively() {
        assert_eq!("A".parse::<StreamClass>().unwrap(), StreamClass::A);
        assert_eq!("b".parse::<StreamClass>().unwrap(), StreamClass::B);
        assert!(matches!(
            "C".parse::<StreamClass>(),
            Err(ShaperError::UnknownStreamClass(_))
        ));
    }

    // ── Refill semantics ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn refill_grows_credit_only_while_in_debt() {
        let account = CreditAccount::new(params(), 0);
        account.set_credit_bits(-1_000).await;

        account.refill(1_000_000).await; // 1 ms
        let grown = account.credit_bits().await;
        let expected = -1_000 + account.params().idle_slope_bps / 1_000;
        assert_eq!(grown, expected);
    }

    #[tokio::test]
    async fn surplus_credit_clamps_to_zero_when_queue_empty() {
        let account = CreditAccount::new(params(), 0);
        account.set_credit_bits(-10).await;

        // Large dt overshoots well past zero; with nobody waiting the surplus
        // must be clamped to exactly 0.
        account.refill(TEN_MS).await;
        assert_eq!(account.credit_bits().await, 0);
    }

    #[tokio::test]
    async fn debt_refill_scenario_one_frame_one_window() {
        // credit = −832 (one 104-byte payload's worth of bits); one 10 ms
        // window must replenish it to non-negative and grant one waiter.
        let account = Arc::new(CreditAccount::new(params(), 0));
        account.set_credit_bits(-832).await;

        let waiter = {
            let account = account.clone();
            tokio::spawn(async move {
                account.acquire().await;
            })
        };
        // Let the waiter enqueue before the refill tick.
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(account.queue_depth().await, 1);

        account.refill(TEN_MS).await;
        assert!(account.credit_bits().await >= 0);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter must be granted within the refill window")
            .unwrap();
    }

    #[tokio::test]
    async fn negative_credit_never_wakes_a_waiter() {
        let account = Arc::new(CreditAccount::new(params(), 0));
        account.set_credit_bits(-1_000_000).await;

        let granted = Arc::new(AtomicU32::new(0));
        let waiter = {
            let account = account.clone();
            let granted = granted.clone();
            tokio::spawn(async move {
                account.acquire().await;
                granted.store(1, Ordering::SeqCst);
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        // 1 µs of replenishment leaves the account deep in debt.
        account.refill(1_000).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(granted.load(Ordering::SeqCst), 0, "no grant while in debt");
        waiter.abort();
    }

    #[tokio::test]
    async fn refill_grants_at_most_one_of_two_contenders() {
        let account = Arc::new(CreditAccount::new(params(), 0));
        let granted = Arc::new(AtomicU32::new(0));

        let mut contenders = Vec::new();
        for _ in 0..2 {
            let account = account.clone();
            let granted = granted.clone();
            contenders.push(tokio::spawn(async move {
                account.acquire().await;
                granted.fetch_add(1, Ordering::SeqCst);
            }));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(account.queue_depth().await, 2);

        account.refill(TEN_MS).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            granted.load(Ordering::SeqCst),
            1,
            "single-slot gate: exactly one grant per refill"
        );
        for c in contenders {
            c.abort();
        }
    }

    #[tokio::test]
    async fn release_charges_full_wire_cost() {
        let account = CreditAccount::new(params(), 0);

        account.state.lock().await.queue = 1;
        account.release(128).await;

        assert_eq!(account.credit_bits().await, -wire_bits(128));
        assert_eq!(account.queue_depth().await, 0);
    }

    #[tokio::test]
    async fn release_of_zero_bytes_leaves_balance_untouched() {
        // The NotReady startup quirk: the slot is released with 0 bytes and
        // must not create debt.
        let account = CreditAccount::new(params(), 0);
        account.state.lock().await.queue = 1;
        account.release(0).await;
        assert_eq!(account.credit_bits().await, 0);
    }

    #[tokio::test]
    async fn refill_elapsed_time_is_clock_based_not_tick_based() {
        let account = CreditAccount::new(params(), 0);
        account.set_credit_bits(-account.params().idle_slope_bps).await;

        // Two ticks covering 1 s of clock time in total must replenish the
        // same amount as one 1 s tick, regardless of tick spacing.
        account.refill(300_000_000).await;
        account.refill(1_000_000_000).await;
        assert_eq!(account.credit_bits().await, 0, "exactly one second's worth");
    }

    #[test]
    fn wire_bits_includes_42_bytes_of_link_overhead() {
        assert_eq!(LINK_OVERHEAD_BYTES, 42);
        assert_eq!(wire_bits(0), 336);
        assert_eq!(wire_bits(128), (128 + 42) * 8);
    }
}
