/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The sender task, the single consumer of the shared record.
//!
//! Per cycle:
//!
//! 1. acquire a credit slot (blocks until the refill task grants one),
//! 2. snapshot-and-clear the shared record under one lock hold,
//! 3. assemble the AVTP PDU (sequence number, truncated gPTP timestamp,
//!    send-time stamp) and transmit it to the stream destination,
//! 4. release the slot with the bytes actually transmitted (0 on a cycle
//!    that found no data; the startup `NotReady` race deliberately still
//!    consumes its refill window),
//! 5. drain loopback noise from the receive queue.
//!
//! A transmit failure on the prioritised path flips the record's `running`
//! flag; best-effort failures are logged and the loop continues. The node
//! degrades to "not transmitting"; there is no process abort from here.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::avtp::PduAssembler;
use crate::clock::NetworkClock;
use crate::error::RecordError;
use crate::record::SensorRecord;
use crate::shaper::{CreditAccount, StreamClass};
use crate::transport::{drain_rx, FrameTransport};

/// How long the sender waits at startup for all producer groups.
pub const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one consume-and-transmit attempt.
enum CycleOutcome {
    /// A frame of this many bytes went out.
    Sent(usize),
    /// No data this cycle (startup race or transient lock timeout).
    Empty,
    /// The record signalled shutdown.
    Stop,
}

/// The sender task.
pub struct SenderTask {
    record: Arc<SensorRecord>,
    account: Arc<CreditAccount>,
    clock: Arc<dyn NetworkClock>,
    transport: Arc<dyn FrameTransport>,
    assembler: PduAssembler,
    stream_class: Option<StreamClass>,
}

impl SenderTask {
    pub fn new(
        record: Arc<SensorRecord>,
        account: Arc<CreditAccount>,
        clock: Arc<dyn NetworkClock>,
        transport: Arc<dyn FrameTransport>,
        assembler: PduAssembler,
    ) -> Self {
        let stream_class = account.params().stream_class;
        Self {
            record,
            account,
            clock,
            transport,
            assembler,
            stream_class,
        }
    }

    /// Run until shutdown. Errors only before steady state (readiness wait).
    pub async fn run(mut self) -> Result<(), RecordError> {
        self.record.wait_until_ready(READY_TIMEOUT).await?;
        info!(
            class = self
                .stream_class
                .map(|c| c.to_string())
                .unwrap_or_else(|| "best-effort".into()),
            "sender started"
        );

        loop {
            self.account.acquire().await;

            let outcome = self.transmit_cycle().await;
            let transmitted = match outcome {
                CycleOutcome::Sent(bytes) => bytes,
                CycleOutcome::Empty => 0,
                CycleOutcome::Stop => {
                    self.account.release(0).await;
                    break;
                }
            };
            self.account.release(transmitted).await;

            let drained = drain_rx(self.transport.as_ref());
            if drained > 0 {
                trace!(drained, "loopback frames discarded");
            }
        }

        info!("sender stopped");
        Ok(())
    }

    async fn transmit_cycle(&mut self) -> CycleOutcome {
        let snapshot = match self.record.snapshot_and_clear().await {
            Ok(snapshot) => snapshot,
            Err(RecordError::NotRunning) => return CycleOutcome::Stop,
            Err(RecordError::NotReady) => {
                // Startup race; the slot is still released with 0 bytes.
                debug!("record not ready, skipping cycle");
                return CycleOutcome::Empty;
            }
            Err(e) => {
                debug!(error = %e, "snapshot skipped");
                return CycleOutcome::Empty;
            }
        };

        let frame = self.assembler.assemble(&snapshot, self.clock.now_ns());
        match self.transport.send(&frame, self.stream_class) {
            Ok(bytes) => {
                trace!(
                    bytes,
                    accel_samples = snapshot.accel_sample_count,
                    gyro_samples = snapshot.gyro_sample_count,
                    "frame transmitted"
                );
                CycleOutcome::Sent(bytes)
            }
            Err(e) if self.stream_class.is_some() => {
                // Terminal: the prioritised path is gone. Cooperating tasks
                // observe the flag and stop.
                warn!(error = %e, "prioritised transmit failed, shutting down");
                self.record.shutdown().await;
                CycleOutcome::Stop
            }
            Err(e) => {
                warn!(error = %e, "best-effort transmit failed");
                CycleOutcome::Empty
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
