/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Periodic diagnostic readout of the shared record.
//!
//! Logs the current fused values and the capture-time skew between the two
//! producer groups at a fixed cadence (10 Hz by default). Purely
//! observational: reads under the record lock and never clears anything, so
//! it can run alongside the sender without perturbing the
//! snapshot-and-clear contract.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::debug;

use crate::record::SensorRecord;

/// Default readout cadence.
pub const DIAG_PERIOD: Duration = Duration::from_millis(100);

/// Diagnostic loop. Returns when the record is no longer running.
pub async fn run_diag(record: Arc<SensorRecord>, period: Duration) {
    let mut ticker = time::interval(period);
    loop {
        ticker.tick().await;
        if !record.is_valid().await {
            break;
        }

        // Peek without clearing: read and write back through the producer
        // path is not an option, so this uses a snapshot peek.
        if let Ok(view) = record.peek().await {
            let skew_ms =
                (view.accel_captured_at_ns as i64 - view.gyro_captured_at_ns as i64) as f64 / 1e6;
            debug!(
                gyro = ?view.gyro,
                accel = ?view.accel,
                magn = ?view.magn,
                temperature = view.temperature,
                skew_ms,
                accel_samples = view.accel_sample_count,
                gyro_samples = view.gyro_sample_count,
                "sensor readout"
            );
        }
    }
    debug!("diagnostic task stopped");
}
