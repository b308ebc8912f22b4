/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Producer tasks and the sensor-driver seam.
//!
//! Device bring-up (register configuration, trigger wiring) lives behind the
//! [`ImuSource`] / [`GyroSource`] traits; the producer loops only rely on
//! "fetch latest raw sample" and a readiness signal.
//!
//! Each producer, per trigger period: fetch one sample, read the shared
//! clock, then under one lock hold write the fields, set the group's capture
//! timestamp and bump the group's sample counter. A lock timeout drops the
//! sample; readings are never queued, loss of an individual sample is
//! acceptable while accumulated staleness is not.
//!
//! Until its source reports ready, a producer stays dormant on a coarse
//! one-second poll rather than busy-spinning.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time;
use tracing::{debug, info, warn};

use crate::clock::NetworkClock;
use crate::error::RecordError;
use crate::record::{GyroSample, ImuSample, ProducerGroup, SensorRecord};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Dormant poll interval while a sensor source is not yet ready.
const SOURCE_READY_POLL: Duration = Duration::from_secs(1);

// ── Driver seam ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SensorError {
    /// A single fetch failed; the producer logs it and waits for the next
    /// trigger.
    #[error("sample fetch failed: {0}")]
    Fetch(String),
}

/// Accelerometer + magnetometer + temperature device.
pub trait ImuSource: Send {
    /// Device bring-up finished and samples can be fetched.
    fn is_ready(&self) -> bool;
    /// Fetch the latest raw sample.
    fn fetch(&mut self) -> Result<ImuSample, SensorError>;
}

/// Gyroscope device.
pub trait GyroSource: Send {
    fn is_ready(&self) -> bool;
    fn fetch(&mut self) -> Result<GyroSample, SensorError>;
}

// ── Producer loops ────────────────────────────────────────────────────────────

/// IMU producer loop. Returns when the record is no longer running.
pub async fn run_imu_producer(
    record: Arc<SensorRecord>,
    clock: Arc<dyn NetworkClock>,
    mut source: impl ImuSource,
    period: Duration,
) {
    wait_source_ready(&record, || source.is_ready(), "imu").await;
    while record.mark_group_ready(ProducerGroup::Imu).await.is_err() {
        time::sleep(Duration::from_millis(50)).await;
        if !record.is_valid().await {
            return;
        }
    }
    info!(period_us = period.as_micros() as u64, "imu producer started");

    let mut ticker = time::interval(period);
    loop {
        ticker.tick().await;
        if !record.is_valid().await {
            break;
        }
        match source.fetch() {
            Ok(sample) => {
                let captured_at_ns = clock.now_ns();
                match record.store_imu(sample, captured_at_ns).await {
                    Ok(()) => {}
                    Err(RecordError::LockTimeout { .. }) => {
                        // Sample dropped; the next trigger brings a fresh one.
                        debug!("imu sample dropped on lock timeout");
                    }
                    Err(e) => warn!(error = %e, "imu store failed"),
                }
            }
            Err(e) => warn!(error = %e, "imu fetch failed"),
        }
    }
    info!("imu producer stopped");
}

/// Gyroscope producer loop. Returns when the record is no longer running.
pub async fn run_gyro_producer(
    record: Arc<SensorRecord>,
    clock: Arc<dyn NetworkClock>,
    mut source: impl GyroSource,
    period: Duration,
) {
    wait_source_ready(&record, || source.is_ready(), "gyro").await;
    while record.mark_group_ready(ProducerGroup::Gyro).await.is_err() {
        time::sleep(Duration::from_millis(50)).await;
        if !record.is_valid().await {
            return;
        }
    }
    info!(period_us = period.as_micros() as u64, "gyro producer started");

    let mut ticker = time::interval(period);
    loop {
        ticker.tick().await;
        if !record.is_valid().await {
            break;
        }
        match source.fetch() {
            Ok(sample) => {
                let captured_at_ns = clock.now_ns();
                match record.store_gyro(sample, captured_at_ns).await {
                    Ok(()) => {}
                    Err(RecordError::LockTimeout { .. }) => {
                        debug!("gyro sample dropped on lock timeout");
                    }
                    Err(e) => warn!(error = %e, "gyro store failed"),
                }
            }
            Err(e) => warn!(error = %e, "gyro fetch failed"),
        }
    }
    info!("gyro producer stopped");
}

/// Dormant wait for the driver source; also exits when the record shuts down
/// before the source ever becomes ready.
async fn wait_source_ready(
    record: &SensorRecord,
    mut is_ready: impl FnMut() -> bool,
    name: &str,
) {
    while !is_ready() {
        debug!(sensor = name, "source not ready, dormant");
        time::sleep(SOURCE_READY_POLL).await;
        if !record.is_valid().await {
            return;
        }
    }
}

// ── Simulated sources ─────────────────────────────────────────────────────────

/// Deterministic IMU waveform generator (demo mode and tests).
#[derive(Debug, Default)]
pub struct SimulatedImu {
    step: u64,
}

impl SimulatedImu {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImuSource for SimulatedImu {
    fn is_ready(&self) -> bool {
        true
    }

    fn fetch(&mut self) -> Result<ImuSample, SensorError> {
        let t = self.step as f64 * 0.01;
        self.step += 1;
        Ok(ImuSample {
            accel: [t.sin() * 0.5, t.cos() * 0.5, 9.81],
            magn: [0.2 + t.sin() * 0.05, -0.1, 0.43],
            temperature: 24.0 + (t * 0.1).sin(),
        })
    }
}

/// Deterministic gyroscope waveform generator.
#[derive(Debug, Default)]
pub struct SimulatedGyro {
    step: u64,
}

impl SimulatedGyro {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GyroSource for SimulatedGyro {
    fn is_ready(&self) -> bool {
        true
    }

    fn fetch(&mut self) -> Result<GyroSample, SensorError> {
        let t = self.step as f64 * 0.01;
        self.step += 1;
        Ok(GyroSample {
            rates: [t.sin() * 2.0, t.cos() * 2.0, (t * 0.5).sin()],
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
