/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The shared sensor record.
//!
//! One [`SensorRecord`] instance is shared (via `Arc`) between every producer
//! task and the single sender task for the lifetime of the process:
//!
//! ```text
//! IMU producer ──┐
//!                ├──► SensorRecord ──► sender (snapshot-and-clear) ──► AVTP
//! gyro producer ─┘
//! ```
//!
//! # Locking model
//! Every field is read or written only while the record lock is held. The
//! lock is acquired with a per-attempt timeout and a bounded retry count
//! ([`LOCK_RETRY_ATTEMPTS`]); exhausting the retries yields
//! [`RecordError::LockTimeout`], which callers treat as "drop this sample /
//! skip this cycle". The guard releases the lock on every exit path.
//!
//! # Snapshot-and-clear
//! The consumer copies and zeroes all sensor fields under one continuous lock
//! hold, so a produced sample is transmitted at most once: a producer write
//! that begins after the clear completes lands in the *next* snapshot, never
//! in none or in two.
//!
//! # Readiness and shutdown
//! `ready` flips true once every producer group has completed first
//! initialisation; waiters suspend on a `watch` channel instead of polling a
//! flag, while `wait_until_ready` preserves the original overall-timeout
//! semantics. `running` is the cooperative shutdown flag: once false, no task
//! starts new work.

use std::time::Duration;

use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::time;
use tracing::info;

use crate::error::RecordError;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Lock acquisition attempts before [`RecordError::LockTimeout`] is returned.
pub const LOCK_RETRY_ATTEMPTS: u32 = 3;

// ── Sample types ──────────────────────────────────────────────────────────────

/// One fused reading from the IMU device (accelerometer, magnetometer and die
/// temperature come from the same part and are fetched together).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImuSample {
    /// m/s² per axis.
    pub accel: [f64; 3],
    /// Gauss per axis.
    pub magn: [f64; 3],
    /// Die temperature, °C.
    pub temperature: f64,
}

/// One reading from the gyroscope device, rad/s per axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GyroSample {
    pub rates: [f64; 3],
}

/// Producer groups writing into the record. Each group owns one capture
/// timestamp and one sample counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerGroup {
    /// Accelerometer + magnetometer + temperature device.
    Imu,
    /// Gyroscope device.
    Gyro,
}

// ── Guarded state ─────────────────────────────────────────────────────────────

/// The guarded fields. Only ever touched through [`SensorRecord`] while the
/// lock is held.
#[derive(Debug, Default)]
struct RecordState {
    accel: [f64; 3],
    magn: [f64; 3],
    gyro: [f64; 3],
    temperature: f64,

    accel_captured_at_ns: u64,
    gyro_captured_at_ns: u64,

    /// Writes per group since the last consumer clear; over-/under-production
    /// relative to the transmit cadence shows up here.
    accel_sample_count: u32,
    gyro_sample_count: u32,

    imu_initialised: bool,
    gyro_initialised: bool,
    ready: bool,
    running: bool,
}

/// What the sender copies out of the record each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSnapshot {
    pub accel: [f64; 3],
    pub magn: [f64; 3],
    pub gyro: [f64; 3],
    pub temperature: f64,
    pub accel_captured_at_ns: u64,
    pub gyro_captured_at_ns: u64,
    pub accel_sample_count: u32,
    pub gyro_sample_count: u32,
}

// ── SensorRecord ──────────────────────────────────────────────────────────────

/// The mutex-protected shared sensor record.
#[derive(Debug)]
pub struct SensorRecord {
    state: Mutex<RecordState>,
    lock_timeout: Duration,
    ready_tx: watch::Sender<bool>,
}

impl SensorRecord {
    /// Create a zeroed record with `running = true` and `ready = false`.
    ///
    /// `lock_timeout` is the per-attempt bound used by [`acquire`](Self::acquire).
    pub fn new(lock_timeout: Duration) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(RecordState {
                running: true,
                ..RecordState::default()
            }),
            lock_timeout,
            ready_tx,
        }
    }

    // ── Lock acquisition ──────────────────────────────────────────────────────

    /// Acquire the record lock, retrying up to [`LOCK_RETRY_ATTEMPTS`] times
    /// with the configured per-attempt timeout.
    ///
    /// The returned guard releases the lock when dropped, on every exit path.
    async fn acquire(&self) -> Result<MutexGuard<'_, RecordState>, RecordError> {
        for _ in 0..LOCK_RETRY_ATTEMPTS {
            match time::timeout(self.lock_timeout, self.state.lock()).await {
                Ok(guard) => return Ok(guard),
                Err(_elapsed) => continue,
            }
        }
        Err(RecordError::LockTimeout {
            attempts: LOCK_RETRY_ATTEMPTS,
            timeout_us: self.lock_timeout.as_micros() as u64,
        })
    }

    // ── Producer side ─────────────────────────────────────────────────────────

    /// Write one IMU sample with its capture timestamp and bump the group's
    /// sample counter. On lock timeout the sample is lost (the caller retries
    /// on its next trigger, never queues).
    pub async fn store_imu(&self, sample: ImuSample, captured_at_ns: u64) -> Result<(), RecordError> {
        let mut s = self.acquire().await?;
        s.accel = sample.accel;
        s.magn = sample.magn;
        s.temperature = sample.temperature;
        s.accel_captured_at_ns = captured_at_ns;
        s.accel_sample_count += 1;
        Ok(())
    }

    /// Write one gyroscope sample with its capture timestamp and bump the
    /// group's sample counter.
    pub async fn store_gyro(&self, sample: GyroSample, captured_at_ns: u64) -> Result<(), RecordError> {
        let mut s = self.acquire().await?;
        s.gyro = sample.rates;
        s.gyro_captured_at_ns = captured_at_ns;
        s.gyro_sample_count += 1;
        Ok(())
    }

    /// Mark one producer group as having completed first initialisation.
    /// When every group has reported, `ready` flips true and waiters on
    /// [`wait_until_ready`](Self::wait_until_ready) are woken.
    pub async fn mark_group_ready(&self, group: ProducerGroup) -> Result<(), RecordError> {
        let mut s = self.acquire().await?;
        match group {
            ProducerGroup::Imu => s.imu_initialised = true,
            ProducerGroup::Gyro => s.gyro_initialised = true,
        }
        if s.imu_initialised && s.gyro_initialised && !s.ready {
            s.ready = true;
            info!("all producer groups initialised, record ready");
            self.ready_tx.send_replace(true);
        }
        Ok(())
    }

    // ── Consumer side ─────────────────────────────────────────────────────────

    /// Copy out every sensor field and zero them, under one continuous lock
    /// hold.
    ///
    /// # Errors
    /// * [`RecordError::NotRunning`]: shutdown observed, terminal.
    /// * [`RecordError::NotReady`]: producers have not finished first
    ///   initialisation; a startup race, not a failure.
    /// * [`RecordError::LockTimeout`]: transient, skip the cycle.
    pub async fn snapshot_and_clear(&self) -> Result<SensorSnapshot, RecordError> {
        let mut s = self.acquire().await?;
        if !s.running {
            return Err(RecordError::NotRunning);
        }
        if !s.ready {
            return Err(RecordError::NotReady);
        }

        let snapshot = SensorSnapshot {
            accel: s.accel,
            magn: s.magn,
            gyro: s.gyro,
            temperature: s.temperature,
            accel_captured_at_ns: s.accel_captured_at_ns,
            gyro_captured_at_ns: s.gyro_captured_at_ns,
            accel_sample_count: s.accel_sample_count,
            gyro_sample_count: s.gyro_sample_count,
        };

        // A stale reading must never be sent twice.
        s.accel = [0.0; 3];
        s.magn = [0.0; 3];
        s.gyro = [0.0; 3];
        s.temperature = 0.0;
        s.accel_captured_at_ns = 0;
        s.gyro_captured_at_ns = 0;
        s.accel_sample_count = 0;
        s.gyro_sample_count = 0;

        Ok(snapshot)
    }

    /// Copy the current fields without clearing them. Diagnostic use only;
    /// the transmit path must go through
    /// [`snapshot_and_clear`](Self::snapshot_and_clear).
    pub async fn peek(&self) -> Result<SensorSnapshot, RecordError> {
        let s = self.acquire().await?;
        Ok(SensorSnapshot {
            accel: s.accel,
            magn: s.magn,
            gyro: s.gyro,
            temperature: s.temperature,
            accel_captured_at_ns: s.accel_captured_at_ns,
            gyro_captured_at_ns: s.gyro_captured_at_ns,
            accel_sample_count: s.accel_sample_count,
            gyro_sample_count: s.gyro_sample_count,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Suspend until `ready` is true or `timeout` elapses.
    ///
    /// Waiters park on the readiness signal rather than polling the flag; the
    /// overall deadline matches the original poll-loop timeout semantics.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), RecordError> {
        let mut rx = self.ready_tx.subscribe();
        let wait = async {
            while !*rx.borrow_and_update() {
                // The sender half lives inside `self`, so `changed()` cannot
                // observe a closed channel while this borrow is alive.
                if rx.changed().await.is_err() {
                    break;
                }
            }
        };
        match time::timeout(timeout, wait).await {
            Ok(()) => Ok(()),
            Err(_elapsed) => Err(RecordError::ReadyTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Current `running` flag, read under lock. Returns `false` when the lock
    /// cannot be acquired; callers treat that conservatively.
    pub async fn is_valid(&self) -> bool {
        match self.acquire().await {
            Ok(s) => s.running,
            Err(_) => false,
        }
    }

    /// Cooperative shutdown: clear `running` so every loop exits on its next
    /// check.
    pub async fn shutdown(&self) {
        let mut s = self.state.lock().await;
        if s.running {
            s.running = false;
            info!("sensor record shut down");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
