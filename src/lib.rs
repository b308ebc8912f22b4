/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! AVB sensor node – credit-shaped AVTP telemetry over raw Ethernet.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/     – YAML stream configuration
//! ├── clock       – network-clock trait (gPTP seam) + monotonic fallback
//! ├── record/     – shared sensor record (lock, snapshot-and-clear, readiness)
//! ├── sensors/    – driver traits, producer tasks, simulated sources
//! ├── shaper/     – 802.1Qav credit-based shaper (params, account, refill)
//! ├── avtp/       – SensorSet wire codec + AVTP stream header + PDU assembly
//! ├── transport/  – frame transport trait, AF_PACKET socket, test transport
//! ├── sender      – the single consumer: credit → snapshot → transmit → drain
//! └── diag        – periodic diagnostic readout of the shared record
//! ```

pub mod avtp;
pub mod clock;
pub mod config;
pub mod diag;
pub mod error;
pub mod record;
pub mod sender;
pub mod sensors;
pub mod shaper;
pub mod transport;
