/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Frame transport seam.
//!
//! The sender only needs two capabilities from the network layer: "send these
//! bytes to the stream destination, optionally at a stream-class priority" and
//! "non-blocking receive, return immediately when nothing is pending". The
//! latter exists because gPTP places the interface in promiscuous mode, so the
//! node's own multicast frames loop back into its receive queue and must be
//! drained before they exhaust receive buffers.
//!
//! [`PacketSocket`] is the deployed implementation (Linux AF_PACKET);
//! [`ChannelTransport`] backs tests and demo mode.

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::PacketSocket;

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::shaper::StreamClass;

// ── Wire constants ────────────────────────────────────────────────────────────

/// EtherType of AVTP frames.
pub const AVTP_ETHERTYPE: u16 = 0x22F0;

/// Multicast destination MAC of the telemetry stream.
pub const STREAM_DEST_MAC: [u8; 6] = [0x01, 0x00, 0x5E, 0x01, 0x11, 0x42];

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Raw-frame transport to the stream destination.
pub trait FrameTransport: Send + Sync {
    /// Transmit one frame. `class` selects the prioritised (VLAN-tagged) path;
    /// `None` transmits best-effort. Returns the number of bytes handed to
    /// the link.
    fn send(&self, frame: &[u8], class: Option<StreamClass>) -> io::Result<usize>;

    /// Non-blocking receive into `buf`. `Ok(None)` when nothing is pending.
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

/// Drain every pending inbound frame. Returns the number of frames discarded.
pub fn drain_rx(transport: &dyn FrameTransport) -> usize {
    let mut buf = [0u8; 1500];
    let mut drained = 0;
    while let Ok(Some(_len)) = transport.try_recv(&mut buf) {
        drained += 1;
    }
    drained
}

// ── In-memory transport ───────────────────────────────────────────────────────

/// Channel-backed transport for tests and demo mode.
///
/// Records every sent frame together with the class it was sent at. With
/// loopback enabled, each sent frame is also queued on the receive side,
/// mimicking the promiscuous-mode echo the drain step exists for.
#[derive(Debug, Default)]
pub struct ChannelTransport {
    sent: Mutex<Vec<(Vec<u8>, Option<StreamClass>)>>,
    rx_queue: Mutex<VecDeque<Vec<u8>>>,
    loopback: bool,
    fail_sends: AtomicBool,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that echoes every transmitted frame into its own receive
    /// queue.
    pub fn with_loopback() -> Self {
        Self {
            loopback: true,
            ..Self::default()
        }
    }

    /// Make subsequent `send` calls fail (simulates a dead prioritised path).
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Frames sent so far, with the class each was sent at.
    pub fn sent_frames(&self) -> Vec<(Vec<u8>, Option<StreamClass>)> {
        self.sent.lock().unwrap().clone()
    }

    /// Queue a frame on the receive side (test hook for inbound noise).
    pub fn inject_rx(&self, frame: Vec<u8>) {
        self.rx_queue.lock().unwrap().push_back(frame);
    }

    /// Frames currently pending on the receive side.
    pub fn rx_pending(&self) -> usize {
        self.rx_queue.lock().unwrap().len()
    }
}

impl FrameTransport for ChannelTransport {
    fn send(&self, frame: &[u8], class: Option<StreamClass>) -> io::Result<usize> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated link failure"));
        }
        self.sent.lock().unwrap().push((frame.to_vec(), class));
        if self.loopback {
            self.rx_queue.lock().unwrap().push_back(frame.to_vec());
        }
        Ok(frame.len())
    }

    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.rx_queue.lock().unwrap().pop_front() {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(Some(len))
            }
            None => Ok(None),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_transport_records_frames_and_class() {
        let t = ChannelTransport::new();
        t.send(&[1, 2, 3], Some(StreamClass::A)).unwrap();
        t.send(&[4, 5], None).unwrap();

        let sent = t.sent_frames();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], (vec![1, 2, 3], Some(StreamClass::A)));
        assert_eq!(sent[1], (vec![4, 5], None));
    }

    #[test]
    fn loopback_echoes_sent_frames_into_rx() {
        let t = ChannelTransport::with_loopback();
        t.send(&[9; 64], Some(StreamClass::B)).unwrap();
        assert_eq!(t.rx_pending(), 1);

        let mut buf = [0u8; 1500];
        assert_eq!(t.try_recv(&mut buf).unwrap(), Some(64));
        assert_eq!(t.try_recv(&mut buf).unwrap(), None);
    }

    #[test]
    fn drain_rx_empties_the_queue() {
        let t = ChannelTransport::new();
        for _ in 0..5 {
            t.inject_rx(vec![0u8; 100]);
        }
        assert_eq!(drain_rx(&t), 5);
        assert_eq!(t.rx_pending(), 0);
        assert_eq!(drain_rx(&t), 0, "drain on an empty queue returns at once");
    }

    #[test]
    fn failing_transport_reports_errors() {
        let t = ChannelTransport::new();
        t.set_fail_sends(true);
        assert!(t.send(&[0], Some(StreamClass::A)).is_err());

        t.set_fail_sends(false);
        assert!(t.send(&[0], Some(StreamClass::A)).is_ok());
    }
}
