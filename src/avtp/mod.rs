/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! AVTP stream PDU assembly and the SensorSet wire codec.
//!
//! The wire frame is an IEEE 1722 stream header followed by the packed
//! [`SensorSet`] record:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────┐
//! │ AVTP stream header   │ SensorSet payload            │
//! │ 24 bytes             │ 104 bytes                    │
//! └──────────────────────┴──────────────────────────────┘
//! ```
//!
//! Serialisation is explicit and field-by-field, big-endian, independent of
//! in-memory layout or alignment. The payload size is load-bearing: the
//! shaper's `idleSlope` is derived from it, so [`SensorSet::LEN`] must not
//! change without reconfiguring the shaper (`ShaperParams::configure` is the
//! only constructor precisely for this reason).

use thiserror::Error;

use crate::record::SensorSnapshot;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Stream id carried by every PDU of this (single-stream) node.
pub const STREAM_ID: u64 = 42;

/// AVTP subtype for a generic stream PDU.
pub const AVTP_SUBTYPE_STREAM: u8 = 0x02;

/// Micro-units per physical unit in the payload encoding.
const MICRO: f64 = 1_000_000.0;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("buffer too short: need {need} bytes, got {got}")]
    ShortBuffer { need: usize, got: usize },

    #[error("unexpected AVTP subtype 0x{0:02x}")]
    BadSubtype(u8),
}

// ── SensorSet payload ─────────────────────────────────────────────────────────

/// The packed sensor payload. All physical values are signed 64-bit
/// micro-units (value × 10⁶), all timestamps are nanoseconds on the shared
/// network clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorSet {
    pub magn_micro: [i64; 3],
    pub gyro_micro: [i64; 3],
    pub accel_micro: [i64; 3],
    pub temp_micro: i64,
    /// Capture timestamp of the gyroscope group.
    pub gyro_ts_ns: u64,
    /// Capture timestamp of the IMU group.
    pub accel_ts_ns: u64,
    /// Stamped immediately before transmission.
    pub sent_at_ns: u64,
}

impl SensorSet {
    /// Encoded size: ten micro-unit fields + three timestamps, packed.
    pub const LEN: usize = 13 * 8;

    /// Convert a snapshot's physical values to micro-units. `sent_at_ns` is
    /// left at zero; the assembler stamps it just before transmit.
    pub fn from_snapshot(snapshot: &SensorSnapshot) -> Self {
        Self {
            magn_micro: snapshot.magn.map(to_micro),
            gyro_micro: snapshot.gyro.map(to_micro),
            accel_micro: snapshot.accel.map(to_micro),
            temp_micro: to_micro(snapshot.temperature),
            gyro_ts_ns: snapshot.gyro_captured_at_ns,
            accel_ts_ns: snapshot.accel_captured_at_ns,
            sent_at_ns: 0,
        }
    }

    /// Serialise into `buf` (big-endian, no padding). Field order is part of
    /// the wire contract: magn, gyro, accel, temp, gyro_ts, accel_ts, sent_at.
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), WireError> {
        if buf.len() < Self::LEN {
            return Err(WireError::ShortBuffer {
                need: Self::LEN,
                got: buf.len(),
            });
        }

        for (i, v) in self.field_order().into_iter().enumerate() {
            buf[i * 8..(i + 1) * 8].copy_from_slice(&v.to_be_bytes());
        }
        Ok(())
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < Self::LEN {
            return Err(WireError::ShortBuffer {
                need: Self::LEN,
                got: buf.len(),
            });
        }

        let mut fields = [0i64; 13];
        for (i, v) in fields.iter_mut().enumerate() {
            *v = i64::from_be_bytes(buf[i * 8..(i + 1) * 8].try_into().unwrap());
        }

        Ok(Self {
            magn_micro: [fields[0], fields[1], fields[2]],
            gyro_micro: [fields[3], fields[4], fields[5]],
            accel_micro: [fields[6], fields[7], fields[8]],
            temp_micro: fields[9],
            gyro_ts_ns: fields[10] as u64,
            accel_ts_ns: fields[11] as u64,
            sent_at_ns: fields[12] as u64,
        })
    }

    /// The wire field order, flattened. Shared by encode and the length
    /// constant ([`Self::LEN`] = 13 × 8).
    fn field_order(&self) -> [i64; 13] {
        [
            self.magn_micro[0],
            self.magn_micro[1],
            self.magn_micro[2],
            self.gyro_micro[0],
            self.gyro_micro[1],
            self.gyro_micro[2],
            self.accel_micro[0],
            self.accel_micro[1],
            self.accel_micro[2],
            self.temp_micro,
            self.gyro_ts_ns as i64,
            self.accel_ts_ns as i64,
            self.sent_at_ns as i64,
        ]
    }
}

/// Physical value → micro-units.
pub fn to_micro(v: f64) -> i64 {
    (v * MICRO).round() as i64
}

/// Micro-units → physical value.
pub fn from_micro(v: i64) -> f64 {
    v as f64 / MICRO
}

// ── AVTP stream header ────────────────────────────────────────────────────────

/// IEEE 1722 stream header (24 bytes).
///
/// Layout, all multi-byte fields big-endian:
///
/// ```text
/// 0        subtype
/// 1        sv | version(3) | mr | r | gv | tv
/// 2        sequence_num
/// 3        reserved | tu
/// 4..12    stream_id
/// 12..16   avtp_timestamp (truncated 32-bit gPTP time)
/// 16..20   format specific (0)
/// 20..22   stream_data_length
/// 22..24   format specific (0)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvtpStreamHeader {
    pub sequence_num: u8,
    pub stream_id: u64,
    /// tv bit: the `avtp_timestamp` field carries a valid time.
    pub timestamp_valid: bool,
    pub avtp_timestamp: u32,
    pub stream_data_length: u16,
}

impl AvtpStreamHeader {
    pub const LEN: usize = 24;

    /// The sv (stream-id valid) bit, always set on stream PDUs we emit.
    const SV_BIT: u8 = 0x80;
    const TV_BIT: u8 = 0x01;

    pub fn encode(&self, buf: &mut [u8]) -> Result<(), WireError> {
        if buf.len() < Self::LEN {
            return Err(WireError::ShortBuffer {
                need: Self::LEN,
                got: buf.len(),
            });
        }

        buf[..Self::LEN].fill(0);
        buf[0] = AVTP_SUBTYPE_STREAM;
        buf[1] = Self::SV_BIT | if self.timestamp_valid { Self::TV_BIT } else { 0 };
        buf[2] = self.sequence_num;
        buf[4..12].copy_from_slice(&self.stream_id.to_be_bytes());
        buf[12..16].copy_from_slice(&self.avtp_timestamp.to_be_bytes());
        buf[20..22].copy_from_slice(&self.stream_data_length.to_be_bytes());
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < Self::LEN {
            return Err(WireError::ShortBuffer {
                need: Self::LEN,
                got: buf.len(),
            });
        }
        if buf[0] != AVTP_SUBTYPE_STREAM {
            return Err(WireError::BadSubtype(buf[0]));
        }

        Ok(Self {
            sequence_num: buf[2],
            stream_id: u64::from_be_bytes(buf[4..12].try_into().unwrap()),
            timestamp_valid: buf[1] & Self::TV_BIT != 0,
            avtp_timestamp: u32::from_be_bytes(buf[12..16].try_into().unwrap()),
            stream_data_length: u16::from_be_bytes(buf[20..22].try_into().unwrap()),
        })
    }
}

// ── PduAssembler ──────────────────────────────────────────────────────────────

/// Total PDU size on the wire (before link-layer framing).
pub const PDU_LEN: usize = AvtpStreamHeader::LEN + SensorSet::LEN;

/// Pure transformation: snapshot + clock reading + sequence counter → wire
/// frame. Holds the per-stream sequence number, wrapping at the wire field's
/// 8-bit width.
#[derive(Debug)]
pub struct PduAssembler {
    stream_id: u64,
    sequence_num: u8,
}

impl PduAssembler {
    pub fn new(stream_id: u64) -> Self {
        Self {
            stream_id,
            sequence_num: 0,
        }
    }

    /// Build one complete PDU. `now_ns` is the shared-clock reading taken
    /// immediately before transmission; it becomes both the payload's
    /// `sent_at_ns` and, truncated to 32 bits, the header timestamp.
    pub fn assemble(&mut self, snapshot: &SensorSnapshot, now_ns: u64) -> [u8; PDU_LEN] {
        let mut set = SensorSet::from_snapshot(snapshot);
        set.sent_at_ns = now_ns;

        let header = AvtpStreamHeader {
            sequence_num: self.sequence_num,
            stream_id: self.stream_id,
            timestamp_valid: true,
            avtp_timestamp: (now_ns & 0xffff_ffff) as u32,
            stream_data_length: SensorSet::LEN as u16,
        };
        self.sequence_num = self.sequence_num.wrapping_add(1);

        let mut frame = [0u8; PDU_LEN];
        // Infallible: the buffer is sized by the same constants.
        header.encode(&mut frame[..AvtpStreamHeader::LEN]).unwrap();
        set.encode(&mut frame[AvtpStreamHeader::LEN..]).unwrap();
        frame
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SensorSnapshot {
        SensorSnapshot {
            accel: [0.15, -9.81, 0.000001],
            magn: [0.25, -0.125, 0.5],
            gyro: [1.5, -2.25, 0.75],
            temperature: 23.4375,
            accel_captured_at_ns: 111_222_333_444,
            gyro_captured_at_ns: 111_222_000_000,
            accel_sample_count: 4,
            gyro_sample_count: 3,
        }
    }

    #[test]
    fn payload_is_exactly_104_bytes() {
        assert_eq!(SensorSet::LEN, 104);
        assert_eq!(PDU_LEN, 128);
    }

    #[test]
    fn micro_unit_round_trip_within_quantisation_error() {
        for v in [0.0, 1.0, -9.81, 0.1234567, -273.15, 1e3] {
            let back = from_micro(to_micro(v));
            assert!(
                (back - v).abs() <= 0.5e-6,
                "round-trip of {v} drifted to {back}"
            );
        }
    }

    #[test]
    fn sensor_set_encode_decode_round_trip() {
        let mut set = SensorSet::from_snapshot(&snapshot());
        set.sent_at_ns = 999_888_777;

        let mut buf = [0u8; SensorSet::LEN];
        set.encode(&mut buf).unwrap();
        assert_eq!(SensorSet::decode(&buf).unwrap(), set);
    }

    #[test]
    fn sensor_set_fields_are_big_endian_in_declared_order() {
        let set = SensorSet {
            magn_micro: [1, 2, 3],
            gyro_micro: [4, 5, 6],
            accel_micro: [7, 8, 9],
            temp_micro: 10,
            gyro_ts_ns: 11,
            accel_ts_ns: 12,
            sent_at_ns: 13,
        };
        let mut buf = [0u8; SensorSet::LEN];
        set.encode(&mut buf).unwrap();

        // First field, last byte: magn[0] == 1 big-endian.
        assert_eq!(&buf[..8], &1i64.to_be_bytes());
        // Last field: sent_at_ns == 13.
        assert_eq!(&buf[96..104], &13i64.to_be_bytes());
    }

    #[test]
    fn short_buffers_are_rejected() {
        let set = SensorSet::default();
        let mut small = [0u8; 16];
        assert_eq!(
            set.encode(&mut small).unwrap_err(),
            WireError::ShortBuffer { need: 104, got: 16 }
        );
        assert!(SensorSet::decode(&small).is_err());
        assert!(AvtpStreamHeader::decode(&small).is_err());
    }

    #[test]
    fn header_round_trip() {
        let header = AvtpStreamHeader {
            sequence_num: 0xAB,
            stream_id: STREAM_ID,
            timestamp_valid: true,
            avtp_timestamp: 0xDEAD_BEEF,
            stream_data_length: SensorSet::LEN as u16,
        };
        let mut buf = [0u8; AvtpStreamHeader::LEN];
        header.encode(&mut buf).unwrap();

        assert_eq!(buf[0], AVTP_SUBTYPE_STREAM);
        assert_eq!(AvtpStreamHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn header_decode_rejects_foreign_subtype() {
        let mut buf = [0u8; AvtpStreamHeader::LEN];
        buf[0] = 0x7F;
        assert_eq!(
            AvtpStreamHeader::decode(&buf).unwrap_err(),
            WireError::BadSubtype(0x7F)
        );
    }

    #[test]
    fn assembler_produces_full_pdu_with_truncated_timestamp() {
        let mut assembler = PduAssembler::new(STREAM_ID);
        let now_ns = 0x0000_0012_3456_789A_u64;

        let frame = assembler.assemble(&snapshot(), now_ns);
        let header = AvtpStreamHeader::decode(&frame[..AvtpStreamHeader::LEN]).unwrap();
        let set = SensorSet::decode(&frame[AvtpStreamHeader::LEN..]).unwrap();

        assert_eq!(header.stream_id, STREAM_ID);
        assert_eq!(header.sequence_num, 0);
        assert!(header.timestamp_valid);
        assert_eq!(header.avtp_timestamp, 0x3456_789A);
        assert_eq!(header.stream_data_length, 104);

        assert_eq!(set.sent_at_ns, now_ns, "payload keeps the full 64 bits");
        assert_eq!(set.accel_ts_ns, 111_222_333_444);
        assert_eq!(set.gyro_ts_ns, 111_222_000_000);
    }

    #[test]
    fn sequence_number_increments_and_wraps() {
        let mut assembler = PduAssembler::new(STREAM_ID);
        let snap = snapshot();

        for expected in 0..=255u16 {
            let frame = assembler.assemble(&snap, 0);
            assert_eq!(frame[2], expected as u8);
        }
        let frame = assembler.assemble(&snap, 0);
        assert_eq!(frame[2], 0, "8-bit sequence wraps to zero");
    }

    #[test]
    fn micro_conversion_matches_snapshot_values() {
        let set = SensorSet::from_snapshot(&snapshot());
        assert_eq!(set.accel_micro[0], 150_000);
        assert_eq!(set.accel_micro[1], -9_810_000);
        assert_eq!(set.accel_micro[2], 1);
        assert_eq!(set.temp_micro, 23_437_500);
    }
}
