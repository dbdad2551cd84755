// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A single trace packet and its typed payload accessors.

use std::borrow::Cow;
use std::io::{self, Read};

use log::warn;
use num_derive::{FromPrimitive, ToPrimitive};

use crate::TraceError;

/// In-memory size of one packet: the header plus the largest payload any
/// record can carry. Producers assume this bound when emitting records.
pub const PACKET_SIZE: usize = 4096;

/// The first bytes of a packet are header metadata.
pub const HEADER_SIZE: usize = 48;

/// Size of the null-padded Func name field inside the header.
pub const NAME_SIZE: usize = HEADER_SIZE - 14;

/// Size of the payload region following the header. Not all of it is used by
/// any given packet, but producers always emit whole records.
pub const PAYLOAD_SIZE: usize = PACKET_SIZE - HEADER_SIZE;

// The codec relies on one full read covering exactly one header, so the
// layout constants must tile the record exactly.
const _: () = assert!(HEADER_SIZE + PAYLOAD_SIZE == PACKET_SIZE);
const _: () = assert!(14 + NAME_SIZE == HEADER_SIZE);

/// The kinds of event a trace packet can describe.
#[derive(Copy, Clone, Debug, Eq, FromPrimitive, PartialEq, ToPrimitive)]
pub enum EventCode {
    /// A Func read one or more values.
    Load = 0,
    /// A Func wrote one or more values.
    Store = 1,
    /// A Func began a realization over a rectangular domain.
    BeginRealization = 2,
    /// A Func finished a realization.
    EndRealization = 3,
    /// A Func began producing values within a realization.
    Produce = 4,
    /// A Func began an update pass.
    Update = 5,
    /// A Func began consuming another Func's values.
    Consume = 6,
    /// A Func finished consuming.
    EndConsume = 7,
    /// A named pipeline began executing.
    BeginPipeline = 8,
    /// A named pipeline finished executing.
    EndPipeline = 9,
}

/// One payload lane widened from its wire representation.
///
/// The header's `(value_type, bits)` pair selects which fixed-width
/// interpretation applies to the packed value array; each lane widens
/// losslessly to `f64` for range tracking and display normalization.
#[derive(Copy, Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum Value {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl Value {
    /// Widen the lane to `f64`.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Value::I8(v) => v as f64,
            Value::I16(v) => v as f64,
            Value::I32(v) => v as f64,
            Value::I64(v) => v as f64,
            Value::U8(v) => v as f64,
            Value::U16(v) => v as f64,
            Value::U32(v) => v as f64,
            Value::U64(v) => v as f64,
            Value::F32(v) => v as f64,
            Value::F64(v) => v,
        }
    }
}

/// A single decoded trace packet.
///
/// The payload region is held inline so that one packet is a plain stack
/// value; nothing is allocated per packet.
pub struct Packet {
    /// Unique id of the entity this packet describes.
    pub id: u32,

    /// Id of the enclosing scope (realization, production or pipeline).
    pub parent: u32,

    /// Raw wire event code; decode with [`EventCode`]'s `FromPrimitive`.
    pub event: u8,

    /// Value interpretation: 0 = signed int, 1 = unsigned int, 2 = float.
    pub value_type: u8,

    /// Bit width of one lane value.
    pub bits: u8,

    /// Number of SIMD lanes covered by this packet; always at least one.
    pub width: u8,

    /// Reserved by the wire format; carried but unused.
    pub value_idx: u8,

    /// Number of signed 32-bit integer arguments following the values.
    pub num_int_args: u8,

    name: [u8; NAME_SIZE],
    payload: [u8; PAYLOAD_SIZE],
}

impl Packet {
    /// Pull the next packet off `reader`.
    ///
    /// Returns `Ok(None)` on a clean end of stream (zero bytes at a packet
    /// boundary). A packet cut short by the end of the stream, an impossible
    /// payload length and a zero lane count are all framing errors.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Packet>, TraceError> {
        let mut header = [0u8; HEADER_SIZE];
        let got = read_fully(reader, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_SIZE {
            return Err(TraceError::TruncatedHeader(got));
        }

        let mut packet = Packet {
            id: u32::from_ne_bytes([header[0], header[1], header[2], header[3]]),
            parent: u32::from_ne_bytes([header[4], header[5], header[6], header[7]]),
            event: header[8],
            value_type: header[9],
            bits: header[10],
            width: header[11],
            value_idx: header[12],
            num_int_args: header[13],
            name: [0; NAME_SIZE],
            payload: [0; PAYLOAD_SIZE],
        };
        packet.name.copy_from_slice(&header[14..HEADER_SIZE]);
        // Force null termination so the name is always recoverable.
        packet.name[NAME_SIZE - 1] = 0;

        if packet.width == 0 {
            return Err(TraceError::ZeroWidth);
        }
        let payload_bytes = packet.payload_bytes();
        if payload_bytes > PAYLOAD_SIZE {
            return Err(TraceError::OversizedPayload(payload_bytes));
        }

        let got = read_fully(reader, &mut packet.payload[..payload_bytes])?;
        if got < payload_bytes {
            return Err(TraceError::TruncatedPayload {
                expected: payload_bytes,
                got,
            });
        }

        Ok(Some(packet))
    }

    /// The Func name, up to its null terminator.
    #[must_use]
    pub fn name(&self) -> Cow<'_, str> {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
        String::from_utf8_lossy(&self.name[..end])
    }

    /// Bytes occupied by one lane value: the smallest power of two whose
    /// bit width covers `bits`.
    #[must_use]
    pub fn bytes_per_elem(&self) -> usize {
        let mut bytes = 1;
        while bytes * 8 < self.bits as usize {
            bytes <<= 1;
        }
        bytes
    }

    /// Bytes occupied by the packed value array.
    #[must_use]
    pub fn value_bytes(&self) -> usize {
        self.bytes_per_elem() * self.width as usize
    }

    /// Bytes occupied by the whole payload: values then integer arguments.
    #[must_use]
    pub fn payload_bytes(&self) -> usize {
        self.value_bytes() + 4 * self.num_int_args as usize
    }

    /// The `idx`-th signed integer argument.
    ///
    /// Arguments sit immediately after the value array. Indexes beyond the
    /// payload region read as zero.
    #[must_use]
    pub fn get_int_arg(&self, idx: usize) -> i32 {
        let offset = self.value_bytes() + 4 * idx;
        if offset + 4 > PAYLOAD_SIZE {
            return 0;
        }
        i32::from_ne_bytes([
            self.payload[offset],
            self.payload[offset + 1],
            self.payload[offset + 2],
            self.payload[offset + 3],
        ])
    }

    /// Decode the `lane`-th element of the value array, or `None` when the
    /// header's `(value_type, bits)` pair is not a representable
    /// combination.
    #[must_use]
    pub fn value(&self, lane: usize) -> Option<Value> {
        let bytes = self.bytes_per_elem();
        let offset = lane * bytes;
        if offset + bytes > PAYLOAD_SIZE {
            return None;
        }
        let at = &self.payload[offset..offset + bytes];
        match (self.value_type, self.bits) {
            (0, 8) => Some(Value::I8(at[0] as i8)),
            (0, 16) => Some(Value::I16(i16::from_ne_bytes([at[0], at[1]]))),
            (0, 32) => Some(Value::I32(i32::from_ne_bytes([at[0], at[1], at[2], at[3]]))),
            (0, 64) => Some(Value::I64(i64::from_ne_bytes([
                at[0], at[1], at[2], at[3], at[4], at[5], at[6], at[7],
            ]))),
            (1, 8) => Some(Value::U8(at[0])),
            (1, 16) => Some(Value::U16(u16::from_ne_bytes([at[0], at[1]]))),
            (1, 32) => Some(Value::U32(u32::from_ne_bytes([at[0], at[1], at[2], at[3]]))),
            (1, 64) => Some(Value::U64(u64::from_ne_bytes([
                at[0], at[1], at[2], at[3], at[4], at[5], at[6], at[7],
            ]))),
            (2, 32) => Some(Value::F32(f32::from_ne_bytes([at[0], at[1], at[2], at[3]]))),
            (2, 64) => Some(Value::F64(f64::from_ne_bytes([
                at[0], at[1], at[2], at[3], at[4], at[5], at[6], at[7],
            ]))),
            _ => None,
        }
    }

    /// Decode the `lane`-th value widened to `f64`.
    ///
    /// An unrepresentable `(value_type, bits)` combination is reported once
    /// per call and reads as 0.0; the stream itself remains usable.
    #[must_use]
    pub fn value_as_f64(&self, lane: usize) -> f64 {
        match self.value(lane) {
            Some(value) => value.as_f64(),
            None => {
                warn!(
                    "cannot interpret value with type {} and {} bits",
                    self.value_type, self.bits
                );
                0.0
            }
        }
    }
}

/// Read until `buf` is full or the stream ends; short reads are retried.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
