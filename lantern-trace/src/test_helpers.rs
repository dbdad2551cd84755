// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! This module provides helpers for building wire-format trace packets.
//!
//! The aim of this module is to let tests describe a trace stream at the
//! level of events and values, then encode it into the exact byte layout a
//! producer would emit, so the decoder and everything above it can be
//! exercised without a captured trace file.

use num_traits::ToPrimitive;

use crate::packet::{EventCode, HEADER_SIZE, NAME_SIZE};

/// Builds one wire-format trace packet.
///
/// Lane values are appended with the `value_*` methods (each push adds one
/// SIMD lane and fixes the packet's value type); integer arguments follow
/// the values, as on the wire.
pub struct PacketBuilder {
    id: u32,
    parent: u32,
    event: u8,
    value_type: u8,
    bits: u8,
    width: u8,
    name: String,
    values: Vec<u8>,
    int_args: Vec<i32>,
}

macro_rules! value_push {
    ($fn_name:ident, $ty:ty, $type_code:expr, $bits:expr) => {
        /// Append one lane of this type to the value array.
        #[must_use]
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.value_type = $type_code;
            self.bits = $bits;
            self.width += 1;
            self.values.extend_from_slice(&value.to_ne_bytes());
            self
        }
    };
}

impl PacketBuilder {
    /// Start a packet describing the given event.
    #[must_use]
    pub fn new(event: EventCode) -> Self {
        Self {
            id: 0,
            parent: 0,
            event: event.to_u8().unwrap(),
            value_type: 1,
            bits: 32,
            width: 0,
            name: String::new(),
            values: Vec::new(),
            int_args: Vec::new(),
        }
    }

    /// Set the packet id.
    #[must_use]
    pub fn id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Set the enclosing scope id.
    #[must_use]
    pub fn parent(mut self, parent: u32) -> Self {
        self.parent = parent;
        self
    }

    /// Set the Func name. Names longer than the wire field are truncated on
    /// encode, exactly as a producer would.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = String::from(name);
        self
    }

    /// Overwrite the raw event byte, for exercising unknown codes.
    #[must_use]
    pub fn event_raw(mut self, event: u8) -> Self {
        self.event = event;
        self
    }

    /// Overwrite the `(value_type, bits)` header pair, for exercising
    /// combinations no producer emits.
    #[must_use]
    pub fn value_type_raw(mut self, value_type: u8, bits: u8) -> Self {
        self.value_type = value_type;
        self.bits = bits;
        self
    }

    value_push!(value_i8, i8, 0, 8);
    value_push!(value_i16, i16, 0, 16);
    value_push!(value_i32, i32, 0, 32);
    value_push!(value_i64, i64, 0, 64);
    value_push!(value_u8, u8, 1, 8);
    value_push!(value_u16, u16, 1, 16);
    value_push!(value_u32, u32, 1, 32);
    value_push!(value_u64, u64, 1, 64);
    value_push!(value_f32, f32, 2, 32);
    value_push!(value_f64, f64, 2, 64);

    /// Set the integer arguments (access coordinates, realization extents).
    #[must_use]
    pub fn int_args(mut self, args: &[i32]) -> Self {
        self.int_args = args.to_vec();
        self
    }

    /// Encode the packet into one wire record: the header followed by
    /// exactly the payload bytes the header describes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE + self.padded_value_bytes() + 4 * self.int_args.len()];
        bytes[0..4].copy_from_slice(&self.id.to_ne_bytes());
        bytes[4..8].copy_from_slice(&self.parent.to_ne_bytes());
        bytes[8] = self.event;
        bytes[9] = self.value_type;
        bytes[10] = self.bits;
        // Scope events carry no values; the wire still claims one lane.
        bytes[11] = self.width.max(1);
        bytes[12] = 0;
        bytes[13] = self.int_args.len() as u8;

        let name = self.name.as_bytes();
        let len = name.len().min(NAME_SIZE - 1);
        bytes[14..14 + len].copy_from_slice(&name[..len]);

        let mut at = HEADER_SIZE;
        bytes[at..at + self.values.len()].copy_from_slice(&self.values);
        at += self.padded_value_bytes();
        for arg in &self.int_args {
            bytes[at..at + 4].copy_from_slice(&arg.to_ne_bytes());
            at += 4;
        }

        bytes
    }

    /// Bytes the decoder will attribute to the value array, including the
    /// implicit lane of a valueless scope packet.
    fn padded_value_bytes(&self) -> usize {
        let mut bytes_per_elem = 1;
        while bytes_per_elem * 8 < self.bits as usize {
            bytes_per_elem <<= 1;
        }
        bytes_per_elem * self.width.max(1) as usize
    }
}

/// Concatenate encoded packets into one stream.
#[must_use]
pub fn stream(packets: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for packet in packets {
        bytes.extend_from_slice(packet);
    }
    bytes
}
