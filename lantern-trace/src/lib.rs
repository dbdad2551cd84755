// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! This crate decodes the binary trace stream produced by an instrumented
//! compiler pipeline.
//!
//! The stream is a concatenation of records, each describing one traced
//! event: a memory access (load or store) performed by a named Func, or a
//! scope marker (begin/end of a pipeline, realization, production or
//! consumption). A record carries a 48-byte header followed by a payload of
//! packed SIMD lane values and signed 32-bit integer arguments (the access
//! coordinates). Decoded packets occupy a fixed 4096-byte buffer, the
//! largest record the format permits.
//!
//! All multi-byte fields are in the byte order of the producing machine; the
//! stream is consumed on the host that wrote it and is deliberately not
//! portable across hosts.

// Enable warnings for missing documentation
#![warn(missing_docs)]

use std::fmt;
use std::io;

pub mod packet;
pub mod test_helpers;

pub use packet::{EventCode, Packet, Value};

/// Errors raised while pulling packets off a trace stream.
///
/// These are framing-level faults: the stream is structurally damaged and
/// the current packet cannot be used. Data-level anomalies (an
/// unrepresentable value type, say) are handled permissively by the
/// [`Packet`] accessors instead.
#[derive(Debug)]
pub enum TraceError {
    /// The stream ended partway through a packet header.
    TruncatedHeader(usize),

    /// The stream ended partway through a packet payload.
    TruncatedPayload {
        /// Payload bytes the header promised.
        expected: usize,
        /// Payload bytes actually present.
        got: usize,
    },

    /// The header describes a payload larger than the packet's payload
    /// region.
    OversizedPayload(usize),

    /// The header carries a SIMD width of zero.
    ZeroWidth,

    /// The event code is not one of the known trace events.
    UnknownEvent(u8),

    /// The underlying reader failed.
    Io(io::Error),
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TraceError::TruncatedHeader(got) => {
                write!(f, "unexpected end of trace mid-header ({got} of {} bytes)", packet::HEADER_SIZE)
            }
            TraceError::TruncatedPayload { expected, got } => {
                write!(f, "unexpected end of trace mid-packet ({got} of {expected} payload bytes)")
            }
            TraceError::OversizedPayload(len) => {
                write!(f, "packet payload of {len} bytes exceeds the {} byte payload region", packet::PAYLOAD_SIZE)
            }
            TraceError::ZeroWidth => {
                write!(f, "packet carries a SIMD width of zero")
            }
            TraceError::UnknownEvent(code) => {
                write!(f, "unknown trace event code: {code}")
            }
            TraceError::Io(err) => {
                write!(f, "failed reading trace stream: {err}")
            }
        }
    }
}

impl std::error::Error for TraceError {}

impl From<io::Error> for TraceError {
    fn from(err: io::Error) -> Self {
        TraceError::Io(err)
    }
}
