// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use lantern_trace::packet::HEADER_SIZE;
use lantern_trace::test_helpers::{PacketBuilder, stream};
use lantern_trace::{EventCode, Packet, TraceError};

#[test]
fn well_formed_stream_yields_every_packet_then_eof() {
    let packets: Vec<Vec<u8>> = (0..20)
        .map(|i| {
            PacketBuilder::new(EventCode::Store)
                .id(i)
                .name(&format!("func_{i}"))
                .value_u32(i)
                .int_args(&[i as i32, 2 * i as i32])
                .encode()
        })
        .collect();
    let bytes = stream(&packets);
    let mut reader = bytes.as_slice();

    for i in 0..20 {
        let packet = Packet::read_from(&mut reader).unwrap().unwrap();
        assert_eq!(packet.id, i);
        assert_eq!(packet.name(), format!("func_{i}"));
        assert_eq!(packet.value_as_f64(0), f64::from(i));
    }
    assert!(Packet::read_from(&mut reader).unwrap().is_none());

    // EOF is sticky: asking again keeps answering end-of-stream.
    assert!(Packet::read_from(&mut reader).unwrap().is_none());
}

#[test]
fn mixed_record_sizes_frame_correctly() {
    let packets = [
        PacketBuilder::new(EventCode::BeginPipeline).id(1).name("p").encode(),
        PacketBuilder::new(EventCode::Store)
            .id(2)
            .parent(1)
            .name("f")
            .value_u8(1)
            .value_u8(2)
            .value_u8(3)
            .value_u8(4)
            .int_args(&[0, 1, 2, 3])
            .encode(),
        PacketBuilder::new(EventCode::EndPipeline).id(1).name("p").encode(),
    ];
    let bytes = stream(&packets);
    let mut reader = bytes.as_slice();

    let mut seen = Vec::new();
    while let Some(packet) = Packet::read_from(&mut reader).unwrap() {
        seen.push(packet.event);
    }
    assert_eq!(seen, vec![8, 1, 9]);
}

#[test]
fn stream_cut_mid_packet_is_reported() {
    let bytes = PacketBuilder::new(EventCode::Store)
        .name("f")
        .value_u32(7)
        .int_args(&[1, 2, 3])
        .encode();

    // Cut after the header but before the payload completes.
    let mut reader = &bytes[..HEADER_SIZE + 5];
    assert!(matches!(
        Packet::read_from(&mut reader),
        Err(TraceError::TruncatedPayload { .. })
    ));
}
