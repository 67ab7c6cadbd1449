//! Integration tests for framing and compression properties.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rtype_protocol::{
    check_payload_size, payload_layout, validate_packet, CompressionConfig, CompressionStats,
    PacketHeader, PacketType, PayloadLayout, ProtocolEncoder, ProtocolError, MAX_PACKET_SIZE,
    MAX_PAYLOAD_SIZE,
};

fn encoder() -> ProtocolEncoder {
    ProtocolEncoder::new(CompressionConfig::default(), Arc::new(CompressionStats::new()))
}

fn payload_for(ty: PacketType, rng: &mut StdRng) -> Vec<u8> {
    let len = match payload_layout(ty) {
        PayloadLayout::Fixed(size) => size,
        PayloadLayout::Counted { header, .. } => header,
    };
    let mut bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
    // Zero any count field so the body is a valid empty list.
    if let PayloadLayout::Counted { count_offset, count_width, .. } = payload_layout(ty) {
        for b in &mut bytes[count_offset..count_offset + count_width] {
            *b = 0;
        }
    }
    bytes
}

#[test]
fn test_every_type_frames_and_unframes() {
    let enc = encoder();
    let mut rng = StdRng::seed_from_u64(1);
    for (seq, &ty) in PacketType::ALL.iter().enumerate() {
        let payload = payload_for(ty, &mut rng);
        let seq = u32::try_from(seq).unwrap();
        let bytes = enc.encode_packet(ty, &payload, seq).unwrap();
        assert!(validate_packet(&bytes), "{ty:?}");

        let decoded = enc.decode_packet(&bytes).unwrap();
        assert_eq!(decoded.packet_type, ty);
        assert_eq!(decoded.header.sequence_number, seq);
        assert_eq!(decoded.payload, payload);
        assert!(check_payload_size(ty, &decoded.payload).is_ok(), "{ty:?}");
    }
}

#[test]
fn test_no_packet_exceeds_limit() {
    let enc = encoder();
    let mut rng = StdRng::seed_from_u64(2);
    for _ in 0..200 {
        let len = rng.gen_range(0..=MAX_PAYLOAD_SIZE);
        let fill = rng.gen_range(0..4u8);
        let payload: Vec<u8> = (0..len)
            .map(|_| if fill == 0 { rng.gen() } else { rng.gen_range(0..fill) })
            .collect();
        let bytes = enc.encode_packet(PacketType::Snapshot, &payload, 0).unwrap();
        assert!(bytes.len() <= MAX_PACKET_SIZE);
        assert_eq!(enc.decode_packet(&bytes).unwrap().payload, payload);
    }
}

#[test]
fn test_compression_never_enlarges() {
    let enc = encoder();
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..100 {
        let len = rng.gen_range(128..=MAX_PAYLOAD_SIZE);
        let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let bytes = enc.encode_packet(PacketType::RoomList, &payload, 0).unwrap();
        let header = PacketHeader::decode(&bytes).unwrap();
        if header.is_compressed() {
            assert!(usize::from(header.payload_length) * 10 <= len * 9);
        } else {
            assert_eq!(usize::from(header.payload_length), len);
        }
    }
    let stats = enc.stats().snapshot();
    assert!(stats.bytes_after <= stats.bytes_before);
}

#[test]
fn test_random_bytes_never_panic() {
    let enc = encoder();
    let mut rng = StdRng::seed_from_u64(4);
    for _ in 0..2000 {
        let len = rng.gen_range(0..64);
        let mut bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        if let Some(first) = bytes.first_mut() {
            *first = 0x01;
        }
        let _ = validate_packet(&bytes);
        let _ = enc.decode_packet(&bytes);
    }
}

#[test]
fn test_truncated_packet_rejected() {
    let enc = encoder();
    let bytes = enc.encode_packet(PacketType::Pong, &[0u8; 8], 9).unwrap();
    for cut in 0..bytes.len() {
        assert!(!validate_packet(&bytes[..cut]), "cut at {cut}");
        assert!(matches!(enc.decode_packet(&bytes[..cut]), Err(ProtocolError::Frame(_))));
    }
}
