use crate::proto::{
    DecodeError, Flags, HEADER_LEN, MAX_DATA, MAX_SEGMENT_LEN, Malformed, Segment,
};

fn sample() -> Segment {
    Segment::control(0x1234, 123, 0xDEAD_BEEF, 0x0102_0304, Flags::ACK | Flags::FIN, 0xABCD)
        .with_payload(b"hello")
}

#[test]
fn header_layout_is_big_endian_at_fixed_offsets() {
    let enc = sample().encode();
    let b = enc.as_bytes();
    assert_eq!(b.len(), HEADER_LEN + 5);
    assert_eq!(&b[0..2], &[0x12, 0x34]);
    assert_eq!(&b[2..4], &[0x00, 123]);
    assert_eq!(&b[4..8], &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(&b[8..12], &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(b[12], 2 | 4);
    assert_eq!(&b[13..15], &[0xAB, 0xCD]);
    assert_eq!(b[15], 5);
    assert_eq!(&b[16..], b"hello");
}

#[test]
fn decode_inverts_encode_for_every_flag_combination_and_length() {
    for bits in 0..8u8 {
        for len in [0usize, 1, 17, MAX_DATA] {
            let data: Vec<u8> = (0..len as u8).collect();
            let seg = Segment::control(7, 9, u32::MAX - 3, 42, Flags::from_bits_truncate(bits), 128)
                .with_payload(&data);
            let back = Segment::decode(seg.encode().as_bytes()).expect("decode");
            assert_eq!(back, seg, "flags={bits} len={len}");
            assert_eq!(back.payload(), &data[..]);
        }
    }
}

#[test]
fn trailing_padding_is_ignored() {
    let enc = sample().encode();
    let mut padded = enc.as_bytes().to_vec();
    padded.resize(MAX_SEGMENT_LEN, 0xEE);
    assert_eq!(Segment::decode(&padded).expect("decode"), sample());
}

#[test]
fn unknown_flag_bits_are_masked_off() {
    let mut raw = sample().encode().as_bytes().to_vec();
    raw[12] = 0xF8 | 1;
    let seg = Segment::decode(&raw).expect("decode");
    assert_eq!(seg.flags, Flags::SYN);
}

#[test]
fn malformed_buffers_are_rejected() {
    assert_eq!(
        Segment::decode(&[0u8; 15]),
        Err(DecodeError::MalformedSegment(Malformed::ShortHeader { len: 15 }))
    );

    let mut raw = sample().encode().as_bytes().to_vec();
    raw.truncate(HEADER_LEN + 3);
    assert_eq!(
        Segment::decode(&raw),
        Err(DecodeError::MalformedSegment(Malformed::Truncated {
            declared: 5,
            available: 3
        }))
    );

    let mut raw = vec![0u8; MAX_SEGMENT_LEN + 8];
    raw[15] = (MAX_DATA + 1) as u8;
    assert_eq!(
        Segment::decode(&raw),
        Err(DecodeError::MalformedSegment(Malformed::OverCapacity {
            declared: MAX_DATA + 1
        }))
    );
}

#[test]
fn syn_and_fin_each_consume_one_sequence_number() {
    let syn = Segment::control(1, 2, 100, 0, Flags::SYN, 0);
    assert_eq!(syn.seq_len(), 1);
    let data_fin = Segment::control(1, 2, 100, 0, Flags::ACK | Flags::FIN, 0).with_payload(&[1, 2, 3]);
    assert_eq!(data_fin.seq_len(), 4);
    assert_eq!(Segment::control(1, 2, 100, 0, Flags::ACK, 0).seq_len(), 0);
    assert_eq!((Flags::SYN | Flags::ACK).to_string(), "SYN|ACK");
    assert_eq!(Flags::NONE.to_string(), "-");
}
