//! Unit tests for the varint frame codec.

use bytes::{BufMut, Bytes, BytesMut};
use rstest::rstest;
use tokio_util::codec::{Decoder, Encoder};

use super::*;

fn encoded(payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    VarIntFrameCodec::default()
        .encode(Bytes::copy_from_slice(payload), &mut buf)
        .expect("encode should succeed");
    buf
}

#[test]
fn max_frame_length_is_21_bits() {
    assert_eq!(MAX_FRAME_LENGTH, 2_097_151);
}

#[rstest]
#[case::empty(0, 1)]
#[case::one_byte_header(127, 1)]
#[case::two_byte_header(128, 2)]
#[case::three_byte_header(16_384, 3)]
fn header_width_follows_payload_length(#[case] len: usize, #[case] header: usize) {
    let buf = encoded(&vec![7u8; len]);
    assert_eq!(buf.len(), len + header);
}

#[test]
fn partial_header_is_not_consumed() {
    let mut codec = VarIntFrameCodec::default();
    let mut buf = BytesMut::from(&[0x80u8][..]);
    assert!(codec.decode(&mut buf).expect("decode").is_none());
    assert_eq!(&buf[..], &[0x80]);
}

#[test]
fn waits_for_full_payload() {
    let mut codec = VarIntFrameCodec::default();
    let mut buf = encoded(b"abcdef");
    let mut partial = buf.split_to(4);
    assert!(codec.decode(&mut partial).expect("decode").is_none());
    assert_eq!(partial.len(), 4);
    partial.unsplit(buf);
    let frame = codec.decode(&mut partial).expect("decode").expect("frame");
    assert_eq!(&frame[..], b"abcdef");
    assert!(partial.is_empty());
}

#[test]
fn decodes_back_to_back_frames() {
    let mut codec = VarIntFrameCodec::default();
    let mut buf = encoded(b"one");
    buf.unsplit(encoded(b""));
    buf.unsplit(encoded(b"three"));
    let frames: Vec<Bytes> = std::iter::from_fn(|| codec.decode(&mut buf).expect("decode"))
        .collect();
    assert_eq!(frames, vec![
        Bytes::from_static(b"one"),
        Bytes::new(),
        Bytes::from_static(b"three"),
    ]);
}

#[rstest]
#[case::four_byte_header(&[0x80, 0x80, 0x80, 0x01])]
#[case::continuation_on_third(&[0xff, 0xff, 0xff])]
fn rejects_wide_headers(#[case] header: &[u8]) {
    let mut codec = VarIntFrameCodec::default();
    let mut buf = BytesMut::from(header);
    let err = codec.decode(&mut buf).expect_err("header must be rejected");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::CorruptedFrame { header_len: 3 })
    ));
}

#[test]
fn accepts_largest_three_byte_length() {
    let mut codec = VarIntFrameCodec::default();
    let mut buf = BytesMut::with_capacity(MAX_FRAME_LENGTH + 3);
    buf.put_slice(&[0xff, 0xff, 0x7f]);
    buf.put_bytes(0xaa, MAX_FRAME_LENGTH);
    let frame = codec.decode(&mut buf).expect("decode").expect("frame");
    assert_eq!(frame.len(), MAX_FRAME_LENGTH);
}

#[test]
fn copying_codec_yields_identical_frames() {
    let mut codec = VarIntFrameCodec::new(false);
    let mut buf = encoded(b"copied");
    let frame = codec.decode(&mut buf).expect("decode").expect("frame");
    assert_eq!(&frame[..], b"copied");
    assert!(buf.is_empty());
}

#[test]
fn encoder_permits_frames_above_decode_ceiling() {
    let buf = encoded(&vec![0u8; MAX_FRAME_LENGTH + 1]);
    assert_eq!(buf.len(), MAX_FRAME_LENGTH + 1 + 4);
}

#[test]
fn eof_at_boundary_is_clean() {
    let mut codec = VarIntFrameCodec::default();
    let mut buf = BytesMut::new();
    assert!(codec.decode_eof(&mut buf).expect("clean eof").is_none());
}

#[rstest]
#[case::mid_header(&[0x80], EofError::MidHeader { bytes_received: 1 })]
#[case::mid_frame(&[0x05, b'a', b'b'], EofError::MidFrame { bytes_received: 2, expected: 5 })]
fn eof_inside_frame_is_reported(#[case] bytes: &[u8], #[case] expected: EofError) {
    let mut codec = VarIntFrameCodec::default();
    let mut buf = BytesMut::from(bytes);
    let err = codec.decode_eof(&mut buf).expect_err("truncated stream");
    assert!(matches!(err, CodecError::Eof(e) if e == expected));
}
