//! Frame decoding over arbitrarily split byte streams.

use bytes::Bytes;
use packetwire::codec::{CodecError, EofError, FramingError, MAX_FRAME_LENGTH};
use packetwire_testing::{decode_in_chunks, encode_frames};
use proptest::prelude::*;
use rstest::rstest;

proptest! {
    /// However the stream is split, the decoder yields the same frames.
    #[test]
    fn chunking_does_not_change_frames(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..400), 0..8),
        chunk in 1usize..32,
    ) {
        let payloads: Vec<Bytes> = payloads.into_iter().map(Bytes::from).collect();
        let wire = encode_frames(payloads.clone()).expect("encode frames");
        let frames = decode_in_chunks(&wire, chunk).expect("decode frames");
        prop_assert_eq!(frames, payloads);
    }
}

#[rstest]
#[case::one_byte(1)]
#[case::three_bytes(3)]
#[case::whole(usize::MAX)]
fn largest_frame_survives_any_split(#[case] chunk: usize) {
    let payload = Bytes::from(vec![0x5a; MAX_FRAME_LENGTH]);
    let wire = encode_frames([payload.clone()]).expect("encode frame");
    assert_eq!(wire.len(), MAX_FRAME_LENGTH + 3);

    let frames = decode_in_chunks(&wire, chunk.min(wire.len())).expect("decode frame");
    assert_eq!(frames, [payload]);
}

#[rstest]
#[case::one_byte(1)]
#[case::two_bytes(2)]
fn four_byte_header_is_corrupt(#[case] chunk: usize) {
    let wire = encode_frames([Bytes::from(vec![0; MAX_FRAME_LENGTH + 1])]).expect("encode frame");
    let err = decode_in_chunks(&wire, chunk).expect_err("header too wide");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::CorruptedFrame { header_len: 3 })
    ));
}

#[test]
fn truncated_stream_reports_progress() {
    let wire = encode_frames([Bytes::from_static(b"complete"), Bytes::from_static(b"partial")])
        .expect("encode frames");
    let cut = &wire[..wire.len() - 3];

    let err = decode_in_chunks(cut, 4).expect_err("stream ends mid-frame");
    assert!(matches!(
        err,
        CodecError::Eof(EofError::MidFrame {
            bytes_received: 4,
            expected: 7
        })
    ));
}
