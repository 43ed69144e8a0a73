//! Property tests for the frame codec and masking key provider.

use std::collections::HashSet;

use bytes::BytesMut;
use hpx_ws_engine::{
    Frame, MaskKey, OpCode, Role,
    codec::{Decoded, Decoder, decode, encode},
    key::{FixedKeySource, MaskKeyProvider},
    mask::{apply_mask, mask},
};
use proptest::prelude::*;
use tokio_util::codec::Decoder as _;

const MAX: usize = 1 << 20;

fn arb_mask_key() -> impl Strategy<Value = MaskKey> {
    any::<[u8; 4]>()
}

fn arb_payload(max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max)
}

/// Any frame the codec can carry: every opcode, masked or not. Data frames
/// get payloads up to `max_len` bytes.
fn arb_frame_up_to(max_len: usize) -> impl Strategy<Value = Frame> {
    (
        0u8..=0x0F,
        any::<bool>(),
        prop::option::of(arb_mask_key()),
        prop_oneof![arb_payload(125), arb_payload(max_len)],
    )
        .prop_map(|(code, fin, key, mut payload)| {
            let opcode = OpCode::from(code);
            let fin = if opcode.is_control() {
                payload.truncate(125);
                true
            } else {
                fin
            };
            Frame::new(fin, opcode, key, payload)
        })
}

/// Covers all three length encodings (7-bit, 16-bit, 64-bit).
fn arb_frame() -> impl Strategy<Value = Frame> {
    arb_frame_up_to(70_000)
}

fn encoded(frame: &Frame) -> BytesMut {
    let mut buf = BytesMut::new();
    encode(frame, &mut buf);
    buf
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// XOR masking is its own inverse.
    #[test]
    fn mask_is_involution(data in arb_payload(4096), key in arb_mask_key()) {
        let masked = mask(&data, key);
        let unmasked = mask(&masked, key);
        prop_assert_eq!(unmasked.as_ref(), &data[..]);

        let mut buf = data.clone();
        apply_mask(&mut buf, key);
        apply_mask(&mut buf, key);
        prop_assert_eq!(buf, data);
    }

    /// Byte `i` is XORed with key byte `i % 4`.
    #[test]
    fn mask_is_cyclic_xor(data in arb_payload(512), key in arb_mask_key()) {
        let masked = mask(&data, key);
        for (i, (m, d)) in masked.iter().zip(&data).enumerate() {
            prop_assert_eq!(*m, d ^ key[i % 4]);
        }
    }

    /// decode(encode(F)) == F, consuming exactly the encoded bytes.
    #[test]
    fn decode_encode_round_trip(frame in arb_frame()) {
        let mut buf = encoded(&frame);
        let decoded = decode(&mut buf, MAX).unwrap();
        prop_assert_eq!(decoded, Decoded::Frame(frame));
        prop_assert!(buf.is_empty());
    }

    /// A truncated frame yields NeedMoreData and leaves the buffer untouched.
    #[test]
    fn partial_buffer_consumes_nothing(frame in arb_frame(), cut in any::<prop::sample::Index>()) {
        let full = encoded(&frame);
        let cut = cut.index(full.len());

        let mut buf = BytesMut::from(&full[..cut]);
        match decode(&mut buf, MAX).unwrap() {
            Decoded::NeedMoreData(missing) => {
                prop_assert!(missing > 0);
                prop_assert!(cut + missing <= full.len());
            }
            Decoded::Frame(frame) => prop_assert!(false, "decoded {:?} from {} bytes", frame, cut),
        }
        prop_assert_eq!(&buf[..], &full[..cut]);
    }

    /// Frames survive arbitrary transport chunking.
    #[test]
    fn decoder_handles_any_chunking(
        frames in prop::collection::vec(arb_frame_up_to(300), 1..8),
        chunk in 1usize..512,
    ) {
        let mut wire = BytesMut::new();
        for frame in &frames {
            encode(frame, &mut wire);
        }

        let mut decoder = Decoder::new(MAX);
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for piece in wire.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(frame) = decoder.decode(&mut buf).unwrap() {
                out.push(frame);
            }
        }

        prop_assert!(buf.is_empty());
        prop_assert_eq!(out, frames);
    }

    /// A server never masks; a client always uses the injected key.
    #[test]
    fn key_provider_follows_role(key in arb_mask_key()) {
        let mut provider = MaskKeyProvider::new(FixedKeySource(key));
        prop_assert_eq!(provider.next_key(Role::Server).unwrap(), None);
        prop_assert_eq!(provider.next_key(Role::Client).unwrap(), Some(key));
    }
}

#[test]
fn client_keys_are_fresh() {
    let mut provider = MaskKeyProvider::os();
    let keys: HashSet<MaskKey> = (0..1000)
        .map(|_| provider.next_key(Role::Client).unwrap().unwrap())
        .collect();

    // birthday bound for 1000 draws from 2^32 is far below one collision
    assert!(keys.len() >= 998);
}
