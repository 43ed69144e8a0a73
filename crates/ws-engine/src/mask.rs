//! Payload masking ([RFC 6455 Section 5.3](https://datatracker.ietf.org/doc/html/rfc6455#section-5.3)).
//!
//! Byte `i` of a masked payload is byte `i` of the original XOR `key[i % 4]`.
//! Masking is its own inverse.

use bytes::Bytes;

use crate::frame::MaskKey;

/// Masks or unmasks `buf` in place.
///
/// Buffers longer than a machine word are processed eight bytes at a time.
#[inline]
pub fn apply_mask(buf: &mut [u8], key: MaskKey) {
    if buf.len() < 8 {
        apply_mask_fallback(buf, key);
    } else {
        apply_mask_fast64(buf, key);
    }
}

/// Returns a masked copy of `payload`, leaving the input untouched.
///
/// ```rust
/// use hpx_ws_engine::mask::mask;
///
/// let key = [0x37, 0xfa, 0x21, 0x3d];
/// let masked = mask(b"Hello", key);
/// assert_eq!(masked.as_ref(), &[0x7f, 0x9f, 0x4d, 0x51, 0x58]);
/// assert_eq!(mask(&masked, key).as_ref(), b"Hello");
/// ```
pub fn mask(payload: &[u8], key: MaskKey) -> Bytes {
    let mut out = payload.to_vec();
    apply_mask(&mut out, key);
    Bytes::from(out)
}

/// A safe unoptimized mask application.
#[inline(always)]
fn apply_mask_fallback(buf: &mut [u8], key: MaskKey) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

/// 64-bit block version of [`apply_mask`].
///
/// Every block starts at an offset that is a multiple of 8, so the key phase
/// is the same for each block and for the start of the tail.
#[inline(always)]
fn apply_mask_fast64(buf: &mut [u8], key: MaskKey) {
    let [a, b, c, d] = key;
    let mask_u64 = u64::from_ne_bytes([a, b, c, d, a, b, c, d]);

    let mut chunks = buf.chunks_exact_mut(8);
    for chunk in &mut chunks {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        let masked = u64::from_ne_bytes(word) ^ mask_u64;
        chunk.copy_from_slice(&masked.to_ne_bytes());
    }

    apply_mask_fallback(chunks.into_remainder(), key);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_mask() {
        let key = [0x6d, 0xb6, 0xb2, 0x80];
        let unmasked = [
            0xf3, 0x00, 0x01, 0x02, 0x03, 0x80, 0x81, 0x82, 0xff, 0xfe, 0x00, 0x17, 0x74, 0xf9,
            0x12, 0x03,
        ];

        for data_len in 0..=unmasked.len() {
            let unmasked = &unmasked[0..data_len];
            // Different start offsets inside the same allocation.
            for off in 0..=3 {
                if unmasked.len() < off {
                    continue;
                }
                let mut masked = unmasked.to_vec();
                apply_mask_fallback(&mut masked[off..], key);

                let mut masked_fast64 = unmasked.to_vec();
                apply_mask_fast64(&mut masked_fast64[off..], key);

                assert_eq!(masked, masked_fast64);
            }
        }
    }

    #[test]
    fn test_rfc_example() {
        let key = [0x37, 0xfa, 0x21, 0x3d];
        let mut data = b"Hello".to_vec();
        apply_mask(&mut data, key);
        assert_eq!(data, vec![0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_mask_unmask_identity() {
        let key = [0xAA, 0xBB, 0xCC, 0xDD];
        let original = b"Hello, World! This is a test message with various lengths.";

        let mut data = original.to_vec();
        apply_mask(&mut data, key);
        assert_ne!(&data[..], &original[..]);

        apply_mask(&mut data, key);
        assert_eq!(&data[..], &original[..]);
    }

    #[test]
    fn test_mask_does_not_touch_input() {
        let key = [0x01, 0x02, 0x03, 0x04];
        let original = vec![0x10u8; 12];
        let masked = mask(&original, key);

        assert_eq!(original, vec![0x10u8; 12]);
        assert_eq!(masked[0], 0x11);
        assert_eq!(masked[11], 0x14);
    }

    #[test]
    fn test_mask_all_zeros() {
        let key = [0x00, 0x00, 0x00, 0x00];
        let original = b"Test data";

        let mut data = original.to_vec();
        apply_mask(&mut data, key);
        assert_eq!(&data[..], &original[..]);
    }

    #[test]
    fn test_mask_all_ones() {
        let key = [0xFF, 0xFF, 0xFF, 0xFF];
        let mut data = vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];
        apply_mask(&mut data, key);
        assert_eq!(data, vec![0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA, 0x99, 0x88]);
    }

    #[test]
    fn test_mask_edge_cases() {
        let key = [0x12, 0x34, 0x56, 0x78];

        let mut empty: Vec<u8> = vec![];
        apply_mask(&mut empty, key);
        assert!(empty.is_empty());

        let mut three = vec![0xAB, 0xCD, 0xEF];
        apply_mask(&mut three, key);
        assert_eq!(three, vec![0xAB ^ 0x12, 0xCD ^ 0x34, 0xEF ^ 0x56]);
    }

    #[test]
    fn test_mask_fast_matches_fallback() {
        let keys = [
            [0x00, 0x00, 0x00, 0x00],
            [0xFF, 0xFF, 0xFF, 0xFF],
            [0x12, 0x34, 0x56, 0x78],
            [0x01, 0x23, 0x45, 0x67],
        ];

        for key in keys {
            for size in 0..=200 {
                let data: Vec<u8> = (0..size).map(|i| (i * 7) as u8).collect();

                let mut fallback = data.clone();
                apply_mask_fallback(&mut fallback, key);

                let mut fast = data.clone();
                apply_mask(&mut fast, key);

                assert_eq!(
                    fallback, fast,
                    "mismatch for key {:?} with size {}",
                    key, size
                );
            }
        }
    }
}
