//! BER length octets.

/// Largest definite length accepted on decode.
pub const MAX_LENGTH: usize = 0x00FF_FFFF;

/// Encode a definite length.
///
/// Returns the octets in reverse order (ready to be pushed onto an
/// [`EncodeBuf`](super::EncodeBuf)) and the number of valid octets.
pub fn encode_length(len: usize) -> ([u8; 5], usize) {
    let mut out = [0u8; 5];
    if len < 0x80 {
        out[0] = len as u8;
        return (out, 1);
    }

    let mut n = 0;
    let mut v = len;
    while v > 0 {
        out[n] = (v & 0xFF) as u8;
        n += 1;
        v >>= 8;
    }
    out[n] = 0x80 | n as u8;
    (out, n + 1)
}

/// Number of octets a definite length occupies.
pub fn length_encoded_len(len: usize) -> usize {
    encode_length(len).1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_form() {
        assert_eq!(encode_length(0), ([0, 0, 0, 0, 0], 1));
        assert_eq!(encode_length(127).1, 1);
    }

    #[test]
    fn test_long_form_reversed() {
        let (bytes, n) = encode_length(0x0123);
        assert_eq!(n, 3);
        assert_eq!(&bytes[..3], &[0x23, 0x01, 0x82]);
        assert_eq!(length_encoded_len(200), 2);
    }
}
