use core::fmt;
use heapless::Vec;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Decode an ASCII hex string into a bounded byte vector.
pub fn decode_hex<const N: usize>(s: &str) -> Result<Vec<u8, N>, DecodeHexError> {
    let mut out = Vec::new();
    out.resize_default(s.len() / 2)
        .map_err(|_| DecodeHexError::BufferTooSmall)?;
    let len = decode_to_slice(s.as_bytes(), &mut out)?;
    out.truncate(len);
    Ok(out)
}

/// Decode ASCII hex pairs from `src` into `out`, returning the number of bytes
/// written.
pub fn decode_to_slice(src: &[u8], out: &mut [u8]) -> Result<usize, DecodeHexError> {
    if src.len() % 2 != 0 {
        return Err(DecodeHexError::OddLength);
    }
    let len = src.len() / 2;
    if out.len() < len {
        return Err(DecodeHexError::BufferTooSmall);
    }

    for (byte, pair) in out.iter_mut().zip(src.chunks_exact(2)) {
        *byte = (nibble(pair[0])? << 4) | nibble(pair[1])?;
    }
    Ok(len)
}

/// Encode `bytes` as uppercase ASCII hex into `out`, returning the number of
/// characters written.
pub fn encode_to_slice(bytes: &[u8], out: &mut [u8]) -> Result<usize, DecodeHexError> {
    let len = bytes.len() * 2;
    if out.len() < len {
        return Err(DecodeHexError::BufferTooSmall);
    }

    for (b, pair) in bytes.iter().zip(out.chunks_exact_mut(2)) {
        pair[0] = HEX_DIGITS[(b >> 4) as usize];
        pair[1] = HEX_DIGITS[(b & 0x0F) as usize];
    }
    Ok(len)
}

pub(crate) fn nibble(c: u8) -> Result<u8, DecodeHexError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(DecodeHexError::InvalidDigit),
    }
}

pub(crate) fn to_hex_digit(n: u8) -> u8 {
    HEX_DIGITS[(n & 0x0F) as usize]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeHexError {
    OddLength,
    InvalidDigit,
    BufferTooSmall,
}

impl fmt::Display for DecodeHexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeHexError::OddLength => "input string has an odd number of bytes".fmt(f),
            DecodeHexError::InvalidDigit => "input string contains a non-hex character".fmt(f),
            DecodeHexError::BufferTooSmall => "output buffer is too small".fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_survives_the_wire_encoding() {
        let payload: [u8; 8] = [0x00, 0x1A, 0x7F, 0x80, 0xAB, 0xCD, 0xEF, 0xFF];
        let mut wire = [0u8; 16];
        let n = encode_to_slice(&payload, &mut wire).unwrap();
        assert_eq!(&wire[..n], b"001A7F80ABCDEFFF");

        let decoded: Vec<u8, 8> = decode_hex(core::str::from_utf8(&wire[..n]).unwrap()).unwrap();
        assert_eq!(decoded.as_slice(), &payload);
    }

    #[test]
    fn every_byte_value_survives_the_wire_encoding() {
        let all: std::vec::Vec<u8> = (0..=255).collect();
        for len in [0, 1, 2, 15, 64, 255, 256] {
            let payload = &all[all.len() - len..];
            let mut wire = [0u8; 512];
            let n = encode_to_slice(payload, &mut wire).unwrap();
            assert_eq!(n, len * 2);

            let mut out = [0u8; 256];
            let m = decode_to_slice(&wire[..n], &mut out).unwrap();
            assert_eq!(&out[..m], payload, "length {}", len);

            let decoded: Vec<u8, 256> =
                decode_hex(core::str::from_utf8(&wire[..n]).unwrap()).unwrap();
            assert_eq!(decoded.as_slice(), payload);
        }
    }

    #[test]
    fn lowercase_is_accepted() {
        let decoded: Vec<u8, 4> = decode_hex("deadbeef").unwrap();
        assert_eq!(decoded.as_slice(), &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn malformed_input() {
        assert_eq!(decode_hex::<4>("abc"), Err(DecodeHexError::OddLength));
        assert_eq!(decode_hex::<4>("zz"), Err(DecodeHexError::InvalidDigit));
        assert_eq!(decode_hex::<1>("0011"), Err(DecodeHexError::BufferTooSmall));
        assert_eq!(
            encode_to_slice(&[1, 2], &mut [0u8; 3]),
            Err(DecodeHexError::BufferTooSmall)
        );
    }
}
