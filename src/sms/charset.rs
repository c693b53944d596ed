//! Text encodings of the `+CSCS` character sets.
//!
//! Only `GSM` and `UCS2` are translated; `IRA` and every other set pass
//! UTF-8 through unchanged.

use crate::hex::{nibble, to_hex_digit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Charset {
    /// International reference alphabet (ITU-T T.50)
    Ira,
    /// GSM 03.38 default alphabet
    Gsm,
    /// 16-bit code units written as 4 hex digits
    Ucs2,
    /// Any other set, passed through
    Other,
}

impl Charset {
    /// Character set named by `+CSCS`. Only the first letter is significant.
    pub fn from_name(name: &str) -> Self {
        match name.trim().trim_matches('"').as_bytes().first() {
            Some(b'I') => Charset::Ira,
            Some(b'G') => Charset::Gsm,
            Some(b'U') => Charset::Ucs2,
            _ => Charset::Other,
        }
    }
}

/// GSM 03.38 code points that differ from ASCII. 0x1A is missing: text
/// mode uses it as the send marker.
const GSM_TABLE: [(u8, char); 41] = [
    (0x00, '@'),
    (0x01, '£'),
    (0x02, '$'),
    (0x03, '¥'),
    (0x04, 'è'),
    (0x05, 'é'),
    (0x06, 'ù'),
    (0x07, 'ì'),
    (0x08, 'ò'),
    (0x09, 'Ç'),
    (0x0B, 'Ø'),
    (0x0C, 'ø'),
    (0x0E, 'Å'),
    (0x0F, 'å'),
    (0x10, 'Δ'),
    (0x11, '_'),
    (0x12, 'Φ'),
    (0x13, 'Γ'),
    (0x14, 'Λ'),
    (0x15, 'Ω'),
    (0x16, 'Π'),
    (0x17, 'Ψ'),
    (0x18, 'Σ'),
    (0x19, 'Θ'),
    (0x1C, 'Æ'),
    (0x1D, 'æ'),
    (0x1E, 'ß'),
    (0x1F, 'É'),
    (0x24, '¤'),
    (0x40, '¡'),
    (0x5B, 'Ä'),
    (0x5C, 'Ö'),
    (0x5D, 'Ñ'),
    (0x5E, 'Ü'),
    (0x5F, '§'),
    (0x60, '¿'),
    (0x7B, 'ä'),
    (0x7C, 'ö'),
    (0x7D, 'ñ'),
    (0x7E, 'ü'),
    (0x7F, 'à'),
];

/// GSM byte to character. Bytes without a table entry read as ASCII.
pub fn gsm_to_char(byte: u8) -> char {
    GSM_TABLE
        .iter()
        .find(|(gsm, _)| *gsm == byte)
        .map(|(_, c)| *c)
        .unwrap_or(char::from(byte))
}

/// Character to GSM byte, for characters with a table entry.
pub fn char_to_gsm(c: char) -> Option<u8> {
    GSM_TABLE.iter().find(|(_, utf8)| *utf8 == c).map(|(gsm, _)| *gsm)
}

/// Four hex digits of the UCS2 code unit of `c`. Characters outside the
/// basic multilingual plane become a space.
pub fn encode_ucs2(c: char) -> [u8; 4] {
    let unit = u16::try_from(u32::from(c)).unwrap_or(0x0020);
    let [hi, lo] = unit.to_be_bytes();
    [
        to_hex_digit(hi >> 4),
        to_hex_digit(hi),
        to_hex_digit(lo >> 4),
        to_hex_digit(lo),
    ]
}

/// Character of one UCS2 code unit written as 4 hex digits.
pub fn decode_ucs2(hex: &[u8]) -> Option<char> {
    if hex.len() != 4 {
        return None;
    }
    let mut unit = 0u32;
    for digit in hex {
        unit = (unit << 4) | u32::from(nibble(*digit).ok()?);
    }
    Some(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER))
}

/// Wire form of `c` in `charset`, written into `buf`.
pub fn encode(charset: Charset, c: char, buf: &mut [u8; 4]) -> &[u8] {
    match charset {
        Charset::Ucs2 => {
            *buf = encode_ucs2(c);
            &buf[..]
        }
        Charset::Gsm => match char_to_gsm(c) {
            Some(gsm) => {
                buf[0] = gsm;
                &buf[..1]
            }
            None => c.encode_utf8(buf).as_bytes(),
        },
        Charset::Ira | Charset::Other => c.encode_utf8(buf).as_bytes(),
    }
}
