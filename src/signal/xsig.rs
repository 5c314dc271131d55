//! The compact XSig encoding of sigs, as spoken by intersystem serial links.
//!
//! Wire indices are zero-based, sig numbers one-based.  The smart object is
//! not carried and named sigs have no encoding.

use crate::error::{Error, Result};

use super::{Sig, SigValue};

/// Ends a serial frame.  Serial text may not contain it.
pub const SERIAL_TERMINATOR: u8 = 0xFF;

pub const MAX_DIGITAL: u32 = 4096;
pub const MAX_ANALOG: u32 = 1024;
pub const MAX_SERIAL: u32 = 1024;

/// Longest serial text in bytes.  Also bounds how long a receiver waits for
/// the terminator of a corrupt serial header.
pub const MAX_SERIAL_TEXT: usize = 1024;

pub(crate) fn is_digital_header(first: u8, second: u8) -> bool {
    first & 0xC0 == 0x80 && second & 0x80 == 0
}

pub(crate) fn is_analog_header(first: u8, second: u8) -> bool {
    first & 0xC8 == 0xC0 && second & 0x80 == 0
}

pub(crate) fn is_serial_header(first: u8, second: u8) -> bool {
    first & 0xF8 == 0xC8 && second & 0x80 == 0
}

fn wire_index(sig: &Sig, max: u32) -> Result<u32> {
    if sig.name().is_some() {
        return Err(Error::XSig(format!("named sig {sig} has no XSig form")));
    }
    match sig.number() {
        n @ 1.. if n <= max => Ok(n - 1),
        n => Err(Error::XSig(format!("sig number {n} outside 1..={max}"))),
    }
}

/// Encodes one sig as a complete XSig frame.
pub fn encode(sig: &Sig) -> Result<Vec<u8>> {
    match sig.value() {
        SigValue::Digital(high) => {
            let index = wire_index(sig, MAX_DIGITAL)?;
            // Bit 5 set means low.
            let low = if *high { 0 } else { 0x20 };
            Ok(vec![
                0x80 | low | ((index >> 7) & 0x1F) as u8,
                (index & 0x7F) as u8,
            ])
        }
        SigValue::Analog(value) => {
            let index = wire_index(sig, MAX_ANALOG)?;
            let value = *value as u32;
            Ok(vec![
                0xC0 | (((value >> 14) & 0x03) << 4) as u8 | ((index >> 7) & 0x07) as u8,
                (index & 0x7F) as u8,
                ((value >> 7) & 0x7F) as u8,
                (value & 0x7F) as u8,
            ])
        }
        SigValue::Serial(text) => {
            let index = wire_index(sig, MAX_SERIAL)?;
            let text = text
                .as_deref()
                .ok_or_else(|| Error::XSig(format!("serial {sig} has no value to send")))?;
            if text.as_bytes().contains(&SERIAL_TERMINATOR) {
                return Err(Error::XSig("serial text contains the terminator".into()));
            }
            if text.len() > MAX_SERIAL_TEXT {
                return Err(Error::XSig(format!(
                    "serial text of {} bytes exceeds {}",
                    text.len(),
                    MAX_SERIAL_TEXT
                )));
            }
            let mut frame = Vec::with_capacity(text.len() + 3);
            frame.push(0xC8 | ((index >> 7) & 0x07) as u8);
            frame.push((index & 0x7F) as u8);
            frame.extend_from_slice(text.as_bytes());
            frame.push(SERIAL_TERMINATOR);
            Ok(frame)
        }
    }
}

/// Decodes one complete frame as produced by
/// [`XSigDecoder`](crate::framing::XSigDecoder).
pub fn decode(frame: &[u8]) -> Result<Sig> {
    let (&first, &second) = match frame {
        [first, second, ..] => (first, second),
        _ => return Err(Error::XSig(format!("frame too short: {}", hex::encode(frame)))),
    };
    let low_index = second as u32;

    if is_digital_header(first, second) && frame.len() == 2 {
        let index = (((first & 0x1F) as u32) << 7) | low_index;
        return Ok(Sig::digital(index + 1, first & 0x20 == 0));
    }

    if is_analog_header(first, second) && frame.len() == 4 {
        let index = (((first & 0x07) as u32) << 7) | low_index;
        let value = (((first as u16 >> 4) & 0x03) << 14)
            | ((frame[2] as u16 & 0x7F) << 7)
            | (frame[3] as u16 & 0x7F);
        return Ok(Sig::analog(index + 1, value));
    }

    if is_serial_header(first, second)
        && frame.len() <= MAX_SERIAL_TEXT + 3
        && frame.last() == Some(&SERIAL_TERMINATOR)
    {
        let index = (((first & 0x07) as u32) << 7) | low_index;
        let text = String::from_utf8_lossy(&frame[2..frame.len() - 1]).into_owned();
        return Ok(Sig::serial(index + 1, Some(text)));
    }

    Err(Error::XSig(format!("not an XSig frame: {}", hex::encode(frame))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digital_bit_layout() {
        assert_eq!(encode(&Sig::digital(1, true)).unwrap(), vec![0x80, 0x00]);
        assert_eq!(encode(&Sig::digital(1, false)).unwrap(), vec![0xA0, 0x00]);
        assert_eq!(encode(&Sig::digital(4096, true)).unwrap(), vec![0x9F, 0x7F]);
        assert_eq!(decode(&[0xA0, 0x05]).unwrap(), Sig::digital(6, false));
    }

    #[test]
    fn analog_keeps_all_sixteen_bits() {
        let frame = encode(&Sig::analog(1024, u16::MAX)).unwrap();
        assert_eq!(frame, vec![0xF7, 0x7F, 0x7F, 0x7F]);
        assert_eq!(decode(&frame).unwrap(), Sig::analog(1024, u16::MAX));
        assert_eq!(decode(&encode(&Sig::analog(3, 0x4001)).unwrap()).unwrap(), Sig::analog(3, 0x4001));
    }

    #[test]
    fn serial_is_terminated() {
        let frame = encode(&Sig::serial(2, Some("Hi"))).unwrap();
        assert_eq!(frame, vec![0xC8, 0x01, b'H', b'i', 0xFF]);
        assert_eq!(decode(&frame).unwrap(), Sig::serial(2, Some("Hi")));
    }

    #[test]
    fn unencodable_sigs_are_errors() {
        assert!(encode(&Sig::digital(0, true)).is_err());
        assert!(encode(&Sig::digital(4097, true)).is_err());
        assert!(encode(&Sig::analog(1025, 1)).is_err());
        assert!(encode(&Sig::serial(1, None::<String>)).is_err());
        assert!(encode(&Sig::serial(1, Some("x".repeat(MAX_SERIAL_TEXT + 1)))).is_err());
        assert!(encode(&Sig::serial(1, Some("x".repeat(MAX_SERIAL_TEXT)))).is_ok());
        assert!(encode(&Sig::named("x", SigValue::Digital(true))).is_err());
        assert!(decode(&[0x80]).is_err());
        assert!(decode(&[0x00, 0x00]).is_err());
    }
}
