use bytes::{Buf, Bytes, BytesMut};

use super::Decoder;
use crate::signal::xsig::{
    is_analog_header, is_digital_header, is_serial_header, MAX_SERIAL_TEXT, SERIAL_TERMINATOR,
};

/// Frames the XSig signal encoding.
///
/// Each message starts with one of three mutually exclusive headers:
///
/// ```text
/// digital  10cnnnnn 0nnnnnnn                      (2 bytes)
/// analog   11aa0nnn 0nnnnnnn 0aaaaaaa 0aaaaaaa    (4 bytes)
/// serial   11001nnn 0nnnnnnn <text> 0xFF
/// ```
///
/// A byte that cannot start a header is dropped on its own and matching
/// resumes at the next byte, so resynchronisation costs at most one pass over
/// the buffer.  A serial header whose terminator is not within
/// [`MAX_SERIAL_TEXT`] bytes is treated the same way, so a corrupt one holds
/// back the frames behind it for at most that many bytes.
#[derive(Debug, Clone, Default)]
pub struct XSigDecoder;

impl XSigDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for XSigDecoder {
    fn decode(&mut self, buf: &mut BytesMut) -> Option<Bytes> {
        loop {
            let first = *buf.first()?;
            if first & 0x80 == 0 {
                buf.advance(1);
                continue;
            }
            let second = *buf.get(1)?;

            if is_digital_header(first, second) {
                return Some(buf.split_to(2).freeze());
            }

            if is_analog_header(first, second) {
                if buf.len() < 4 {
                    return None;
                }
                if buf[2] & 0x80 == 0 && buf[3] & 0x80 == 0 {
                    return Some(buf.split_to(4).freeze());
                }
                buf.advance(1);
                continue;
            }

            if is_serial_header(first, second) {
                let window = buf.len().min(MAX_SERIAL_TEXT + 3);
                if let Some(at) = buf[2..window].iter().position(|&b| b == SERIAL_TERMINATOR) {
                    return Some(buf.split_to(at + 3).freeze());
                }
                if window < MAX_SERIAL_TEXT + 3 {
                    return None;
                }
                buf.advance(1);
                continue;
            }

            buf.advance(1);
        }
    }
}
