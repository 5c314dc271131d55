use bytes::{Buf, Bytes, BytesMut};

use super::Decoder;

/// Splits on a single delimiter byte.  Empty messages are never emitted.
#[derive(Debug, Clone)]
pub struct DelimiterDecoder {
    delimiter: u8,
    scanned: usize,
}

impl DelimiterDecoder {
    pub fn new(delimiter: u8) -> Self {
        Self {
            delimiter,
            scanned: 0,
        }
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }
}

impl Decoder for DelimiterDecoder {
    fn decode(&mut self, buf: &mut BytesMut) -> Option<Bytes> {
        loop {
            let Some(offset) = buf[self.scanned..].iter().position(|&b| b == self.delimiter) else {
                self.scanned = buf.len();
                return None;
            };
            let message = buf.split_to(self.scanned + offset).freeze();
            buf.advance(1);
            self.scanned = 0;
            if !message.is_empty() {
                return Some(message);
            }
        }
    }

    fn reset(&mut self) {
        self.scanned = 0;
    }
}

/// Splits on any byte of a fixed set.  Unlike [`DelimiterDecoder`] the empty
/// message between two adjacent delimiters is emitted.
#[derive(Debug, Clone)]
pub struct MultiDelimiterDecoder {
    delimiters: Vec<u8>,
    scanned: usize,
}

impl MultiDelimiterDecoder {
    pub fn new(delimiters: impl Into<Vec<u8>>) -> Self {
        Self {
            delimiters: delimiters.into(),
            scanned: 0,
        }
    }

    /// CR and LF, the usual line endings of serial devices.
    pub fn lines() -> Self {
        Self::new(b"\r\n".to_vec())
    }
}

impl Decoder for MultiDelimiterDecoder {
    fn decode(&mut self, buf: &mut BytesMut) -> Option<Bytes> {
        let Some(offset) = buf[self.scanned..]
            .iter()
            .position(|b| self.delimiters.contains(b))
        else {
            self.scanned = buf.len();
            return None;
        };
        let message = buf.split_to(self.scanned + offset).freeze();
        buf.advance(1);
        self.scanned = 0;
        Some(message)
    }

    fn reset(&mut self) {
        self.scanned = 0;
    }
}
