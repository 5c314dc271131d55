use bytes::{Buf, Bytes, BytesMut};

use super::Decoder;

/// Messages delimited by a start and an end byte, both included in the
/// emitted message.  Anything before the next start byte is garbage and is
/// dropped, which resynchronises the stream after corruption.
#[derive(Debug, Clone)]
pub struct BoundedDecoder {
    start: u8,
    end: u8,
    /// Bytes after the start marker already searched for the end marker;
    /// zero while no start marker is at the front.
    scanned: usize,
}

impl BoundedDecoder {
    pub fn new(start: u8, end: u8) -> Self {
        Self {
            start,
            end,
            scanned: 0,
        }
    }

    /// STX/ETX framing.
    pub fn stx_etx() -> Self {
        Self::new(0x02, 0x03)
    }
}

impl Decoder for BoundedDecoder {
    fn decode(&mut self, buf: &mut BytesMut) -> Option<Bytes> {
        if self.scanned == 0 {
            match buf.iter().position(|&b| b == self.start) {
                Some(at) => buf.advance(at),
                None => {
                    buf.clear();
                    return None;
                }
            }
            self.scanned = 1;
        }

        let Some(offset) = buf[self.scanned..].iter().position(|&b| b == self.end) else {
            self.scanned = buf.len();
            return None;
        };
        let len = self.scanned + offset + 1;
        self.scanned = 0;
        Some(buf.split_to(len).freeze())
    }

    fn reset(&mut self) {
        self.scanned = 0;
    }
}
