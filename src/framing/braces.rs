use bytes::{Buf, Bytes, BytesMut};

use super::Decoder;

/// Frames structured text by counting nesting depth of an open/close marker
/// pair.
///
/// Noise before the first open marker is trimmed, and a message is emitted
/// when depth returns to zero.  Content is not validated; a parser further
/// down rejects malformed documents.  The scan position and depth carry over
/// between calls so each byte is inspected once.
#[derive(Debug, Clone)]
pub struct BraceDecoder {
    open: u8,
    close: u8,
    depth: usize,
    scanned: usize,
}

impl BraceDecoder {
    pub fn new(open: u8, close: u8) -> Self {
        Self {
            open,
            close,
            depth: 0,
            scanned: 0,
        }
    }

    pub fn json() -> Self {
        Self::new(b'{', b'}')
    }
}

impl Decoder for BraceDecoder {
    fn decode(&mut self, buf: &mut BytesMut) -> Option<Bytes> {
        while self.scanned < buf.len() {
            let b = buf[self.scanned];

            if self.depth == 0 {
                if b == self.open {
                    buf.advance(self.scanned);
                    self.scanned = 0;
                    self.depth = 1;
                }
                self.scanned += 1;
                continue;
            }

            self.scanned += 1;
            if b == self.open {
                self.depth += 1;
            } else if b == self.close {
                self.depth -= 1;
                if self.depth == 0 {
                    let message = buf.split_to(self.scanned).freeze();
                    self.scanned = 0;
                    return Some(message);
                }
            }
        }

        if self.depth == 0 {
            // Nothing but noise so far.
            buf.clear();
            self.scanned = 0;
        }
        None
    }

    fn reset(&mut self) {
        self.depth = 0;
        self.scanned = 0;
    }
}
