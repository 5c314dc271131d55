//! Byte-stream framing.
//!
//! A [`Framer`] turns arbitrary, possibly fragmented reads into discrete
//! messages.  The actual boundary rule is supplied by a [`Decoder`]; five are
//! provided:
//!
//! * [`DelimiterDecoder`] – one delimiter byte, empty messages suppressed.
//! * [`MultiDelimiterDecoder`] – any byte of a set, empty messages kept.
//! * [`BoundedDecoder`] – start/end marker bytes, garbage before the start
//!   marker is discarded.
//! * [`BraceDecoder`] – balanced open/close markers, used for JSON documents.
//! * [`XSigDecoder`] – the fixed-header XSig signal encoding.
//!
//! Completed messages are delivered on the [`Frames`] channel returned by
//! [`Framer::new`], in arrival order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use parking_lot::Mutex;
use tokio::sync::mpsc;

mod bounded;
mod braces;
mod delimiter;
mod xsig;

pub use bounded::BoundedDecoder;
pub use braces::BraceDecoder;
pub use delimiter::{DelimiterDecoder, MultiDelimiterDecoder};
pub use xsig::XSigDecoder;

/// Receiving half of a framer: one item per completed message.
pub type Frames = mpsc::UnboundedReceiver<Bytes>;

/// A message boundary rule.
pub trait Decoder: Send {
    /// Splits one complete message off the front of `buf`.
    ///
    /// Bytes that can never be part of a message may be discarded.  Returns
    /// `None` when more input is needed.  Between calls the caller only
    /// appends to `buf`, so a decoder may remember how far it has searched.
    fn decode(&mut self, buf: &mut BytesMut) -> Option<Bytes>;

    /// Forgets any scan state kept between calls.  Called whenever the
    /// buffer is cleared.
    fn reset(&mut self) {}
}

struct DecodeState<D> {
    decoder: D,
    buffer: BytesMut,
}

/// Thread-safe framing engine around a [`Decoder`].
///
/// `enqueue` never waits for decoding: chunks land in an inbox guarded by its
/// own lock and whichever caller holds the decode lock drains it.  Exactly
/// one decode loop runs at a time per instance.
pub struct Framer<D> {
    inbox: Mutex<VecDeque<Bytes>>,
    state: Mutex<DecodeState<D>>,
    cancel: AtomicBool,
    output: mpsc::UnboundedSender<Bytes>,
}

impl<D: Decoder> Framer<D> {
    pub fn new(decoder: D) -> (Self, Frames) {
        let (output, frames) = mpsc::unbounded_channel();
        let framer = Self {
            inbox: Mutex::new(VecDeque::new()),
            state: Mutex::new(DecodeState {
                decoder,
                buffer: BytesMut::new(),
            }),
            cancel: AtomicBool::new(false),
            output,
        };
        (framer, frames)
    }

    /// Queues a chunk and decodes it unless another caller already is.
    pub fn enqueue(&self, chunk: &[u8]) {
        if !chunk.is_empty() {
            self.inbox.lock().push_back(Bytes::copy_from_slice(chunk));
        }

        loop {
            let Some(mut state) = self.state.try_lock() else {
                // The running loop picks our chunk up.
                return;
            };
            self.drain(&mut state);
            drop(state);

            // A chunk pushed while we held the lock would otherwise be
            // stranded until the next enqueue.  During a clear the clearing
            // thread drains whatever arrived once it is done.
            if self.cancel.load(Ordering::SeqCst) || self.inbox.lock().is_empty() {
                return;
            }
        }
    }

    /// Discards queued input and any partially decoded message.
    pub fn clear(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.inbox.lock().clear();

        let mut state = self.state.lock();
        state.buffer.clear();
        state.decoder.reset();
        self.cancel.store(false, Ordering::SeqCst);
        drop(state);
        debug!("framer cleared");

        // Input that raced with the clear is newer than it and still counts.
        self.enqueue(&[]);
    }

    /// Number of bytes held back waiting for the rest of a message.
    pub fn buffered(&self) -> usize {
        self.state.lock().buffer.len()
    }

    fn drain(&self, state: &mut DecodeState<D>) {
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return;
            }
            let chunk = self.inbox.lock().pop_front();
            let Some(chunk) = chunk else { return };
            state.buffer.extend_from_slice(&chunk);

            while let Some(message) = state.decoder.decode(&mut state.buffer) {
                trace!("framed {} byte message", message.len());
                // A closed receiver just means nobody listens any more.
                let _ = self.output.send(message);

                if self.cancel.load(Ordering::SeqCst) {
                    state.buffer.clear();
                    state.decoder.reset();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn collect(frames: &mut Frames) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Ok(frame) = frames.try_recv() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn zero_length_input_is_ignored() {
        let (framer, mut frames) = Framer::new(DelimiterDecoder::new(b'\n'));
        framer.enqueue(b"");
        framer.enqueue(b"abc");
        framer.enqueue(b"");
        assert!(collect(&mut frames).is_empty());
        framer.enqueue(b"\n");
        assert_eq!(collect(&mut frames), vec![Bytes::from_static(b"abc")]);
    }

    #[test]
    fn clear_drops_partial_message() {
        let (framer, mut frames) = Framer::new(BraceDecoder::json());
        framer.enqueue(b"{\"a\":{");
        assert!(framer.buffered() > 0);
        framer.clear();
        assert_eq!(framer.buffered(), 0);

        framer.enqueue(b"{\"b\":1}");
        assert_eq!(collect(&mut frames), vec![Bytes::from_static(b"{\"b\":1}")]);
    }

    #[test]
    fn clear_interrupts_running_decode() {
        const MESSAGES: usize = 2_000_000;
        let (framer, mut frames) = Framer::new(DelimiterDecoder::new(b';'));
        let framer = Arc::new(framer);

        let producer = {
            let framer = Arc::clone(&framer);
            thread::spawn(move || framer.enqueue("ab;".repeat(MESSAGES).as_bytes()))
        };

        // The decode loop is running once the first message is out.
        let first = frames.blocking_recv().unwrap();
        assert_eq!(first, Bytes::from_static(b"ab"));
        framer.clear();
        producer.join().unwrap();

        assert_eq!(framer.buffered(), 0);
        let emitted = 1 + collect(&mut frames).len();
        assert!(emitted < MESSAGES / 2, "{emitted} of {MESSAGES} messages emitted");

        // The framer stays usable.
        framer.enqueue(b"cd;");
        assert_eq!(collect(&mut frames), vec![Bytes::from_static(b"cd")]);
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let (framer, mut frames) = Framer::new(DelimiterDecoder::new(b';'));
        let framer = Arc::new(framer);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let framer = Arc::clone(&framer);
                thread::spawn(move || {
                    for i in 0..250 {
                        // Whole messages per call so threads cannot interleave
                        // inside one message.
                        framer.enqueue(format!("t{t}m{i};").as_bytes());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let got = collect(&mut frames);
        assert_eq!(got.len(), 1000);
        for t in 0..4 {
            let ours: Vec<_> = got
                .iter()
                .filter(|m| m.starts_with(format!("t{t}m").as_bytes()))
                .collect();
            // Per-producer order survives.
            let expected: Vec<_> = (0..250).map(|i| format!("t{t}m{i}")).collect();
            let ours: Vec<_> = ours
                .iter()
                .map(|m| String::from_utf8(m.to_vec()).unwrap())
                .collect();
            assert_eq!(ours, expected);
        }
    }
}
