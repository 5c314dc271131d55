//! Any split of a valid message yields exactly that message, for every
//! framing strategy.

use bytes::Bytes;
use proptest::prelude::*;
use proptest::sample::Index;

use crosspoint::framing::{
    BoundedDecoder, BraceDecoder, Decoder, DelimiterDecoder, Framer, MultiDelimiterDecoder,
    XSigDecoder,
};
use crosspoint::signal::{xsig, Sig};

/// Cuts `bytes` at the given points (duplicates and empty pieces allowed).
fn split(bytes: &[u8], cuts: &[Index]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len() + 1)).collect();
    points.sort_unstable();
    let mut pieces = Vec::new();
    let mut start = 0;
    for point in points {
        pieces.push(bytes[start..point].to_vec());
        start = point;
    }
    pieces.push(bytes[start..].to_vec());
    pieces
}

fn feed<D: Decoder>(decoder: D, input: &[u8], cuts: &[Index]) -> Vec<Bytes> {
    let (framer, mut frames) = Framer::new(decoder);
    for piece in split(input, cuts) {
        framer.enqueue(&piece);
    }
    let mut out = Vec::new();
    while let Ok(frame) = frames.try_recv() {
        out.push(frame);
    }
    out
}

fn cut_points() -> impl Strategy<Value = Vec<Index>> {
    prop::collection::vec(any::<Index>(), 0..8)
}

fn any_xsig() -> impl Strategy<Value = Sig> {
    prop_oneof![
        (1u32..=4096, any::<bool>()).prop_map(|(n, v)| Sig::digital(n, v)),
        (1u32..=1024, any::<u16>()).prop_map(|(n, v)| Sig::analog(n, v)),
        (1u32..=1024, "[ -~]{0,24}").prop_map(|(n, v)| Sig::serial(n, Some(v))),
    ]
}

proptest! {
    #[test]
    fn single_delimiter(message in prop::collection::vec(0u8..0xFF, 1..64), cuts in cut_points()) {
        let mut input = message.clone();
        input.push(0xFF);
        prop_assert_eq!(feed(DelimiterDecoder::new(0xFF), &input, &cuts), vec![Bytes::from(message)]);
    }

    #[test]
    fn multi_delimiter(message in "[^\r\n]{0,40}", cuts in cut_points()) {
        let input = format!("{message}\n");
        prop_assert_eq!(
            feed(MultiDelimiterDecoder::lines(), input.as_bytes(), &cuts),
            vec![Bytes::from(message)]
        );
    }

    #[test]
    fn bounded(content in prop::collection::vec(4u8.., 0..48), noise in "[a-z]{0,8}", cuts in cut_points()) {
        let mut message = vec![0x02];
        message.extend_from_slice(&content);
        message.push(0x03);
        let mut input = noise.into_bytes();
        input.extend_from_slice(&message);
        prop_assert_eq!(feed(BoundedDecoder::stx_etx(), &input, &cuts), vec![Bytes::from(message)]);
    }

    #[test]
    fn brace_balanced(text in "[a-z0-9 :,\\[\\]]{0,32}", noise in "[a-z ]{0,8}", cuts in cut_points()) {
        let message = format!("{{\"a\":{{\"b\":\"{text}\"}},\"c\":{{}}}}");
        let input = format!("{noise}{message}");
        prop_assert_eq!(
            feed(BraceDecoder::json(), input.as_bytes(), &cuts),
            vec![Bytes::from(message)]
        );
    }

    #[test]
    fn xsig_frames(sig in any_xsig(), cuts in cut_points()) {
        let frame = xsig::encode(&sig).unwrap();
        let out = feed(XSigDecoder::new(), &frame, &cuts);
        prop_assert_eq!(out.len(), 1);
        prop_assert_eq!(&out[0][..], &frame[..]);
        prop_assert_eq!(xsig::decode(&out[0]).unwrap(), sig);
    }
}

#[test]
fn several_messages_in_one_chunk() {
    let out = feed(
        BraceDecoder::json(),
        b"{\"a\":1}  {\"b\":{}}x{",
        &[],
    );
    assert_eq!(
        out,
        vec![Bytes::from_static(b"{\"a\":1}"), Bytes::from_static(b"{\"b\":{}}")]
    );
}

#[test]
fn xsig_stream_of_mixed_sigs() {
    let sigs = [
        Sig::digital(1, true),
        Sig::analog(7, 512),
        Sig::serial(3, Some("Input 2")),
        Sig::digital(200, false),
    ];
    let mut stream = vec![0x00, 0x13];
    for sig in &sigs {
        stream.extend(xsig::encode(sig).unwrap());
    }
    let decoded: Vec<Sig> = feed(XSigDecoder::new(), &stream, &[])
        .iter()
        .map(|frame| xsig::decode(frame).unwrap())
        .collect();
    assert_eq!(decoded, sigs);
}
