//! Unit tests for the NDJSON line codec.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use agent_console::protocol::codec::{NdjsonCodec, MAX_LINE_BYTES};

#[test]
fn decodes_one_line_at_a_time() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"a\":1}\n{\"b\":2}\n");

    assert_eq!(
        codec.decode(&mut buf).expect("first line"),
        Some("{\"a\":1}".to_owned())
    );
    assert_eq!(
        codec.decode(&mut buf).expect("second line"),
        Some("{\"b\":2}".to_owned())
    );
    assert_eq!(codec.decode(&mut buf).expect("drained"), None);
}

#[test]
fn incomplete_line_waits_for_more_bytes() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"partial\":");

    assert_eq!(codec.decode(&mut buf).expect("no line yet"), None);

    buf.extend_from_slice(b"true}\n");
    assert_eq!(
        codec.decode(&mut buf).expect("completed line"),
        Some("{\"partial\":true}".to_owned())
    );
}

#[test]
fn final_line_without_newline_decodes_at_eof() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"last\":1}");

    assert_eq!(
        codec.decode_eof(&mut buf).expect("eof line"),
        Some("{\"last\":1}".to_owned())
    );
}

#[test]
fn oversized_line_is_a_protocol_error() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from(vec![b'x'; MAX_LINE_BYTES + 16].as_slice());

    let err = codec.decode(&mut buf).expect_err("line too long");
    assert!(err.to_string().contains("line too long"));
}

#[test]
fn encoder_terminates_lines() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::new();

    codec
        .encode("{\"type\":\"user\"}".to_owned(), &mut buf)
        .expect("encode");
    assert_eq!(&buf[..], b"{\"type\":\"user\"}\n");
}
