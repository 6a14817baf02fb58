//! Framer reassembly property
//!
//! For any split of a valid byte stream into chunks, the parser must yield
//! the identical sequence of (header, payload) pairs. Exercised over every
//! uniform chunk size and a few adversarial split patterns.

use bytes::{Bytes, BytesMut};
use h2mux::codec::{FrameCodec, FrameParser};
use h2mux::frames::{
    ContinuationFrame, DataFrame, FrameHeader, GoawayFrame, HeadersFrame, PingFrame,
    RstStreamFrame, SettingsFrame, WindowUpdateFrame,
};
use h2mux::error::ErrorCode;
use h2mux::settings::SettingsBuilder;

/// A frame sequence mixing types, lengths, and zero-length payloads
fn build_stream() -> BytesMut {
    let mut buf = BytesMut::new();

    let settings = SettingsBuilder::new()
        .header_table_size(4096)
        .initial_window_size(65535)
        .build()
        .unwrap();
    FrameCodec::encode_settings_frame(&SettingsFrame::new(settings), &mut buf);

    let headers = HeadersFrame::new(1, Bytes::from_static(b"\x82\x86\x84\x41\x0ahalf.block"), false, false);
    FrameCodec::encode_headers_frame(&headers, &mut buf);

    let cont = ContinuationFrame {
        stream_id: 1,
        header_block: Bytes::from_static(b"rest-of-block"),
        end_headers: true,
    };
    FrameCodec::encode_continuation_frame(&cont, &mut buf);

    FrameCodec::encode_data_frame(&DataFrame::new(1, Bytes::from(vec![0xAB; 300]), false), &mut buf);
    FrameCodec::encode_data_frame(&DataFrame::new(1, Bytes::new(), true), &mut buf);

    FrameCodec::encode_ping_frame(&PingFrame::new([9, 8, 7, 6, 5, 4, 3, 2]), &mut buf);
    FrameCodec::encode_window_update_frame(&WindowUpdateFrame::new(0, 12345), &mut buf);
    FrameCodec::encode_rst_stream_frame(
        &RstStreamFrame {
            stream_id: 3,
            error_code: ErrorCode::Cancel,
        },
        &mut buf,
    );
    FrameCodec::encode_goaway_frame(
        &GoawayFrame::new(3, ErrorCode::NoError, Bytes::from_static(b"bye")),
        &mut buf,
    );
    buf
}

fn parse_chunked(input: &[u8], chunks: &[&[u8]]) -> Vec<(FrameHeader, Vec<u8>)> {
    let total: usize = chunks.iter().map(|c| c.len()).sum();
    assert_eq!(total, input.len(), "split must cover the whole input");

    let mut parser = FrameParser::default();
    let mut frames = Vec::new();
    for chunk in chunks {
        let outcome = parser.parse_input(chunk, &mut |hdr, payload| {
            frames.push((*hdr, payload.to_vec()));
            Ok(())
        });
        assert!(outcome.is_ok());
    }
    frames
}

#[test]
fn every_uniform_chunk_size_yields_identical_frames() {
    let input = build_stream();
    let reference = parse_chunked(&input, &[&input]);
    assert_eq!(reference.len(), 9);

    for chunk_size in 1..=input.len() {
        let chunks: Vec<&[u8]> = input.chunks(chunk_size).collect();
        let frames = parse_chunked(&input, &chunks);
        assert_eq!(frames, reference, "chunk size {} diverged", chunk_size);
    }
}

#[test]
fn adversarial_splits_yield_identical_frames() {
    let input = build_stream();
    let reference = parse_chunked(&input, &[&input]);

    // Splits straddling header/payload boundaries of the first frames
    let cuts: &[&[usize]] = &[
        &[1, 2, 3, 4, 5],       // tiny prefix chunks
        &[8, 1, 8, 1, 8],       // repeatedly one byte short of a header
        &[9],                   // exactly one header
        &[9 + 12],              // first frame boundary (SETTINGS payload is 12 bytes)
        &[100],
        &[input.len() - 1],     // everything but the last byte
    ];
    for cut in cuts {
        let mut chunks: Vec<&[u8]> = Vec::new();
        let mut pos = 0;
        for &len in cut.iter() {
            let end = std::cmp::min(pos + len, input.len());
            chunks.push(&input[pos..end]);
            pos = end;
        }
        if pos < input.len() {
            chunks.push(&input[pos..]);
        }
        let frames = parse_chunked(&input, &chunks);
        assert_eq!(frames, reference);
    }
}

#[test]
fn interleaved_streams_parse_in_order() {
    let mut input = BytesMut::new();
    for i in 0..10u32 {
        let stream_id = (i % 3) * 2 + 1;
        FrameCodec::encode_data_frame(
            &DataFrame::new(stream_id, Bytes::from(vec![i as u8; (i * 7) as usize]), false),
            &mut input,
        );
    }
    let reference = parse_chunked(&input, &[&input]);
    assert_eq!(reference.len(), 10);

    for chunk_size in [1, 2, 5, 13, 64] {
        let chunks: Vec<&[u8]> = input.chunks(chunk_size).collect();
        assert_eq!(parse_chunked(&input, &chunks), reference);
    }
}
