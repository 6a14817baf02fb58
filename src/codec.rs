//! HTTP/2 frame encoding and incremental decoding
//!
//! [`FrameCodec`] writes frames into an outbound buffer; [`FrameParser`] is
//! the inbound side, reassembling `(header, payload)` pairs from a byte
//! stream that may be chunked arbitrarily by the transport.

use crate::error::{Error, Result};
use crate::frames::*;
use bytes::{BufMut, BytesMut};

/// Maximum frame payload length expressible on the wire (24 bits)
pub const MAX_WIRE_FRAME_SIZE: usize = 0x00FF_FFFF;

/// Frame encoder for HTTP/2 frames
///
/// Stateless; each function appends one complete frame (header + payload)
/// to the supplied buffer.
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a DATA frame
    pub fn encode_data_frame(frame: &DataFrame, buf: &mut BytesMut) {
        let mut payload_len = frame.data.len();
        let mut flags = FrameFlags::empty();

        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }

        let padding_len = if let Some(pad_len) = frame.padding {
            flags.set(FrameFlags::PADDED);
            payload_len += 1 + pad_len as usize;
            pad_len
        } else {
            0
        };

        let header = FrameHeader::new(FrameType::Data, flags, frame.stream_id, payload_len);
        buf.put_slice(&header.encode());

        if frame.padding.is_some() {
            buf.put_u8(padding_len);
        }
        buf.put_slice(&frame.data);
        if padding_len > 0 {
            buf.put_bytes(0, padding_len as usize);
        }
    }

    /// Encode a HEADERS frame
    pub fn encode_headers_frame(frame: &HeadersFrame, buf: &mut BytesMut) {
        let mut payload_len = frame.header_block.len();
        let mut flags = FrameFlags::empty();

        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }
        if frame.priority.is_some() {
            flags.set(FrameFlags::PRIORITY);
            payload_len += 5;
        }

        let padding_len = if let Some(pad_len) = frame.padding {
            flags.set(FrameFlags::PADDED);
            payload_len += 1 + pad_len as usize;
            pad_len
        } else {
            0
        };

        let header = FrameHeader::new(FrameType::Headers, flags, frame.stream_id, payload_len);
        buf.put_slice(&header.encode());

        if frame.padding.is_some() {
            buf.put_u8(padding_len);
        }
        if let Some(priority) = &frame.priority {
            let mut dep = priority.stream_dependency;
            if priority.exclusive {
                dep |= 0x8000_0000;
            }
            buf.put_u32(dep);
            buf.put_u8(priority.weight);
        }
        buf.put_slice(&frame.header_block);
        if padding_len > 0 {
            buf.put_bytes(0, padding_len as usize);
        }
    }

    /// Encode a CONTINUATION frame
    pub fn encode_continuation_frame(frame: &ContinuationFrame, buf: &mut BytesMut) {
        let mut flags = FrameFlags::empty();
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }
        let header = FrameHeader::new(
            FrameType::Continuation,
            flags,
            frame.stream_id,
            frame.header_block.len(),
        );
        buf.put_slice(&header.encode());
        buf.put_slice(&frame.header_block);
    }

    /// Encode a SETTINGS frame
    pub fn encode_settings_frame(frame: &SettingsFrame, buf: &mut BytesMut) {
        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        let mut settings_data = BytesMut::new();
        if !frame.ack {
            frame.settings.encode_payload(&mut settings_data);
        }

        // Stream ID must be 0 for SETTINGS
        let header = FrameHeader::new(FrameType::Settings, flags, 0, settings_data.len());
        buf.put_slice(&header.encode());
        buf.put_slice(&settings_data);
    }

    /// Encode a PING frame
    pub fn encode_ping_frame(frame: &PingFrame, buf: &mut BytesMut) {
        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        let header = FrameHeader::new(FrameType::Ping, flags, 0, 8);
        buf.put_slice(&header.encode());
        buf.put_slice(&frame.data);
    }

    /// Encode a GOAWAY frame
    pub fn encode_goaway_frame(frame: &GoawayFrame, buf: &mut BytesMut) {
        let payload_len = 8 + frame.debug_data.len();
        let header = FrameHeader::new(FrameType::Goaway, FrameFlags::empty(), 0, payload_len);
        buf.put_slice(&header.encode());
        buf.put_u32(frame.last_stream_id & 0x7FFF_FFFF);
        buf.put_u32(frame.error_code.as_u32());
        buf.put_slice(&frame.debug_data);
    }

    /// Encode a WINDOW_UPDATE frame
    pub fn encode_window_update_frame(frame: &WindowUpdateFrame, buf: &mut BytesMut) {
        let header =
            FrameHeader::new(FrameType::WindowUpdate, FrameFlags::empty(), frame.stream_id, 4);
        buf.put_slice(&header.encode());
        buf.put_u32(frame.size_increment & 0x7FFF_FFFF);
    }

    /// Encode a RST_STREAM frame
    pub fn encode_rst_stream_frame(frame: &RstStreamFrame, buf: &mut BytesMut) {
        let header =
            FrameHeader::new(FrameType::RstStream, FrameFlags::empty(), frame.stream_id, 4);
        buf.put_slice(&header.encode());
        buf.put_u32(frame.error_code.as_u32());
    }

    /// Encode a PRIORITY frame
    pub fn encode_priority_frame(frame: &PriorityFrame, buf: &mut BytesMut) {
        let header =
            FrameHeader::new(FrameType::Priority, FrameFlags::empty(), frame.stream_id, 5);
        buf.put_slice(&header.encode());
        let mut dep = frame.priority.stream_dependency;
        if frame.priority.exclusive {
            dep |= 0x8000_0000;
        }
        buf.put_u32(dep);
        buf.put_u8(frame.priority.weight);
    }
}

/// Outcome of one [`FrameParser::parse_input`] call
#[derive(Debug)]
pub enum ParseOutcome {
    /// All input consumed on a frame boundary
    Success,
    /// Input exhausted mid-frame; the tail is buffered internally
    Incomplete,
    /// Unrecoverable framing or dispatch error
    Fatal(Error),
}

impl ParseOutcome {
    /// True unless the outcome is `Fatal`
    pub fn is_ok(&self) -> bool {
        !matches!(self, ParseOutcome::Fatal(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Header,
    Payload,
}

/// Incremental frame decoder.
///
/// Reassembles frames across arbitrarily chunked reads: a 9-byte staging
/// buffer collects the header, then the payload accumulates into an owned
/// buffer sized from the header. When a whole payload is already contiguous
/// in the input, the staging copy is skipped and the callback receives a
/// view directly into the caller's buffer. The callback must consume the
/// payload before returning; the buffer is reused for the next frame.
pub struct FrameParser {
    read_state: ReadState,
    hdr_buf: [u8; FRAME_HEADER_SIZE],
    hdr_used: usize,
    header: FrameHeader,
    payload: Vec<u8>,
    payload_used: usize,
    max_frame_size: usize,
}

impl FrameParser {
    /// Create a parser accepting payloads up to `max_frame_size` bytes
    pub fn new(max_frame_size: u32) -> Self {
        FrameParser {
            read_state: ReadState::Header,
            hdr_buf: [0u8; FRAME_HEADER_SIZE],
            hdr_used: 0,
            header: FrameHeader::decode(&[0u8; FRAME_HEADER_SIZE]),
            payload: Vec::new(),
            payload_used: 0,
            max_frame_size: max_frame_size as usize,
        }
    }

    /// Change the accepted payload size limit (local MAX_FRAME_SIZE)
    pub fn set_max_frame_size(&mut self, max_frame_size: u32) {
        self.max_frame_size = max_frame_size as usize;
    }

    /// Feed input bytes, invoking `on_frame` for each completed frame.
    ///
    /// A single call can deliver many frames; partial frames are buffered
    /// and completed by later calls.
    pub fn parse_input<F>(&mut self, mut data: &[u8], on_frame: &mut F) -> ParseOutcome
    where
        F: FnMut(&FrameHeader, &[u8]) -> Result<()>,
    {
        while !data.is_empty() {
            if self.read_state == ReadState::Header {
                if self.hdr_used + data.len() < FRAME_HEADER_SIZE {
                    self.hdr_buf[self.hdr_used..self.hdr_used + data.len()].copy_from_slice(data);
                    self.hdr_used += data.len();
                    return ParseOutcome::Incomplete;
                }
                let consumed = FRAME_HEADER_SIZE - self.hdr_used;
                if self.hdr_used > 0 {
                    self.hdr_buf[self.hdr_used..].copy_from_slice(&data[..consumed]);
                    self.header = FrameHeader::decode(&self.hdr_buf);
                } else {
                    let mut raw = [0u8; FRAME_HEADER_SIZE];
                    raw.copy_from_slice(&data[..FRAME_HEADER_SIZE]);
                    self.header = FrameHeader::decode(&raw);
                }
                data = &data[consumed..];
                self.hdr_used = 0;
                if self.header.length > self.max_frame_size {
                    return ParseOutcome::Fatal(Error::FrameSize(format!(
                        "frame length {} exceeds maximum {}",
                        self.header.length, self.max_frame_size
                    )));
                }
                self.payload.clear();
                self.payload_used = 0;
                self.read_state = ReadState::Payload;
            }
            if self.read_state == ReadState::Payload {
                let need = self.header.length;
                if self.payload.is_empty() {
                    if data.len() >= need {
                        // Whole payload contiguous in the input: hand out a
                        // view without staging it.
                        if let Err(err) = on_frame(&self.header, &data[..need]) {
                            return ParseOutcome::Fatal(err);
                        }
                        data = &data[need..];
                        self.read_state = ReadState::Header;
                    } else {
                        self.payload.resize(need, 0);
                        self.payload[..data.len()].copy_from_slice(data);
                        self.payload_used = data.len();
                        return ParseOutcome::Incomplete;
                    }
                } else {
                    let copy_len = std::cmp::min(data.len(), need - self.payload_used);
                    self.payload[self.payload_used..self.payload_used + copy_len]
                        .copy_from_slice(&data[..copy_len]);
                    self.payload_used += copy_len;
                    if self.payload_used < need {
                        return ParseOutcome::Incomplete;
                    }
                    data = &data[copy_len..];
                    self.read_state = ReadState::Header;
                    if let Err(err) = on_frame(&self.header, &self.payload[..need]) {
                        return ParseOutcome::Fatal(err);
                    }
                    self.payload.clear();
                    self.payload_used = 0;
                }
            }
        }
        ParseOutcome::Success
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(crate::DEFAULT_MAX_FRAME_SIZE)
    }
}
