//! HTTP/2 frame types and payload decoding
//!
//! This module defines the frame taxonomy of RFC 7540 Section 6: the 9-byte
//! frame header, per-type flag bits, and one struct per frame type. Typed
//! frames know how to decode themselves from a raw payload; encoding lives in
//! [`crate::codec`].

use crate::error::{Error, ErrorCode, Result};
use crate::settings::Settings;
use bytes::Bytes;
use std::fmt;

/// HTTP/2 frame header size (9 bytes)
pub const FRAME_HEADER_SIZE: usize = 9;

/// HTTP/2 frame types (RFC 7540 Section 6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// DATA frame (0x0) - Conveys arbitrary, variable-length sequences of octets
    Data = 0x0,
    /// HEADERS frame (0x1) - Opens a stream and carries header block fragment
    Headers = 0x1,
    /// PRIORITY frame (0x2) - Specifies sender-advised priority of a stream
    Priority = 0x2,
    /// RST_STREAM frame (0x3) - Allows immediate termination of a stream
    RstStream = 0x3,
    /// SETTINGS frame (0x4) - Conveys configuration parameters
    Settings = 0x4,
    /// PUSH_PROMISE frame (0x5) - Used to notify peer of intent to initiate stream
    PushPromise = 0x5,
    /// PING frame (0x6) - Mechanism for measuring round-trip time
    Ping = 0x6,
    /// GOAWAY frame (0x7) - Initiates shutdown of connection
    Goaway = 0x7,
    /// WINDOW_UPDATE frame (0x8) - Implements flow control
    WindowUpdate = 0x8,
    /// CONTINUATION frame (0x9) - Continues sequence of header block fragments
    Continuation = 0x9,
}

impl FrameType {
    /// Convert frame type to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create frame type from u8
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(FrameType::Data),
            0x1 => Some(FrameType::Headers),
            0x2 => Some(FrameType::Priority),
            0x3 => Some(FrameType::RstStream),
            0x4 => Some(FrameType::Settings),
            0x5 => Some(FrameType::PushPromise),
            0x6 => Some(FrameType::Ping),
            0x7 => Some(FrameType::Goaway),
            0x8 => Some(FrameType::WindowUpdate),
            0x9 => Some(FrameType::Continuation),
            _ => None,
        }
    }

    /// Get frame type name
    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Priority => "PRIORITY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::PushPromise => "PUSH_PROMISE",
            FrameType::Ping => "PING",
            FrameType::Goaway => "GOAWAY",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Continuation => "CONTINUATION",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u8())
    }
}

/// HTTP/2 frame flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// END_STREAM flag (0x1)
    pub const END_STREAM: u8 = 0x1;

    /// ACK flag (0x1) - used for SETTINGS and PING
    pub const ACK: u8 = 0x1;

    /// END_HEADERS flag (0x4)
    pub const END_HEADERS: u8 = 0x4;

    /// PADDED flag (0x8)
    pub const PADDED: u8 = 0x8;

    /// PRIORITY flag (0x20)
    pub const PRIORITY: u8 = 0x20;

    /// Create empty flags
    pub fn empty() -> Self {
        FrameFlags(0)
    }

    /// Create from u8
    pub fn from_u8(flags: u8) -> Self {
        FrameFlags(flags)
    }

    /// Get raw u8 value
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Set a flag
    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    /// Check if a flag is set
    pub fn is_set(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    /// Check if END_STREAM is set
    pub fn is_end_stream(&self) -> bool {
        self.is_set(Self::END_STREAM)
    }

    /// Check if ACK is set
    pub fn is_ack(&self) -> bool {
        self.is_set(Self::ACK)
    }

    /// Check if END_HEADERS is set
    pub fn is_end_headers(&self) -> bool {
        self.is_set(Self::END_HEADERS)
    }

    /// Check if PADDED is set
    pub fn is_padded(&self) -> bool {
        self.is_set(Self::PADDED)
    }

    /// Check if PRIORITY is set
    pub fn is_priority(&self) -> bool {
        self.is_set(Self::PRIORITY)
    }
}

/// Decoded 9-byte frame header.
///
/// The frame type is kept raw so frames of unknown type can be skipped
/// rather than rejected (RFC 7540 Section 4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length (24-bit)
    pub length: usize,
    /// Raw frame type octet
    pub frame_type: u8,
    /// Frame flags
    pub flags: FrameFlags,
    /// Stream ID (31-bit, reserved bit masked)
    pub stream_id: u32,
}

impl FrameHeader {
    /// Create a new frame header
    pub fn new(frame_type: FrameType, flags: FrameFlags, stream_id: u32, length: usize) -> Self {
        FrameHeader {
            length,
            frame_type: frame_type.as_u8(),
            flags,
            stream_id: stream_id & 0x7FFF_FFFF,
        }
    }

    /// Frame type, if known
    pub fn known_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }

    /// Encode into the 9-byte wire format
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];

        // Length (24 bits, big-endian)
        header[0] = ((self.length >> 16) & 0xFF) as u8;
        header[1] = ((self.length >> 8) & 0xFF) as u8;
        header[2] = (self.length & 0xFF) as u8;

        header[3] = self.frame_type;
        header[4] = self.flags.as_u8();

        // Stream ID (31 bits, big-endian, reserved bit is 0)
        let stream_id = self.stream_id & 0x7FFF_FFFF;
        header[5] = ((stream_id >> 24) & 0xFF) as u8;
        header[6] = ((stream_id >> 16) & 0xFF) as u8;
        header[7] = ((stream_id >> 8) & 0xFF) as u8;
        header[8] = (stream_id & 0xFF) as u8;

        header
    }

    /// Decode from the 9-byte wire format
    pub fn decode(bytes: &[u8; FRAME_HEADER_SIZE]) -> Self {
        let length =
            ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize);

        // Stream ID (31 bits, reserved bit masked out)
        let stream_id = (((bytes[5] & 0x7F) as u32) << 24)
            | ((bytes[6] as u32) << 16)
            | ((bytes[7] as u32) << 8)
            | (bytes[8] as u32);

        FrameHeader {
            length,
            frame_type: bytes[3],
            flags: FrameFlags::from_u8(bytes[4]),
            stream_id,
        }
    }
}

/// Priority specification (RFC 7540 Section 6.3)
#[derive(Debug, Clone, Copy)]
pub struct PrioritySpec {
    /// Stream dependency
    pub stream_dependency: u32,
    /// Exclusive flag
    pub exclusive: bool,
    /// Weight (the wire value; effective weight is this plus one)
    pub weight: u8,
}

impl PrioritySpec {
    /// Create a new priority specification
    pub fn new(stream_dependency: u32, exclusive: bool, weight: u8) -> Self {
        PrioritySpec {
            stream_dependency,
            exclusive,
            weight,
        }
    }

    fn decode(bytes: &[u8]) -> Self {
        let dep = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        PrioritySpec {
            stream_dependency: dep & 0x7FFF_FFFF,
            exclusive: dep & 0x8000_0000 != 0,
            weight: bytes[4],
        }
    }
}

/// DATA frame (RFC 7540 Section 6.1)
#[derive(Debug, Clone)]
pub struct DataFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Data payload (padding stripped)
    pub data: Bytes,
    /// END_STREAM flag
    pub end_stream: bool,
    /// Padding length (if PADDED flag was set)
    pub padding: Option<u8>,
}

impl DataFrame {
    /// Create a new DATA frame
    pub fn new(stream_id: u32, data: Bytes, end_stream: bool) -> Self {
        DataFrame {
            stream_id,
            data,
            end_stream,
            padding: None,
        }
    }

    fn decode(hdr: &FrameHeader, payload: &[u8]) -> Result<Self> {
        if hdr.stream_id == 0 {
            return Err(Error::Protocol("DATA frame on stream 0".to_string()));
        }
        let (data, padding) = strip_padding(hdr, payload)?;
        Ok(DataFrame {
            stream_id: hdr.stream_id,
            data: Bytes::copy_from_slice(data),
            end_stream: hdr.flags.is_end_stream(),
            padding,
        })
    }
}

/// HEADERS frame (RFC 7540 Section 6.2)
#[derive(Debug, Clone)]
pub struct HeadersFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Header block fragment (padding and priority stripped)
    pub header_block: Bytes,
    /// END_STREAM flag
    pub end_stream: bool,
    /// END_HEADERS flag
    pub end_headers: bool,
    /// Priority information (if PRIORITY flag was set)
    pub priority: Option<PrioritySpec>,
    /// Padding length (if PADDED flag was set)
    pub padding: Option<u8>,
}

impl HeadersFrame {
    /// Create a new HEADERS frame
    pub fn new(stream_id: u32, header_block: Bytes, end_stream: bool, end_headers: bool) -> Self {
        HeadersFrame {
            stream_id,
            header_block,
            end_stream,
            end_headers,
            priority: None,
            padding: None,
        }
    }

    fn decode(hdr: &FrameHeader, payload: &[u8]) -> Result<Self> {
        if hdr.stream_id == 0 {
            return Err(Error::Protocol("HEADERS frame on stream 0".to_string()));
        }
        let (mut fragment, padding) = strip_padding(hdr, payload)?;
        let priority = if hdr.flags.is_priority() {
            if fragment.len() < 5 {
                return Err(Error::FrameSize(
                    "HEADERS priority field truncated".to_string(),
                ));
            }
            let spec = PrioritySpec::decode(&fragment[..5]);
            fragment = &fragment[5..];
            Some(spec)
        } else {
            None
        };
        Ok(HeadersFrame {
            stream_id: hdr.stream_id,
            header_block: Bytes::copy_from_slice(fragment),
            end_stream: hdr.flags.is_end_stream(),
            end_headers: hdr.flags.is_end_headers(),
            priority,
            padding,
        })
    }
}

/// PRIORITY frame (RFC 7540 Section 6.3)
#[derive(Debug, Clone, Copy)]
pub struct PriorityFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Priority specification
    pub priority: PrioritySpec,
}

impl PriorityFrame {
    fn decode(hdr: &FrameHeader, payload: &[u8]) -> Result<Self> {
        if hdr.stream_id == 0 {
            return Err(Error::Protocol("PRIORITY frame on stream 0".to_string()));
        }
        if payload.len() != 5 {
            return Err(Error::FrameSize("PRIORITY payload must be 5 bytes".to_string()));
        }
        Ok(PriorityFrame {
            stream_id: hdr.stream_id,
            priority: PrioritySpec::decode(payload),
        })
    }
}

/// RST_STREAM frame (RFC 7540 Section 6.4)
#[derive(Debug, Clone, Copy)]
pub struct RstStreamFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Error code (unknown wire codes map to INTERNAL_ERROR)
    pub error_code: ErrorCode,
}

impl RstStreamFrame {
    fn decode(hdr: &FrameHeader, payload: &[u8]) -> Result<Self> {
        if hdr.stream_id == 0 {
            return Err(Error::Protocol("RST_STREAM frame on stream 0".to_string()));
        }
        if payload.len() != 4 {
            return Err(Error::FrameSize(
                "RST_STREAM payload must be 4 bytes".to_string(),
            ));
        }
        let code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        Ok(RstStreamFrame {
            stream_id: hdr.stream_id,
            error_code: ErrorCode::from_u32(code).unwrap_or(ErrorCode::InternalError),
        })
    }
}

/// SETTINGS frame (RFC 7540 Section 6.5)
#[derive(Debug, Clone)]
pub struct SettingsFrame {
    /// ACK flag
    pub ack: bool,
    /// Settings parameters
    pub settings: Settings,
}

impl SettingsFrame {
    /// Create a new SETTINGS frame
    pub fn new(settings: Settings) -> Self {
        SettingsFrame {
            ack: false,
            settings,
        }
    }

    /// Create a SETTINGS ACK frame
    pub fn ack() -> Self {
        SettingsFrame {
            ack: true,
            settings: Settings::new(),
        }
    }

    fn decode(hdr: &FrameHeader, payload: &[u8]) -> Result<Self> {
        if hdr.stream_id != 0 {
            return Err(Error::Protocol(
                "SETTINGS frame must have stream ID 0".to_string(),
            ));
        }
        if hdr.flags.is_ack() {
            if !payload.is_empty() {
                return Err(Error::FrameSize(
                    "SETTINGS ACK must have empty payload".to_string(),
                ));
            }
            return Ok(SettingsFrame::ack());
        }
        if payload.len() % 6 != 0 {
            return Err(Error::FrameSize(
                "SETTINGS payload must be a multiple of 6 bytes".to_string(),
            ));
        }
        Ok(SettingsFrame::new(Settings::parse_payload(payload)?))
    }
}

/// PUSH_PROMISE frame (RFC 7540 Section 6.6)
#[derive(Debug, Clone)]
pub struct PushPromiseFrame {
    /// Stream ID the promise is associated with
    pub stream_id: u32,
    /// Promised stream ID
    pub promised_stream_id: u32,
    /// Header block fragment
    pub header_block: Bytes,
    /// END_HEADERS flag
    pub end_headers: bool,
    /// Padding length (if PADDED flag was set)
    pub padding: Option<u8>,
}

impl PushPromiseFrame {
    fn decode(hdr: &FrameHeader, payload: &[u8]) -> Result<Self> {
        if hdr.stream_id == 0 {
            return Err(Error::Protocol("PUSH_PROMISE frame on stream 0".to_string()));
        }
        let (fragment, padding) = strip_padding(hdr, payload)?;
        if fragment.len() < 4 {
            return Err(Error::FrameSize(
                "PUSH_PROMISE payload truncated".to_string(),
            ));
        }
        let promised =
            u32::from_be_bytes([fragment[0], fragment[1], fragment[2], fragment[3]]) & 0x7FFF_FFFF;
        Ok(PushPromiseFrame {
            stream_id: hdr.stream_id,
            promised_stream_id: promised,
            header_block: Bytes::copy_from_slice(&fragment[4..]),
            end_headers: hdr.flags.is_end_headers(),
            padding,
        })
    }
}

/// PING frame (RFC 7540 Section 6.7)
#[derive(Debug, Clone, Copy)]
pub struct PingFrame {
    /// ACK flag
    pub ack: bool,
    /// Opaque data (8 bytes)
    pub data: [u8; 8],
}

impl PingFrame {
    /// Create a new PING frame
    pub fn new(data: [u8; 8]) -> Self {
        PingFrame { ack: false, data }
    }

    /// Create a PING ACK frame
    pub fn ack(data: [u8; 8]) -> Self {
        PingFrame { ack: true, data }
    }

    fn decode(hdr: &FrameHeader, payload: &[u8]) -> Result<Self> {
        if hdr.stream_id != 0 {
            return Err(Error::Protocol(
                "PING frame must have stream ID 0".to_string(),
            ));
        }
        if payload.len() != 8 {
            return Err(Error::FrameSize("PING payload must be 8 bytes".to_string()));
        }
        let mut data = [0u8; 8];
        data.copy_from_slice(payload);
        Ok(PingFrame {
            ack: hdr.flags.is_ack(),
            data,
        })
    }
}

/// GOAWAY frame (RFC 7540 Section 6.8)
#[derive(Debug, Clone)]
pub struct GoawayFrame {
    /// Last stream ID
    pub last_stream_id: u32,
    /// Error code (unknown wire codes map to INTERNAL_ERROR)
    pub error_code: ErrorCode,
    /// Debug data
    pub debug_data: Bytes,
}

impl GoawayFrame {
    /// Create a new GOAWAY frame
    pub fn new(last_stream_id: u32, error_code: ErrorCode, debug_data: Bytes) -> Self {
        GoawayFrame {
            last_stream_id,
            error_code,
            debug_data,
        }
    }

    fn decode(hdr: &FrameHeader, payload: &[u8]) -> Result<Self> {
        if hdr.stream_id != 0 {
            return Err(Error::Protocol(
                "GOAWAY frame must have stream ID 0".to_string(),
            ));
        }
        if payload.len() < 8 {
            return Err(Error::FrameSize(
                "GOAWAY payload must be at least 8 bytes".to_string(),
            ));
        }
        let last =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
        let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        Ok(GoawayFrame {
            last_stream_id: last,
            error_code: ErrorCode::from_u32(code).unwrap_or(ErrorCode::InternalError),
            debug_data: Bytes::copy_from_slice(&payload[8..]),
        })
    }
}

/// WINDOW_UPDATE frame (RFC 7540 Section 6.9)
#[derive(Debug, Clone, Copy)]
pub struct WindowUpdateFrame {
    /// Stream ID (0 for connection-level)
    pub stream_id: u32,
    /// Window size increment
    pub size_increment: u32,
}

impl WindowUpdateFrame {
    /// Create a new WINDOW_UPDATE frame
    pub fn new(stream_id: u32, size_increment: u32) -> Self {
        WindowUpdateFrame {
            stream_id,
            size_increment,
        }
    }

    fn decode(hdr: &FrameHeader, payload: &[u8]) -> Result<Self> {
        if payload.len() != 4 {
            return Err(Error::FrameSize(
                "WINDOW_UPDATE payload must be 4 bytes".to_string(),
            ));
        }
        let increment =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
        Ok(WindowUpdateFrame {
            stream_id: hdr.stream_id,
            size_increment: increment,
        })
    }
}

/// CONTINUATION frame (RFC 7540 Section 6.10)
#[derive(Debug, Clone)]
pub struct ContinuationFrame {
    /// Stream ID
    pub stream_id: u32,
    /// Header block fragment
    pub header_block: Bytes,
    /// END_HEADERS flag
    pub end_headers: bool,
}

impl ContinuationFrame {
    fn decode(hdr: &FrameHeader, payload: &[u8]) -> Result<Self> {
        if hdr.stream_id == 0 {
            return Err(Error::Protocol(
                "CONTINUATION frame on stream 0".to_string(),
            ));
        }
        Ok(ContinuationFrame {
            stream_id: hdr.stream_id,
            header_block: Bytes::copy_from_slice(payload),
            end_headers: hdr.flags.is_end_headers(),
        })
    }
}

/// A decoded HTTP/2 frame
#[derive(Debug, Clone)]
pub enum Frame {
    /// DATA frame
    Data(DataFrame),
    /// HEADERS frame
    Headers(HeadersFrame),
    /// PRIORITY frame
    Priority(PriorityFrame),
    /// RST_STREAM frame
    RstStream(RstStreamFrame),
    /// SETTINGS frame
    Settings(SettingsFrame),
    /// PUSH_PROMISE frame
    PushPromise(PushPromiseFrame),
    /// PING frame
    Ping(PingFrame),
    /// GOAWAY frame
    Goaway(GoawayFrame),
    /// WINDOW_UPDATE frame
    WindowUpdate(WindowUpdateFrame),
    /// CONTINUATION frame
    Continuation(ContinuationFrame),
}

impl Frame {
    /// Decode a raw payload into a typed frame.
    ///
    /// Returns `Ok(None)` for unknown frame types, which are skipped per
    /// RFC 7540 Section 4.1.
    pub fn decode(hdr: &FrameHeader, payload: &[u8]) -> Result<Option<Frame>> {
        let Some(frame_type) = hdr.known_type() else {
            return Ok(None);
        };
        let frame = match frame_type {
            FrameType::Data => Frame::Data(DataFrame::decode(hdr, payload)?),
            FrameType::Headers => Frame::Headers(HeadersFrame::decode(hdr, payload)?),
            FrameType::Priority => Frame::Priority(PriorityFrame::decode(hdr, payload)?),
            FrameType::RstStream => Frame::RstStream(RstStreamFrame::decode(hdr, payload)?),
            FrameType::Settings => Frame::Settings(SettingsFrame::decode(hdr, payload)?),
            FrameType::PushPromise => Frame::PushPromise(PushPromiseFrame::decode(hdr, payload)?),
            FrameType::Ping => Frame::Ping(PingFrame::decode(hdr, payload)?),
            FrameType::Goaway => Frame::Goaway(GoawayFrame::decode(hdr, payload)?),
            FrameType::WindowUpdate => {
                Frame::WindowUpdate(WindowUpdateFrame::decode(hdr, payload)?)
            }
            FrameType::Continuation => {
                Frame::Continuation(ContinuationFrame::decode(hdr, payload)?)
            }
        };
        Ok(Some(frame))
    }
}

/// Strip the PADDED field and trailing padding from a DATA / HEADERS /
/// PUSH_PROMISE payload.
fn strip_padding<'a>(hdr: &FrameHeader, payload: &'a [u8]) -> Result<(&'a [u8], Option<u8>)> {
    if !hdr.flags.is_padded() {
        return Ok((payload, None));
    }
    if payload.is_empty() {
        return Err(Error::FrameSize("padded frame with empty payload".to_string()));
    }
    let pad_len = payload[0] as usize;
    let body = &payload[1..];
    if pad_len >= body.len() + 1 {
        // Pad length equal to or exceeding the remaining payload
        return Err(Error::Protocol(format!(
            "pad length {} exceeds payload length {}",
            pad_len,
            body.len()
        )));
    }
    Ok((&body[..body.len() - pad_len], Some(pad_len as u8)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_conversion() {
        assert_eq!(FrameType::Data.as_u8(), 0x0);
        assert_eq!(FrameType::Headers.as_u8(), 0x1);
        assert_eq!(FrameType::Continuation.as_u8(), 0x9);

        assert_eq!(FrameType::from_u8(0x0), Some(FrameType::Data));
        assert_eq!(FrameType::from_u8(0x9), Some(FrameType::Continuation));
        assert_eq!(FrameType::from_u8(0xff), None);
    }

    #[test]
    fn test_frame_flags() {
        let mut flags = FrameFlags::empty();
        assert!(!flags.is_end_stream());

        flags.set(FrameFlags::END_STREAM);
        assert!(flags.is_end_stream());
        assert!(!flags.is_end_headers());

        flags.set(FrameFlags::END_HEADERS);
        assert!(flags.is_end_stream());
        assert!(flags.is_end_headers());
    }

    #[test]
    fn test_header_roundtrip() {
        let hdr = FrameHeader::new(
            FrameType::Headers,
            FrameFlags::from_u8(FrameFlags::END_STREAM | FrameFlags::END_HEADERS),
            42,
            1234,
        );
        let bytes = hdr.encode();
        let decoded = FrameHeader::decode(&bytes);
        assert_eq!(decoded, hdr);
        assert_eq!(decoded.known_type(), Some(FrameType::Headers));
    }

    #[test]
    fn test_header_reserved_bit_masked() {
        let hdr = FrameHeader::new(FrameType::Data, FrameFlags::empty(), 1, 0);
        let mut bytes = hdr.encode();
        bytes[5] |= 0x80; // set the reserved bit on the wire
        let decoded = FrameHeader::decode(&bytes);
        assert_eq!(decoded.stream_id, 1);
    }

    #[test]
    fn test_decode_data_with_padding() {
        let hdr = FrameHeader {
            length: 8,
            frame_type: FrameType::Data.as_u8(),
            flags: FrameFlags::from_u8(FrameFlags::PADDED | FrameFlags::END_STREAM),
            stream_id: 3,
        };
        // pad_len=2, "hello", 2 pad bytes
        let payload = [2u8, b'h', b'e', b'l', b'l', b'o', 0, 0];
        let Some(Frame::Data(frame)) = Frame::decode(&hdr, &payload).unwrap() else {
            panic!("expected DATA frame");
        };
        assert_eq!(&frame.data[..], b"hello");
        assert!(frame.end_stream);
        assert_eq!(frame.padding, Some(2));
    }

    #[test]
    fn test_decode_data_bad_padding() {
        let hdr = FrameHeader {
            length: 3,
            frame_type: FrameType::Data.as_u8(),
            flags: FrameFlags::from_u8(FrameFlags::PADDED),
            stream_id: 3,
        };
        let payload = [5u8, 0, 0]; // pad length larger than payload
        assert!(Frame::decode(&hdr, &payload).is_err());
    }

    #[test]
    fn test_decode_headers_with_priority() {
        let hdr = FrameHeader {
            length: 8,
            frame_type: FrameType::Headers.as_u8(),
            flags: FrameFlags::from_u8(FrameFlags::PRIORITY | FrameFlags::END_HEADERS),
            stream_id: 5,
        };
        let mut payload = Vec::new();
        payload.extend_from_slice(&0x8000_0003u32.to_be_bytes()); // exclusive, dep=3
        payload.push(15); // weight
        payload.extend_from_slice(b"abc");
        let Some(Frame::Headers(frame)) = Frame::decode(&hdr, &payload).unwrap() else {
            panic!("expected HEADERS frame");
        };
        let spec = frame.priority.unwrap();
        assert!(spec.exclusive);
        assert_eq!(spec.stream_dependency, 3);
        assert_eq!(spec.weight, 15);
        assert_eq!(&frame.header_block[..], b"abc");
    }

    #[test]
    fn test_decode_rst_stream() {
        let hdr = FrameHeader {
            length: 4,
            frame_type: FrameType::RstStream.as_u8(),
            flags: FrameFlags::empty(),
            stream_id: 7,
        };
        let payload = 0x8u32.to_be_bytes(); // CANCEL
        let Some(Frame::RstStream(frame)) = Frame::decode(&hdr, &payload).unwrap() else {
            panic!("expected RST_STREAM frame");
        };
        assert_eq!(frame.error_code, ErrorCode::Cancel);

        let bad = FrameHeader { length: 3, ..hdr };
        assert!(Frame::decode(&bad, &payload[..3]).is_err());
    }

    #[test]
    fn test_decode_window_update_masks_reserved() {
        let hdr = FrameHeader {
            length: 4,
            frame_type: FrameType::WindowUpdate.as_u8(),
            flags: FrameFlags::empty(),
            stream_id: 0,
        };
        let payload = 0x8000_0400u32.to_be_bytes();
        let Some(Frame::WindowUpdate(frame)) = Frame::decode(&hdr, &payload).unwrap() else {
            panic!("expected WINDOW_UPDATE frame");
        };
        assert_eq!(frame.size_increment, 0x400);
    }

    #[test]
    fn test_decode_unknown_type_skipped() {
        let hdr = FrameHeader {
            length: 3,
            frame_type: 0xEE,
            flags: FrameFlags::empty(),
            stream_id: 1,
        };
        assert!(Frame::decode(&hdr, b"xyz").unwrap().is_none());
    }

    #[test]
    fn test_decode_goaway() {
        let hdr = FrameHeader {
            length: 13,
            frame_type: FrameType::Goaway.as_u8(),
            flags: FrameFlags::empty(),
            stream_id: 0,
        };
        let mut payload = Vec::new();
        payload.extend_from_slice(&5u32.to_be_bytes());
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(b"debug");
        let Some(Frame::Goaway(frame)) = Frame::decode(&hdr, &payload).unwrap() else {
            panic!("expected GOAWAY frame");
        };
        assert_eq!(frame.last_stream_id, 5);
        assert_eq!(frame.error_code, ErrorCode::ProtocolError);
        assert_eq!(&frame.debug_data[..], b"debug");
    }
}
