//! HTTP/2 error types
//!
//! The crate-level [`Error`] enum carries rich context for callers; when an
//! error has to go on the wire (GOAWAY or RST_STREAM) it is narrowed to an
//! RFC 7540 Section 7 [`ErrorCode`] through [`Error::h2_code`].

use std::fmt;

/// HTTP/2 errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from the transport collaborator
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error detected (RFC 7540 Section 7 - Error code 0x1)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Internal error (RFC 7540 Section 7 - Error code 0x2)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Flow control error (RFC 7540 Section 7 - Error code 0x3)
    #[error("Flow control error: {0}")]
    FlowControl(String),

    /// Frame received for closed stream (RFC 7540 Section 7 - Error code 0x5)
    #[error("Stream closed: {0}")]
    StreamClosed(u32),

    /// Frame size error (RFC 7540 Section 7 - Error code 0x6)
    #[error("Frame size error: {0}")]
    FrameSize(String),

    /// Refused stream (RFC 7540 Section 7 - Error code 0x7)
    #[error("Refused stream: {0}")]
    RefusedStream(u32),

    /// Stream cancelled (RFC 7540 Section 7 - Error code 0x8)
    #[error("Stream cancelled: {0}")]
    Cancel(u32),

    /// Compression error (RFC 7540 Section 7 - Error code 0x9)
    #[error("Compression error: {0}")]
    Compression(String),

    /// Invalid stream ID
    #[error("Invalid stream ID: {0}")]
    InvalidStreamId(u32),

    /// Stream not found
    #[error("Stream not found: {0}")]
    StreamNotFound(u32),

    /// Too many streams
    #[error("Too many concurrent streams")]
    TooManyStreams,

    /// Invalid settings value
    #[error("Invalid settings value: {0}")]
    InvalidSettings(String),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection is shutting down; no new streams may be opened
    #[error("Connection is going away")]
    GoingAway,

    /// Invalid request URI
    #[error("Invalid URI: {0}")]
    InvalidUri(String),
}

impl Error {
    /// Map this error to the RFC 7540 error code carried on the wire
    /// (GOAWAY or RST_STREAM).
    pub fn h2_code(&self) -> ErrorCode {
        match self {
            Error::Protocol(_) | Error::InvalidStreamId(_) | Error::InvalidSettings(_) => {
                ErrorCode::ProtocolError
            }
            Error::FlowControl(_) => ErrorCode::FlowControlError,
            Error::StreamClosed(_) => ErrorCode::StreamClosed,
            Error::FrameSize(_) => ErrorCode::FrameSizeError,
            Error::RefusedStream(_) => ErrorCode::RefusedStream,
            Error::Cancel(_) => ErrorCode::Cancel,
            Error::Compression(_) => ErrorCode::CompressionError,
            _ => ErrorCode::InternalError,
        }
    }
}

/// Wire error codes of RFC 7540 Section 7.
///
/// The codes are a dense range (0x0..=0xd), so conversions are driven by
/// one table in wire order rather than per-code match arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    /// Shutdown with nothing wrong (0x0)
    NoError = 0x0,
    /// Violation of the HTTP/2 protocol (0x1)
    ProtocolError = 0x1,
    /// Unexpected fault at the endpoint itself (0x2)
    InternalError = 0x2,
    /// Flow-control windows were not respected (0x3)
    FlowControlError = 0x3,
    /// A SETTINGS frame went unacknowledged (0x4)
    SettingsTimeout = 0x4,
    /// Frame arrived on a stream already half-closed (0x5)
    StreamClosed = 0x5,
    /// Frame length outside what the type permits (0x6)
    FrameSizeError = 0x6,
    /// Stream turned away before any processing happened (0x7)
    RefusedStream = 0x7,
    /// Stream no longer wanted by the sender (0x8)
    Cancel = 0x8,
    /// Header compression state can no longer be kept in sync (0x9)
    CompressionError = 0x9,
    /// The connection behind a CONNECT request failed (0xa)
    ConnectError = 0xa,
    /// Peer is generating excessive load (0xb)
    EnhanceYourCalm = 0xb,
    /// Transport security properties are insufficient (0xc)
    InadequateSecurity = 0xc,
    /// Request belongs on HTTP/1.1 instead (0xd)
    Http11Required = 0xd,
}

/// Every code in wire order; index i holds the code with value i
const WIRE_ORDER: [(ErrorCode, &str); 14] = [
    (ErrorCode::NoError, "NO_ERROR"),
    (ErrorCode::ProtocolError, "PROTOCOL_ERROR"),
    (ErrorCode::InternalError, "INTERNAL_ERROR"),
    (ErrorCode::FlowControlError, "FLOW_CONTROL_ERROR"),
    (ErrorCode::SettingsTimeout, "SETTINGS_TIMEOUT"),
    (ErrorCode::StreamClosed, "STREAM_CLOSED"),
    (ErrorCode::FrameSizeError, "FRAME_SIZE_ERROR"),
    (ErrorCode::RefusedStream, "REFUSED_STREAM"),
    (ErrorCode::Cancel, "CANCEL"),
    (ErrorCode::CompressionError, "COMPRESSION_ERROR"),
    (ErrorCode::ConnectError, "CONNECT_ERROR"),
    (ErrorCode::EnhanceYourCalm, "ENHANCE_YOUR_CALM"),
    (ErrorCode::InadequateSecurity, "INADEQUATE_SECURITY"),
    (ErrorCode::Http11Required, "HTTP_1_1_REQUIRED"),
];

impl ErrorCode {
    /// The 32-bit value carried in GOAWAY and RST_STREAM payloads
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Look up a wire value; codes beyond the table are unknown
    pub fn from_u32(code: u32) -> Option<Self> {
        WIRE_ORDER.get(code as usize).map(|&(c, _)| c)
    }

    /// The RFC's name for this code
    pub fn name(self) -> &'static str {
        WIRE_ORDER[self as usize].1
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameCodec;
    use crate::frames::{Frame, FrameFlags, FrameHeader, FrameType, GoawayFrame};
    use bytes::{Bytes, BytesMut};

    #[test]
    fn wire_table_is_in_wire_order() {
        for (index, (code, name)) in WIRE_ORDER.iter().enumerate() {
            assert_eq!(code.as_u32() as usize, index);
            assert_eq!(code.name(), *name);
            assert_eq!(ErrorCode::from_u32(index as u32), Some(*code));
        }
        assert_eq!(ErrorCode::from_u32(WIRE_ORDER.len() as u32), None);
        assert_eq!(ErrorCode::from_u32(u32::MAX), None);
    }

    #[test]
    fn wire_code_mapping_round_trips() {
        let cases = [
            (Error::Protocol("bad pseudo order".to_string()), ErrorCode::ProtocolError),
            (Error::InvalidSettings("push flag".to_string()), ErrorCode::ProtocolError),
            (Error::FlowControl("window overflow".to_string()), ErrorCode::FlowControlError),
            (Error::FrameSize("runt RST_STREAM".to_string()), ErrorCode::FrameSizeError),
            (Error::Compression("table desync".to_string()), ErrorCode::CompressionError),
            (Error::StreamClosed(9), ErrorCode::StreamClosed),
            (Error::RefusedStream(11), ErrorCode::RefusedStream),
            (Error::Cancel(13), ErrorCode::Cancel),
            (Error::ConnectionClosed, ErrorCode::InternalError),
            (Error::GoingAway, ErrorCode::InternalError),
        ];
        for (err, expected) in cases {
            let code = err.h2_code();
            assert_eq!(code, expected, "{err}");
            // What we put on the wire reads back as the same code
            assert_eq!(ErrorCode::from_u32(code.as_u32()), Some(code));
        }
    }

    #[test]
    fn goaway_carries_the_mapped_code_on_the_wire() {
        let err = Error::Compression("dynamic table desync".to_string());
        let frame = GoawayFrame::new(7, err.h2_code(), Bytes::new());
        let mut buf = BytesMut::new();
        FrameCodec::encode_goaway_frame(&frame, &mut buf);

        let mut raw = [0u8; 9];
        raw.copy_from_slice(&buf[..9]);
        let hdr = FrameHeader::decode(&raw);
        let Some(Frame::Goaway(decoded)) = Frame::decode(&hdr, &buf[9..]).unwrap() else {
            panic!("expected GOAWAY frame");
        };
        assert_eq!(decoded.error_code, ErrorCode::CompressionError);
        assert_eq!(decoded.last_stream_id, 7);
    }

    #[test]
    fn unknown_wire_code_degrades_to_internal_error() {
        // An RST_STREAM with a code past the RFC table must not be rejected
        let hdr = FrameHeader {
            length: 4,
            frame_type: FrameType::RstStream.as_u8(),
            flags: FrameFlags::empty(),
            stream_id: 5,
        };
        let payload = 0x4fu32.to_be_bytes();
        let Some(Frame::RstStream(frame)) = Frame::decode(&hdr, &payload).unwrap() else {
            panic!("expected RST_STREAM frame");
        };
        assert_eq!(frame.error_code, ErrorCode::InternalError);
    }

    #[test]
    fn display_uses_rfc_names() {
        assert_eq!(ErrorCode::EnhanceYourCalm.to_string(), "ENHANCE_YOUR_CALM");
        assert_eq!(ErrorCode::Http11Required.to_string(), "HTTP_1_1_REQUIRED");
        assert_eq!(
            Error::GoingAway.h2_code().to_string(),
            "INTERNAL_ERROR"
        );
    }
}
