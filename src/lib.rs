//! h2mux - per-connection HTTP/2 multiplexer core
//!
//! This crate implements the hard middle of an HTTP/2 endpoint: the frame
//! codec, the per-stream state machine, stream- and connection-level flow
//! control, and the connection dispatcher that ties them together
//! (RFC 7540). Transport I/O, TLS/ALPN, and connection pooling live in
//! collaborators behind the [`transport::Transport`] trait; HPACK is
//! consumed as an opaque encoder/decoder pair.
//!
//! # Architecture
//!
//! - [`codec::FrameParser`] reassembles frames from arbitrarily chunked
//!   reads and [`codec::FrameCodec`] encodes them.
//! - [`flow_control::FlowController`] owns one window pair and the
//!   WINDOW_UPDATE credit-return arithmetic.
//! - [`stream::H2Stream`] enforces frame legality per stream state and
//!   surfaces events through callbacks.
//! - [`connection::H2Connection`] multiplexes: settings handshake, header
//!   block coalescing, blocked-stream wake-ups, GOAWAY.
//! - [`client::H2Request`] / [`server::H2Response`] map HTTP messages onto
//!   streams (pseudo-headers, trailers, cookie joining).
//!
//! # Example
//!
//! ```no_run
//! use h2mux::connection::{H2Connection, Side};
//! use h2mux::settings::SettingsBuilder;
//! use h2mux::transport::BufferTransport;
//!
//! # fn main() -> h2mux::Result<()> {
//! let settings = SettingsBuilder::new()
//!     .enable_push(false)
//!     .initial_window_size(65535)
//!     .build()?;
//! let mut conn = H2Connection::new(BufferTransport::new(), Side::Client, settings)?;
//!
//! let stream_id = conn.open_stream()?;
//! let headers = vec![
//!     (":method".to_string(), "GET".to_string()),
//!     (":scheme".to_string(), "https".to_string()),
//!     (":path".to_string(), "/".to_string()),
//!     (":authority".to_string(), "example.com".to_string()),
//! ];
//! conn.send_headers(stream_id, &headers, true)?;
//!
//! // feed inbound bytes from the transport:
//! // conn.on_bytes(&bytes)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod flow_control;
pub mod frames;
pub mod headers;
pub mod hpack;
pub mod server;
pub mod settings;
pub mod stream;
pub mod transport;

pub use client::H2Request;
pub use connection::{H2Connection, Side};
pub use error::{Error, ErrorCode, Result};
pub use frames::{Frame, FrameFlags, FrameHeader, FrameType};
pub use server::H2Response;
pub use settings::{Settings, SettingsBuilder};
pub use stream::{H2Stream, StreamId, StreamState, StreamWriter};

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Default header table size (4096 bytes)
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;
