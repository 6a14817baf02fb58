//! Transport collaborator interface
//!
//! The connection core never touches sockets or TLS; it hands outbound
//! bytes to a [`Transport`] and is fed inbound plaintext through
//! `H2Connection::on_bytes`. A transport may accept a write partially and
//! signal `would_block`, in which case the connection buffers the tail and
//! retries from `on_write_ready`.

use bytes::{Bytes, BytesMut};
use std::io;

/// Result of one transport write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Bytes accepted by the transport
    pub written: usize,
    /// True when the transport cannot accept more right now
    pub would_block: bool,
}

/// Byte-pipe abstraction over the real connection (TCP, TLS, in-memory)
pub trait Transport {
    /// Write bytes, possibly partially
    fn write(&mut self, buf: &[u8]) -> io::Result<WriteOutcome>;

    /// Close the underlying connection
    fn close(&mut self);
}

/// In-memory transport that accumulates written bytes.
///
/// An optional write quota simulates a full socket: writes beyond the quota
/// report `would_block` until more quota is granted. Used by the test suite
/// and handy for driving two connections against each other.
pub struct BufferTransport {
    written: BytesMut,
    quota: Option<usize>,
    closed: bool,
}

impl BufferTransport {
    /// Create a transport with unlimited write capacity
    pub fn new() -> Self {
        BufferTransport {
            written: BytesMut::new(),
            quota: None,
            closed: false,
        }
    }

    /// Create a transport that blocks after `quota` bytes
    pub fn with_quota(quota: usize) -> Self {
        BufferTransport {
            written: BytesMut::new(),
            quota: Some(quota),
            closed: false,
        }
    }

    /// Grant additional write quota
    pub fn add_quota(&mut self, n: usize) {
        if let Some(q) = &mut self.quota {
            *q += n;
        }
    }

    /// Take everything written so far
    pub fn take_written(&mut self) -> Bytes {
        self.written.split().freeze()
    }

    /// Bytes currently buffered
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for BufferTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for BufferTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<WriteOutcome> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "transport closed"));
        }
        let accept = match &mut self.quota {
            Some(q) => {
                let n = std::cmp::min(*q, buf.len());
                *q -= n;
                n
            }
            None => buf.len(),
        };
        self.written.extend_from_slice(&buf[..accept]);
        Ok(WriteOutcome {
            written: accept,
            would_block: accept < buf.len(),
        })
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_write() {
        let mut t = BufferTransport::new();
        let out = t.write(b"hello").unwrap();
        assert_eq!(out.written, 5);
        assert!(!out.would_block);
        assert_eq!(t.take_written(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_quota_blocks() {
        let mut t = BufferTransport::with_quota(3);
        let out = t.write(b"hello").unwrap();
        assert_eq!(out.written, 3);
        assert!(out.would_block);
        assert_eq!(t.written(), b"hel");

        t.add_quota(10);
        let out = t.write(b"lo").unwrap();
        assert_eq!(out.written, 2);
        assert!(!out.would_block);
        assert_eq!(t.take_written(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_write_after_close_fails() {
        let mut t = BufferTransport::new();
        t.close();
        assert!(t.write(b"x").is_err());
    }
}
