//! Response side of the HTTP message mapping
//!
//! [`H2Response`] attaches to a peer-opened stream (from the connection's
//! new-stream hook), captures the request's pseudo-headers and body, and
//! sends the response: `:status` plus headers, then the body under flow
//! control.

use crate::connection::H2Connection;
use crate::error::{Error, ErrorCode, Result};
use crate::headers::{
    self, BodyFraming, HeaderList, PSEUDO_AUTHORITY, PSEUDO_METHOD, PSEUDO_PATH, PSEUDO_SCHEME,
    PSEUDO_STATUS,
};
use crate::stream::{H2Stream, StreamId};
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseState {
    Receiving,
    SendingBody,
    Complete,
}

#[derive(Default)]
struct RequestParts {
    method: String,
    path: String,
    scheme: String,
    headers: HeaderList,
    body: BytesMut,
    complete: bool,
    reset: Option<ErrorCode>,
    write_ready: bool,
}

/// Server-side view of one stream: the peer's request and our response
pub struct H2Response {
    stream_id: StreamId,
    headers: HeaderList,
    framing: BodyFraming,
    body_bytes_sent: u64,
    state: ResponseState,
    req: Rc<RefCell<RequestParts>>,
}

/// Statuses that forbid a response body (RFC 7231): informational,
/// no-content, not-modified
fn status_allows_body(status_code: u16) -> bool {
    !((100..=199).contains(&status_code) || status_code == 204 || status_code == 304)
}

impl H2Response {
    /// Attach to a newly opened peer stream, installing the callbacks that
    /// capture the request. Call this from the connection's new-stream
    /// hook, before the opening header block is dispatched.
    pub fn attach(stream_id: StreamId, stream: &mut H2Stream) -> H2Response {
        let req = Rc::new(RefCell::new(RequestParts::default()));

        let parts = req.clone();
        stream.set_headers_callback(Box::new(move |list, _end_headers, end_stream| {
            let mut parts = parts.borrow_mut();
            for (name, value) in list {
                if name.is_empty() {
                    continue;
                }
                if headers::is_pseudo(name) {
                    if name == PSEUDO_METHOD {
                        parts.method = value.clone();
                    } else if name == PSEUDO_PATH {
                        parts.path = value.clone();
                    } else if name == PSEUDO_SCHEME {
                        parts.scheme = value.clone();
                    } else if name == PSEUDO_AUTHORITY {
                        parts.headers.push(("host".to_string(), value.clone()));
                    }
                } else if !name.eq_ignore_ascii_case("cookie") {
                    parts.headers.push((name.clone(), value.clone()));
                }
            }
            // Cookie entries may arrive split one pair per entry
            if let Some(cookie) = headers::join_cookies(list) {
                parts.headers.push(("cookie".to_string(), cookie));
            }
            if end_stream {
                parts.complete = true;
            }
        }));

        let parts = req.clone();
        stream.set_data_callback(Box::new(move |data, end_stream| {
            let mut parts = parts.borrow_mut();
            parts.body.extend_from_slice(data);
            if end_stream {
                parts.complete = true;
            }
        }));

        let parts = req.clone();
        stream.set_reset_callback(Box::new(move |code| {
            parts.borrow_mut().reset = Some(code);
        }));

        let parts = req.clone();
        stream.set_write_callback(Box::new(move |_writer| {
            parts.borrow_mut().write_ready = true;
        }));

        H2Response {
            stream_id,
            headers: HeaderList::new(),
            framing: BodyFraming::new(),
            body_bytes_sent: 0,
            state: ResponseState::Receiving,
            req,
        }
    }

    /// Add a response header. Names are lowercased; a chunked
    /// transfer-encoding is absorbed.
    pub fn add_header(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        if name.is_empty() {
            return;
        }
        if !self.framing.observe(&name, value) {
            return;
        }
        self.headers.push((name, value.to_string()));
    }

    /// Send the response headers.
    ///
    /// The stream ends at the headers frame for bodiless responses: a
    /// declared `content-length: 0`, or a status that forbids a body.
    pub fn send_response<T: Transport>(
        &mut self,
        conn: &mut H2Connection<T>,
        status_code: u16,
    ) -> Result<()> {
        debug!(stream = self.stream_id, status = status_code, "sending response");
        let mut list = HeaderList::with_capacity(self.headers.len() + 1);
        list.push((PSEUDO_STATUS.to_string(), status_code.to_string()));
        list.extend(self.headers.iter().cloned());

        let end_stream = (self.framing.has_content_length && self.framing.content_length == 0)
            || !status_allows_body(status_code);
        conn.send_headers(self.stream_id, &list, end_stream)?;
        self.state = if end_stream {
            ResponseState::Complete
        } else {
            ResponseState::SendingBody
        };
        Ok(())
    }

    /// Send response body bytes, bounded by the declared content-length;
    /// zero means flow control blocked the stream. END_STREAM goes out by
    /// itself once the declared length is reached.
    pub fn send_data<T: Transport>(
        &mut self,
        conn: &mut H2Connection<T>,
        data: &[u8],
    ) -> Result<usize> {
        if self.state != ResponseState::SendingBody {
            return Ok(0);
        }

        let mut send_len = data.len() as u64;
        if self.framing.has_content_length
            && self.body_bytes_sent + send_len > self.framing.content_length
        {
            send_len = self.framing.content_length - self.body_bytes_sent;
        }
        // The chunk that completes the declared length carries END_STREAM
        let completes = self.framing.has_content_length
            && self.body_bytes_sent + send_len == self.framing.content_length;
        let sent = conn.send_data(self.stream_id, &data[..send_len as usize], completes)?;
        self.body_bytes_sent += sent as u64;

        if completes && sent as u64 == send_len {
            self.state = ResponseState::Complete;
        }
        Ok(sent)
    }

    /// End the response body early (no declared length)
    pub fn finish_body<T: Transport>(&mut self, conn: &mut H2Connection<T>) -> Result<()> {
        if self.state != ResponseState::SendingBody {
            return Ok(());
        }
        conn.send_data(self.stream_id, &[], true)?;
        self.state = ResponseState::Complete;
        Ok(())
    }

    /// Send a trailer block after the body
    pub fn send_trailers<T: Transport>(
        &mut self,
        conn: &mut H2Connection<T>,
        trailers: &HeaderList,
    ) -> Result<()> {
        if self.state != ResponseState::SendingBody {
            return Err(Error::Internal(
                "trailers must follow an unfinished body".to_string(),
            ));
        }
        conn.send_headers(self.stream_id, trailers, true)?;
        self.state = ResponseState::Complete;
        Ok(())
    }

    /// Cancel the stream
    pub fn close<T: Transport>(&mut self, conn: &mut H2Connection<T>) -> Result<()> {
        self.state = ResponseState::Complete;
        conn.close_stream(self.stream_id)
    }

    /// Stream this exchange lives on
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Request method (`:method`)
    pub fn method(&self) -> String {
        self.req.borrow().method.clone()
    }

    /// Request path (`:path`)
    pub fn path(&self) -> String {
        self.req.borrow().path.clone()
    }

    /// Request scheme (`:scheme`)
    pub fn scheme(&self) -> String {
        self.req.borrow().scheme.clone()
    }

    /// First request header matching `name` (`:authority` appears as `host`)
    pub fn header_value(&self, name: &str) -> Option<String> {
        headers::get(&self.req.borrow().headers, name).map(str::to_string)
    }

    /// Visit every request header in arrival order
    pub fn for_each_header(&self, mut cb: impl FnMut(&str, &str)) {
        for (name, value) in self.req.borrow().headers.iter() {
            cb(name, value);
        }
    }

    /// Request body received so far
    pub fn request_body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.req.borrow().body)
    }

    /// Whether the request has fully arrived (END_STREAM observed)
    pub fn request_complete(&self) -> bool {
        self.req.borrow().complete
    }

    /// Reset code if the stream died
    pub fn reset_error(&self) -> Option<ErrorCode> {
        self.req.borrow().reset
    }

    /// Consume a pending write-ready wake-up
    pub fn take_write_ready(&self) -> bool {
        let mut req = self.req.borrow_mut();
        std::mem::take(&mut req.write_ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_allows_body() {
        assert!(status_allows_body(200));
        assert!(status_allows_body(404));
        assert!(!status_allows_body(100));
        assert!(!status_allows_body(101));
        assert!(!status_allows_body(204));
        assert!(!status_allows_body(304));
    }

    #[test]
    fn test_attach_captures_request() {
        let mut stream = crate::stream::H2Stream::new(1, 65535, 65535);
        let resp = H2Response::attach(1, &mut stream);

        // Drive the headers callback the way the connection would
        let list: HeaderList = vec![
            (":method".to_string(), "POST".to_string()),
            (":scheme".to_string(), "https".to_string()),
            (":path".to_string(), "/submit".to_string()),
            (":authority".to_string(), "example.com".to_string()),
            ("cookie".to_string(), "a=1".to_string()),
            ("cookie".to_string(), "b=2".to_string()),
            ("content-type".to_string(), "text/plain".to_string()),
        ];

        // Feed through a SendCtx-free path: invoke handle_headers directly
        let mut out = bytes::BytesMut::new();
        let mut flow = crate::flow_control::FlowController::new(65535, 65535);
        let mut blocked = std::collections::VecDeque::new();
        let mut hpack = crate::hpack::HpackCodec::new();
        let mut ctx = crate::stream::SendCtx {
            out: &mut out,
            conn_flow: &mut flow,
            blocked: &mut blocked,
            hpack: &mut hpack,
            max_frame_size: 16384,
        };
        stream.handle_headers(&mut ctx, &list, true, false);
        stream.handle_data(&mut ctx, b"hello", true);

        assert_eq!(resp.method(), "POST");
        assert_eq!(resp.path(), "/submit");
        assert_eq!(resp.scheme(), "https");
        assert_eq!(resp.header_value("host").as_deref(), Some("example.com"));
        assert_eq!(resp.header_value("cookie").as_deref(), Some("a=1; b=2"));
        assert_eq!(resp.header_value("content-type").as_deref(), Some("text/plain"));
        assert_eq!(&resp.request_body()[..], b"hello");
        assert!(resp.request_complete());
    }
}
