//! Request side of the HTTP message mapping
//!
//! [`H2Request`] turns a method + URL + headers into the pseudo-header
//! block of RFC 7540 Section 8.1.2.3, drives the body out under flow
//! control, and reassembles the response (status, headers with cookie
//! entries rejoined, body) from the stream callbacks.

use crate::connection::H2Connection;
use crate::error::{Error, ErrorCode, Result};
use crate::headers::{
    self, BodyFraming, HeaderList, PSEUDO_AUTHORITY, PSEUDO_METHOD, PSEUDO_PATH, PSEUDO_SCHEME,
    PSEUDO_STATUS,
};
use crate::stream::StreamId;
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("h2mux/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Init,
    SendingBody,
    ReceivingResponse,
    Complete,
}

#[derive(Default)]
struct ResponseParts {
    status_code: u16,
    headers: HeaderList,
    body: BytesMut,
    complete: bool,
    reset: Option<ErrorCode>,
    write_ready: bool,
}

/// One outgoing HTTP/2 request and its incoming response
pub struct H2Request {
    method: String,
    url: Url,
    headers: HeaderList,
    framing: BodyFraming,
    body_bytes_sent: u64,
    stream_id: Option<StreamId>,
    state: RequestState,
    rsp: Rc<RefCell<ResponseParts>>,
}

impl H2Request {
    /// Create a request for `method` on an absolute URL
    pub fn new(method: &str, url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUri(format!("{}: {}", url, e)))?;
        if url.host_str().is_none() {
            return Err(Error::InvalidUri(format!("URL has no host: {}", url)));
        }
        Ok(H2Request {
            method: method.to_uppercase(),
            url,
            headers: HeaderList::new(),
            framing: BodyFraming::new(),
            body_bytes_sent: 0,
            stream_id: None,
            state: RequestState::Init,
            rsp: Rc::new(RefCell::new(ResponseParts::default())),
        })
    }

    /// Add a request header. Names are lowercased; a chunked
    /// transfer-encoding is absorbed since HTTP/2 frames its own bodies.
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

    fn has_header(&self, name: &str) -> bool {
        headers::get(&self.headers, name).is_some()
    }

    /// Fill in the headers any ordinary client request carries
    fn check_headers(&mut self) {
        if !self.has_header("accept") {
            self.add_header("accept", "*/*");
        }
        if !self.has_header("content-type") {
            self.add_header("content-type", "application/octet-stream");
        }
        if !self.has_header("user-agent") {
            self.add_header("user-agent", USER_AGENT);
        }
        if !self.has_header("cache-control") {
            self.add_header("cache-control", "no-cache");
        }
        if !self.has_header("pragma") {
            self.add_header("pragma", "no-cache");
        }
    }

    /// Pseudo-headers first, then the regular headers.
    ///
    /// `:path` carries path, query, and fragment composed in order.
    fn build_header_list(&self) -> HeaderList {
        let mut list = HeaderList::with_capacity(self.headers.len() + 4);
        list.push((PSEUDO_METHOD.to_string(), self.method.clone()));
        list.push((PSEUDO_SCHEME.to_string(), self.url.scheme().to_string()));

        let mut path = self.url.path().to_string();
        if let Some(query) = self.url.query() {
            path.push('?');
            path.push_str(query);
        }
        if let Some(fragment) = self.url.fragment() {
            path.push('#');
            path.push_str(fragment);
        }
        list.push((PSEUDO_PATH.to_string(), path));

        let host = self.url.host_str().unwrap_or_default();
        list.push((PSEUDO_AUTHORITY.to_string(), host.to_string()));

        list.extend(self.headers.iter().cloned());
        list
    }

    /// Open a stream and send the request headers. A request without a
    /// body (no content-length, not chunked) ends the stream immediately.
    pub fn send<T: Transport>(&mut self, conn: &mut H2Connection<T>) -> Result<()> {
        if self.state != RequestState::Init {
            return Err(Error::Internal("request already sent".to_string()));
        }
        self.check_headers();

        let id = conn.open_stream()?;
        self.stream_id = Some(id);
        debug!(stream = id, method = %self.method, "sending request");
        let Some(stream) = conn.stream_mut(id) else {
            return Err(Error::StreamNotFound(id));
        };

        let rsp = self.rsp.clone();
        stream.set_headers_callback(Box::new(move |list, _end_headers, end_stream| {
            let mut rsp = rsp.borrow_mut();
            match list.first() {
                Some((name, value)) if name == PSEUDO_STATUS => {
                    rsp.status_code = value.parse().unwrap_or(0);
                    for (name, value) in &list[1..] {
                        if !name.eq_ignore_ascii_case("cookie") && !headers::is_pseudo(name) {
                            rsp.headers.push((name.clone(), value.clone()));
                        }
                    }
                    if let Some(cookie) = headers::join_cookies(list) {
                        rsp.headers.push(("cookie".to_string(), cookie));
                    }
                }
                Some(_) => {
                    // Trailer block: plain headers appended after the body
                    for (name, value) in list {
                        if !headers::is_pseudo(name) {
                            rsp.headers.push((name.clone(), value.clone()));
                        }
                    }
                }
                None => {}
            }
            if end_stream {
                rsp.complete = true;
            }
        }));

        let rsp = self.rsp.clone();
        stream.set_data_callback(Box::new(move |data, end_stream| {
            let mut rsp = rsp.borrow_mut();
            rsp.body.extend_from_slice(data);
            if end_stream {
                rsp.complete = true;
            }
        }));

        let rsp = self.rsp.clone();
        stream.set_reset_callback(Box::new(move |code| {
            rsp.borrow_mut().reset = Some(code);
        }));

        let rsp = self.rsp.clone();
        stream.set_write_callback(Box::new(move |_writer| {
            rsp.borrow_mut().write_ready = true;
        }));

        let list = self.build_header_list();
        let end_stream = !self.framing.has_body();
        conn.send_headers(id, &list, end_stream)?;
        self.state = if end_stream {
            RequestState::ReceivingResponse
        } else {
            RequestState::SendingBody
        };
        Ok(())
    }

    /// Send body bytes, bounded by the declared content-length.
    ///
    /// Returns the count accepted (zero when flow control blocked the
    /// stream; retry once `take_write_ready` reports the wake-up). The
    /// END_STREAM frame goes out by itself once the declared length has
    /// been sent.
    pub fn send_data<T: Transport>(
        &mut self,
        conn: &mut H2Connection<T>,
        data: &[u8],
    ) -> Result<usize> {
        if self.state != RequestState::SendingBody {
            return Ok(0);
        }
        let Some(id) = self.stream_id else {
            return Ok(0);
        };

        let mut send_len = data.len() as u64;
        if self.framing.has_content_length
            && self.body_bytes_sent + send_len > self.framing.content_length
        {
            send_len = self.framing.content_length - self.body_bytes_sent;
        }
        // The chunk that completes the declared length carries END_STREAM
        let completes = self.framing.has_content_length
            && self.body_bytes_sent + send_len == self.framing.content_length;
        let sent = conn.send_data(id, &data[..send_len as usize], completes)?;
        self.body_bytes_sent += sent as u64;

        if completes && sent as u64 == send_len {
            self.state = RequestState::ReceivingResponse;
        }
        Ok(sent)
    }

    /// End the body early (chunked-style bodies with no declared length)
    pub fn finish_body<T: Transport>(&mut self, conn: &mut H2Connection<T>) -> Result<()> {
        if self.state != RequestState::SendingBody {
            return Ok(());
        }
        if let Some(id) = self.stream_id {
            conn.send_data(id, &[], true)?;
        }
        self.state = RequestState::ReceivingResponse;
        Ok(())
    }

    /// Cancel the request's stream
    pub fn close<T: Transport>(&mut self, conn: &mut H2Connection<T>) -> Result<()> {
        self.state = RequestState::Complete;
        match self.stream_id.take() {
            Some(id) => conn.close_stream(id),
            None => Ok(()),
        }
    }

    /// Stream carrying this request, once sent
    pub fn stream_id(&self) -> Option<StreamId> {
        self.stream_id
    }

    /// Response status code (0 until response headers arrive)
    pub fn status_code(&self) -> u16 {
        self.rsp.borrow().status_code
    }

    /// First response header matching `name`
    pub fn header_value(&self, name: &str) -> Option<String> {
        headers::get(&self.rsp.borrow().headers, name).map(str::to_string)
    }

    /// Visit every response header in arrival order
    pub fn for_each_header(&self, mut cb: impl FnMut(&str, &str)) {
        for (name, value) in self.rsp.borrow().headers.iter() {
            cb(name, value);
        }
    }

    /// Response body received so far
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.rsp.borrow().body)
    }

    /// Whether the response has fully arrived (END_STREAM observed)
    pub fn is_complete(&self) -> bool {
        self.rsp.borrow().complete
    }

    /// Reset code if the stream died
    pub fn reset_error(&self) -> Option<ErrorCode> {
        self.rsp.borrow().reset
    }

    /// Consume a pending write-ready wake-up
    pub fn take_write_ready(&self) -> bool {
        let mut rsp = self.rsp.borrow_mut();
        std::mem::take(&mut rsp.write_ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_composition() {
        let req = H2Request::new("GET", "https://example.com/a/b?x=1&y=2#frag").unwrap();
        let list = req.build_header_list();
        assert_eq!(list[0], (":method".to_string(), "GET".to_string()));
        assert_eq!(list[1], (":scheme".to_string(), "https".to_string()));
        assert_eq!(list[2], (":path".to_string(), "/a/b?x=1&y=2#frag".to_string()));
        assert_eq!(list[3], (":authority".to_string(), "example.com".to_string()));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(H2Request::new("GET", "not a url").is_err());
        assert!(H2Request::new("GET", "data:text/plain,hi").is_err());
    }

    #[test]
    fn test_header_names_lowercased() {
        let mut req = H2Request::new("GET", "https://h/").unwrap();
        req.add_header("X-Custom-Header", "V");
        assert_eq!(headers::get(&req.headers, "x-custom-header"), Some("V"));
    }

    #[test]
    fn test_chunked_transfer_encoding_absorbed() {
        let mut req = H2Request::new("POST", "https://h/upload").unwrap();
        req.add_header("Transfer-Encoding", "chunked");
        assert!(req.framing.is_chunked);
        assert!(headers::get(&req.headers, "transfer-encoding").is_none());
        assert!(req.framing.has_body());
    }

    #[test]
    fn test_content_length_tracked() {
        let mut req = H2Request::new("POST", "https://h/upload").unwrap();
        req.add_header("Content-Length", "1024");
        assert!(req.framing.has_content_length);
        assert_eq!(req.framing.content_length, 1024);
        assert!(req.framing.has_body());
    }

    #[test]
    fn test_default_headers_added_once() {
        let mut req = H2Request::new("GET", "https://h/").unwrap();
        req.add_header("accept", "text/html");
        req.check_headers();
        let accepts: Vec<_> = req
            .headers
            .iter()
            .filter(|(n, _)| n == "accept")
            .collect();
        assert_eq!(accepts.len(), 1);
        assert_eq!(accepts[0].1, "text/html");
        assert!(req.has_header("user-agent"));
        assert!(req.has_header("cache-control"));
    }
}
