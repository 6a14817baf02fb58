//! Header list handling
//!
//! HTTP/2 carries headers as an ordered list of (name, value) pairs with
//! lowercase names; pseudo-headers (names starting with `:`) carry the
//! request/response metadata and must precede all regular headers within a
//! block (RFC 7540 Section 8.1.2).

use crate::error::{Error, Result};

/// One header field
pub type Header = (String, String);

/// Ordered header list as decoded from (or encoded into) a header block
pub type HeaderList = Vec<Header>;

/// `:method` pseudo-header name
pub const PSEUDO_METHOD: &str = ":method";
/// `:scheme` pseudo-header name
pub const PSEUDO_SCHEME: &str = ":scheme";
/// `:path` pseudo-header name
pub const PSEUDO_PATH: &str = ":path";
/// `:authority` pseudo-header name
pub const PSEUDO_AUTHORITY: &str = ":authority";
/// `:status` pseudo-header name
pub const PSEUDO_STATUS: &str = ":status";

/// Check whether a header name is a pseudo-header
pub fn is_pseudo(name: &str) -> bool {
    name.starts_with(':')
}

/// Validate that pseudo-headers precede all regular headers.
///
/// A pseudo-header appearing after a regular header makes the block
/// malformed (RFC 7540 Section 8.1.2.1).
pub fn validate_pseudo_order(headers: &HeaderList) -> Result<()> {
    let mut seen_regular = false;
    for (name, _) in headers {
        if is_pseudo(name) {
            if seen_regular {
                return Err(Error::Protocol(format!(
                    "pseudo-header {} after regular headers",
                    name
                )));
            }
        } else {
            seen_regular = true;
        }
    }
    Ok(())
}

/// Join all `cookie` header entries with `"; "`.
///
/// HPACK encoders are allowed to split the cookie header into one entry per
/// cookie-pair; the application-visible value is the rejoined form
/// (RFC 7540 Section 8.1.2.5).
pub fn join_cookies(headers: &HeaderList) -> Option<String> {
    let mut joined = String::new();
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("cookie") {
            if !joined.is_empty() {
                joined.push_str("; ");
            }
            joined.push_str(value);
        }
    }
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Sum of name and value lengths across the list, used against the peer's
/// MAX_HEADER_LIST_SIZE advisory limit
pub fn list_size(headers: &HeaderList) -> usize {
    headers.iter().map(|(n, v)| n.len() + v.len()).sum()
}

/// First value for `name`, compared case-insensitively
pub fn get<'a>(headers: &'a HeaderList, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Body framing state derived from the message headers.
///
/// `content-length` decides whether a message has a body and bounds how
/// many bytes may be sent; `transfer-encoding: chunked` marks an unbounded
/// body but is absorbed rather than emitted, since HTTP/2 frames its own
/// bodies (RFC 7540 Section 8.1).
#[derive(Debug, Default, Clone)]
pub struct BodyFraming {
    /// A content-length header was seen
    pub has_content_length: bool,
    /// Declared body length
    pub content_length: u64,
    /// A chunked transfer-encoding was seen (and absorbed)
    pub is_chunked: bool,
}

impl BodyFraming {
    /// Fresh state with no framing headers observed
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one header; returns false when the header must be dropped
    /// from the emitted list (chunked transfer-encoding).
    pub fn observe(&mut self, name: &str, value: &str) -> bool {
        if name.eq_ignore_ascii_case("content-length") {
            if let Ok(n) = value.trim().parse() {
                self.has_content_length = true;
                self.content_length = n;
            }
            true
        } else if name.eq_ignore_ascii_case("transfer-encoding")
            && value.eq_ignore_ascii_case("chunked")
        {
            self.is_chunked = true;
            false
        } else {
            true
        }
    }

    /// Whether the message carries a body at all
    pub fn has_body(&self) -> bool {
        self.is_chunked || (self.has_content_length && self.content_length > 0)
    }
}
