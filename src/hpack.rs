//! HPACK collaborator wrapper
//!
//! Thin adapter over the `hpack` crate. The core treats header blocks as
//! opaque: encode turns a header list into a block, decode turns a complete
//! block back into a list. Any decode failure is a COMPRESSION_ERROR, which
//! is always connection-fatal.

use crate::error::{Error, Result};
use crate::headers::HeaderList;
use bytes::Bytes;
use hpack::{Decoder, Encoder};

/// Paired HPACK encoder/decoder for one connection.
///
/// Both directions keep dynamic-table state, so one codec must serve the
/// whole connection lifetime.
pub struct HpackCodec {
    encoder: Encoder<'static>,
    decoder: Decoder<'static>,
}

impl HpackCodec {
    /// Create a codec with default dynamic table sizes
    pub fn new() -> Self {
        HpackCodec {
            encoder: Encoder::new(),
            decoder: Decoder::new(),
        }
    }

    /// Bound the decoder's dynamic table (local HEADER_TABLE_SIZE setting)
    pub fn set_decoder_max_table_size(&mut self, size: usize) {
        self.decoder.set_max_table_size(size);
    }

    /// Encode a header list into an HPACK block
    pub fn encode(&mut self, headers: &HeaderList) -> Bytes {
        let tuples: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|(name, value)| (name.as_bytes(), value.as_bytes()))
            .collect();
        Bytes::from(self.encoder.encode(tuples))
    }

    /// Decode a complete HPACK block into a header list
    pub fn decode(&mut self, block: &[u8]) -> Result<HeaderList> {
        let entries = self
            .decoder
            .decode(block)
            .map_err(|e| Error::Compression(format!("HPACK decode error: {:?}", e)))?;
        entries
            .into_iter()
            .map(|(name, value)| {
                let name = String::from_utf8(name)
                    .map_err(|e| Error::Compression(format!("invalid header name: {}", e)))?;
                let value = String::from_utf8(value)
                    .map_err(|e| Error::Compression(format!("invalid header value: {}", e)))?;
                Ok((name, value))
            })
            .collect()
    }
}

impl Default for HpackCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(pairs: &[(&str, &str)]) -> HeaderList {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut codec = HpackCodec::new();
        let headers = list(&[
            (":method", "GET"),
            (":scheme", "https"),
            (":path", "/index.html"),
            (":authority", "example.com"),
            ("accept", "*/*"),
        ]);

        let block = codec.encode(&headers);
        let decoded = codec.decode(&block).unwrap();
        assert_eq!(decoded, headers);
    }

    #[test]
    fn test_state_survives_across_blocks() {
        let mut codec = HpackCodec::new();
        let first = list(&[(":status", "200"), ("x-custom", "indexed-value")]);
        let second = list(&[(":status", "200"), ("x-custom", "indexed-value")]);

        let block_a = codec.encode(&first);
        let block_b = codec.encode(&second);
        assert_eq!(codec.decode(&block_a).unwrap(), first);
        assert_eq!(codec.decode(&block_b).unwrap(), second);
    }

    #[test]
    fn test_decode_garbage_is_compression_error() {
        let mut codec = HpackCodec::new();
        let result = codec.decode(&[0x7f, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(Error::Compression(_))));
    }
}
