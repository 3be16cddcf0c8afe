//! Stream codecs for the relay's sockets
//!
//! Two decoders live here:
//! - [`JsonStreamDecoder`] turns a TCP byte stream into JSON values. Values may
//!   be newline-delimited, arrive one per read, or be packed back to back.
//! - [`PngSplitter`] turns a byte stream of concatenated PNG images into frames:
//!
//! ```text
//! [ 8 bytes: signature ]{ [ u32 BE: length ][ 4 bytes: type ][ N bytes: data ][ 4 bytes: CRC ] }... IEND
//! ```

use bytes::{Buf, Bytes, BytesMut};
use serde_json::Value;
use thiserror::Error;

use crate::limits::{MAX_JSON_MESSAGE_SIZE, MAX_PNG_CHUNK_SIZE};

/// PNG file signature
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Errors that can occur during decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Message too large: {0} bytes (max: {MAX_JSON_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Invalid PNG chunk length: {0}")]
    InvalidLength(u32),
}

/// Streaming JSON decoder
///
/// Errors consume the offending bytes, so calling `decode_next` again after an
/// error always makes progress.
#[derive(Debug, Default)]
pub struct JsonStreamDecoder {
    buffer: BytesMut,
}

impl JsonStreamDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(crate::limits::READ_BUFFER_SIZE),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next JSON value from the buffer
    ///
    /// Returns:
    /// - `Ok(Some(value))` if a complete value was decoded
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the next value is malformed; the bad line is discarded
    pub fn decode_next(&mut self) -> Result<Option<Value>, CodecError> {
        let (next, consumed) = {
            let mut stream = serde_json::Deserializer::from_slice(&self.buffer).into_iter::<Value>();
            let next = stream.next();
            (next, stream.byte_offset())
        };

        match next {
            Some(Ok(value)) => {
                self.buffer.advance(consumed);
                Ok(Some(value))
            }
            Some(Err(e)) if e.is_eof() => {
                if self.buffer.len() > MAX_JSON_MESSAGE_SIZE {
                    let len = self.buffer.len();
                    self.buffer.clear();
                    return Err(CodecError::MessageTooLarge(len));
                }
                Ok(None)
            }
            Some(Err(e)) => {
                self.discard_line(consumed);
                Err(CodecError::MalformedJson(e))
            }
            None => {
                // Only whitespace left
                self.buffer.clear();
                Ok(None)
            }
        }
    }

    /// Drop everything up to and including the first newline after the
    /// start of the failed value, or the whole buffer if there is none.
    fn discard_line(&mut self, from: usize) {
        let start = self.buffer[from..]
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map_or(self.buffer.len(), |p| from + p);

        match self.buffer[start..].iter().position(|b| *b == b'\n') {
            Some(pos) => self.buffer.advance(start + pos + 1),
            None => self.buffer.clear(),
        }
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Splits a byte stream of concatenated PNG images into individual frames
#[derive(Debug, Default)]
pub struct PngSplitter {
    buffer: BytesMut,
    /// Offset of the next unparsed chunk within the current image
    scanned: usize,
}

impl PngSplitter {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            scanned: 0,
        }
    }

    /// Add data to the splitter buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to split the next complete PNG image off the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete frames.
    /// Bytes before a PNG signature are skipped. After an error the splitter
    /// resynchronises on the next signature.
    pub fn decode_next(&mut self) -> Result<Option<Bytes>, CodecError> {
        if self.scanned == 0 {
            if !self.sync_to_signature() {
                return Ok(None);
            }
            self.scanned = PNG_SIGNATURE.len();
        }

        loop {
            let offset = self.scanned;
            if self.buffer.len() < offset + 8 {
                return Ok(None);
            }

            let len = u32::from_be_bytes([
                self.buffer[offset],
                self.buffer[offset + 1],
                self.buffer[offset + 2],
                self.buffer[offset + 3],
            ]);

            if len > MAX_PNG_CHUNK_SIZE {
                // Skip this signature so the next call searches for a new image
                self.buffer.advance(1);
                self.scanned = 0;
                return Err(CodecError::InvalidLength(len));
            }

            let end = offset + 12 + len as usize;
            if self.buffer.len() < end {
                return Ok(None);
            }

            let is_iend = &self.buffer[offset + 4..offset + 8] == b"IEND";
            self.scanned = end;

            if is_iend {
                let frame = self.buffer.split_to(end).freeze();
                self.scanned = 0;
                return Ok(Some(frame));
            }
        }
    }

    /// Advance the buffer to the next PNG signature. Returns false if none is buffered.
    fn sync_to_signature(&mut self) -> bool {
        match self
            .buffer
            .windows(PNG_SIGNATURE.len())
            .position(|w| w == PNG_SIGNATURE)
        {
            Some(pos) => {
                self.buffer.advance(pos);
                true
            }
            None => {
                // Keep a tail that could be the start of a split signature
                let keep = self.buffer.len().min(PNG_SIGNATURE.len() - 1);
                let drop = self.buffer.len() - keep;
                self.buffer.advance(drop);
                false
            }
        }
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use serde_json::json;

    fn chunk(buf: &mut BytesMut, kind: &[u8; 4], data: &[u8]) {
        buf.put_u32(data.len() as u32);
        buf.put_slice(kind);
        buf.put_slice(data);
        buf.put_u32(0); // CRC is not checked
    }

    fn create_test_png(marker: u8) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_slice(&PNG_SIGNATURE);
        chunk(&mut buf, b"IHDR", &[marker; 13]);
        chunk(&mut buf, b"IDAT", &[marker; 40]);
        chunk(&mut buf, b"IEND", &[]);
        buf.freeze()
    }

    fn drain_json(decoder: &mut JsonStreamDecoder) -> (Vec<Value>, usize) {
        let mut values = Vec::new();
        let mut errors = 0;
        loop {
            match decoder.decode_next() {
                Ok(Some(v)) => values.push(v),
                Ok(None) => break,
                Err(_) => errors += 1,
            }
        }
        (values, errors)
    }

    #[test]
    fn test_json_newline_delimited() {
        let mut decoder = JsonStreamDecoder::new();
        decoder.extend(b"{\"X\": 1}\n{\"Y\": -2}\n");

        let (values, errors) = drain_json(&mut decoder);
        assert_eq!(values, vec![json!({"X": 1}), json!({"Y": -2})]);
        assert_eq!(errors, 0);
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_json_chunk_without_newline() {
        let mut decoder = JsonStreamDecoder::new();
        decoder.extend(b"{\"T\": true}");

        let (values, _) = drain_json(&mut decoder);
        assert_eq!(values, vec![json!({"T": true})]);
    }

    #[test]
    fn test_json_back_to_back_values() {
        let mut decoder = JsonStreamDecoder::new();
        decoder.extend(b"{\"X\": 1}{\"L\": true}\"GET\"");

        let (values, _) = drain_json(&mut decoder);
        assert_eq!(values, vec![json!({"X": 1}), json!({"L": true}), json!("GET")]);
    }

    #[test]
    fn test_json_partial_value_waits_for_more() {
        let mut decoder = JsonStreamDecoder::new();
        decoder.extend(b"{\"X\": ");
        assert!(decoder.decode_next().expect("partial is not an error").is_none());
        assert_eq!(decoder.buffer_len(), 6);

        decoder.extend(b"0.5}\n");
        let value = decoder.decode_next().expect("decode error").expect("value");
        assert_eq!(value, json!({"X": 0.5}));
    }

    #[test]
    fn test_json_malformed_chunk_is_dropped() {
        let mut decoder = JsonStreamDecoder::new();
        decoder.extend(b"{not json");

        assert!(matches!(decoder.decode_next(), Err(CodecError::MalformedJson(_))));
        assert_eq!(decoder.buffer_len(), 0);

        decoder.extend(b"{\"X\": 1}");
        let (values, errors) = drain_json(&mut decoder);
        assert_eq!(values, vec![json!({"X": 1})]);
        assert_eq!(errors, 0);
    }

    #[test]
    fn test_json_malformed_line_resyncs_on_newline() {
        let mut decoder = JsonStreamDecoder::new();
        decoder.extend(b"{\"X\": 1}\n{not json}\n{\"Y\": 1}\n");

        let (values, errors) = drain_json(&mut decoder);
        assert_eq!(values, vec![json!({"X": 1}), json!({"Y": 1})]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_json_blank_lines_skipped() {
        let mut decoder = JsonStreamDecoder::new();
        decoder.extend(b"\n\r\n  \n{\"S\": 1}\n\n");

        let (values, errors) = drain_json(&mut decoder);
        assert_eq!(values, vec![json!({"S": 1})]);
        assert_eq!(errors, 0);
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_json_oversized_partial_value_dropped() {
        let mut decoder = JsonStreamDecoder::new();
        decoder.extend(b"[");
        decoder.extend(&vec![b' '; MAX_JSON_MESSAGE_SIZE + 1]);

        assert!(matches!(decoder.decode_next(), Err(CodecError::MessageTooLarge(_))));
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_png_split_multiple_frames() {
        let first = create_test_png(1);
        let second = create_test_png(2);

        let mut splitter = PngSplitter::new();
        splitter.extend(&first);
        splitter.extend(&second);

        assert_eq!(splitter.decode_next().expect("decode error"), Some(first));
        assert_eq!(splitter.decode_next().expect("decode error"), Some(second));
        assert!(splitter.decode_next().expect("decode error").is_none());
        assert_eq!(splitter.buffer_len(), 0);
    }

    #[test]
    fn test_png_partial_frame() {
        let png = create_test_png(7);
        let mut splitter = PngSplitter::new();

        // Feed data in small pieces, including a split signature
        for piece in png.chunks(5) {
            assert!(splitter.decode_next().expect("decode error").is_none());
            splitter.extend(piece);
        }

        assert_eq!(splitter.decode_next().expect("decode error"), Some(png));
    }

    #[test]
    fn test_png_skips_garbage_before_signature() {
        let png = create_test_png(3);
        let mut splitter = PngSplitter::new();
        splitter.extend(b"garbage bytes from a restarted encoder");
        splitter.extend(&png);

        assert_eq!(splitter.decode_next().expect("decode error"), Some(png));
    }

    #[test]
    fn test_png_invalid_chunk_length_resyncs() {
        let mut bad = BytesMut::new();
        bad.put_slice(&PNG_SIGNATURE);
        bad.put_u32(MAX_PNG_CHUNK_SIZE + 1);
        bad.put_slice(b"IDAT");

        let good = create_test_png(9);
        let mut splitter = PngSplitter::new();
        splitter.extend(&bad);
        splitter.extend(&good);

        assert!(matches!(splitter.decode_next(), Err(CodecError::InvalidLength(_))));
        assert_eq!(splitter.decode_next().expect("decode error"), Some(good));
    }
}
