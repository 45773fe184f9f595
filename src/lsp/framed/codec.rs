// Codec for LSP JSON RPC frame.
// Based on LanguageServerCodec from [tower-lsp](https://github.com/ebkalderon/tower-lsp).
// Copyright (c) 2020 Eyal Kalderon. MIT License.

use std::{
    io::{Error as IoError, Write},
    str::{self, Utf8Error},
};

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

use super::parser::{self, Frame};

pub fn reader<R: AsyncRead>(inner: R) -> FramedRead<R, LspFrameCodec> {
    FramedRead::new(inner, LspFrameCodec::default())
}

pub fn writer<W: AsyncWrite>(inner: W) -> FramedWrite<W, LspFrameCodec> {
    FramedWrite::new(inner, LspFrameCodec::default())
}

/// Errors from LspFrameCodec.
///
/// None of these are recoverable. The stream is left where the error was found
/// and the connection should be dropped.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame lacks the required `Content-Length` header.
    #[error("missing required `Content-Length` header")]
    MissingHeader,
    /// The length value in the `Content-Length` header is invalid.
    #[error("unable to parse content length")]
    InvalidLength,
    /// The media type in the `Content-Type` header is invalid.
    #[error("unable to parse content type")]
    InvalidType,
    /// The frame contains invalid UTF8.
    #[error("frame contains invalid UTF8: {0}")]
    Utf8(#[from] Utf8Error),
    /// Failed to read or write, or the stream ended inside a frame.
    #[error("io error: {0}")]
    Io(#[from] IoError),
}

#[derive(Clone, Debug, Default)]
pub struct LspFrameCodec {
    // Size of the frame being received once its header is known.
    remaining_bytes: usize,
}

impl Encoder<String> for LspFrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if !item.is_empty() {
            // `Content-Length: ` + `\r\n\r\n` = 20
            dst.reserve(item.len() + number_of_digits(item.len()) + 20);
            let mut writer = dst.writer();
            write!(writer, "Content-Length: {}\r\n\r\n{}", item.len(), item)?;
            writer.flush()?;
        }
        Ok(())
    }
}

impl Decoder for LspFrameCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.remaining_bytes > src.len() {
                return Ok(None);
            }

            match parser::parse_message(src)? {
                Frame::Complete { body, rest } => {
                    let message = str::from_utf8(body)?.to_string();
                    let len = src.len() - rest.len();
                    src.advance(len);
                    self.remaining_bytes = 0;
                    // Skip empty frame and try the next one already buffered
                    if !message.is_empty() {
                        return Ok(Some(message));
                    }
                }

                Frame::Partial { needed } => {
                    self.remaining_bytes = needed;
                    return Ok(None);
                }
            }
        }
    }
}

#[inline]
fn number_of_digits(mut n: usize) -> usize {
    let mut num_digits = 0;
    while n > 0 {
        n /= 10;
        num_digits += 1;
    }
    num_digits
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    fn frame(body: &str) -> String {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body)
    }

    // Feed `stream` in chunks of `size` bytes, draining the decoder after each chunk.
    fn decode_in_chunks(stream: &[u8], size: usize) -> Vec<String> {
        let mut codec = LspFrameCodec::default();
        let mut buffer = BytesMut::new();
        let mut messages = Vec::new();
        for chunk in stream.chunks(size) {
            buffer.extend_from_slice(chunk);
            while let Some(message) = codec.decode(&mut buffer).unwrap() {
                messages.push(message);
            }
        }
        assert!(buffer.is_empty());
        messages
    }

    #[test]
    fn encode_and_decode() {
        let decoded = r#"{"jsonrpc":"2.0","method":"exit"}"#.to_string();
        let encoded = frame(&decoded);

        let mut codec = LspFrameCodec::default();
        let mut buffer = BytesMut::new();
        codec.encode(decoded.clone(), &mut buffer).unwrap();
        assert_eq!(buffer, BytesMut::from(encoded.as_str()));

        let mut buffer = BytesMut::from(encoded.as_str());
        let message = codec.decode(&mut buffer).unwrap();
        assert_eq!(message, Some(decoded));
    }

    #[test]
    fn encodes_byte_length_of_multibyte_body() {
        let decoded = r#"{"message":"héllo ✓"}"#.to_string();
        let mut codec = LspFrameCodec::default();
        let mut buffer = BytesMut::new();
        codec.encode(decoded.clone(), &mut buffer).unwrap();
        let expected = format!("Content-Length: {}\r\n\r\n{}", decoded.as_bytes().len(), decoded);
        assert_eq!(buffer, BytesMut::from(expected.as_str()));
        assert_ne!(decoded.chars().count(), decoded.as_bytes().len());
    }

    #[test]
    fn skips_encoding_empty_message() {
        let mut codec = LspFrameCodec::default();
        let mut buffer = BytesMut::new();
        codec.encode("".to_string(), &mut buffer).unwrap();
        assert_eq!(buffer, BytesMut::new());
    }

    #[test]
    fn decodes_optional_content_type() {
        let decoded = r#"{"jsonrpc":"2.0","method":"exit"}"#.to_string();
        let content_len = format!("Content-Length: {}", decoded.len());
        let content_type = "Content-Type: application/vscode-jsonrpc; charset=utf-8".to_string();
        let encoded = format!("{}\r\n{}\r\n\r\n{}", content_len, content_type, decoded);

        let mut codec = LspFrameCodec::default();
        let mut buffer = BytesMut::from(encoded.as_str());
        let message = codec.decode(&mut buffer).unwrap();
        assert_eq!(message, Some(decoded));
    }

    #[test]
    fn decodes_independent_of_chunk_boundaries() {
        let bodies = vec![
            r#"{"jsonrpc":"2.0","id":0,"result":{"capabilities":{}}}"#.to_string(),
            r#"{"jsonrpc":"2.0","method":"window/logMessage","params":{"message":"ünïcödé"}}"#
                .to_string(),
            r#"{"jsonrpc":"2.0","id":7,"method":"workspace/configuration","params":{}}"#
                .to_string(),
        ];
        let stream: String = bodies.iter().map(|b| frame(b)).collect();
        let stream = stream.as_bytes();

        let whole = decode_in_chunks(stream, stream.len());
        assert_eq!(whole, bodies);
        for size in 1..stream.len() {
            assert_eq!(decode_in_chunks(stream, size), whole, "chunk size {}", size);
        }
    }

    #[test]
    fn waits_for_full_body() {
        let decoded = r#"{"jsonrpc":"2.0","method":"exit"}"#;
        let encoded = frame(decoded);
        let (head, tail) = encoded.split_at(encoded.len() - 3);

        let mut codec = LspFrameCodec::default();
        let mut buffer = BytesMut::from(head);
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
        assert_eq!(buffer.len(), head.len());

        buffer.extend_from_slice(tail.as_bytes());
        assert_eq!(
            codec.decode(&mut buffer).unwrap(),
            Some(decoded.to_string())
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn skips_empty_frame_between_messages() {
        let decoded = r#"{"jsonrpc":"2.0","method":"exit"}"#;
        let encoded = format!("Content-Length: 0\r\n\r\n{}", frame(decoded));

        let mut codec = LspFrameCodec::default();
        let mut buffer = BytesMut::from(encoded.as_str());
        assert_eq!(
            codec.decode(&mut buffer).unwrap(),
            Some(decoded.to_string())
        );
    }

    #[test]
    fn fails_on_missing_header() {
        let decoded = r#"{"jsonrpc":"2.0","method":"exit"}"#;
        let mixed = format!("1234567890abcdefgh{}", frame(decoded));

        let mut codec = LspFrameCodec::default();
        let mut buffer = BytesMut::from(mixed.as_str());
        match codec.decode(&mut buffer) {
            Err(CodecError::MissingHeader) => {}
            other => panic!("expected `Err(CodecError::MissingHeader)`, got {:?}", other),
        }
    }

    #[test]
    fn fails_on_non_numeric_length() {
        let mut codec = LspFrameCodec::default();
        let mut buffer = BytesMut::from("Content-Length: abc\r\n\r\n{}");
        match codec.decode(&mut buffer) {
            Err(CodecError::InvalidLength) => {}
            other => panic!("expected `Err(CodecError::InvalidLength)`, got {:?}", other),
        }
    }

    #[test]
    fn fails_on_invalid_utf8() {
        let mut codec = LspFrameCodec::default();
        let mut buffer = BytesMut::from(&b"Content-Length: 2\r\n\r\n\xff\xfe"[..]);
        match codec.decode(&mut buffer) {
            Err(CodecError::Utf8(_)) => {}
            other => panic!("expected `Err(CodecError::Utf8)`, got {:?}", other),
        }
    }
}
