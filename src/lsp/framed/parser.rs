// Header parsing for LSP frames.
// Started from the parser in [tower-lsp](https://github.com/ebkalderon/tower-lsp).
// Copyright (c) 2020 Eyal Kalderon. MIT License.
// See codec.rs.

use std::str;

use nom::{
    bytes::streaming::{is_not, take},
    character::streaming::{char, crlf, space0},
    multi::many1,
    sequence::{pair, separated_pair, terminated},
    IResult,
};

use super::codec::CodecError;

/// Result of looking at the start of the buffer.
#[derive(Debug, PartialEq)]
pub enum Frame<'a> {
    /// A whole frame. `rest` is what follows it.
    Complete { body: &'a [u8], rest: &'a [u8] },
    /// More input is required. `needed` is the total length of the frame when
    /// the header is complete, `0` while still reading the header.
    Partial { needed: usize },
}

type Field<'a> = (&'a [u8], &'a [u8]);

// `Name: value\r\n`
fn header_field(input: &[u8]) -> IResult<&[u8], Field<'_>> {
    terminated(
        separated_pair(is_not(":\r\n"), pair(char(':'), space0), is_not("\r\n")),
        crlf,
    )(input)
}

// Header fields followed by an empty line.
fn header_block(input: &[u8]) -> IResult<&[u8], Vec<Field<'_>>> {
    terminated(many1(header_field), crlf)(input)
}

fn content_length(fields: &[Field<'_>]) -> Result<usize, CodecError> {
    let mut length = None;
    for (name, value) in fields {
        if name.eq_ignore_ascii_case(b"Content-Length") {
            let value = str::from_utf8(value).map_err(|_| CodecError::InvalidLength)?;
            length = Some(
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| CodecError::InvalidLength)?,
            );
        } else if name.eq_ignore_ascii_case(b"Content-Type") {
            check_content_type(value)?;
        }
    }
    length.ok_or(CodecError::MissingHeader)
}

// Only UTF-8 is supported. A missing charset means UTF-8.
fn check_content_type(value: &[u8]) -> Result<(), CodecError> {
    let value = str::from_utf8(value).map_err(|_| CodecError::InvalidType)?;
    let mut parts = value.split(';');
    if parts.next().map_or(true, |media| media.trim().is_empty()) {
        return Err(CodecError::InvalidType);
    }
    for param in parts {
        let param = param.trim();
        if let Some(charset) = param.strip_prefix("charset=") {
            if !charset.eq_ignore_ascii_case("utf-8") && !charset.eq_ignore_ascii_case("utf8") {
                return Err(CodecError::InvalidType);
            }
        }
    }
    Ok(())
}

/// Get JSON message from input using the Content-Length header.
pub fn parse_message(input: &[u8]) -> Result<Frame<'_>, CodecError> {
    let (body_start, fields) = match header_block(input) {
        Ok(parsed) => parsed,
        Err(nom::Err::Incomplete(_)) => return Ok(Frame::Partial { needed: 0 }),
        Err(_) => return Err(CodecError::MissingHeader),
    };

    let length = content_length(&fields)?;
    let header_len = input.len() - body_start.len();
    // The whole frame must be addressable.
    let needed = header_len
        .checked_add(length)
        .ok_or(CodecError::InvalidLength)?;
    match take::<_, _, nom::error::Error<&[u8]>>(length)(body_start) {
        Ok((rest, body)) => Ok(Frame::Complete { body, rest }),
        Err(_) => Ok(Frame::Partial { needed }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECODED: &str =
        r#"{"jsonrpc":"2.0","method":"initialize","id":1,"params":{"capabilities":{}}}"#;

    fn complete(body: &str) -> Frame<'_> {
        Frame::Complete {
            body: body.as_bytes(),
            rest: b"",
        }
    }

    #[test]
    fn test_parse_exact() {
        let sample = format!("Content-Length: {}\r\n\r\n{}", DECODED.len(), DECODED);
        assert_eq!(parse_message(sample.as_bytes()).unwrap(), complete(DECODED));
    }

    #[test]
    fn test_optional_content_type() {
        let content_type = "Content-Type: application/vscode-jsonrpc; charset=utf-8".to_string();
        let sample = format!(
            "Content-Length: {}\r\n{}\r\n\r\n{}",
            DECODED.len(),
            content_type,
            DECODED
        );
        assert_eq!(parse_message(sample.as_bytes()).unwrap(), complete(DECODED));
    }

    #[test]
    fn test_header_order_and_case() {
        let sample = format!(
            "content-type: application/vscode-jsonrpc; charset=utf8\r\ncontent-length:{}\r\n\r\n{}",
            DECODED.len(),
            DECODED
        );
        assert_eq!(parse_message(sample.as_bytes()).unwrap(), complete(DECODED));
    }

    #[test]
    fn test_leaves_following_bytes() {
        let sample = format!("Content-Length: {}\r\n\r\n{}Content", DECODED.len(), DECODED);
        assert_eq!(
            parse_message(sample.as_bytes()).unwrap(),
            Frame::Complete {
                body: DECODED.as_bytes(),
                rest: b"Content",
            }
        );
    }

    #[test]
    fn test_incomplete_header() {
        for partial in &["", "Content-Len", "Content-Length: 7", "Content-Length: 7\r\n"] {
            assert_eq!(
                parse_message(partial.as_bytes()).unwrap(),
                Frame::Partial { needed: 0 },
                "{:?}",
                partial
            );
        }
    }

    #[test]
    fn test_incomplete_body_reports_frame_size() {
        let header = format!("Content-Length: {}\r\n\r\n", DECODED.len());
        let needed = header.len() + DECODED.len();
        assert_eq!(
            parse_message(header.as_bytes()).unwrap(),
            Frame::Partial { needed }
        );
        assert_eq!(
            parse_message((header + "{").as_bytes()).unwrap(),
            Frame::Partial { needed }
        );
    }

    #[test]
    fn test_missing_length() {
        let sample = "Content-Type: application/vscode-jsonrpc\r\n\r\n{}";
        assert!(matches!(
            parse_message(sample.as_bytes()),
            Err(CodecError::MissingHeader)
        ));
    }

    #[test]
    fn test_invalid_length() {
        for sample in &["Content-Length: abc\r\n\r\n{}", "Content-Length: -2\r\n\r\n{}"] {
            assert!(matches!(
                parse_message(sample.as_bytes()),
                Err(CodecError::InvalidLength)
            ));
        }
    }

    #[test]
    fn test_length_overflowing_frame_size() {
        let sample = format!("Content-Length: {}\r\n\r\n", usize::MAX);
        assert!(matches!(
            parse_message(sample.as_bytes()),
            Err(CodecError::InvalidLength)
        ));

        // Fits on its own, but not together with the header.
        let sample = format!("Content-Length: {}\r\n\r\n{{}}", usize::MAX - 4);
        assert!(matches!(
            parse_message(sample.as_bytes()),
            Err(CodecError::InvalidLength)
        ));
    }

    #[test]
    fn test_invalid_charset() {
        let sample = "Content-Length: 2\r\nContent-Type: text/plain; charset=latin1\r\n\r\n{}";
        assert!(matches!(
            parse_message(sample.as_bytes()),
            Err(CodecError::InvalidType)
        ));
    }
}
