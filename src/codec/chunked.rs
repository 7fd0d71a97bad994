//! Chunked transfer-encoding.

use std::sync::OnceLock;

use bytes::{Buf, BufMut, BytesMut};

use super::{
    HttpCodec,
    decode::{DecodeState, Step, take_line},
    error::ParseError,
};
use crate::request::Request;

/// Position within a chunked body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(super) enum ChunkState {
    /// Expecting a hex size line.
    #[default]
    Size,
    /// Copying chunk data.
    Data { remaining: usize },
    /// Expecting the CRLF that closes a chunk.
    DataEnd,
    /// Skipping trailer lines up to the empty line.
    Trailers,
}

impl HttpCodec {
    pub(super) fn read_chunked(
        &self,
        mut request: Request,
        mut chunk: ChunkState,
        mut total: usize,
        src: &mut BytesMut,
    ) -> Result<Step, ParseError> {
        let limit = self.limits.max_line_length;
        let max = self.limits.max_body_size;
        loop {
            match chunk {
                ChunkState::Size => {
                    let Some(line) = take_line(src, limit)? else {
                        break;
                    };
                    let size = parse_chunk_size(&line)?;
                    if size == 0 {
                        chunk = ChunkState::Trailers;
                        continue;
                    }
                    total = total.saturating_add(size);
                    if total > max {
                        return Err(ParseError::BodyTooLarge {
                            size: u64::try_from(total).unwrap_or(u64::MAX),
                            max,
                        });
                    }
                    request.body.reserve(size);
                    chunk = ChunkState::Data { remaining: size };
                }
                ChunkState::Data { remaining } => {
                    let take = remaining.min(src.len());
                    if take == 0 {
                        break;
                    }
                    request.body.extend_from_slice(&src[..take]);
                    src.advance(take);
                    chunk = if take == remaining {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data {
                            remaining: remaining - take,
                        }
                    };
                }
                ChunkState::DataEnd => match src.first() {
                    None => break,
                    Some(b'\n') => {
                        src.advance(1);
                        chunk = ChunkState::Size;
                    }
                    Some(b'\r') => match src.get(1) {
                        None => break,
                        Some(b'\n') => {
                            src.advance(2);
                            chunk = ChunkState::Size;
                        }
                        Some(_) => return Err(ParseError::InvalidChunkTerminator),
                    },
                    Some(_) => return Err(ParseError::InvalidChunkTerminator),
                },
                ChunkState::Trailers => {
                    let Some(line) = take_line(src, limit)? else {
                        break;
                    };
                    if line.is_empty() {
                        let len = u64::try_from(request.body.len()).unwrap_or(u64::MAX);
                        request.content_length = OnceLock::from(len);
                        return Ok(Step::Complete(request));
                    }
                }
            }
        }
        Ok(Step::Pending(DecodeState::Chunked {
            request,
            chunk,
            total,
        }))
    }
}

/// Parse a chunk size line, ignoring any `;name=value` extensions.
fn parse_chunk_size(line: &[u8]) -> Result<usize, ParseError> {
    let text = String::from_utf8_lossy(line);
    let digits = text.split(';').next().unwrap_or_default().trim();
    usize::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidChunkSize(text.to_string()))
}

/// Encode `body` with chunked transfer-encoding.
///
/// The body is split into chunks of at most `chunk_size` bytes and
/// terminated with a zero-size chunk and an empty trailer section.
///
/// ```
/// use wirehttp::codec::chunked_body;
///
/// assert_eq!(&chunked_body(b"hello", 3)[..], b"3\r\nhel\r\n2\r\nlo\r\n0\r\n\r\n");
/// assert_eq!(&chunked_body(b"", 3)[..], b"0\r\n\r\n");
/// ```
#[must_use]
pub fn chunked_body(body: &[u8], chunk_size: usize) -> BytesMut {
    let chunk_size = chunk_size.max(1);
    let mut out = BytesMut::with_capacity(body.len() + 16 * (body.len() / chunk_size + 1));
    for piece in body.chunks(chunk_size) {
        out.put_slice(format!("{:x}\r\n", piece.len()).as_bytes());
        out.put_slice(piece);
        out.put_slice(b"\r\n");
    }
    out.put_slice(b"0\r\n\r\n");
    out
}
