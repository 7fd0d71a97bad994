//! HTTP/1.1 wire codec.
//!
//! [`HttpCodec`] plugs into `tokio_util::codec::Framed`. As a
//! [`Decoder`] it turns a byte stream into [`Request`] values, resuming
//! across partial reads and leaving pipelined bytes in the buffer for the
//! next call. As an [`Encoder`] it serialises a [`Response`] into a single
//! output buffer so the whole response goes out in one batched write.
//!
//! # Error Handling
//!
//! Decoding failures are reported as [`CodecError`]. Protocol violations
//! ([`CodecError::Parse`]) are answered with a 400 by the connection
//! manager; transport failures ([`CodecError::Io`]) close the connection
//! without a response. See the [`error`] module for the full taxonomy.

use std::{fmt, io, sync::Arc};

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::{pool::Pools, request::Request, response::Response};

mod chunked;
mod decode;
mod encode;
pub mod error;

pub use chunked::chunked_body;
pub use error::{CodecError, ParseError};

use self::decode::DecodeState;

/// Largest request body accepted, whether framed by `Content-Length` or
/// chunked (10 MiB).
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Longest single line (request line, header, chunk size or trailer)
/// accepted before the request is rejected (64 KiB).
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Size limits enforced while decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecLimits {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// Maximum length of one line in bytes, excluding the terminator.
    pub max_line_length: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_body_size: MAX_BODY_SIZE,
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}

/// Streaming HTTP/1.1 request decoder and response encoder.
///
/// Each connection owns one codec. Decoded requests are checked out of the
/// shared [`Pools`] so their buffers are reused across requests.
///
/// ```
/// use std::sync::Arc;
///
/// use bytes::BytesMut;
/// use tokio_util::codec::Decoder;
/// use wirehttp::{codec::HttpCodec, pool::Pools, request::Method};
///
/// let mut codec = HttpCodec::new(Arc::new(Pools::new(4)));
/// let mut buf = BytesMut::from(&b"GET /users/7?full=1 HTTP/1.1\r\nHost: a\r\n\r\n"[..]);
/// let req = codec.decode(&mut buf).unwrap().unwrap();
/// assert_eq!(req.method(), Method::Get);
/// assert_eq!(req.path(), "/users/7");
/// assert_eq!(req.raw_query(), "full=1");
/// assert_eq!(req.host(), "a");
/// ```
pub struct HttpCodec {
    limits: CodecLimits,
    pools: Arc<Pools>,
    state: DecodeState,
}

impl HttpCodec {
    /// Create a codec drawing requests from `pools`.
    #[must_use]
    pub fn new(pools: Arc<Pools>) -> Self {
        Self {
            limits: CodecLimits::default(),
            pools,
            state: DecodeState::default(),
        }
    }

    /// Replace the decoding limits.
    #[must_use]
    pub fn with_limits(mut self, limits: CodecLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Limits enforced by this codec.
    #[must_use]
    pub fn limits(&self) -> CodecLimits { self.limits }

    /// Whether the decoder sits between requests with nothing partially read.
    #[must_use]
    pub fn is_idle(&self) -> bool { matches!(self.state, DecodeState::RequestLine) }
}

impl fmt::Debug for HttpCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCodec")
            .field("limits", &self.limits)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Decoder for HttpCodec {
    type Item = Request;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_request(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_request_eof(src)
    }
}

impl Encoder<&Response> for HttpCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode::write_response(item, dst);
        Ok(())
    }
}

impl Encoder<Response> for HttpCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode::write_response(&item, dst);
        Ok(())
    }
}
