//! Error types for the codec layer.
//!
//! # Error Categories
//!
//! - [`ParseError`]: the peer sent bytes that are not a valid HTTP/1.x request (bad request
//!   line, unknown method, bad framing, oversized body). Answered with a 400.
//! - [`CodecError::Io`]: the transport failed or closed mid-request. The connection is closed
//!   without a response.

use std::io;

use thiserror::Error;

/// Protocol violations detected while decoding a request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Request line had fewer than two space-separated tokens.
    #[error("malformed request line: {line:?}")]
    MalformedRequestLine {
        /// The offending line, lossily decoded.
        line: String,
    },

    /// Method token is not one of the supported verbs.
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Request target could not be parsed, even after escaping.
    #[error("invalid request target {target:?}: {reason}")]
    InvalidTarget {
        /// Target as received.
        target: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// `Content-Length` is not a non-negative decimal integer.
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    /// Declared or accumulated body size exceeds the limit.
    #[error("body too large: {size} bytes exceeds limit of {max}")]
    BodyTooLarge {
        /// Declared length, or the running chunked total.
        size: u64,
        /// Configured maximum.
        max: usize,
    },

    /// Chunk size line is not hexadecimal.
    #[error("invalid chunk size: {0:?}")]
    InvalidChunkSize(String),

    /// Chunk data was not followed by CRLF.
    #[error("missing CRLF after chunk data")]
    InvalidChunkTerminator,

    /// A single line exceeded the line length limit.
    #[error("line exceeds {limit} bytes")]
    LineTooLong {
        /// Configured maximum.
        limit: usize,
    },
}

impl ParseError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRequestLine { .. } => "request_line",
            Self::InvalidMethod(_) => "method",
            Self::InvalidTarget { .. } => "target",
            Self::InvalidContentLength(_) => "content_length",
            Self::BodyTooLarge { .. } => "body_too_large",
            Self::InvalidChunkSize(_) | Self::InvalidChunkTerminator => "chunked",
            Self::LineTooLong { .. } => "line_too_long",
        }
    }
}

/// Top-level codec error.
///
/// # Examples
///
/// ```
/// use wirehttp::codec::{CodecError, ParseError};
///
/// let err = CodecError::from(ParseError::InvalidChunkTerminator);
/// assert!(err.is_protocol());
///
/// let err = CodecError::from(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
/// assert!(err.is_transport());
/// ```
#[derive(Debug, Error)]
pub enum CodecError {
    /// The request violated the protocol.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Transport layer I/O error, including truncated requests.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Whether the peer should be answered with a 400 before closing.
    #[must_use]
    pub fn is_protocol(&self) -> bool { matches!(self, Self::Parse(_)) }

    /// Whether the connection should be closed without a response.
    #[must_use]
    pub fn is_transport(&self) -> bool { matches!(self, Self::Io(_)) }

    /// Returns the error category as a string for logging and metrics.
    ///
    /// One of `"protocol"` or `"io"`.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Parse(_) => "protocol",
            Self::Io(_) => "io",
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::Parse(e) => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
