//! Request decoding state machine.
//!
//! The decoder moves through request line, headers and body. Each call to
//! [`HttpCodec::decode_request`] consumes as many complete lines or body
//! bytes as the buffer holds and parks the partially built request in the
//! codec state until more bytes arrive.

use std::{io, mem, sync::OnceLock};

use bytes::{Buf, BytesMut};
use url::Url;

use super::{
    HttpCodec,
    chunked::ChunkState,
    error::{CodecError, ParseError},
};
use crate::request::{Method, Request};

/// Where the decoder is within the current request.
#[derive(Debug, Default)]
pub(super) enum DecodeState {
    /// Waiting for a request line.
    #[default]
    RequestLine,
    /// Reading header lines; `count` valid headers seen so far.
    Headers { request: Request, count: usize },
    /// Reading a `Content-Length` body.
    Body { request: Request, remaining: usize },
    /// Reading a chunked body.
    Chunked {
        request: Request,
        chunk: ChunkState,
        total: usize,
    },
}

/// Outcome of advancing the state machine once.
pub(super) enum Step {
    /// More bytes are needed.
    Pending(DecodeState),
    /// Progress was made; keep going.
    Continue(DecodeState),
    /// A whole request has been decoded.
    Complete(Request),
}

impl HttpCodec {
    pub(super) fn decode_request(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Request>, CodecError> {
        loop {
            let state = mem::take(&mut self.state);
            match self.advance(state, src)? {
                Step::Pending(state) => {
                    self.state = state;
                    return Ok(None);
                }
                Step::Continue(state) => self.state = state,
                Step::Complete(request) => return Ok(Some(request)),
            }
        }
    }

    pub(super) fn decode_request_eof(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Request>, CodecError> {
        if let Some(request) = self.decode_request(src)? {
            return Ok(Some(request));
        }
        match mem::take(&mut self.state) {
            DecodeState::RequestLine if src.iter().all(u8::is_ascii_whitespace) => {
                src.clear();
                Ok(None)
            }
            // A peer that closes after at least one header ends the header block.
            DecodeState::Headers { mut request, count } if count > 0 => {
                if !src.is_empty() {
                    let line = src.split();
                    parse_header(strip_cr(&line), &mut request);
                }
                match self.begin_body(request)? {
                    Step::Complete(request) => Ok(Some(request)),
                    Step::Pending(_) | Step::Continue(_) => Err(truncated()),
                }
            }
            _ => Err(truncated()),
        }
    }

    fn advance(&self, state: DecodeState, src: &mut BytesMut) -> Result<Step, ParseError> {
        match state {
            DecodeState::RequestLine => self.read_request_line(src),
            DecodeState::Headers { request, count } => self.read_headers(request, count, src),
            DecodeState::Body { request, remaining } => Ok(read_body(request, remaining, src)),
            DecodeState::Chunked {
                request,
                chunk,
                total,
            } => self.read_chunked(request, chunk, total, src),
        }
    }

    fn read_request_line(&self, src: &mut BytesMut) -> Result<Step, ParseError> {
        loop {
            let Some(line) = take_line(src, self.limits.max_line_length)? else {
                return Ok(Step::Pending(DecodeState::RequestLine));
            };
            // Stray CRLFs between pipelined requests are ignored.
            if line.is_empty() {
                continue;
            }
            let mut request = self.pools.requests.checkout();
            parse_request_line(&line, &mut request)?;
            return Ok(Step::Continue(DecodeState::Headers { request, count: 0 }));
        }
    }

    fn read_headers(
        &self,
        mut request: Request,
        mut count: usize,
        src: &mut BytesMut,
    ) -> Result<Step, ParseError> {
        loop {
            let Some(line) = take_line(src, self.limits.max_line_length)? else {
                return Ok(Step::Pending(DecodeState::Headers { request, count }));
            };
            if line.is_empty() {
                return self.begin_body(request);
            }
            if parse_header(&line, &mut request) {
                count += 1;
            }
        }
    }

    /// Decide how the body is framed once the header block has ended.
    ///
    /// `Content-Length` wins over `Transfer-Encoding`. A declared length
    /// above the limit fails before any body byte is read.
    fn begin_body(&self, mut request: Request) -> Result<Step, ParseError> {
        let max = self.limits.max_body_size;
        if let Some(raw) = request.header("Content-Length") {
            let declared: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidContentLength(raw.to_owned()))?;
            if declared > u64::try_from(max).unwrap_or(u64::MAX) {
                return Err(ParseError::BodyTooLarge {
                    size: declared,
                    max,
                });
            }
            request.content_length = OnceLock::from(declared);
            if declared > 0 {
                let remaining = usize::try_from(declared).unwrap_or(max);
                request.body.reserve(remaining);
                return Ok(Step::Continue(DecodeState::Body { request, remaining }));
            }
        }
        let chunked = request
            .header("Transfer-Encoding")
            .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"));
        if chunked {
            return Ok(Step::Continue(DecodeState::Chunked {
                request,
                chunk: ChunkState::default(),
                total: 0,
            }));
        }
        Ok(Step::Complete(request))
    }
}

fn read_body(mut request: Request, remaining: usize, src: &mut BytesMut) -> Step {
    let take = remaining.min(src.len());
    request.body.extend_from_slice(&src[..take]);
    src.advance(take);
    let remaining = remaining - take;
    if remaining == 0 {
        Step::Complete(request)
    } else {
        src.reserve(remaining);
        Step::Pending(DecodeState::Body { request, remaining })
    }
}

/// Split one line off the front of `src`, without its terminator.
///
/// Accepts CRLF or a bare LF. Returns `None` until a terminator arrives.
pub(super) fn take_line(src: &mut BytesMut, limit: usize) -> Result<Option<BytesMut>, ParseError> {
    let Some(end) = src.iter().position(|&b| b == b'\n') else {
        if src.len() > limit {
            return Err(ParseError::LineTooLong { limit });
        }
        return Ok(None);
    };
    if end > limit {
        return Err(ParseError::LineTooLong { limit });
    }
    let mut line = src.split_to(end + 1);
    line.truncate(strip_cr(&line[..end]).len());
    Ok(Some(line))
}

fn strip_cr(line: &[u8]) -> &[u8] { line.strip_suffix(b"\r").unwrap_or(line) }

fn parse_request_line(line: &[u8], request: &mut Request) -> Result<(), ParseError> {
    let text = String::from_utf8_lossy(line);
    let mut parts = text.split(' ');
    let method = parts.next().unwrap_or_default();
    let target = match parts.next() {
        Some(target) if !method.is_empty() => target,
        _ => {
            return Err(ParseError::MalformedRequestLine {
                line: text.to_string(),
            });
        }
    };
    let proto = parts.next().filter(|p| !p.is_empty()).unwrap_or("HTTP/1.1");

    request.method =
        Method::from_token(method).ok_or_else(|| ParseError::InvalidMethod(method.to_owned()))?;
    request.proto.push_str(proto);
    parse_target(target, request)
}

/// Normalise the target and split it into decoded path and raw query.
///
/// Path and query are sliced from the target as sent; the `url` parser only
/// decides whether the target is acceptable.
fn parse_target(raw: &str, request: &mut Request) -> Result<(), ParseError> {
    let target = &mut request.target;
    target.clear();
    if raw.is_empty() {
        target.push('/');
    } else {
        if !raw.contains("://") && !raw.starts_with('/') {
            target.push('/');
        }
        target.push_str(raw);
    }
    validate_target(&request.target)?;

    let (path, query) = split_target(&request.target);
    match urlencoding::decode(path) {
        Ok(decoded) => request.path.push_str(&decoded),
        Err(_) => request.path.push_str(path),
    }
    if let Some(query) = query {
        request.raw_query.push_str(query);
    }
    Ok(())
}

/// Raw path and query of an origin-form or absolute-form target.
fn split_target(target: &str) -> (&str, Option<&str>) {
    let rest = match target.split_once("://") {
        Some((_, authority_and_rest)) => authority_and_rest
            .find(['/', '?', '#'])
            .map_or("", |start| &authority_and_rest[start..]),
        None => target,
    };
    let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };
    (if path.is_empty() { "/" } else { path }, query)
}

fn validate_target(target: &str) -> Result<(), ParseError> {
    let parse = |candidate: &str| {
        if candidate.contains("://") {
            Url::parse(candidate)
        } else {
            Url::parse(&format!("http://localhost{candidate}"))
        }
    };
    parse(target).map(drop).or_else(|first| {
        let escaped = format!("/{}", urlencoding::encode(target.trim_start_matches('/')));
        parse(&escaped)
            .map(drop)
            .map_err(|_| ParseError::InvalidTarget {
                target: target.to_owned(),
                reason: first.to_string(),
            })
    })
}

/// Store one header line; returns `false` when the line was skipped.
fn parse_header(line: &[u8], request: &mut Request) -> bool {
    let text = String::from_utf8_lossy(line);
    let Some((key, value)) = text.split_once(':') else {
        tracing::warn!(line = %text, "skipping malformed header");
        return false;
    };
    let key = key.trim();
    if key.is_empty() {
        tracing::warn!(line = %text, "skipping header with empty name");
        return false;
    }
    request.insert_header(key.to_owned(), value.trim().to_owned());
    true
}

fn truncated() -> CodecError {
    CodecError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "connection closed before the request was complete",
    ))
}
