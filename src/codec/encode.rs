//! Response serialisation.

use bytes::{BufMut, BytesMut};

use crate::response::{Response, reason_phrase};

const CRLF: &[u8] = b"\r\n";

/// Write the status line, headers and body of `res` into `dst`.
///
/// `Content-Length` is added when the handler did not set one and a
/// `Connection` directive is always present (`keep-alive` unless set).
pub(super) fn write_response(res: &Response, dst: &mut BytesMut) {
    let body = res.body();
    let headers_len: usize = res
        .headers()
        .iter()
        .map(|(name, value)| name.len() + value.len() + 4)
        .sum();
    dst.reserve(64 + headers_len + body.len());

    dst.put_slice(b"HTTP/1.1 ");
    dst.put_slice(res.status().to_string().as_bytes());
    dst.put_u8(b' ');
    dst.put_slice(reason_phrase(res.status()).as_bytes());
    dst.put_slice(CRLF);

    for (name, value) in res.headers() {
        put_header(dst, name, value);
    }
    if res.header("Content-Length").is_none() {
        put_header(dst, "Content-Length", &body.len().to_string());
    }
    if res.header("Connection").is_none() {
        put_header(dst, "Connection", "keep-alive");
    }
    dst.put_slice(CRLF);
    dst.put_slice(body);
}

fn put_header(dst: &mut BytesMut, name: &str, value: &str) {
    dst.put_slice(name.as_bytes());
    dst.put_slice(b": ");
    dst.put_slice(value.as_bytes());
    dst.put_slice(CRLF);
}
