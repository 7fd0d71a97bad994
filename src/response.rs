//! Buffered HTTP response writer.
//!
//! Handlers fill a [`Response`] through the [`Context`](crate::context::Context)
//! API. Nothing reaches the socket until the handler chain returns and the
//! connection task encodes the response with
//! [`HttpCodec`](crate::codec::HttpCodec).

use serde::Serialize;

use crate::pool::Reset;

/// Content type used for JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
/// Content type used for plain text bodies.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
/// Content type used for HTML bodies.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Status, headers and body of one HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: u16,
}

impl Response {
    /// Build an error response with the `{"error": .., "code": ..}` body.
    ///
    /// ```
    /// use wirehttp::response::Response;
    ///
    /// let res = Response::error(404, "Not Found");
    /// assert_eq!(res.status(), 404);
    /// assert_eq!(res.body(), br#"{"error":"Not Found","code":404}"#);
    /// ```
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        let mut res = Self::default();
        res.write_error(status, message);
        res
    }

    /// Status code; 200 until set.
    #[must_use]
    pub fn status(&self) -> u16 { self.status }

    /// Set the status code.
    pub fn set_status(&mut self, status: u16) { self.status = status; }

    /// Headers in insertion order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// First header value whose name matches ignoring ASCII case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Set a header, replacing every existing value with the same name.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.remove_header(name);
        self.headers.push((name.to_owned(), value.to_owned()));
    }

    /// Append a header value without touching existing ones.
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_owned(), value.to_owned()));
    }

    /// Remove every header with the given name.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    /// Body bytes written so far.
    #[must_use]
    pub fn body(&self) -> &[u8] { &self.body }

    /// Append raw bytes to the body.
    pub fn write(&mut self, bytes: &[u8]) { self.body.extend_from_slice(bytes); }

    /// Discard the body written so far, keeping status and headers.
    pub fn clear_body(&mut self) { self.body.clear(); }

    /// Replace the body with `text` and set a plain-text content type.
    pub fn write_text(&mut self, status: u16, text: &str) {
        self.replace_body(status, TEXT_CONTENT_TYPE, text.as_bytes());
    }

    /// Replace the body with `html` and set an HTML content type.
    pub fn write_html(&mut self, status: u16, html: &str) {
        self.replace_body(status, HTML_CONTENT_TYPE, html.as_bytes());
    }

    /// Replace the body with the JSON encoding of `value`.
    ///
    /// # Errors
    ///
    /// Returns the serialisation error; the body is left empty.
    pub fn write_json<T: Serialize + ?Sized>(
        &mut self,
        status: u16,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        self.status = status;
        self.set_header("Content-Type", JSON_CONTENT_TYPE);
        self.body.clear();
        if let Err(e) = serde_json::to_writer(&mut self.body, value) {
            self.body.clear();
            return Err(e);
        }
        Ok(())
    }

    /// Replace the body with the standard error JSON shape.
    pub fn write_error(&mut self, status: u16, message: &str) {
        let body = ErrorBody {
            error: message,
            code: status,
        };
        // A struct of a string and an integer always serialises.
        let _ = self.write_json(status, &body);
    }

    fn replace_body(&mut self, status: u16, content_type: &str, bytes: &[u8]) {
        self.status = status;
        self.set_header("Content-Type", content_type);
        self.body.clear();
        self.body.extend_from_slice(bytes);
    }
}

impl Reset for Response {
    fn reset(&mut self) {
        self.status = 200;
        self.headers.clear();
        self.body.clear();
    }
}

/// Reason phrase for a status code.
#[must_use]
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        411 => "Length Required",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        418 => "I'm a teapot",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown Status",
    }
}
