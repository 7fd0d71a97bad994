//! Parsed HTTP request type.
//!
//! A [`Request`] is produced by the [`HttpCodec`](crate::codec::HttpCodec)
//! decoder, handed to the dispatch pipeline inside a
//! [`Context`](crate::context::Context), and returned to its pool once the
//! response has been written.

use std::{collections::HashMap, fmt, str::FromStr, sync::OnceLock};

use url::form_urlencoded;

use crate::pool::Reset;

/// HTTP request methods accepted by the decoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// `PATCH`
    Patch,
    /// `CONNECT`
    Connect,
    /// `TRACE`
    Trace,
}

impl Method {
    /// Every method the server understands, in declaration order.
    pub const ALL: [Method; 9] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Head,
        Method::Options,
        Method::Patch,
        Method::Connect,
        Method::Trace,
    ];

    /// Canonical upper-case token for this method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
        }
    }

    /// Match a method token case-insensitively.
    ///
    /// ```
    /// use wirehttp::request::Method;
    ///
    /// assert_eq!(Method::from_token("get"), Some(Method::Get));
    /// assert_eq!(Method::from_token("PaTcH"), Some(Method::Patch));
    /// assert_eq!(Method::from_token("BREW"), None);
    /// ```
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(token))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Error returned when a string is not a known HTTP method.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown HTTP method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| UnknownMethod(s.to_owned()))
    }
}

/// A parsed HTTP/1.x request.
///
/// Header keys are stored exactly as received; a repeated header keeps the
/// last value seen.
#[derive(Debug, Default)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) target: String,
    pub(crate) path: String,
    pub(crate) raw_query: String,
    pub(crate) proto: String,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) host: String,
    pub(crate) body: Vec<u8>,
    pub(crate) content_length: OnceLock<u64>,
}

impl Request {
    /// Build a request by hand, mainly for tests and in-process dispatch.
    ///
    /// ```
    /// use wirehttp::request::{Method, Request};
    ///
    /// let req = Request::new(Method::Get, "/users/7?verbose=1");
    /// assert_eq!(req.path(), "/users/7");
    /// assert_eq!(req.query("verbose").as_deref(), Some("1"));
    /// ```
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (path, raw_query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        Self {
            method,
            target: target.to_owned(),
            path: path.to_owned(),
            raw_query: raw_query.to_owned(),
            proto: "HTTP/1.1".to_owned(),
            ..Self::default()
        }
    }

    /// Attach a header, replacing any previous value under the same key.
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.insert_header(key.to_owned(), value.to_owned());
        self
    }

    /// Attach a body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> Method { self.method }

    /// Normalised request target as it appeared on the request line.
    #[must_use]
    pub fn target(&self) -> &str { &self.target }

    /// Percent-decoded path component of the target.
    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Raw (still encoded) query string without the leading `?`.
    #[must_use]
    pub fn raw_query(&self) -> &str { &self.raw_query }

    /// Protocol token, `HTTP/1.1` when the request line omitted it.
    #[must_use]
    pub fn proto(&self) -> &str { &self.proto }

    /// Value of the `Host` header, or an empty string.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// Request body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] { &self.body }

    /// All headers keyed as received.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> { &self.headers }

    /// Look up a header value.
    ///
    /// An exact key match wins; otherwise the first key equal ignoring ASCII
    /// case is used, so `content-length` finds `Content-Length`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    /// Media type of the body with any parameters (`; charset=..`) removed.
    #[must_use]
    pub fn content_type(&self) -> &str {
        let value = self.header("Content-Type").unwrap_or_default();
        value
            .split([' ', ';'])
            .next()
            .unwrap_or_default()
    }

    /// Declared body length.
    ///
    /// Derived from `Content-Length` the first time it is asked for and
    /// cached afterwards. Missing or unparsable values count as zero.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        *self.content_length.get_or_init(|| {
            self.header("Content-Length")
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(0)
        })
    }

    /// Whether the client asked to close the connection after this request.
    ///
    /// `HTTP/1.0` requests close unless they carry `Connection: keep-alive`.
    #[must_use]
    pub fn wants_close(&self) -> bool {
        let connection = self.header("Connection").unwrap_or_default();
        if connection.eq_ignore_ascii_case("close") {
            return true;
        }
        self.proto.eq_ignore_ascii_case("HTTP/1.0") && !connection.eq_ignore_ascii_case("keep-alive")
    }

    /// First value of a query parameter, decoded.
    #[must_use]
    pub fn query(&self, key: &str) -> Option<String> {
        form_urlencoded::parse(self.raw_query.as_bytes())
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }

    /// Every value of a repeated query parameter, decoded.
    #[must_use]
    pub fn query_all(&self, key: &str) -> Vec<String> {
        form_urlencoded::parse(self.raw_query.as_bytes())
            .filter(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
            .collect()
    }

    /// Decoded `(name, value)` pairs of the query string in order.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        form_urlencoded::parse(self.raw_query.as_bytes())
            .into_owned()
            .collect()
    }

    /// Replace every occurrence of `key` in the query string with one value.
    pub fn set_query(&mut self, key: &str, value: &str) {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, existing) in form_urlencoded::parse(self.raw_query.as_bytes()) {
            if name != key {
                serializer.append_pair(&name, &existing);
            }
        }
        serializer.append_pair(key, value);
        self.raw_query = serializer.finish();
    }

    pub(crate) fn insert_header(&mut self, key: String, value: String) {
        if key == "Host" || (self.host.is_empty() && key.eq_ignore_ascii_case("host")) {
            self.host.clone_from(&value);
        }
        self.headers.insert(key, value);
    }
}

impl Reset for Request {
    fn reset(&mut self) {
        self.method = Method::default();
        self.target.clear();
        self.path.clear();
        self.raw_query.clear();
        self.proto.clear();
        self.headers.clear();
        self.host.clear();
        self.body.clear();
        self.content_length.take();
    }
}
