//! Compiled path templates.

use std::fmt;

use super::Params;
use crate::{context::HandlerFn, request::Method};

/// One `/`-separated piece of a template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Segment {
    /// Must equal the path segment exactly.
    Literal(String),
    /// Binds whatever the path segment holds to the name.
    Param(String),
}

/// A registered route.
#[derive(Clone)]
pub struct Route {
    method: Method,
    template: String,
    segments: Vec<Segment>,
    handler: HandlerFn,
}

impl Route {
    /// Compile `template` for `method`.
    ///
    /// Segments written `:name` become parameters; everything else, `*`
    /// included, is matched literally.
    #[must_use]
    pub fn new(method: Method, template: &str, handler: HandlerFn) -> Self {
        Self {
            method,
            template: template.to_owned(),
            segments: compile(template),
            handler,
        }
    }

    /// Method the route answers.
    #[must_use]
    pub fn method(&self) -> Method { self.method }

    /// Template as registered.
    #[must_use]
    pub fn template(&self) -> &str { &self.template }

    /// Handler invoked on a match.
    #[must_use]
    pub fn handler(&self) -> &HandlerFn { &self.handler }

    pub(crate) fn segments(&self) -> &[Segment] { &self.segments }

    /// Match pre-split path segments, returning the bound parameters.
    pub(crate) fn match_segments(&self, parts: &[&str]) -> Option<Params> {
        if self.segments.len() != parts.len() {
            return None;
        }
        let mut params = Params::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.push(name, part),
            }
        }
        Some(params)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("template", &self.template)
            .field("segments", &self.segments)
            .finish_non_exhaustive()
    }
}

fn compile(template: &str) -> Vec<Segment> {
    let trimmed = template.trim_matches('/');
    if trimmed.is_empty() {
        return vec![Segment::Literal(String::new())];
    }
    trimmed
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => Segment::Param(name.to_owned()),
            _ => Segment::Literal(segment.to_owned()),
        })
        .collect()
}

/// Split a request path into segments.
///
/// One leading and one trailing `/` are ignored, so `/users/42/` and
/// `users/42` both give `["users", "42"]`. The root gives `[""]`.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    path.split('/').collect()
}
