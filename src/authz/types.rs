use std::fmt;
use std::str::FromStr;

use axum::http::Method;

use crate::authz::errors::BouncerError;
use crate::authz::path;

/// The closed set of HTTP methods a grant can name, plus the `any_method`
/// wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Any,
    Get,
    Head,
    Put,
    Post,
    Delete,
    Options,
    Patch,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 8] = [
        HttpMethod::Any,
        HttpMethod::Get,
        HttpMethod::Head,
        HttpMethod::Put,
        HttpMethod::Post,
        HttpMethod::Delete,
        HttpMethod::Options,
        HttpMethod::Patch,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            HttpMethod::Any => "any_method",
            HttpMethod::Get => "get",
            HttpMethod::Head => "head",
            HttpMethod::Put => "put",
            HttpMethod::Post => "post",
            HttpMethod::Delete => "delete",
            HttpMethod::Options => "options",
            HttpMethod::Patch => "patch",
        }
    }

    /// Case-insensitive lookup of a method token.
    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.token().eq_ignore_ascii_case(token))
    }

    /// Maps a request method onto the grant vocabulary. Methods outside the
    /// closed set (TRACE, CONNECT, extensions) have no counterpart.
    pub fn from_http(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(HttpMethod::Get),
            Method::HEAD => Some(HttpMethod::Head),
            Method::PUT => Some(HttpMethod::Put),
            Method::POST => Some(HttpMethod::Post),
            Method::DELETE => Some(HttpMethod::Delete),
            Method::OPTIONS => Some(HttpMethod::Options),
            Method::PATCH => Some(HttpMethod::Patch),
            _ => None,
        }
    }

    /// Comma-separated list of every accepted token, for error messages.
    pub fn valid_keys() -> String {
        Self::ALL
            .iter()
            .map(|m| m.token())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for HttpMethod {
    type Err = BouncerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| BouncerError::UnknownMethod {
            key: s.to_string(),
            valid: Self::valid_keys(),
        })
    }
}

impl AsRef<str> for HttpMethod {
    fn as_ref(&self) -> &str {
        self.token()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    /// `*`: exactly one non-empty segment
    Wildcard,
}

/// A path template: either every path, or a fixed-length list of segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathPattern {
    All,
    Segments(Vec<Segment>),
}

impl PathPattern {
    pub fn all() -> Self {
        PathPattern::All
    }

    /// Parses a template like `/reports/*/summary`. The leading `/` is
    /// optional. Never fails; `*` is only special as a whole segment.
    pub fn parse(pattern: &str) -> Self {
        let segments = path::segments(pattern)
            .into_iter()
            .map(|seg| match seg {
                "*" => Segment::Wildcard,
                literal => Segment::Literal(literal.to_string()),
            })
            .collect();
        PathPattern::Segments(segments)
    }

    pub fn matches(&self, path: &str) -> bool {
        path::matches(self, path)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPattern::All => f.write_str("<all>"),
            PathPattern::Segments(segments) if segments.is_empty() => f.write_str("/"),
            PathPattern::Segments(segments) => {
                for seg in segments {
                    match seg {
                        Segment::Literal(s) => write!(f, "/{s}")?,
                        Segment::Wildcard => f.write_str("/*")?,
                    }
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for PathPattern {
    fn from(value: &str) -> Self {
        PathPattern::parse(value)
    }
}

impl From<String> for PathPattern {
    fn from(value: String) -> Self {
        PathPattern::parse(&value)
    }
}

/// One or many path patterns attached to a single method key. A bare path
/// converts into a one-element set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathSet(Vec<PathPattern>);

impl PathSet {
    pub fn patterns(&self) -> &[PathPattern] {
        &self.0
    }

    pub fn into_patterns(self) -> Vec<PathPattern> {
        self.0
    }
}

impl From<PathPattern> for PathSet {
    fn from(value: PathPattern) -> Self {
        PathSet(vec![value])
    }
}

impl From<&str> for PathSet {
    fn from(value: &str) -> Self {
        PathSet(vec![PathPattern::parse(value)])
    }
}

impl From<String> for PathSet {
    fn from(value: String) -> Self {
        PathSet(vec![PathPattern::parse(&value)])
    }
}

impl<P: Into<PathPattern>> From<Vec<P>> for PathSet {
    fn from(value: Vec<P>) -> Self {
        PathSet(value.into_iter().map(Into::into).collect())
    }
}

impl<P: Into<PathPattern>, const N: usize> From<[P; N]> for PathSet {
    fn from(value: [P; N]) -> Self {
        PathSet(value.into_iter().map(Into::into).collect())
    }
}
