//! Query request lines
//!
//! Grammar: `<path>` or `<path>?<key>[=<value>]{&<key>[=<value>]}`.
//! Value-less keys select attributes; `listen=true|false` toggles push
//! subscription for the requesting connection.

use std::fmt;

use param_map::{address, Attribute};

use crate::error::{QueryError, Result};

const LISTEN_KEY: &str = "listen";

/// A parsed request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRequest {
    /// Full document of the subtree at `path`
    Namespace { path: String },
    /// Projection of the named attributes of `path`
    Attributes { path: String, attributes: Vec<Attribute> },
    /// Enable or disable pushes for `path`
    Listen { path: String, enable: bool },
}

impl QueryRequest {
    /// Parse a request line
    ///
    /// Every malformation is a `BadRequest`; nothing is partially applied.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let mut parts = line.split('?');
        let raw_path = parts.next().unwrap_or_default();
        let query = parts.next();
        if parts.next().is_some() {
            return Err(QueryError::BadRequest(format!("more than one '?' in {line:?}")));
        }

        let path = address::normalize(raw_path)?;

        let Some(query) = query else {
            return Ok(QueryRequest::Namespace { path });
        };
        if query.is_empty() {
            return Ok(QueryRequest::Namespace { path });
        }

        let mut attributes = Vec::new();
        let mut listen = None;

        for pair in query.split('&') {
            let mut kv = pair.split('=');
            let key = kv.next().unwrap_or_default();
            let value = kv.next();
            if kv.next().is_some() {
                return Err(QueryError::BadRequest(format!("malformed key=value {pair:?}")));
            }
            if key.is_empty() {
                return Err(QueryError::BadRequest(format!("empty key in {line:?}")));
            }

            match (key, value) {
                (LISTEN_KEY, Some("true")) => listen = Some(true),
                (LISTEN_KEY, Some("false")) => listen = Some(false),
                (LISTEN_KEY, other) => {
                    return Err(QueryError::BadRequest(format!("listen expects true or false, got {other:?}")));
                }
                (key, None) => {
                    let attribute = key
                        .parse::<Attribute>()
                        .map_err(|_| QueryError::BadRequest(format!("unknown attribute {key:?}")))?;
                    if !attributes.contains(&attribute) {
                        attributes.push(attribute);
                    }
                }
                (key, Some(_)) => {
                    return Err(QueryError::BadRequest(format!("unexpected value for {key:?}")));
                }
            }
        }

        match listen {
            Some(_) if !attributes.is_empty() => Err(QueryError::BadRequest(
                "listen cannot be combined with attribute keys".to_string(),
            )),
            Some(enable) => Ok(QueryRequest::Listen { path, enable }),
            None => Ok(QueryRequest::Attributes { path, attributes }),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            QueryRequest::Namespace { path }
            | QueryRequest::Attributes { path, .. }
            | QueryRequest::Listen { path, .. } => path,
        }
    }

    /// Request line for this request
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryRequest::Namespace { path } => f.write_str(path),
            QueryRequest::Attributes { path, attributes } => {
                let keys: Vec<&str> = attributes.iter().map(Attribute::key).collect();
                write!(f, "{path}?{}", keys.join("&"))
            }
            QueryRequest::Listen { path, enable } => write!(f, "{path}?{LISTEN_KEY}={enable}"),
        }
    }
}

impl std::str::FromStr for QueryRequest {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        QueryRequest::parse(s)
    }
}
