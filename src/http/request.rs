//! Request side of the handler contract.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::{GeowsError, Result};

/// What a handler can read from an inbound request.
pub trait HttpRequest: Send + Sync {
    /// Request method, e.g. `GET`
    fn method(&self) -> &str;

    /// Protocol version, e.g. `HTTP/1.1`
    fn version(&self) -> &str;

    /// Percent-decoded request path without the query string
    fn base_uri(&self) -> &str;

    /// Raw query string, without the leading `?`
    fn query_string(&self) -> Option<&str>;

    /// Request body
    fn content(&self) -> &[u8];

    fn content_length(&self) -> usize {
        self.content().len()
    }

    /// Value of a request variable, looked up in the query string first and
    /// in a form-encoded body second. Values are returned undecoded. Pairs
    /// without `=` are skipped, so one malformed pair does not hide the rest;
    /// use [`expand_query_string`] to reject them instead.
    fn get_var(&self, name: &str) -> Option<String> {
        self.query_string()
            .and_then(|qs| find_var(qs, name))
            .or_else(|| {
                std::str::from_utf8(self.content())
                    .ok()
                    .and_then(|body| find_var(body.trim_end(), name))
            })
    }
}

/// Last value of `name` among the `&`-separated pairs of `pairs`
fn find_var(pairs: &str, name: &str) -> Option<String> {
    pairs
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| *key == name)
        .last()
        .map(|(_, value)| value.to_string())
}

/// Split a query string into key/value pairs.
///
/// Pairs are separated by `&` and split at the first `=`. Keys and values are
/// kept exactly as received: no percent-decoding and no `+` to space
/// translation. When a key repeats, the last value wins.
pub fn expand_query_string(query: &str) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if query.is_empty() {
        return Ok(vars);
    }

    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            GeowsError::parse(format!("invalid query string parameter '{}': missing '='", pair))
        })?;
        vars.insert(key.to_string(), value.to_string());
    }

    Ok(vars)
}

/// A fully buffered request, detached from any transport.
#[derive(Debug, Clone)]
pub struct OwnedRequest {
    method: String,
    version: String,
    base_uri: String,
    query_string: Option<String>,
    content: Bytes,
}

impl OwnedRequest {
    /// Create a request for `path`. The path is percent-decoded; if it does
    /// not decode to UTF-8 it is kept verbatim.
    pub fn new(method: impl Into<String>, path: &str) -> Self {
        let base_uri = urlencoding::decode(path)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| path.to_string());

        Self {
            method: method.into(),
            version: "HTTP/1.1".to_string(),
            base_uri,
            query_string: None,
            content: Bytes::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_query(mut self, query: Option<&str>) -> Self {
        self.query_string = query.map(str::to_string);
        self
    }

    pub fn with_content(mut self, content: impl Into<Bytes>) -> Self {
        self.content = content.into();
        self
    }
}

impl HttpRequest for OwnedRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn base_uri(&self) -> &str {
        &self.base_uri
    }

    fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    fn content(&self) -> &[u8] {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expand_query_string() {
        let vars = expand_query_string("a=1&b=2").unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["a"], "1");
        assert_eq!(vars["b"], "2");

        assert!(expand_query_string("").unwrap().is_empty());
    }

    #[test]
    fn test_expand_query_string_missing_separator() {
        let err = expand_query_string("a=1&b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);

        // trailing '&' leaves an empty pair behind
        assert!(expand_query_string("a=1&").is_err());
    }

    #[test]
    fn test_expand_query_string_keeps_raw_values() {
        let vars = expand_query_string("q=a%20b&expr=x=y&empty=").unwrap();
        assert_eq!(vars["q"], "a%20b");
        assert_eq!(vars["expr"], "x=y");
        assert_eq!(vars["empty"], "");
    }

    #[test]
    fn test_owned_request() {
        let request = OwnedRequest::new("POST", "/wtss/time%20series")
            .with_query(Some("coverage=mod13q1"))
            .with_content(&b"attributes=ndvi"[..]);

        assert_eq!(request.method(), "POST");
        assert_eq!(request.version(), "HTTP/1.1");
        assert_eq!(request.base_uri(), "/wtss/time series");
        assert_eq!(request.query_string(), Some("coverage=mod13q1"));
        assert_eq!(request.content_length(), 15);
        assert_eq!(request.get_var("coverage").as_deref(), Some("mod13q1"));
        assert_eq!(request.get_var("attributes").as_deref(), Some("ndvi"));
        assert_eq!(request.get_var("missing"), None);
    }

    #[test]
    fn test_get_var_skips_malformed_pairs() {
        let request = OwnedRequest::new("GET", "/wtss/describe_coverage")
            .with_query(Some("name=mod13q1&flag"));
        assert_eq!(request.get_var("name").as_deref(), Some("mod13q1"));
        assert_eq!(request.get_var("flag"), None);

        let request = OwnedRequest::new("POST", "/wtss/describe_coverage")
            .with_query(Some("flag&"))
            .with_content(&b"name=mod13q1&name=mod13q1_nt\n"[..]);
        assert_eq!(request.get_var("name").as_deref(), Some("mod13q1_nt"));
    }
}
