//! Request/response values crossing the interception boundary.

use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

/// An outgoing request as seen by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path portion of the URL; never empty.
    pub fn path(&self) -> &str {
        let rest = self.after_authority();
        let end = rest.find(['?', '#']).unwrap_or(rest.len());
        let path = &rest[..end];
        if path.is_empty() {
            "/"
        } else {
            path
        }
    }

    /// Raw query string, without the leading `?`.
    pub fn query_string(&self) -> Option<&str> {
        let rest = self.after_authority();
        let start = rest.find('?')? + 1;
        let query = &rest[start..];
        let end = query.find('#').unwrap_or(query.len());
        Some(&query[..end])
    }

    /// Decoded query parameters.
    pub fn query_params(&self) -> HashMap<String, String> {
        parse_query_string(self.query_string().unwrap_or(""))
    }

    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    fn after_authority(&self) -> &str {
        match self.url.split_once("://") {
            Some((_, rest)) => {
                let start = rest.find(['/', '?', '#']).unwrap_or(rest.len());
                &rest[start..]
            }
            None => &self.url,
        }
    }
}

/// A response returned to the caller, mocked or live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// The live network, as provided by the surrounding HTTP client.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Parse a query string into key-value pairs.
pub(crate) fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params.insert(decode_component(key), decode_component(value));
    }

    params
}

fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    urlencoding::decode(&s)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_url_parts() {
        let req = HttpRequest::get("https://api.example.com/users/42?page=1&q=a%20b#frag");
        assert_eq!(req.path(), "/users/42");
        assert_eq!(req.query_string(), Some("page=1&q=a%20b"));

        let params = req.query_params();
        assert_eq!(params.get("page"), Some(&"1".to_string()));
        assert_eq!(params.get("q"), Some(&"a b".to_string()));
    }

    #[test]
    fn test_bare_host_has_root_path() {
        let req = HttpRequest::get("http://localhost:8080");
        assert_eq!(req.path(), "/");
        assert_eq!(req.query_string(), None);

        let req = HttpRequest::get("http://localhost:8080?x=1");
        assert_eq!(req.path(), "/");
        assert_eq!(req.query_string(), Some("x=1"));
    }

    #[test]
    fn test_relative_url() {
        let req = HttpRequest::new("get", "/search?term=rust+lang");
        assert_eq!(req.method, "GET");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_params().get("term"), Some(&"rust lang".to_string()));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = HttpRequest::get("/").with_header("Content-Type", "application/json");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn test_parse_query_string_flags() {
        let params = parse_query_string("verbose&name=John%20Doe");
        assert_eq!(params.get("verbose"), Some(&String::new()));
        assert_eq!(params.get("name"), Some(&"John Doe".to_string()));
    }
}
