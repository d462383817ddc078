//! The parsed inbound request handed to the core by the transport.

use crate::error::MockError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Trace,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = MockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            _ => Err(MockError::InvalidMethod(s.to_string())),
        }
    }
}

/// An inbound request as parsed by the transport.
///
/// Query parameters and headers are multi-valued. Header names are stored
/// lowercased so lookups are case-insensitive.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: HashMap<String, Vec<String>>,
    headers: HashMap<String, Vec<String>>,
    cookies: HashMap<String, String>,
    body: Vec<u8>,
    content_type: Option<String>,
}

impl Request {
    /// Create a request with no query, headers, cookies or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            body: Vec::new(),
            content_type: None,
        }
    }

    /// Build a request from a request target (`/path?query`), raw header
    /// pairs and a body.
    ///
    /// `Cookie` headers are split into cookies and `Content-Type` becomes the
    /// declared content type.
    pub fn from_parts<'a>(
        method: Method,
        target: &str,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        let (path, query_string) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };

        let mut request = Self::new(method, path);
        request.query = parse_query_string(query_string);
        for (name, value) in headers {
            request = request.with_header(name, value);
        }
        request.body = body.into();
        request
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let key = name.to_lowercase();
        match key.as_str() {
            "cookie" => {
                for (cookie_name, cookie_value) in parse_cookie_header(value) {
                    self.cookies.insert(cookie_name, cookie_value);
                }
            }
            "content-type" => self.content_type = Some(value.trim().to_string()),
            _ => {}
        }
        self.headers.entry(key).or_default().push(value.to_string());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// All values of a query parameter (empty when absent).
    pub fn query_values(&self, name: &str) -> &[String] {
        self.query.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All values of a header, looked up case-insensitively.
    pub fn header_values(&self, name: &str) -> &[String] {
        self.headers
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn query(&self) -> &HashMap<String, Vec<String>> {
        &self.query
    }

    pub fn headers(&self) -> &HashMap<String, Vec<String>> {
        &self.headers
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8 text, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

/// Parse a query string into multi-valued parameters.
pub(crate) fn parse_query_string(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = match part.split_once('=') {
            Some((key, value)) => (decode_component(key), decode_component(value)),
            None => (decode_component(part), String::new()),
        };
        params.entry(key).or_default().push(value);
    }

    params
}

/// Split a `Cookie` header into name/value pairs.
fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}

/// Percent and plus decoding for form and query components.
pub(crate) fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    match urlencoding::decode(&s) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned(),
    }
}

/// Percent-encode a form or query component.
pub(crate) fn encode_component(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("foo=bar&baz=qux&foo=again");
        assert_eq!(params.get("foo"), Some(&vec!["bar".to_string(), "again".to_string()]));
        assert_eq!(params.get("baz"), Some(&vec!["qux".to_string()]));

        let params = parse_query_string("name=John%20Doe&flag");
        assert_eq!(params.get("name"), Some(&vec!["John Doe".to_string()]));
        assert_eq!(params.get("flag"), Some(&vec![String::new()]));
    }

    #[test]
    fn test_decode_multibyte_and_plus() {
        assert_eq!(decode_component("caf%C3%A9+au+lait"), "café au lait");
        assert_eq!(decode_component("100%"), "100%");
        assert_eq!(decode_component("%zz"), "%zz");
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode_component("a b&c=d"), "a%20b%26c%3Dd");
    }

    #[test]
    fn test_from_parts() {
        let request = Request::from_parts(
            Method::Post,
            "/login?next=%2Fhome",
            [
                ("Content-Type", "application/json"),
                ("Cookie", "session=abc; theme=dark"),
                ("X-Trace", "1"),
                ("x-trace", "2"),
            ],
            br#"{"user":"ann"}"#.to_vec(),
        );

        assert_eq!(request.method(), Method::Post);
        assert_eq!(request.path(), "/login");
        assert_eq!(request.query_values("next"), &["/home".to_string()]);
        assert_eq!(request.content_type(), Some("application/json"));
        assert_eq!(request.cookie("session"), Some("abc"));
        assert_eq!(request.cookie("theme"), Some("dark"));
        assert_eq!(request.header_values("X-TRACE").len(), 2);
        assert_eq!(request.body_str(), Some(r#"{"user":"ann"}"#));
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!(Method::Delete.to_string(), "DELETE");
        assert!(matches!(
            "BREW".parse::<Method>(),
            Err(MockError::InvalidMethod(m)) if m == "BREW"
        ));
    }
}
