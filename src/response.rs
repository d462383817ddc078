//! Response configurations and their builder.
//!
//! A [`ResponseConfig`] is immutable once built. Bodies that need the
//! inbound request or a converter are resolved when the response is
//! materialized for a specific request, see [`ResponseConfig::materialize`].

use crate::converter::Converters;
use crate::error::{MockError, Result};
use crate::request::Request;
use crate::template::TemplateEngine;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Closure producing a logical body value for a request.
pub type BodyProducer = Arc<dyn Fn(&Request) -> Value + Send + Sync>;

/// Response body content.
#[derive(Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    /// Raw bytes, written as-is.
    Bytes(Vec<u8>),
    /// Logical value encoded by the converter for the content type.
    Content(Value),
    /// Logical value produced per request, then encoded like `Content`.
    Lazy(BodyProducer),
    /// Handlebars template rendered against the request.
    Template(String),
    /// Logical value whose string leaves are rendered as templates, then
    /// encoded like `Content`.
    JsonTemplate(Value),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Body::Content(value) => f.debug_tuple("Content").field(value).finish(),
            Body::Lazy(_) => f.write_str("Lazy(..)"),
            Body::Template(template) => f.debug_tuple("Template").field(template).finish(),
            Body::JsonTemplate(value) => f.debug_tuple("JsonTemplate").field(value).finish(),
        }
    }
}

/// Artificial latency applied before a response is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    Fixed(Duration),
    /// Uniformly random within inclusive bounds.
    Between(Duration, Duration),
}

impl Delay {
    /// Calculate the actual delay to apply.
    pub fn calculate(&self) -> Duration {
        match *self {
            Delay::Fixed(duration) => duration,
            Delay::Between(min, max) if max > min => {
                use rand::Rng;
                let millis = rand::thread_rng().gen_range(as_millis(min)..=as_millis(max));
                Duration::from_millis(millis)
            }
            Delay::Between(min, _) => min,
        }
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// What to emit for a matched request.
#[derive(Debug, Clone)]
pub struct ResponseConfig {
    status: u16,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    content_type: Option<String>,
    body: Body,
    delay: Option<Delay>,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            cookies: Vec::new(),
            content_type: None,
            body: Body::Empty,
            delay: None,
        }
    }
}

impl ResponseConfig {
    /// Start building a response (status 200, no body).
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::new()
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_ignore_case(&self.headers, name)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn delay(&self) -> Option<Delay> {
        self.delay
    }

    /// Produce the concrete response for one request.
    ///
    /// Logical bodies are encoded with the converter registered for the
    /// content type (falling back to `default_content_type`); a missing
    /// converter is an error, never an empty body.
    pub fn materialize(&self, ctx: &RenderContext<'_>) -> Result<MockResponse> {
        let (body, content_type) = match &self.body {
            Body::Empty => (Vec::new(), self.content_type.clone()),
            Body::Bytes(bytes) => (bytes.clone(), self.content_type.clone()),
            Body::Content(value) => {
                let content_type = self.effective_content_type(ctx);
                (ctx.converters.encode(value, &content_type)?, Some(content_type))
            }
            Body::Lazy(producer) => {
                let content_type = self.effective_content_type(ctx);
                let value = producer(ctx.request);
                (ctx.converters.encode(&value, &content_type)?, Some(content_type))
            }
            Body::Template(template) => {
                let rendered = ctx
                    .templates
                    .render(template, ctx.request, ctx.converters)
                    .map_err(|e| MockError::Template(e.to_string()))?;
                (rendered.into_bytes(), Some(self.effective_content_type(ctx)))
            }
            Body::JsonTemplate(template) => {
                let content_type = self.effective_content_type(ctx);
                let value = ctx
                    .templates
                    .render_json(template, ctx.request, ctx.converters)
                    .map_err(|e| MockError::Template(e.to_string()))?;
                (ctx.converters.encode(&value, &content_type)?, Some(content_type))
            }
        };

        let mut headers = Vec::with_capacity(self.headers.len() + 1);
        if let Some(content_type) = content_type {
            headers.push(("Content-Type".to_string(), content_type));
        }
        headers.extend(self.headers.iter().cloned());

        Ok(MockResponse {
            status: self.status,
            headers,
            cookies: self.cookies.clone(),
            body,
        })
    }

    fn effective_content_type(&self, ctx: &RenderContext<'_>) -> String {
        self.content_type
            .clone()
            .unwrap_or_else(|| ctx.default_content_type.to_string())
    }
}

/// Everything a response needs to materialize against one request.
pub struct RenderContext<'a> {
    pub request: &'a Request,
    pub converters: &'a Converters,
    pub templates: &'a TemplateEngine,
    pub default_content_type: &'a str,
}

/// Fluent builder for [`ResponseConfig`].
///
/// Setters return `&mut Self` for chaining; [`build`](Self::build) validates
/// and produces the immutable configuration. Headers and cookies are
/// single-valued: setting a name twice keeps the last value.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    config: ResponseConfig,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self {
            config: ResponseConfig::default(),
        }
    }

    /// Set the status code. Validated by `build`.
    pub fn status(&mut self, status: u16) -> &mut Self {
        self.config.status = status;
        self
    }

    /// Set a header. A `Content-Type` header sets the content type.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        if name.eq_ignore_ascii_case("content-type") {
            return self.content_type(value);
        }
        self.config.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.config.headers.push((name, value.into()));
        self
    }

    pub fn cookie(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.config.cookies.retain(|(k, _)| *k != name);
        self.config.cookies.push((name, value.into()));
        self
    }

    pub fn content_type(&mut self, content_type: impl Into<String>) -> &mut Self {
        self.config.content_type = Some(content_type.into());
        self
    }

    /// Set a logical body value, encoded for `content_type`.
    pub fn body(&mut self, value: Value, content_type: impl Into<String>) -> &mut Self {
        self.config.body = Body::Content(value);
        self.content_type(content_type)
    }

    /// Set a logical body value encoded for the configured (or default)
    /// content type.
    pub fn content(&mut self, value: Value) -> &mut Self {
        self.config.body = Body::Content(value);
        self
    }

    pub fn json(&mut self, value: Value) -> &mut Self {
        self.body(value, "application/json")
    }

    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        self.config.body = Body::Bytes(text.into().into_bytes());
        if self.config.content_type.is_none() {
            self.config.content_type = Some("text/plain".to_string());
        }
        self
    }

    pub fn bytes(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.config.body = Body::Bytes(bytes.into());
        self
    }

    /// Produce the body per request with a closure.
    pub fn lazy(&mut self, producer: impl Fn(&Request) -> Value + Send + Sync + 'static) -> &mut Self {
        self.config.body = Body::Lazy(Arc::new(producer));
        self
    }

    /// Render the body from a Handlebars template per request.
    pub fn template(&mut self, template: impl Into<String>) -> &mut Self {
        self.config.body = Body::Template(template.into());
        self
    }

    /// Render each string leaf of `value` as a template per request. The
    /// result is encoded for the configured (or default) content type.
    pub fn json_template(&mut self, value: Value) -> &mut Self {
        self.config.body = Body::JsonTemplate(value);
        self
    }

    pub fn delay(&mut self, delay: Duration) -> &mut Self {
        self.config.delay = Some(Delay::Fixed(delay));
        self
    }

    pub fn delay_between(&mut self, min: Duration, max: Duration) -> &mut Self {
        self.config.delay = Some(Delay::Between(min, max));
        self
    }

    /// Validate and produce the configuration.
    pub fn build(&self) -> Result<ResponseConfig> {
        if !(100..=599).contains(&self.config.status) {
            return Err(MockError::InvalidStatusCode(self.config.status));
        }
        Ok(self.config.clone())
    }
}

impl From<ResponseConfig> for ResponseBuilder {
    fn from(config: ResponseConfig) -> Self {
        Self { config }
    }
}

/// A concrete response handed back to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
    /// Response headers, `Content-Type` first when known.
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_ignore_case(&self.headers, name)
    }

    /// Values for `Set-Cookie` headers.
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect()
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

fn find_ignore_case<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;
    use serde_json::json;

    fn materialize(config: &ResponseConfig, request: &Request) -> Result<MockResponse> {
        let converters = Converters::default();
        let templates = TemplateEngine::new();
        config.materialize(&RenderContext {
            request,
            converters: &converters,
            templates: &templates,
            default_content_type: "application/json",
        })
    }

    #[test]
    fn test_defaults() {
        let config = ResponseConfig::builder().build().unwrap();
        assert_eq!(config.status(), 200);
        assert!(config.headers().is_empty());
        assert!(matches!(config.body(), Body::Empty));
        assert!(config.delay().is_none());
    }

    #[test]
    fn test_status_validation() {
        for status in [99, 600, 0, 1000] {
            let err = ResponseConfig::builder().status(status).build().unwrap_err();
            assert!(matches!(err, MockError::InvalidStatusCode(s) if s == status));
        }
        for status in [100, 204, 599] {
            assert_eq!(
                ResponseConfig::builder().status(status).build().unwrap().status(),
                status
            );
        }
    }

    #[test]
    fn test_last_write_wins() {
        let config = ResponseConfig::builder()
            .header("X-Version", "1")
            .header("x-version", "2")
            .cookie("session", "a")
            .cookie("session", "b")
            .build()
            .unwrap();

        assert_eq!(config.headers().len(), 1);
        assert_eq!(config.header("X-VERSION"), Some("2"));
        assert_eq!(config.cookies().len(), 1);
        assert_eq!(config.cookie("session"), Some("b"));
    }

    #[test]
    fn test_content_type_header_sets_content_type() {
        let config = ResponseConfig::builder()
            .header("content-type", "text/csv")
            .build()
            .unwrap();
        assert_eq!(config.content_type(), Some("text/csv"));
        assert!(config.header("Content-Type").is_none());
    }

    #[test]
    fn test_materialize_json() {
        let config = ResponseConfig::builder()
            .status(201)
            .json(json!({"id": 1}))
            .header("Location", "/users/1")
            .cookie("seen", "yes")
            .build()
            .unwrap();

        let response = materialize(&config, &Request::new(Method::Post, "/users")).unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("location"), Some("/users/1"));
        assert_eq!(response.body, br#"{"id":1}"#);
        assert_eq!(response.set_cookie_headers(), vec!["seen=yes".to_string()]);
    }

    #[test]
    fn test_materialize_falls_back_to_default_content_type() {
        let config = ResponseConfig::builder()
            .content(json!([1, 2]))
            .build()
            .unwrap();
        let response = materialize(&config, &Request::new(Method::Get, "/")).unwrap();
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.body_str(), Some("[1,2]"));
    }

    #[test]
    fn test_materialize_unresolved_converter() {
        let config = ResponseConfig::builder()
            .body(json!({"a": 1}), "application/xml")
            .build()
            .unwrap();
        let err = materialize(&config, &Request::new(Method::Get, "/")).unwrap_err();
        assert!(matches!(err, MockError::UnresolvedConverter { .. }));
    }

    #[test]
    fn test_materialize_raw_bytes_has_no_implicit_content_type() {
        let config = ResponseConfig::builder()
            .bytes(vec![0u8, 1, 2])
            .build()
            .unwrap();
        let response = materialize(&config, &Request::new(Method::Get, "/")).unwrap();
        assert!(response.header("Content-Type").is_none());
        assert_eq!(response.body, vec![0u8, 1, 2]);
    }

    #[test]
    fn test_materialize_lazy_per_request() {
        let config = ResponseConfig::builder()
            .lazy(|request| json!({"path": request.path()}))
            .build()
            .unwrap();

        let a = materialize(&config, &Request::new(Method::Get, "/a")).unwrap();
        let b = materialize(&config, &Request::new(Method::Get, "/b")).unwrap();
        assert_eq!(a.body_str(), Some(r#"{"path":"/a"}"#));
        assert_eq!(b.body_str(), Some(r#"{"path":"/b"}"#));
    }

    #[test]
    fn test_materialize_template() {
        let config = ResponseConfig::builder()
            .content_type("text/plain")
            .template("hello {{query.name}}")
            .build()
            .unwrap();
        let request = Request::new(Method::Get, "/greet").with_query("name", "ann");
        let response = materialize(&config, &request).unwrap();
        assert_eq!(response.body_str(), Some("hello ann"));
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn test_materialize_json_template_escapes_values() {
        let config = ResponseConfig::builder()
            .content_type("application/json")
            .json_template(json!({"user": "{{json.user}}", "tags": ["{{method}}", 7]}))
            .build()
            .unwrap();
        let request = Request::new(Method::Post, "/login")
            .with_content_type("application/json")
            .with_body(br#"{"user": "a\"b\\c"}"#.to_vec());

        let response = materialize(&config, &request).unwrap();
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body, json!({"user": "a\"b\\c", "tags": ["POST", 7]}));
        assert_eq!(response.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn test_delay_calculation() {
        assert_eq!(
            Delay::Fixed(Duration::from_millis(100)).calculate(),
            Duration::from_millis(100)
        );

        let delay = Delay::Between(Duration::from_millis(50), Duration::from_millis(150)).calculate();
        assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(150));

        let inverted = Delay::Between(Duration::from_millis(30), Duration::from_millis(10));
        assert_eq!(inverted.calculate(), Duration::from_millis(30));

        let huge = Delay::Between(Duration::from_secs(u64::MAX - 1), Duration::from_secs(u64::MAX));
        assert_eq!(huge.calculate(), Duration::from_millis(u64::MAX));
    }
}
