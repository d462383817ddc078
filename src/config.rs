//! Configuration for the mock server.
//!
//! Describes expectations, their response sequences, and global settings in
//! YAML. Definitions are compiled into [`ExpectationBuilder`]s, so a config
//! file and the builder API produce identical expectations.

use crate::expectation::ExpectationBuilder;
use crate::matcher::{BodyMatcher, Matcher};
use crate::request::Method;
use crate::response::{Delay, ResponseBuilder};
use crate::verifier::CallCount;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration for the mock server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// Expectations in match-precedence order
    #[serde(default)]
    pub expectations: Vec<ExpectationDefinition>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl MockServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_yaml(&content)?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration by compiling every expectation.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.builders().map(|_| ())
    }

    /// Compile all expectation definitions, in order.
    pub fn builders(&self) -> anyhow::Result<Vec<ExpectationBuilder>> {
        self.expectations
            .iter()
            .enumerate()
            .map(|(i, def)| {
                def.to_builder()
                    .with_context(|| format!("Expectation {} ({})", i, def.id))
            })
            .collect()
    }
}

/// A single expectation definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectationDefinition {
    /// Identifier used as the expectation label
    pub id: String,

    /// HTTP method to match
    pub method: Method,

    /// Path matching (absent = any path)
    #[serde(default)]
    pub path: Option<ValueMatcher>,

    /// Query parameter matching
    #[serde(default)]
    pub query: HashMap<String, ValueMatcher>,

    /// Header matching (names are case-insensitive)
    #[serde(default)]
    pub headers: HashMap<String, ValueMatcher>,

    /// Cookie matching
    #[serde(default)]
    pub cookies: HashMap<String, ValueMatcher>,

    /// Request content type matching
    #[serde(default)]
    pub content_type: Option<ValueMatcher>,

    /// Body matching
    #[serde(default)]
    pub body: Option<BodyMatcherDefinition>,

    /// Responses returned in order; the last one repeats
    #[serde(default)]
    pub responses: Vec<ResponseDefinition>,

    /// Expected number of calls, checked on verification
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub calls: Option<CallCount>,
}

impl ExpectationDefinition {
    /// Compile into a builder, validating patterns and responses.
    pub fn to_builder(&self) -> anyhow::Result<ExpectationBuilder> {
        if self.id.is_empty() {
            anyhow::bail!("Expectation id cannot be empty");
        }

        let path = match &self.path {
            Some(path) => path.to_matcher()?,
            None => Matcher::Any,
        };

        let mut builder = ExpectationBuilder::new(self.method, path);
        builder.label(self.id.clone());

        for (name, matcher) in &self.query {
            builder.query(name.clone(), matcher.to_matcher()?);
        }
        for (name, matcher) in &self.headers {
            builder.header(name.clone(), matcher.to_matcher()?);
        }
        for (name, matcher) in &self.cookies {
            builder.cookie(name.clone(), matcher.to_matcher()?);
        }
        if let Some(content_type) = &self.content_type {
            builder.content_type(content_type.to_matcher()?);
        }
        if let Some(body) = &self.body {
            builder.body(body.to_matcher()?);
        }
        for (i, response) in self.responses.iter().enumerate() {
            let response = response
                .to_builder()
                .with_context(|| format!("Response {}", i))?
                .build()
                .with_context(|| format!("Response {}", i))?;
            builder.respond(response);
        }
        if let Some(calls) = self.calls {
            builder.called(calls);
        }

        // Surface builder-time errors during validation
        builder.build()?;
        Ok(builder)
    }
}

/// Attribute value matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueMatcher {
    /// Exact value match
    Exact { value: String },
    /// Case-insensitive exact match
    ExactIgnoreCase { value: String },
    /// Value must contain substring
    Contains { value: String },
    /// Value prefix match
    Prefix { value: String },
    /// Regex pattern match
    Regex { pattern: String },
    /// Glob pattern match
    Glob { pattern: String },
    /// Numeric value within inclusive bounds
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Value must be present (any value)
    Present,
    /// Value must be absent
    Absent,
    /// Anything, present or not
    Any,
}

impl ValueMatcher {
    pub fn to_matcher(&self) -> anyhow::Result<Matcher> {
        Ok(match self {
            ValueMatcher::Exact { value } => Matcher::equals(value.clone()),
            ValueMatcher::ExactIgnoreCase { value } => Matcher::equals_ignore_case(value.clone()),
            ValueMatcher::Contains { value } => Matcher::contains(value.clone()),
            ValueMatcher::Prefix { value } => Matcher::prefix(value.clone()),
            ValueMatcher::Regex { pattern } => Matcher::regex(pattern)?,
            ValueMatcher::Glob { pattern } => Matcher::glob(pattern)?,
            ValueMatcher::Range { min, max } => Matcher::range(*min, *max),
            ValueMatcher::Present => Matcher::Present,
            ValueMatcher::Absent => Matcher::Absent,
            ValueMatcher::Any => Matcher::Any,
        })
    }
}

/// Body matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyMatcherDefinition {
    /// Exact body match
    Exact { value: String },
    /// Regex pattern match
    Regex { pattern: String },
    /// JSON path matching
    JsonPath {
        /// JSON path expressions and expected values
        expressions: HashMap<String, serde_json::Value>,
    },
    /// Body must contain substring
    Contains { value: String },
    /// Body must be valid JSON (any structure)
    Json,
    /// Body must be empty
    Empty,
}

impl BodyMatcherDefinition {
    pub fn to_matcher(&self) -> anyhow::Result<BodyMatcher> {
        Ok(match self {
            BodyMatcherDefinition::Exact { value } => BodyMatcher::equals(value.as_bytes()),
            BodyMatcherDefinition::Regex { pattern } => BodyMatcher::regex(pattern)?,
            BodyMatcherDefinition::JsonPath { expressions } => {
                BodyMatcher::json_path(expressions.clone())?
            }
            BodyMatcherDefinition::Contains { value } => BodyMatcher::contains(value.clone()),
            BodyMatcherDefinition::Json => BodyMatcher::Json,
            BodyMatcherDefinition::Empty => BodyMatcher::Empty,
        })
    }
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response cookies
    #[serde(default)]
    pub cookies: HashMap<String, String>,

    /// Content type (overrides the body's implied type)
    #[serde(default)]
    pub content_type: Option<String>,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,

    /// Whether text/json bodies are Handlebars templates
    #[serde(default)]
    pub template: bool,

    /// Latency simulation
    #[serde(default)]
    pub delay: Option<DelayConfig>,
}

fn default_status() -> u16 {
    200
}

impl ResponseDefinition {
    /// Compile into a response builder. Status is validated on `build`.
    pub fn to_builder(&self) -> anyhow::Result<ResponseBuilder> {
        let mut builder = ResponseBuilder::new();
        builder.status(self.status);

        match &self.body {
            Some(ResponseBody::Text { content }) if self.template => {
                builder.content_type("text/plain").template(content.clone());
            }
            Some(ResponseBody::Json { content }) if self.template => {
                builder
                    .content_type("application/json")
                    .json_template(content.clone());
            }
            Some(body) => {
                builder
                    .bytes(body.to_bytes()?)
                    .content_type(body.content_type());
            }
            None => {}
        }

        let mut headers: Vec<_> = self.headers.iter().collect();
        headers.sort();
        for (name, value) in headers {
            builder.header(name.clone(), value.clone());
        }

        let mut cookies: Vec<_> = self.cookies.iter().collect();
        cookies.sort();
        for (name, value) in cookies {
            builder.cookie(name.clone(), value.clone());
        }

        if let Some(content_type) = &self.content_type {
            builder.content_type(content_type.clone());
        }

        match self.delay.as_ref().and_then(DelayConfig::to_delay) {
            Some(Delay::Fixed(duration)) => {
                builder.delay(duration);
            }
            Some(Delay::Between(min, max)) => {
                builder.delay_between(min, max);
            }
            None => {}
        }

        Ok(builder)
    }
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 { content: String },
    /// Load from file
    File { path: String },
}

impl ResponseBody {
    /// Get the body content as bytes.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        match self {
            ResponseBody::Text { content } => Ok(content.as_bytes().to_vec()),
            ResponseBody::Json { content } => Ok(serde_json::to_vec(content)?),
            ResponseBody::Base64 { content } => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .map_err(|e| anyhow::anyhow!("Invalid base64: {}", e))
            }
            ResponseBody::File { path } => std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("Failed to read file {}: {}", path, e)),
        }
    }

    /// Get content type for this body.
    pub fn content_type(&self) -> &'static str {
        match self {
            ResponseBody::Text { .. } => "text/plain",
            ResponseBody::Json { .. } => "application/json",
            ResponseBody::Base64 { .. } => "application/octet-stream",
            ResponseBody::File { .. } => "application/octet-stream",
        }
    }
}

/// Delay/latency simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    /// Fixed delay in milliseconds
    #[serde(default)]
    pub fixed_ms: u64,

    /// Minimum delay for random range (ms)
    #[serde(default)]
    pub min_ms: u64,

    /// Maximum delay for random range (ms)
    #[serde(default)]
    pub max_ms: u64,
}

impl DelayConfig {
    /// The delay to attach to a response, if any.
    pub fn to_delay(&self) -> Option<Delay> {
        if self.fixed_ms > 0 {
            return Some(Delay::Fixed(Duration::from_millis(self.fixed_ms)));
        }
        if self.max_ms > self.min_ms {
            return Some(Delay::Between(
                Duration::from_millis(self.min_ms),
                Duration::from_millis(self.max_ms),
            ));
        }
        (self.min_ms > 0).then(|| Delay::Fixed(Duration::from_millis(self.min_ms)))
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log all matched expectations
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Content type for logical bodies that do not declare one
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            default_content_type: default_content_type(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_content_type() -> String {
    "application/json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::response::Body;
    use std::io::Write;

    #[test]
    fn test_parse_simple_expectation() {
        let yaml = r#"
expectations:
  - id: hello-world
    method: GET
    path:
      type: exact
      value: /hello
    responses:
      - status: 200
        body:
          type: text
          content: "Hello, World!"
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.expectations.len(), 1);
        assert_eq!(config.expectations[0].id, "hello-world");
        assert_eq!(config.expectations[0].method, Method::Get);

        let expectation = config.builders().unwrap()[0].build().unwrap();
        assert_eq!(expectation.label(), Some("hello-world"));
        assert!(expectation.matches(&Request::new(Method::Get, "/hello")));
        let response = expectation.next_response();
        assert_eq!(response.content_type(), Some("text/plain"));
        assert!(matches!(response.body(), Body::Bytes(b) if b == b"Hello, World!"));
    }

    #[test]
    fn test_parse_matchers() {
        let yaml = r#"
expectations:
  - id: search
    method: GET
    path:
      type: glob
      pattern: /api/*/search
    query:
      limit:
        type: range
        min: 1
        max: 100
    headers:
      Authorization:
        type: regex
        pattern: "^Bearer .+"
    cookies:
      session:
        type: present
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        let expectation = config.builders().unwrap()[0].build().unwrap();

        let request = Request::new(Method::Get, "/api/books/search")
            .with_query("limit", "10")
            .with_header("authorization", "Bearer t")
            .with_cookie("session", "s");
        assert!(expectation.matches(&request));

        let over_limit = Request::new(Method::Get, "/api/books/search")
            .with_query("limit", "500")
            .with_header("authorization", "Bearer t")
            .with_cookie("session", "s");
        assert!(!expectation.matches(&over_limit));
    }

    #[test]
    fn test_parse_response_sequence_and_calls() {
        let yaml = r#"
expectations:
  - id: login
    method: POST
    path:
      type: exact
      value: /login
    body:
      type: json_path
      expressions:
        "$.user": "ann"
    calls:
      exactly: 2
    responses:
      - status: 401
      - status: 200
        cookies:
          session: abc
        body:
          type: json
          content:
            ok: true
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        let expectation = config.builders().unwrap()[0].build().unwrap();
        assert_eq!(expectation.responses().len(), 2);
        assert_eq!(expectation.expected_calls(), Some(CallCount::Exactly(2)));
        assert_eq!(expectation.next_response().status(), 401);
        let second = expectation.next_response();
        assert_eq!(second.status(), 200);
        assert_eq!(second.cookie("session"), Some("abc"));
        assert_eq!(second.content_type(), Some("application/json"));
    }

    #[test]
    fn test_parse_delay_config() {
        let yaml = r#"
expectations:
  - id: slow-response
    method: GET
    responses:
      - delay:
          fixed_ms: 1000
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        let expectation = config.builders().unwrap()[0].build().unwrap();
        assert_eq!(
            expectation.next_response().delay(),
            Some(Delay::Fixed(Duration::from_millis(1000)))
        );
    }

    #[test]
    fn test_delay_config_conversion() {
        let fixed = DelayConfig {
            fixed_ms: 100,
            min_ms: 0,
            max_ms: 0,
        };
        assert_eq!(fixed.to_delay(), Some(Delay::Fixed(Duration::from_millis(100))));

        let range = DelayConfig {
            fixed_ms: 0,
            min_ms: 50,
            max_ms: 150,
        };
        assert_eq!(
            range.to_delay(),
            Some(Delay::Between(Duration::from_millis(50), Duration::from_millis(150)))
        );

        let none = DelayConfig {
            fixed_ms: 0,
            min_ms: 0,
            max_ms: 0,
        };
        assert_eq!(none.to_delay(), None);
    }

    #[test]
    fn test_template_response() {
        let yaml = r#"
expectations:
  - id: echo
    method: GET
    responses:
      - template: true
        body:
          type: json
          content:
            path: "{{path}}"
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        let expectation = config.builders().unwrap()[0].build().unwrap();
        let response = expectation.next_response();
        assert!(matches!(response.body(), Body::JsonTemplate(t) if t["path"] == "{{path}}"));
        assert_eq!(response.content_type(), Some("application/json"));
    }

    #[test]
    fn test_invalid_status_rejected() {
        let yaml = r#"
expectations:
  - id: bad
    method: GET
    responses:
      - status: 999
"#;
        let err = MockServerConfig::from_yaml(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid status code: 999"));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let yaml = r#"
expectations:
  - id: bad-regex
    method: GET
    path:
      type: regex
      pattern: "(unclosed"
"#;
        assert!(MockServerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = r#"
expectations:
  - id: typo
    method: GET
    respones: []
"#;
        assert!(MockServerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = MockServerConfig::from_yaml(include_str!("../config/default-config.yaml")).unwrap();
        assert_eq!(config.expectations.len(), 3);

        let builders = config.builders().unwrap();
        let get_user = builders[0].build().unwrap();
        assert!(get_user.matches(
            &Request::new(Method::Get, "/users/42").with_header("Accept", "application/json")
        ));

        let login = builders[1].build().unwrap();
        let request = Request::new(Method::Post, "/login")
            .with_content_type("application/json")
            .with_body(br#"{"user": "ann"}"#.to_vec());
        assert!(login.matches(&request));
    }

    #[test]
    fn test_base64_body() {
        let body = ResponseBody::Base64 {
            content: "aGVsbG8=".to_string(),
        };
        assert_eq!(body.to_bytes().unwrap(), b"hello");
        assert_eq!(body.content_type(), "application/octet-stream");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "expectations:\n  - id: ping\n    method: GET\nsettings:\n  log_matches: false"
        )
        .unwrap();

        let config = MockServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.expectations.len(), 1);
        assert!(!config.settings.log_matches);
        assert!(config.settings.log_unmatched);
        assert_eq!(config.settings.default_content_type, "application/json");
    }
}
