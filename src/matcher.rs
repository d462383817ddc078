//! Matcher primitives.
//!
//! A [`Matcher`] tests one request attribute value (path, header, query
//! parameter, cookie, content type). A [`BodyMatcher`] tests the raw request
//! body. Matchers never fail at match time: patterns are compiled when the
//! matcher is built, and values that are absent or unparseable simply test
//! false.

use crate::error::{MockError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied predicate carried by the `Custom` matcher variants.
pub struct Predicate<T: ?Sized>(Arc<dyn Fn(&T) -> bool + Send + Sync>);

impl<T: ?Sized> Predicate<T> {
    pub fn new(f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn call(&self, value: &T) -> bool {
        (self.0)(value)
    }
}

impl<T: ?Sized> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// Predicate over a single, possibly absent, attribute value.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Matches anything, including an absent value.
    Any,
    /// Matches any present value.
    Present,
    /// Matches only when the value is absent.
    Absent,
    Equals(String),
    EqualsIgnoreCase(String),
    Contains(String),
    Prefix(String),
    Regex(Regex),
    Glob(globset::GlobMatcher),
    /// Numeric value within inclusive bounds.
    Range { min: Option<f64>, max: Option<f64> },
    Custom(Predicate<str>),
}

impl Matcher {
    pub fn equals(value: impl Into<String>) -> Self {
        Matcher::Equals(value.into())
    }

    pub fn equals_ignore_case(value: impl Into<String>) -> Self {
        Matcher::EqualsIgnoreCase(value.into())
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Matcher::Contains(value.into())
    }

    pub fn prefix(value: impl Into<String>) -> Self {
        Matcher::Prefix(value.into())
    }

    /// Compile a regular expression matcher.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Matcher::Regex)
            .map_err(|e| MockError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// Compile a glob matcher (e.g. `/api/*/items`).
    pub fn glob(pattern: &str) -> Result<Self> {
        globset::Glob::new(pattern)
            .map(|glob| Matcher::Glob(glob.compile_matcher()))
            .map_err(|e| MockError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        Matcher::Range { min, max }
    }

    pub fn custom(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Matcher::Custom(Predicate::new(f))
    }

    /// Test a single value. `None` means the attribute is absent.
    pub fn test(&self, value: Option<&str>) -> bool {
        match (self, value) {
            (Matcher::Any, _) => true,
            (Matcher::Absent, value) => value.is_none(),
            (_, None) => false,
            (Matcher::Present, Some(_)) => true,
            (Matcher::Equals(expected), Some(value)) => value == expected,
            (Matcher::EqualsIgnoreCase(expected), Some(value)) => value.eq_ignore_ascii_case(expected),
            (Matcher::Contains(needle), Some(value)) => value.contains(needle.as_str()),
            (Matcher::Prefix(prefix), Some(value)) => value.starts_with(prefix.as_str()),
            (Matcher::Regex(regex), Some(value)) => regex.is_match(value),
            (Matcher::Glob(glob), Some(value)) => glob.is_match(value),
            (Matcher::Range { min, max }, Some(value)) => match value.trim().parse::<f64>() {
                Ok(n) => min.map_or(true, |min| n >= min) && max.map_or(true, |max| n <= max),
                Err(_) => false,
            },
            (Matcher::Custom(predicate), Some(value)) => predicate.call(value),
        }
    }

    /// Test a multi-valued attribute: passes when any value passes.
    /// `Absent` passes only when there are no values.
    pub fn test_values(&self, values: &[String]) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Absent => values.is_empty(),
            _ => values.iter().any(|v| self.test(Some(v))),
        }
    }
}

impl From<&str> for Matcher {
    fn from(value: &str) -> Self {
        Matcher::Equals(value.to_string())
    }
}

impl From<String> for Matcher {
    fn from(value: String) -> Self {
        Matcher::Equals(value)
    }
}

impl From<Regex> for Matcher {
    fn from(regex: Regex) -> Self {
        Matcher::Regex(regex)
    }
}

/// Predicate over the raw request body.
#[derive(Debug, Clone)]
pub enum BodyMatcher {
    Equals(Vec<u8>),
    Contains(String),
    Regex(Regex),
    /// Body must be valid JSON (any structure).
    Json,
    /// Each JSON path must resolve to the expected value. A `null` expected
    /// value only requires the path to resolve.
    JsonPath(Vec<JsonPathExpectation>),
    /// Body must be empty.
    Empty,
    Custom(Predicate<[u8]>),
}

impl BodyMatcher {
    pub fn equals(body: impl Into<Vec<u8>>) -> Self {
        BodyMatcher::Equals(body.into())
    }

    pub fn contains(value: impl Into<String>) -> Self {
        BodyMatcher::Contains(value.into())
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(BodyMatcher::Regex)
            .map_err(|e| MockError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// Build a JSON path matcher, rejecting expressions that do not parse.
    pub fn json_path(expressions: HashMap<String, serde_json::Value>) -> Result<Self> {
        let mut compiled = Vec::with_capacity(expressions.len());
        for (expression, expected) in expressions {
            let path = jsonpath_rust::JsonPath::<serde_json::Value>::try_from(expression.as_str())
                .map_err(|e| MockError::InvalidPattern {
                    pattern: expression.clone(),
                    reason: e.to_string(),
                })?;
            compiled.push(JsonPathExpectation {
                expression,
                path,
                expected,
            });
        }
        // Stable order keeps Debug output deterministic.
        compiled.sort_by(|a, b| a.expression.cmp(&b.expression));
        Ok(BodyMatcher::JsonPath(compiled))
    }

    pub fn custom(f: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Self {
        BodyMatcher::Custom(Predicate::new(f))
    }

    pub fn test(&self, body: &[u8]) -> bool {
        let body_str = std::str::from_utf8(body).ok();

        match self {
            BodyMatcher::Equals(expected) => body == expected.as_slice(),
            BodyMatcher::Contains(value) => {
                body_str.map(|bs| bs.contains(value.as_str())).unwrap_or(false)
            }
            BodyMatcher::Regex(regex) => body_str.map(|bs| regex.is_match(bs)).unwrap_or(false),
            BodyMatcher::Json => body_str
                .map(|bs| serde_json::from_str::<serde_json::Value>(bs).is_ok())
                .unwrap_or(false),
            BodyMatcher::JsonPath(expressions) => body_str
                .and_then(|bs| serde_json::from_str::<serde_json::Value>(bs).ok())
                .map(|json| expressions.iter().all(|expectation| expectation.test(&json)))
                .unwrap_or(false),
            BodyMatcher::Empty => body.is_empty(),
            BodyMatcher::Custom(predicate) => predicate.call(body),
        }
    }
}

/// A compiled JSON path and the value it must resolve to.
#[derive(Debug, Clone)]
pub struct JsonPathExpectation {
    expression: String,
    path: jsonpath_rust::JsonPath,
    expected: serde_json::Value,
}

impl JsonPathExpectation {
    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn test(&self, json: &serde_json::Value) -> bool {
        let results = self.path.find(json);

        // Results may come back as the bare value or as a one-element array.
        let single = match &results {
            serde_json::Value::Array(items) if items.len() == 1 => Some(&items[0]),
            serde_json::Value::Array(_) => None,
            other => Some(other),
        };

        if self.expected.is_null() {
            match &results {
                serde_json::Value::Null => false,
                serde_json::Value::Array(items) => !items.is_empty(),
                _ => true,
            }
        } else {
            results == self.expected || single == Some(&self.expected)
        }
    }
}
