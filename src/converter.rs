//! Body converters.
//!
//! A [`Converter`] turns a logical body value into bytes for a content type
//! and back. The core only ever sees bytes plus a content-type tag; anything
//! richer goes through the converters registered in [`Converters`].

use crate::error::{MockError, Result};
use crate::request::{decode_component, encode_component};
use serde_json::Value;
use std::sync::Arc;

/// Pluggable encoder/decoder for one family of content types.
pub trait Converter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether this converter handles the given (normalized) media type.
    fn supports(&self, media_type: &str) -> bool;

    fn encode(&self, value: &Value, content_type: &str) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8], content_type: &str) -> Result<Value>;
}

/// Strip parameters and lowercase a content type: `Text/HTML; charset=utf-8`
/// becomes `text/html`.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

fn conversion_error(content_type: &str, reason: impl ToString) -> MockError {
    MockError::Conversion {
        content_type: content_type.to_string(),
        reason: reason.to_string(),
    }
}

/// `application/json` and `*/*+json`.
#[derive(Debug, Default)]
pub struct JsonConverter;

impl Converter for JsonConverter {
    fn name(&self) -> &str {
        "json"
    }

    fn supports(&self, media_type: &str) -> bool {
        media_type == "application/json" || media_type.ends_with("+json")
    }

    fn encode(&self, value: &Value, content_type: &str) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| conversion_error(content_type, e))
    }

    fn decode(&self, bytes: &[u8], content_type: &str) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| conversion_error(content_type, e))
    }
}

/// `text/*`. Strings are written verbatim, other values in their JSON form.
#[derive(Debug, Default)]
pub struct TextConverter;

impl Converter for TextConverter {
    fn name(&self) -> &str {
        "text"
    }

    fn supports(&self, media_type: &str) -> bool {
        media_type.starts_with("text/")
    }

    fn encode(&self, value: &Value, _content_type: &str) -> Result<Vec<u8>> {
        Ok(match value {
            Value::String(s) => s.clone().into_bytes(),
            Value::Null => Vec::new(),
            other => other.to_string().into_bytes(),
        })
    }

    fn decode(&self, bytes: &[u8], content_type: &str) -> Result<Value> {
        std::str::from_utf8(bytes)
            .map(|s| Value::String(s.to_string()))
            .map_err(|e| conversion_error(content_type, e))
    }
}

/// `application/x-www-form-urlencoded`, mapping to a flat JSON object.
#[derive(Debug, Default)]
pub struct FormConverter;

impl Converter for FormConverter {
    fn name(&self) -> &str {
        "form"
    }

    fn supports(&self, media_type: &str) -> bool {
        media_type == "application/x-www-form-urlencoded"
    }

    fn encode(&self, value: &Value, content_type: &str) -> Result<Vec<u8>> {
        let fields = value
            .as_object()
            .ok_or_else(|| conversion_error(content_type, "form body must be an object"))?;

        let mut pairs = Vec::new();
        for (name, field) in fields {
            let rendered = match field {
                Value::String(s) => s.clone(),
                Value::Array(items) => {
                    for item in items {
                        let item = item.as_str().map(String::from).unwrap_or_else(|| item.to_string());
                        pairs.push(format!("{}={}", encode_component(name), encode_component(&item)));
                    }
                    continue;
                }
                other => other.to_string(),
            };
            pairs.push(format!("{}={}", encode_component(name), encode_component(&rendered)));
        }
        Ok(pairs.join("&").into_bytes())
    }

    fn decode(&self, bytes: &[u8], content_type: &str) -> Result<Value> {
        let text = std::str::from_utf8(bytes).map_err(|e| conversion_error(content_type, e))?;
        let mut fields = serde_json::Map::new();

        for part in text.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once('=').unwrap_or((part, ""));
            let name = decode_component(name);
            let value = Value::String(decode_component(value));
            match fields.get_mut(&name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    fields.insert(name, value);
                }
            }
        }
        Ok(Value::Object(fields))
    }
}

/// Ordered set of converters. Later registrations take precedence, so a
/// caller can override a built-in converter for a content type.
#[derive(Clone)]
pub struct Converters {
    converters: Vec<Arc<dyn Converter>>,
}

impl Converters {
    /// An empty set: every encode fails with `UnresolvedConverter`.
    pub fn empty() -> Self {
        Self {
            converters: Vec::new(),
        }
    }

    pub fn register(&mut self, converter: impl Converter + 'static) -> &mut Self {
        self.converters.push(Arc::new(converter));
        self
    }

    /// Find the converter for a content type.
    pub fn find(&self, content_type: &str) -> Option<&dyn Converter> {
        let media = media_type(content_type);
        self.converters
            .iter()
            .rev()
            .find(|c| c.supports(&media))
            .map(|c| c.as_ref())
    }

    pub fn encode(&self, value: &Value, content_type: &str) -> Result<Vec<u8>> {
        let converter = self
            .find(content_type)
            .ok_or_else(|| MockError::UnresolvedConverter {
                content_type: content_type.to_string(),
            })?;
        converter.encode(value, content_type)
    }

    pub fn decode(&self, bytes: &[u8], content_type: &str) -> Result<Value> {
        let converter = self
            .find(content_type)
            .ok_or_else(|| MockError::UnresolvedConverter {
                content_type: content_type.to_string(),
            })?;
        converter.decode(bytes, content_type)
    }
}

impl Default for Converters {
    fn default() -> Self {
        let mut converters = Self::empty();
        converters
            .register(TextConverter)
            .register(FormConverter)
            .register(JsonConverter);
        converters
    }
}

impl std::fmt::Debug for Converters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.converters.iter().map(|c| c.name()))
            .finish()
    }
}
