//! Template engine for request-aware response bodies.
//!
//! Uses Handlebars for template rendering with request context.

use crate::converter::Converters;
use crate::request::Request;
use handlebars::Handlebars;
use serde::Serialize;
use std::collections::HashMap;

/// Template engine for rendering dynamic responses.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

/// Context for template rendering.
#[derive(Debug, Serialize)]
pub struct TemplateContext {
    /// Request method
    pub method: String,
    /// Request path
    pub path: String,
    /// Query parameters (first value of each)
    pub query: HashMap<String, String>,
    /// Request headers (first value of each, lowercased names)
    pub headers: HashMap<String, String>,
    /// Request cookies
    pub cookies: HashMap<String, String>,
    /// Request body (as string, if text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Request body decoded through the converter for its content type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
}

impl TemplateContext {
    /// Capture the parts of a request visible to templates.
    pub fn from_request(request: &Request, converters: &Converters) -> Self {
        let first_values = |map: &HashMap<String, Vec<String>>| {
            map.iter()
                .filter_map(|(k, v)| v.first().map(|first| (k.clone(), first.clone())))
                .collect::<HashMap<_, _>>()
        };

        let body = request.body_str().filter(|s| !s.is_empty()).map(String::from);
        let json = match request.content_type() {
            Some(ct) => converters.decode(request.body(), ct).ok(),
            None => body.as_ref().and_then(|s| serde_json::from_str(s).ok()),
        };

        Self {
            method: request.method().to_string(),
            path: request.path().to_string(),
            query: first_values(request.query()),
            headers: first_values(request.headers()),
            cookies: request.cookies().clone(),
            body,
            json,
        }
    }
}

impl TemplateEngine {
    /// Create a new template engine.
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("json", Box::new(json_helper));
        handlebars.register_helper("uuid", Box::new(uuid_helper));
        handlebars.register_helper("now", Box::new(now_helper));
        handlebars.register_helper("random", Box::new(random_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));

        // Bodies are not necessarily HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Render a template string against a request.
    pub fn render(
        &self,
        template: &str,
        request: &Request,
        converters: &Converters,
    ) -> Result<String, handlebars::RenderError> {
        let ctx = TemplateContext::from_request(request, converters);
        self.handlebars.render_template(template, &ctx)
    }

    /// Render every string leaf of a JSON value against a request.
    ///
    /// Rendered strings stay strings, so request values never need escaping.
    pub fn render_json(
        &self,
        json: &serde_json::Value,
        request: &Request,
        converters: &Converters,
    ) -> Result<serde_json::Value, handlebars::RenderError> {
        let ctx = TemplateContext::from_request(request, converters);
        self.render_json_value(json, &ctx)
    }

    fn render_json_value(
        &self,
        value: &serde_json::Value,
        ctx: &TemplateContext,
    ) -> Result<serde_json::Value, handlebars::RenderError> {
        match value {
            serde_json::Value::String(s) if s.contains("{{") => {
                let rendered = self.handlebars.render_template(s, ctx)?;
                Ok(serde_json::Value::String(rendered))
            }
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| self.render_json_value(item, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            serde_json::Value::Object(fields) => {
                let mut rendered = serde_json::Map::new();
                for (name, field) in fields {
                    rendered.insert(name.clone(), self.render_json_value(field, ctx)?);
                }
                Ok(serde_json::Value::Object(rendered))
            }
            _ => Ok(value.clone()),
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine").finish_non_exhaustive()
    }
}

// Custom Handlebars helpers

fn json_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    match h.param(0).map(|v| v.value()) {
        Some(serde_json::Value::String(s)) => out.write(s)?,
        Some(value) => out.write(&serde_json::to_string(value).unwrap_or_default())?,
        None => {}
    }
    Ok(())
}

fn uuid_helper(
    _: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let uuid = format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        rng.gen::<u32>(),
        rng.gen::<u16>(),
        rng.gen::<u16>() & 0x0fff,
        (rng.gen::<u16>() & 0x3fff) | 0x8000,
        rng.gen::<u64>() & 0xffffffffffff,
    );
    out.write(&uuid)?;
    Ok(())
}

fn now_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use chrono::Utc;

    let format = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .unwrap_or("%Y-%m-%dT%H:%M:%S%.3fZ");

    out.write(&Utc::now().format(format).to_string())?;
    Ok(())
}

fn random_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use rand::Rng;

    let min = h.param(0).and_then(|v| v.value().as_i64()).unwrap_or(0);
    let max = h.param(1).and_then(|v| v.value().as_i64()).unwrap_or(100);

    let value = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    out.write(&value.to_string())?;
    Ok(())
}

fn default_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).map(|v| v.value());
    let default = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");

    match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => out.write(s)?,
        Some(v) if !v.is_null() && !v.is_string() => out.write(&v.to_string())?,
        _ => out.write(default)?,
    }
    Ok(())
}

fn upper_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_uppercase())?;
    Ok(())
}

fn lower_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_lowercase())?;
    Ok(())
}
