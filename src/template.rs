//! Template engine for dynamic responses.
//!
//! Rules marked `template: true` render their string content through
//! Handlebars with the intercepted request as context.

use crate::http::HttpRequest;
use crate::matcher::MatchContext;
use crate::scenario::ResponseBody;
use handlebars::{Context, Handlebars, Helper, HelperResult, Output, RenderContext};
use serde::Serialize;
use std::collections::HashMap;

/// Handlebars registry with the response helpers installed.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

/// Context for template rendering.
#[derive(Debug, Serialize)]
pub struct TemplateContext {
    /// Path parameters from URL template matching
    pub path: HashMap<String, String>,
    /// Query parameters
    pub query: HashMap<String, String>,
    /// Request headers, keyed by lowercase name
    pub headers: HashMap<String, String>,
    /// Regex capture groups
    pub captures: HashMap<String, String>,
    /// Request method
    pub method: String,
    /// Request path
    pub request_path: String,
    /// Full request URL
    pub url: String,
    /// Request body (as string, if text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Request body as JSON (if parseable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
}

impl TemplateContext {
    pub fn new(match_ctx: &MatchContext, request: &HttpRequest) -> Self {
        let body = request
            .body_bytes()
            .and_then(|b| std::str::from_utf8(b).ok())
            .map(String::from);
        let json = body.as_ref().and_then(|s| serde_json::from_str(s).ok());

        Self {
            path: match_ctx.path_params.clone(),
            query: match_ctx.query_params.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
            captures: match_ctx.captures.clone(),
            method: request.method.clone(),
            request_path: request.path().to_string(),
            url: request.url.clone(),
            body,
            json,
        }
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("uuid", Box::new(uuid_helper));
        handlebars.register_helper("now", Box::new(now_helper));
        handlebars.register_helper("random", Box::new(random_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));
        handlebars.register_helper("json", Box::new(json_helper));

        // Bodies are not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Render a response body against the intercepted request.
    pub fn render_body(&self, body: &ResponseBody, ctx: &TemplateContext) -> Result<Vec<u8>, String> {
        match body {
            ResponseBody::Text { content } => self
                .render(content, ctx)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
            ResponseBody::Json { content } => {
                let rendered = self
                    .render_json_value(content, ctx)
                    .map_err(|e| e.to_string())?;
                serde_json::to_vec(&rendered).map_err(|e| e.to_string())
            }
            // Binary bodies are never templated
            ResponseBody::Base64 { .. } => body.to_bytes(),
        }
    }

    /// Render a template string with the given context.
    pub fn render(
        &self,
        template: &str,
        ctx: &TemplateContext,
    ) -> Result<String, handlebars::RenderError> {
        self.handlebars.render_template(template, ctx)
    }

    /// Render every string leaf of a JSON document; structure is preserved.
    fn render_json_value(
        &self,
        value: &serde_json::Value,
        ctx: &TemplateContext,
    ) -> Result<serde_json::Value, handlebars::RenderError> {
        use serde_json::Value;

        Ok(match value {
            Value::String(s) if s.contains("{{") => {
                Value::String(self.handlebars.render_template(s, ctx)?)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.render_json_value(item, ctx))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, item)| {
                        self.render_json_value(item, ctx)
                            .map(|rendered| (key.clone(), rendered))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            other => other.clone(),
        })
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Declares a helper that writes the string produced by `$body`.
macro_rules! text_helper {
    ($name:ident, |$h:ident| $body:expr) => {
        fn $name(
            $h: &Helper,
            _: &Handlebars,
            _: &Context,
            _: &mut RenderContext,
            out: &mut dyn Output,
        ) -> HelperResult {
            let text: String = $body;
            out.write(&text)?;
            Ok(())
        }
    };
}

fn param<'a>(h: &'a Helper, index: usize) -> Option<&'a serde_json::Value> {
    h.param(index).map(|p| p.value())
}

fn str_param<'a>(h: &'a Helper, index: usize) -> &'a str {
    param(h, index).and_then(|v| v.as_str()).unwrap_or("")
}

text_helper!(json_helper, |h| {
    let raw = str_param(h, 0);
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or_else(|| raw.to_string())
});

text_helper!(uuid_helper, |_h| random_uuid());

text_helper!(now_helper, |h| {
    let format = param(h, 0)
        .and_then(|v| v.as_str())
        .unwrap_or("%Y-%m-%dT%H:%M:%S%.3fZ");
    chrono::Utc::now().format(format).to_string()
});

text_helper!(random_helper, |h| {
    use rand::Rng;
    let min = param(h, 0).and_then(|v| v.as_i64()).unwrap_or(0);
    let max = param(h, 1).and_then(|v| v.as_i64()).unwrap_or(100).max(min);
    rand::thread_rng().gen_range(min..=max).to_string()
});

text_helper!(default_helper, |h| {
    match param(h, 0) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::String(_)) | Some(serde_json::Value::Null) | None => {
            str_param(h, 1).to_string()
        }
        Some(other) => other.to_string(),
    }
});

text_helper!(upper_helper, |h| str_param(h, 0).to_uppercase());

text_helper!(lower_helper, |h| str_param(h, 0).to_lowercase());

/// Random version 4 UUID.
fn random_uuid() -> String {
    use rand::Rng;
    let mut bytes: [u8; 16] = rand::thread_rng().gen();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}
