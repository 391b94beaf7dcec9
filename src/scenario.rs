//! Scenario descriptors: the decoded form of a scenario file.
//!
//! A scenario is an ordered list of rules. Each rule pairs request-matching
//! criteria with one response; the first rule that matches wins.
//!
//! # Example (YAML)
//!
//! ```yaml
//! rules:
//!   - id: user-by-id
//!     request:
//!       method: [GET]
//!       path:
//!         type: template
//!         template: /users/{id}
//!     response:
//!       status: 200
//!       template: true
//!       body:
//!         type: json
//!         content:
//!           id: "{{path.id}}"
//!     delay:
//!       fixed_ms: 250
//! ```

use crate::error::DecodeError;
use crate::http::{HttpRequest, HttpResponse};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Decoded scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ScenarioDescriptor {
    /// Rules, evaluated in file order
    #[serde(default)]
    pub rules: Vec<ScenarioRule>,
}

impl ScenarioDescriptor {
    pub fn new(rules: Vec<ScenarioRule>) -> Self {
        Self { rules }
    }

    /// Check every rule; the first invalid one is reported.
    pub fn validate(&self) -> Result<(), DecodeError> {
        for (index, rule) in self.rules.iter().enumerate() {
            rule.validate().map_err(|message| DecodeError::InvalidRule {
                rule: rule.label(index),
                message,
            })?;
        }
        Ok(())
    }

    /// Build a single-rule scenario that replays a live exchange.
    pub fn from_exchange(exchange: &RecordedExchange) -> Self {
        let request = &exchange.request;
        let response = &exchange.response;

        let query = request
            .query_params()
            .into_iter()
            .map(|(name, value)| (name, QueryMatcher::Exact { value }))
            .collect();

        let body = if response.body.is_empty() {
            None
        } else {
            match std::str::from_utf8(&response.body) {
                Ok(text) => Some(ResponseBody::Text {
                    content: text.to_string(),
                }),
                Err(_) => Some(ResponseBody::Base64 {
                    content: base64::engine::general_purpose::STANDARD.encode(&response.body),
                }),
            }
        };

        let rule = ScenarioRule {
            id: Some(format!("{} {}", request.method, request.path())),
            name: None,
            request: RequestMatcher {
                method: vec![request.method.clone()],
                path: Some(PathMatcher::Exact {
                    value: request.path().to_string(),
                }),
                query,
                headers: BTreeMap::new(),
                body: None,
            },
            response: ResponseDefinition {
                status: response.status,
                headers: response.headers.clone(),
                body,
                template: false,
            },
            enabled: true,
            delay: None,
        };

        Self { rules: vec![rule] }
    }
}

/// One request/response rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioRule {
    /// Identifier used in logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Optional name/description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Request matcher
    #[serde(default)]
    pub request: RequestMatcher,

    /// Response to return
    pub response: ResponseDefinition,

    /// Whether this rule is considered at all
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,

    /// Per-response latency, overriding the interceptor's delay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<DelayConfig>,
}

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

impl ScenarioRule {
    /// Log label: the id, or the rule's position in the file.
    pub fn label(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("#{}", index))
    }

    fn validate(&self) -> Result<(), String> {
        self.request.validate()?;
        self.response.validate()?;
        if let Some(delay) = &self.delay {
            delay.validate()?;
        }
        Ok(())
    }
}

/// Request matching criteria. Empty criteria match everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RequestMatcher {
    /// HTTP method(s) to match (empty = any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub method: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathMatcher>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, QueryMatcher>,

    /// Header matching; names are case-insensitive
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, HeaderMatcher>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyMatcher>,
}

impl RequestMatcher {
    fn validate(&self) -> Result<(), String> {
        if let Some(path) = &self.path {
            path.validate()?;
        }
        for matcher in self.query.values() {
            if let QueryMatcher::Regex { pattern } = matcher {
                check_regex(pattern)?;
            }
        }
        for matcher in self.headers.values() {
            if let HeaderMatcher::Regex { pattern } = matcher {
                check_regex(pattern)?;
            }
        }
        if let Some(body) = &self.body {
            body.validate()?;
        }
        Ok(())
    }

    /// Every regex pattern these criteria use.
    pub(crate) fn regex_patterns(&self) -> impl Iterator<Item = &str> {
        let path = match &self.path {
            Some(PathMatcher::Regex { pattern }) => Some(pattern.as_str()),
            _ => None,
        };
        let query = self.query.values().filter_map(|m| match m {
            QueryMatcher::Regex { pattern } => Some(pattern.as_str()),
            _ => None,
        });
        let headers = self.headers.values().filter_map(|m| match m {
            HeaderMatcher::Regex { pattern } => Some(pattern.as_str()),
            _ => None,
        });
        let body = match &self.body {
            Some(BodyMatcher::Regex { pattern }) => Some(pattern.as_str()),
            _ => None,
        };
        path.into_iter().chain(query).chain(headers).chain(body)
    }
}

fn check_regex(pattern: &str) -> Result<(), String> {
    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| format!("Invalid regex: {}", e))
}

/// Path matching configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathMatcher {
    /// Exact path match
    Exact { value: String },
    /// Path prefix match
    Prefix { value: String },
    /// Regex pattern match
    Regex { pattern: String },
    /// Glob pattern match
    Glob { pattern: String },
    /// Path with parameters (e.g., /users/{id})
    Template { template: String },
}

impl PathMatcher {
    fn validate(&self) -> Result<(), String> {
        match self {
            PathMatcher::Regex { pattern } => check_regex(pattern),
            PathMatcher::Glob { pattern } => globset::Glob::new(pattern)
                .map(|_| ())
                .map_err(|e| format!("Invalid glob: {}", e)),
            PathMatcher::Template { template } => {
                if template.matches('{').count() != template.matches('}').count() {
                    return Err(format!("Unbalanced braces in template: {}", template));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Query parameter matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryMatcher {
    Exact { value: String },
    Regex { pattern: String },
    /// Parameter must be present (any value)
    Present,
    /// Parameter must be absent
    Absent,
}

/// Header matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeaderMatcher {
    Exact { value: String },
    Regex { pattern: String },
    Present,
    Absent,
    /// Value must contain substring
    Contains { value: String },
}

/// Body predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyMatcher {
    Exact { value: String },
    Regex { pattern: String },
    /// JSON path expressions and expected values (null = path must exist)
    JsonPath {
        expressions: BTreeMap<String, serde_json::Value>,
    },
    Contains { value: String },
    /// Body must be valid JSON (any structure)
    Json,
    /// Body must be absent or empty
    Empty,
}

impl BodyMatcher {
    fn validate(&self) -> Result<(), String> {
        match self {
            BodyMatcher::Regex { pattern } => check_regex(pattern),
            BodyMatcher::JsonPath { expressions } => {
                use jsonpath_rust::JsonPath;

                for expr in expressions.keys() {
                    let _: JsonPath = JsonPath::try_from(expr.as_str())
                        .map_err(|e| format!("Invalid JSON path {}: {}", expr, e))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Response part of a rule, before rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    #[serde(default = "default_status")]
    pub status: u16,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBody>,

    /// Render string content through the template engine
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub template: bool,
}

fn default_status() -> u16 {
    200
}

impl ResponseDefinition {
    fn validate(&self) -> Result<(), String> {
        if self.status < 100 || self.status > 599 {
            return Err(format!("Invalid status code: {}", self.status));
        }
        if let Some(ResponseBody::Base64 { content }) = &self.body {
            base64::engine::general_purpose::STANDARD
                .decode(content)
                .map_err(|e| format!("Invalid base64: {}", e))?;
        }
        Ok(())
    }

    /// Whether the definition names its own content type.
    pub fn has_content_type(&self) -> bool {
        self.headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"))
    }
}

/// Response body configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 { content: String },
}

impl ResponseBody {
    /// Get the body content as bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, String> {
        match self {
            ResponseBody::Text { content } => Ok(content.as_bytes().to_vec()),
            ResponseBody::Json { content } => {
                serde_json::to_vec(content).map_err(|e| e.to_string())
            }
            ResponseBody::Base64 { content } => base64::engine::general_purpose::STANDARD
                .decode(content)
                .map_err(|e| format!("Invalid base64: {}", e)),
        }
    }

    /// Content type implied by the body kind, if any.
    pub fn implied_content_type(&self) -> Option<&'static str> {
        match self {
            ResponseBody::Json { .. } => Some("application/json"),
            _ => None,
        }
    }
}

/// Latency simulation for a single rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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
    pub fn fixed(ms: u64) -> Self {
        Self {
            fixed_ms: ms,
            min_ms: 0,
            max_ms: 0,
        }
    }

    /// Calculate the actual delay to apply.
    pub fn calculate(&self) -> Duration {
        if self.fixed_ms > 0 {
            return Duration::from_millis(self.fixed_ms);
        }
        if self.max_ms > self.min_ms {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            return Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms));
        }
        Duration::from_millis(self.min_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.fixed_ms == 0 && self.max_ms != 0 && self.max_ms < self.min_ms {
            return Err(format!(
                "Delay range is empty: {}..{} ms",
                self.min_ms, self.max_ms
            ));
        }
        Ok(())
    }
}

/// A resolved mock response, ready to hand back to the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDescriptor {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    /// Overrides the interceptor's simulated delay when set
    pub delay: Option<Duration>,
}

impl ResponseDescriptor {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Vec::new(),
            delay: None,
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

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn into_response(self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// A completed live exchange, as handed to the recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedExchange {
    pub request: HttpRequest,
    pub response: HttpResponse,
}
