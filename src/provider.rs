//! Scenario providers: sources able to answer an intercepted request.
//!
//! The interceptor holds an ordered list of providers and does not care which
//! kind each one is. A provider either produces a response or reports that it
//! has none; only malformed fixtures are errors.

use crate::error::{DecodeError, InterceptError, LoadError};
use crate::filing::FilingPolicy;
use crate::http::HttpRequest;
use crate::mapper::Mapper;
use crate::matcher::{MatchResult, RuleMatcher};
use crate::scenario::{ResponseDescriptor, ScenarioDescriptor};
use crate::store::ScenarioLoader;
use crate::template::{TemplateContext, TemplateEngine};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// A source of mock responses.
#[async_trait]
pub trait ScenarioProvider: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Produce a response for the request, or `None` when this provider has
    /// nothing for it.
    async fn resolve(
        &self,
        request: &HttpRequest,
    ) -> Result<Option<ResponseDescriptor>, InterceptError>;
}

/// Callback answering requests programmatically.
pub trait RequestCallback: Send + Sync {
    fn respond(&self, request: &HttpRequest) -> Option<ResponseDescriptor>;
}

impl<F> RequestCallback for F
where
    F: Fn(&HttpRequest) -> Option<ResponseDescriptor> + Send + Sync,
{
    fn respond(&self, request: &HttpRequest) -> Option<ResponseDescriptor> {
        self(request)
    }
}

/// Tries registered callbacks in order; the first answer wins.
#[derive(Default)]
pub struct DynamicMockProvider {
    callbacks: Vec<Arc<dyn RequestCallback>>,
}

impl DynamicMockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, callback: Arc<dyn RequestCallback>) {
        self.callbacks.push(callback);
    }
}

#[async_trait]
impl ScenarioProvider for DynamicMockProvider {
    fn name(&self) -> &str {
        "dynamic"
    }

    async fn resolve(
        &self,
        request: &HttpRequest,
    ) -> Result<Option<ResponseDescriptor>, InterceptError> {
        Ok(self.callbacks.iter().find_map(|cb| cb.respond(request)))
    }
}

/// Serves responses from scenario files located by a filing policy.
///
/// The file is loaded and decoded on every call, so edits to a scenario are
/// visible to the very next request.
pub struct StaticMockProvider {
    name: String,
    policy: Arc<dyn FilingPolicy>,
    loader: Arc<dyn ScenarioLoader>,
    mapper: Arc<dyn Mapper>,
    templates: Arc<TemplateEngine>,
}

impl StaticMockProvider {
    pub fn new(
        policy: Arc<dyn FilingPolicy>,
        loader: Arc<dyn ScenarioLoader>,
        mapper: Arc<dyn Mapper>,
    ) -> Self {
        Self {
            name: format!("static:{}", mapper.format()),
            policy,
            loader,
            mapper,
            templates: Arc::new(TemplateEngine::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_templates(mut self, templates: Arc<TemplateEngine>) -> Self {
        self.templates = templates;
        self
    }

    /// Load and decode the scenario for a file identifier.
    ///
    /// A missing or unreadable file is `None`; undecodable bytes are an error.
    async fn load_scenario(&self, id: &str) -> Result<Option<ScenarioDescriptor>, InterceptError> {
        let loader = Arc::clone(&self.loader);
        let mapper = Arc::clone(&self.mapper);
        let id = id.to_string();

        let decoded = tokio::task::spawn_blocking(move || -> Result<_, DecodeError> {
            let bytes = match loader.load(&id) {
                Ok(bytes) => bytes,
                Err(LoadError::NotFound(_)) => {
                    debug!(file = %id, "No scenario file");
                    return Ok(None);
                }
                Err(e) => {
                    warn!(file = %id, error = %e, "Scenario file unreadable, skipping");
                    return Ok(None);
                }
            };
            mapper.decode(&bytes).map(Some)
        })
        .await
        .map_err(|e| InterceptError::Task(e.to_string()))?;

        Ok(decoded?)
    }

    fn build_response(
        &self,
        found: &MatchResult<'_>,
        request: &HttpRequest,
    ) -> Result<ResponseDescriptor, InterceptError> {
        let rule = found.rule;
        let definition = &rule.response;

        let body = match &definition.body {
            Some(body) if definition.template => {
                let ctx = TemplateContext::new(&found.context, request);
                self.templates.render_body(body, &ctx)
            }
            Some(body) => body.to_bytes(),
            None => Ok(Vec::new()),
        }
        .map_err(|message| InterceptError::Render {
            rule: rule.label(found.index),
            message,
        })?;

        let mut response = ResponseDescriptor::new(definition.status).with_body(body);
        response.headers = definition.headers.clone();

        if !definition.has_content_type() {
            if let Some(content_type) = definition
                .body
                .as_ref()
                .and_then(|b| b.implied_content_type())
            {
                response
                    .headers
                    .insert("Content-Type".to_string(), content_type.to_string());
            }
        }

        if let Some(delay) = &rule.delay {
            response.delay = Some(delay.calculate());
        }

        Ok(response)
    }
}

#[async_trait]
impl ScenarioProvider for StaticMockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(
        &self,
        request: &HttpRequest,
    ) -> Result<Option<ResponseDescriptor>, InterceptError> {
        let id = self.policy.file_name(request);
        let Some(scenario) = self.load_scenario(&id).await? else {
            return Ok(None);
        };

        let matcher = RuleMatcher::compile(&scenario)?;
        let Some(found) = matcher.find_match(&scenario, request) else {
            debug!(file = %id, rules = scenario.rules.len(), "No rule matched");
            return Ok(None);
        };

        debug!(file = %id, rule = %found.rule.label(found.index), "Rule matched");
        self.build_response(&found, request).map(Some)
    }
}
