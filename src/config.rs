//! Interceptor configuration.
//!
//! [`InterceptorConfig`] is the file-backed form; [`InterceptorBuilder`] is the
//! programmatic one and the only way to assemble an interceptor. Invalid
//! combinations are rejected by `build`, never at request time.

use crate::error::ConfigError;
use crate::filing::{FilingKind, FilingPolicy, MirrorPathPolicy};
use crate::interceptor::MockResponseInterceptor;
use crate::mapper::{JsonMapper, Mapper, ScenarioFormat};
use crate::mode::Mode;
use crate::provider::{DynamicMockProvider, RequestCallback, ScenarioProvider, StaticMockProvider};
use crate::store::{FileSystemStore, ScenarioLoader, ScenarioSink};
use crate::template::TemplateEngine;
use crate::writer::RequestWriter;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// File configuration for the interceptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterceptorConfig {
    /// Initial dispatch mode
    #[serde(default)]
    pub mode: Mode,

    /// Simulated latency for mocked responses (ms)
    #[serde(default)]
    pub delay_ms: u64,

    /// Where recorded scenarios are written
    #[serde(default)]
    pub storage_root: Option<PathBuf>,

    /// Where scenarios are read from (defaults to the storage root)
    #[serde(default)]
    pub scenario_root: Option<PathBuf>,

    /// Scenario file format
    #[serde(default)]
    pub format: ScenarioFormat,

    /// Filing policies, in lookup order
    #[serde(default = "default_filing")]
    pub filing: Vec<FilingKind>,

    /// Surface recording failures to the caller
    #[serde(default)]
    pub fail_on_recording_error: bool,

    /// Also record live fallbacks in mixed mode
    #[serde(default)]
    pub record_mixed_fallback: bool,

    /// Logging settings
    #[serde(default)]
    pub settings: LogSettings,
}

fn default_filing() -> Vec<FilingKind> {
    vec![FilingKind::MirrorPath]
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            delay_ms: 0,
            storage_root: None,
            scenario_root: None,
            format: ScenarioFormat::default(),
            filing: default_filing(),
            fail_on_recording_error: false,
            record_mixed_fallback: false,
            settings: LogSettings::default(),
        }
    }
}

impl InterceptorConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let records = self.mode == Mode::Record || self.record_mixed_fallback;
        match &self.storage_root {
            None if records => return Err(ConfigError::MissingStorageRoot),
            Some(root) if root.exists() && !root.is_dir() => {
                return Err(ConfigError::InvalidStorageRoot(root.clone()))
            }
            _ => {}
        }
        Ok(())
    }

    /// Directory scenarios are served from, if any.
    pub fn effective_scenario_root(&self) -> Option<&Path> {
        self.scenario_root
            .as_deref()
            .or(self.storage_root.as_deref())
    }

    /// Translate into a builder; callbacks can still be added before `build`.
    pub fn into_builder(self) -> InterceptorBuilder {
        let mapper: Arc<dyn Mapper> = Arc::from(self.format.mapper());
        let mut builder = InterceptorBuilder::new()
            .mode(self.mode)
            .delay(Duration::from_millis(self.delay_ms))
            .fail_on_recording_error(self.fail_on_recording_error)
            .record_mixed_fallback(self.record_mixed_fallback)
            .settings(self.settings.clone());

        if let Some(root) = &self.storage_root {
            builder = builder.storage_root(root);
        }
        // Filing policies only locate files; without a root there is nothing to read
        if let Some(root) = self.effective_scenario_root() {
            builder = builder.scenario_root(root);
            for kind in &self.filing {
                builder = builder.add_filing_policy(Arc::from(kind.policy(mapper.format())));
            }
        }
        builder.mapper(mapper)
    }

    /// Decode and validate every scenario file of the configured format
    /// beneath the scenario root. Returns the number of files checked.
    pub fn check_scenarios(&self) -> anyhow::Result<usize> {
        let Some(root) = self.effective_scenario_root() else {
            return Ok(0);
        };
        let mapper = self.format.mapper();
        let mut pending = vec![root.to_path_buf()];
        let mut checked = 0;

        while let Some(dir) = pending.pop() {
            if !dir.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !has_scenario_extension(&path, mapper.format()) {
                    continue;
                }
                let bytes = std::fs::read(&path)?;
                mapper
                    .decode(&bytes)
                    .and_then(|scenario| scenario.validate())
                    .with_context(|| format!("Invalid scenario file {}", path.display()))?;
                checked += 1;
            }
        }

        Ok(checked)
    }
}

fn has_scenario_extension(path: &Path, format: &str) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    ext.eq_ignore_ascii_case(format) || (format == "yaml" && ext.eq_ignore_ascii_case("yml"))
}

/// Logging switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSettings {
    /// Log all matched requests
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Assembles a [`MockResponseInterceptor`].
pub struct InterceptorBuilder {
    mode: Mode,
    delay: Duration,
    mapper: Option<Arc<dyn Mapper>>,
    loader: Option<Arc<dyn ScenarioLoader>>,
    policies: Vec<Arc<dyn FilingPolicy>>,
    callbacks: Vec<Arc<dyn RequestCallback>>,
    sink: Option<Arc<dyn ScenarioSink>>,
    storage_root: Option<PathBuf>,
    recording_policy: Option<Arc<dyn FilingPolicy>>,
    fail_on_recording_error: bool,
    record_mixed_fallback: bool,
    settings: LogSettings,
}

impl Default for InterceptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptorBuilder {
    pub fn new() -> Self {
        Self {
            mode: Mode::default(),
            delay: Duration::ZERO,
            mapper: None,
            loader: None,
            policies: Vec::new(),
            callbacks: Vec::new(),
            sink: None,
            storage_root: None,
            recording_policy: None,
            fail_on_recording_error: false,
            record_mixed_fallback: false,
            settings: LogSettings::default(),
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Base latency for mocked responses without their own delay.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Scenario codec. Defaults to JSON.
    pub fn mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn ScenarioLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Serve scenarios from files beneath a directory.
    pub fn scenario_root(self, root: impl Into<PathBuf>) -> Self {
        self.loader(Arc::new(FileSystemStore::new(root)))
    }

    /// Register a filing policy; each adds one static provider, in order.
    pub fn add_filing_policy(mut self, policy: Arc<dyn FilingPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Register a callback; all callbacks are consulted before any file.
    pub fn add_callback(mut self, callback: impl RequestCallback + 'static) -> Self {
        self.callbacks.push(Arc::new(callback));
        self
    }

    /// Record into files beneath a directory.
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.sink = Some(Arc::new(FileSystemStore::new(root.clone())));
        self.storage_root = Some(root);
        self
    }

    /// Record into an arbitrary sink.
    pub fn recording_sink(mut self, sink: Arc<dyn ScenarioSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Naming used for recordings. Defaults to the first registered policy.
    pub fn recording_policy(mut self, policy: Arc<dyn FilingPolicy>) -> Self {
        self.recording_policy = Some(policy);
        self
    }

    pub fn fail_on_recording_error(mut self, fail: bool) -> Self {
        self.fail_on_recording_error = fail;
        self
    }

    pub fn record_mixed_fallback(mut self, record: bool) -> Self {
        self.record_mixed_fallback = record;
        self
    }

    pub fn settings(mut self, settings: LogSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<MockResponseInterceptor, ConfigError> {
        let records = self.mode == Mode::Record || self.record_mixed_fallback;
        if records && self.sink.is_none() {
            return Err(ConfigError::MissingStorageRoot);
        }
        if let Some(root) = &self.storage_root {
            if root.exists() && !root.is_dir() {
                return Err(ConfigError::InvalidStorageRoot(root.clone()));
            }
        }
        if !self.policies.is_empty() && self.loader.is_none() {
            return Err(ConfigError::MissingLoader);
        }

        let mapper = self.mapper.unwrap_or_else(|| Arc::new(JsonMapper));
        let default_policy =
            || -> Arc<dyn FilingPolicy> { Arc::new(MirrorPathPolicy::new(mapper.format())) };

        let mut providers: Vec<Arc<dyn ScenarioProvider>> = Vec::new();

        if !self.callbacks.is_empty() {
            let mut dynamic = DynamicMockProvider::new();
            for callback in self.callbacks {
                dynamic.push(callback);
            }
            providers.push(Arc::new(dynamic));
        }

        if let Some(loader) = &self.loader {
            let policies = if self.policies.is_empty() {
                vec![default_policy()]
            } else {
                self.policies.clone()
            };
            let templates = Arc::new(TemplateEngine::new());
            for (index, policy) in policies.into_iter().enumerate() {
                let provider =
                    StaticMockProvider::new(policy, Arc::clone(loader), Arc::clone(&mapper))
                        .with_name(format!("static:{}#{}", mapper.format(), index))
                        .with_templates(Arc::clone(&templates));
                providers.push(Arc::new(provider));
            }
        }

        let writer = self.sink.map(|sink| {
            let policy = self
                .recording_policy
                .or_else(|| self.policies.first().cloned())
                .unwrap_or_else(default_policy);
            RequestWriter::new(policy, Arc::clone(&mapper), sink)
                .fail_on_error(self.fail_on_recording_error)
        });

        Ok(MockResponseInterceptor::from_parts(
            providers,
            self.mode,
            writer,
            self.delay,
            self.record_mixed_fallback,
            self.settings,
        ))
    }
}
