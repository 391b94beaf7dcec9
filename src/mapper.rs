//! Scenario codecs.
//!
//! The pipeline never parses scenario bytes itself; a [`Mapper`] is injected
//! and declares the format it speaks. The format tag doubles as the file
//! extension used by the default filing policy.

use crate::error::{ConfigError, DecodeError, EncodeError};
use crate::scenario::{RecordedExchange, ScenarioDescriptor};
use serde::{Deserialize, Serialize};

/// Encodes and decodes scenario files in one format.
pub trait Mapper: Send + Sync {
    /// Format tag, e.g. `json`.
    fn format(&self) -> &str;

    fn decode(&self, bytes: &[u8]) -> Result<ScenarioDescriptor, DecodeError>;

    fn encode(&self, exchange: &RecordedExchange) -> Result<Vec<u8>, EncodeError>;
}

/// Formats selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioFormat {
    #[default]
    Json,
    Yaml,
}

impl ScenarioFormat {
    pub fn mapper(self) -> Box<dyn Mapper> {
        match self {
            ScenarioFormat::Json => Box::new(JsonMapper),
            ScenarioFormat::Yaml => Box::new(YamlMapper),
        }
    }
}

impl std::str::FromStr for ScenarioFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ScenarioFormat::Json),
            "yaml" | "yml" => Ok(ScenarioFormat::Yaml),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

/// Pretty-printed JSON scenarios.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMapper;

impl Mapper for JsonMapper {
    fn format(&self) -> &str {
        "json"
    }

    fn decode(&self, bytes: &[u8]) -> Result<ScenarioDescriptor, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Syntax {
            format: self.format().to_string(),
            message: e.to_string(),
        })
    }

    fn encode(&self, exchange: &RecordedExchange) -> Result<Vec<u8>, EncodeError> {
        let scenario = ScenarioDescriptor::from_exchange(exchange);
        serde_json::to_vec_pretty(&scenario).map_err(|e| EncodeError {
            format: self.format().to_string(),
            message: e.to_string(),
        })
    }
}

/// YAML scenarios, the same layout as the configuration file.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlMapper;

impl Mapper for YamlMapper {
    fn format(&self) -> &str {
        "yaml"
    }

    fn decode(&self, bytes: &[u8]) -> Result<ScenarioDescriptor, DecodeError> {
        serde_yaml::from_slice(bytes).map_err(|e| DecodeError::Syntax {
            format: self.format().to_string(),
            message: e.to_string(),
        })
    }

    fn encode(&self, exchange: &RecordedExchange) -> Result<Vec<u8>, EncodeError> {
        let scenario = ScenarioDescriptor::from_exchange(exchange);
        serde_yaml::to_string(&scenario)
            .map(String::into_bytes)
            .map_err(|e| EncodeError {
                format: self.format().to_string(),
                message: e.to_string(),
            })
    }
}
