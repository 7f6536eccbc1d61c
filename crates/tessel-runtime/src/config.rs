//! Instance configuration

use serde::{Deserialize, Serialize};

/// Platform and device description visible to components
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Environment {
    pub platform: String,
    pub os_version: String,
    pub app_version: String,
    pub device_width: f64,
    pub device_height: f64,
    /// Pixel density
    pub scale: f64,
    /// Anything else the host passes along
    #[serde(flatten)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl Environment {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            scale: 1.0,
            ..Self::default()
        }
    }

    pub fn with_device(mut self, width: f64, height: f64, scale: f64) -> Self {
        self.device_width = width;
        self.device_height = height;
        self.scale = scale;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    /// JSON view, as exposed to templates
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Instance configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Queue native calls and send them on flush
    pub batch_native_calls: bool,
    /// Bound on scheduler rounds when flush handlers queue more work
    pub max_flush_rounds: usize,
    pub env: Environment,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_native_calls: false,
            max_flush_rounds: 16,
            env: Environment::default(),
        }
    }
}

impl Config {
    /// Parse a host-provided JSON configuration; missing fields use defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_batching(mut self, batch: bool) -> Self {
        self.batch_native_calls = batch;
        self
    }

    pub fn with_max_flush_rounds(mut self, rounds: usize) -> Self {
        self.max_flush_rounds = rounds.max(1);
        self
    }

    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }
}
