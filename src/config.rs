use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::providers::ProviderKind;
use crate::selector::SelectionStrategy;
use crate::{Result, RouterError};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub strategy: SelectionStrategy,
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
}

fn default_true() -> bool {
    true
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::default(),
            fallback_enabled: true,
            health_check: HealthCheckConfig::default(),
            batch: BatchConfig::default(),
            extractor: ExtractorConfig::default(),
            providers: Vec::new(),
        }
    }
}

impl RouterConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| RouterError::Config(err.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Settings that carry every credential their vendor needs; the rest are never registered.
    pub fn configured_providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers
            .iter()
            .filter(|settings| settings.has_credentials())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_check_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_health_check_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_health_check_concurrency() -> usize {
    4
}

fn default_health_check_timeout_seconds() -> u64 {
    10
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_health_check_concurrency(),
            timeout_seconds: default_health_check_timeout_seconds(),
        }
    }
}

impl HealthCheckConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_concurrency")]
    pub max_concurrent: usize,
}

fn default_batch_concurrency() -> usize {
    3
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_batch_concurrency(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_negative_keywords")]
    pub negative_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
}

fn default_negative_keywords() -> Vec<String> {
    [
        "不要", "避免", "不包含", "不想要", "排除", "没有", "无", "avoid", "without",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            negative_keywords: default_negative_keywords(),
            default_provider: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: f64,
    #[serde(default)]
    pub extra: BTreeMap<String, toml::Value>,
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_seconds() -> f64 {
    1.0
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("enabled", &self.enabled)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .field("app_id", &self.app_id)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_seconds", &self.retry_delay_seconds)
            .field("extra", &self.extra)
            .finish()
    }
}

impl ProviderSettings {
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            enabled: true,
            api_key: None,
            api_secret: None,
            app_id: None,
            base_url: None,
            model: None,
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay_seconds = retry_delay.as_secs_f64();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        if self.retry_delay_seconds.is_nan() || self.retry_delay_seconds <= 0.0 {
            return Duration::ZERO;
        }
        // Values beyond what a Duration can hold saturate instead of panicking.
        Duration::try_from_secs_f64(self.retry_delay_seconds).unwrap_or(Duration::MAX)
    }

    pub fn model_or_default(&self) -> &str {
        self.model
            .as_deref()
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| self.kind.default_model())
    }

    fn credential(&self, field: &str) -> Option<&str> {
        match field {
            "api_key" => self.api_key.as_deref(),
            "api_secret" => self.api_secret.as_deref(),
            "app_id" => self.app_id.as_deref(),
            _ => None,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.kind.required_credentials().iter().all(|field| {
            self.credential(field)
                .is_some_and(|value| !value.trim().is_empty())
        })
    }
}
