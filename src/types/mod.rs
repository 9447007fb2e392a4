use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid image size: {0:?}")]
pub struct InvalidSize(pub String);

impl FromStr for ImageSize {
    type Err = InvalidSize;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (width, height) = trimmed
            .split_once(['x', 'X', '×', '*'])
            .ok_or_else(|| InvalidSize(raw.to_string()))?;
        let width = width
            .trim()
            .parse::<u32>()
            .map_err(|_| InvalidSize(raw.to_string()))?;
        let height = height
            .trim()
            .parse::<u32>()
            .map_err(|_| InvalidSize(raw.to_string()))?;
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for ImageSize {
    type Error = InvalidSize;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImageSize> for String {
    fn from(size: ImageSize) -> Self {
        size.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Highest,
    High,
    Standard,
    Fast,
    Detailed,
    Rough,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Highest => "highest",
            Self::High => "high",
            Self::Standard => "standard",
            Self::Fast => "fast",
            Self::Detailed => "detailed",
            Self::Rough => "rough",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    #[default]
    Url,
    Base64,
    FilePath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    Url(String),
    Base64(String),
    FilePath(String),
}

impl ImagePayload {
    pub fn response_type(&self) -> ResponseType {
        match self {
            Self::Url(_) => ResponseType::Url,
            Self::Base64(_) => ResponseType::Base64,
            Self::FilePath(_) => ResponseType::FilePath,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Url(value) | Self::Base64(value) | Self::FilePath(value) => value.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
    Error,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<ImageSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub response_type: ResponseType,
}

fn default_count() -> u32 {
    1
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            size: None,
            style: None,
            quality: None,
            count: default_count(),
            seed: None,
            provider: None,
            response_type: ResponseType::default(),
        }
    }

    pub fn with_size(mut self, size: ImageSize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Metadata map echoing the request fields, keyed the way results are reported.
    pub fn metadata(&self, provider: &str, model: &str) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        out.insert("provider".to_string(), Value::String(provider.to_string()));
        out.insert("model".to_string(), Value::String(model.to_string()));
        out.insert("prompt".to_string(), Value::String(self.prompt.clone()));
        if let Some(negative_prompt) = &self.negative_prompt {
            out.insert(
                "negative_prompt".to_string(),
                Value::String(negative_prompt.clone()),
            );
        }
        if let Some(size) = self.size {
            out.insert("size".to_string(), Value::String(size.to_string()));
        }
        if let Some(seed) = self.seed {
            out.insert("seed".to_string(), Value::Number(seed.into()));
        }
        if let Some(style) = &self.style {
            out.insert("style".to_string(), Value::String(style.clone()));
        }
        if let Some(quality) = self.quality {
            out.insert(
                "quality".to_string(),
                Value::String(quality.as_str().to_string()),
            );
        }
        out.insert("count".to_string(), Value::Number(self.count.into()));
        out
    }
}

/// Outcome of one generation attempt. Built once, never mutated by the router afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireResult", from = "WireResult")]
pub struct GenerationResult {
    pub success: bool,
    pub payload: Option<ImagePayload>,
    pub error_message: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl GenerationResult {
    pub fn success(payload: ImagePayload, metadata: BTreeMap<String, Value>) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error_message: None,
            metadata,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error_message: Some(message.into()),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// A result only counts as a success when it actually carries an image.
    pub fn is_success(&self) -> bool {
        self.success && self.payload.is_some()
    }

    pub fn response_type(&self) -> ResponseType {
        self.payload
            .as_ref()
            .map(ImagePayload::response_type)
            .unwrap_or_default()
    }

    pub fn image_url(&self) -> Option<&str> {
        match &self.payload {
            Some(ImagePayload::Url(url)) => Some(url.as_str()),
            _ => None,
        }
    }

    pub fn provider(&self) -> Option<&str> {
        self.metadata.get("provider").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireResult {
    success: bool,
    response_type: ResponseType,
    #[serde(default)]
    payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

impl From<GenerationResult> for WireResult {
    fn from(result: GenerationResult) -> Self {
        let response_type = result.response_type();
        Self {
            success: result.success,
            response_type,
            payload: result
                .payload
                .map(|payload| payload.as_str().to_string())
                .unwrap_or_default(),
            error_message: result.error_message,
            metadata: result.metadata,
        }
    }
}

impl From<WireResult> for GenerationResult {
    fn from(wire: WireResult) -> Self {
        let payload = if wire.payload.is_empty() {
            None
        } else {
            Some(match wire.response_type {
                ResponseType::Url => ImagePayload::Url(wire.payload),
                ResponseType::Base64 => ImagePayload::Base64(wire.payload),
                ResponseType::FilePath => ImagePayload::FilePath(wire.payload),
            })
        };
        Self {
            success: wire.success,
            payload,
            error_message: wire.error_message,
            metadata: wire.metadata,
        }
    }
}
