//! Capability descriptors and request negotiation.
//!
//! `validate` only reports; `preprocess` is what actually shapes the outgoing call.

use serde::{Deserialize, Serialize};

use crate::types::{GenerationRequest, ImageSize};
use crate::{Result, RouterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Png,
    Jpg,
    Jpeg,
    Webp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub supported_sizes: Vec<ImageSize>,
    #[serde(default)]
    pub supported_formats: Vec<ImageFormat>,
    /// Empty means any style value is passed through.
    #[serde(default)]
    pub supported_styles: Vec<String>,
    #[serde(default)]
    pub supported_qualities: Vec<String>,
    #[serde(default = "default_max_images")]
    pub max_images_per_request: u32,
    #[serde(default)]
    pub supports_negative_prompt: bool,
    #[serde(default)]
    pub supports_seed: bool,
    #[serde(default)]
    pub supports_style: bool,
    #[serde(default)]
    pub supports_size_control: bool,
    #[serde(default = "default_estimated_seconds")]
    pub estimated_seconds: u32,
}

fn default_max_images() -> u32 {
    1
}

fn default_estimated_seconds() -> u32 {
    30
}

impl ProviderCapabilities {
    /// Rejects tables no request could ever be negotiated against.
    pub fn check(&self, provider: &str) -> Result<()> {
        let invalid = |reason: &str| RouterError::InvalidCapabilities {
            provider: provider.to_string(),
            reason: reason.to_string(),
        };
        if self.supported_sizes.is_empty() {
            return Err(invalid("supported_sizes is empty"));
        }
        if self
            .supported_sizes
            .iter()
            .any(|size| size.width == 0 || size.height == 0)
        {
            return Err(invalid("supported_sizes contains a zero dimension"));
        }
        if self.max_images_per_request == 0 {
            return Err(invalid("max_images_per_request must be at least 1"));
        }
        Ok(())
    }

    pub fn supports_size(&self, size: ImageSize) -> bool {
        self.supported_sizes.contains(&size)
    }

    /// Human-readable warnings for everything the provider will ignore or adjust.
    pub fn validate(&self, request: &GenerationRequest) -> Vec<String> {
        let mut warnings = Vec::new();

        if request.count > self.max_images_per_request {
            warnings.push(format!(
                "requested {} images but at most {} are supported per request",
                request.count, self.max_images_per_request
            ));
        }

        if let Some(size) = request.size {
            if !self.supports_size_control {
                warnings.push(format!(
                    "size {size} is ignored, this provider does not take a size"
                ));
            } else if !self.supports_size(size) {
                let supported = self
                    .supported_sizes
                    .iter()
                    .map(ImageSize::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                warnings.push(format!(
                    "size {size} is not supported, supported sizes: {supported}"
                ));
            }
        }

        if let Some(style) = request.style.as_deref() {
            if !self.supports_style {
                warnings.push(format!("style '{style}' is not supported by this provider"));
            } else if !self.supported_styles.is_empty()
                && !self.supported_styles.iter().any(|s| s == style)
            {
                warnings.push(format!(
                    "style '{style}' is not supported, supported styles: {}",
                    self.supported_styles.join(", ")
                ));
            }
        }

        if let Some(quality) = request.quality {
            if !self.supported_qualities.is_empty()
                && !self.supported_qualities.iter().any(|q| q == quality.as_str())
            {
                warnings.push(format!(
                    "quality '{quality}' is not supported, supported qualities: {}",
                    self.supported_qualities.join(", ")
                ));
            }
        }

        if request.negative_prompt.is_some() && !self.supports_negative_prompt {
            warnings.push("negative prompt is not supported by this provider".to_string());
        }

        if request.seed.is_some() && !self.supports_seed {
            warnings.push("custom seed is not supported by this provider".to_string());
        }

        warnings
    }

    pub fn preprocess(&self, request: &GenerationRequest) -> GenerationRequest {
        let mut out = request.clone();
        if !self.supports_size_control {
            out.size = None;
        } else if out.size.is_none() {
            out.size = self.supported_sizes.first().copied();
        }
        if out.count > self.max_images_per_request {
            out.count = self.max_images_per_request;
        }
        out
    }
}
