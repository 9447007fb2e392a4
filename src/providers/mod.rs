//! Vendor catalog. Adding a vendor means adding a variant here; the router never
//! matches on vendors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::capability::{ImageFormat, ProviderCapabilities};
use crate::types::ImageSize;

#[cfg(feature = "provider-openai-compatible")]
pub mod openai_compatible;

#[cfg(feature = "provider-openai-compatible")]
pub use openai_compatible::OpenAiCompatibleImages;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Tongyi,
    Volcengine,
    Qianfan,
    Xunfei,
    Ppio,
    Zhipu,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Grok,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 9] = [
        Self::Tongyi,
        Self::Volcengine,
        Self::Qianfan,
        Self::Xunfei,
        Self::Ppio,
        Self::Zhipu,
        Self::OpenAi,
        Self::Gemini,
        Self::Grok,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tongyi => "tongyi",
            Self::Volcengine => "volcengine",
            Self::Qianfan => "qianfan",
            Self::Xunfei => "xunfei",
            Self::Ppio => "ppio",
            Self::Zhipu => "zhipu",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Grok => "grok",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Tongyi => "Alibaba Tongyi Wanxiang",
            Self::Volcengine => "ByteDance Volcengine",
            Self::Qianfan => "Baidu Qianfan",
            Self::Xunfei => "iFlytek Spark",
            Self::Ppio => "PPIO",
            Self::Zhipu => "Zhipu CogView",
            Self::OpenAi => "OpenAI DALL-E",
            Self::Gemini => "Google Imagen",
            Self::Grok => "xAI Grok",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Tongyi => "wanx2.1-t2i-turbo",
            Self::Volcengine => "high_aes_general_v21_L",
            Self::Qianfan => "sd_xl",
            Self::Xunfei => "spark-image",
            Self::Ppio => "ppio-diffusion-v1",
            Self::Zhipu => "cogview-3",
            Self::OpenAi => "dall-e-3",
            Self::Gemini => "imagen-2",
            Self::Grok => "grok-2-image",
        }
    }

    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Grok => Some("https://api.x.ai/v1"),
            _ => None,
        }
    }

    /// Settings fields that must be non-empty before the provider is registered.
    pub fn required_credentials(&self) -> &'static [&'static str] {
        match self {
            Self::Volcengine | Self::Qianfan => &["api_key", "api_secret"],
            Self::Xunfei => &["app_id", "api_key", "api_secret"],
            _ => &["api_key"],
        }
    }

    /// Whether the bundled OpenAI-style HTTP adapter can serve this vendor.
    pub fn is_openai_compatible(&self) -> bool {
        matches!(self, Self::OpenAi | Self::Grok)
    }

    pub fn default_capabilities(&self) -> ProviderCapabilities {
        let sizes = |pairs: &[(u32, u32)]| {
            pairs
                .iter()
                .map(|&(width, height)| ImageSize::new(width, height))
                .collect::<Vec<_>>()
        };
        let base = |supported_sizes: Vec<ImageSize>, max_images: u32, negative: bool| {
            ProviderCapabilities {
                supported_sizes,
                supported_formats: vec![ImageFormat::Png, ImageFormat::Jpg],
                supported_styles: Vec::new(),
                supported_qualities: Vec::new(),
                max_images_per_request: max_images,
                supports_negative_prompt: negative,
                supports_seed: negative,
                supports_style: true,
                supports_size_control: true,
                estimated_seconds: 30,
            }
        };

        match self {
            Self::Tongyi => base(
                sizes(&[
                    (1024, 1024),
                    (512, 512),
                    (768, 768),
                    (1280, 720),
                    (720, 1280),
                    (1024, 1792),
                    (1792, 1024),
                ]),
                4,
                true,
            ),
            Self::Volcengine => ProviderCapabilities {
                supported_styles: vec!["美感版".to_string(), "标准版".to_string()],
                supported_qualities: vec!["standard".to_string(), "high".to_string()],
                estimated_seconds: 15,
                ..base(
                    sizes(&[
                        (512, 512),
                        (640, 360),
                        (640, 480),
                        (768, 768),
                        (1024, 1024),
                        (1280, 720),
                        (1440, 720),
                        (720, 1440),
                        (768, 1344),
                        (1344, 768),
                        (864, 1152),
                        (1152, 864),
                    ]),
                    1,
                    true,
                )
            },
            Self::Qianfan => base(
                sizes(&[(1024, 1024), (512, 512), (768, 768), (1024, 1792), (1792, 1024)]),
                1,
                false,
            ),
            Self::Xunfei => base(sizes(&[(512, 512), (256, 256), (768, 768), (1024, 1024)]), 1, false),
            Self::Ppio | Self::Gemini => base(
                sizes(&[
                    (1024, 1024),
                    (512, 512),
                    (768, 768),
                    (512, 768),
                    (768, 512),
                    (1024, 768),
                    (768, 1024),
                    (1536, 1024),
                    (1024, 1536),
                ]),
                4,
                true,
            ),
            Self::Zhipu => base(
                sizes(&[
                    (1024, 1024),
                    (512, 512),
                    (768, 768),
                    (512, 768),
                    (768, 512),
                    (1024, 768),
                    (768, 1024),
                    (1024, 1536),
                    (1536, 1024),
                ]),
                1,
                false,
            ),
            Self::OpenAi => ProviderCapabilities {
                supported_formats: vec![ImageFormat::Png],
                supported_qualities: vec!["standard".to_string(), "hd".to_string()],
                ..base(sizes(&[(1024, 1024), (1792, 1024), (1024, 1792)]), 1, false)
            },
            Self::Grok => ProviderCapabilities {
                supported_formats: vec![ImageFormat::Jpg],
                ..base(
                    sizes(&[(1024, 1024), (1792, 1024), (1024, 1792), (1344, 768), (768, 1344)]),
                    1,
                    false,
                )
            },
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lowered = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == lowered)
            .ok_or_else(|| format!("unknown provider kind: {raw}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalog_entry_has_valid_capabilities() {
        for kind in ProviderKind::ALL {
            kind.default_capabilities()
                .check(kind.name())
                .unwrap_or_else(|err| panic!("{kind}: {err}"));
            assert_eq!(kind.name().parse::<ProviderKind>(), Ok(kind));
        }
    }

    #[test]
    fn kind_round_trips_through_serde() {
        let value = serde_json::to_value(ProviderKind::OpenAi).unwrap();
        assert_eq!(value, "openai");
        let kind: ProviderKind = serde_json::from_value(value).unwrap();
        assert_eq!(kind, ProviderKind::OpenAi);
    }
}
