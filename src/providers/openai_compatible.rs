use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::capability::ProviderCapabilities;
use crate::config::ProviderSettings;
use crate::provider::ImageProvider;
use crate::providers::ProviderKind;
use crate::types::{GenerationRequest, GenerationResult, ImagePayload, Quality, ResponseType};
use crate::utils::http::{error_body, http_client, join_endpoint};
use crate::{Result, RouterError};

const RESERVED_BODY_KEYS: &[&str] = &["model", "prompt", "n", "size", "response_format"];

/// Client for vendors exposing the OpenAI `images/generations` endpoint (OpenAI, xAI Grok
/// and self-hosted compatible gateways).
#[derive(Clone)]
pub struct OpenAiCompatibleImages {
    settings: ProviderSettings,
    capabilities: ProviderCapabilities,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatibleImages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleImages")
            .field("settings", &self.settings)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ImagesGenerationResponse {
    #[serde(default)]
    created: Option<u64>,
    #[serde(default)]
    data: Vec<ImageGenerationData>,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationData {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

impl ImageGenerationData {
    fn payload(&self) -> Option<ImagePayload> {
        if let Some(url) = self.url.as_deref().filter(|v| !v.trim().is_empty()) {
            return Some(ImagePayload::Url(url.to_string()));
        }
        self.b64_json
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(|data| ImagePayload::Base64(data.to_string()))
    }
}

impl OpenAiCompatibleImages {
    /// Uses `settings.base_url`, falling back to the vendor's public endpoint.
    pub fn new(settings: ProviderSettings) -> Result<Self> {
        let base_url = settings
            .base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| settings.kind.default_base_url())
            .ok_or_else(|| {
                RouterError::Config(format!(
                    "provider {} ({}) needs a base_url",
                    settings.name, settings.kind
                ))
            })?
            .to_string();

        Ok(Self {
            capabilities: settings.kind.default_capabilities(),
            model: settings.model_or_default().to_string(),
            http: http_client(settings.timeout()),
            base_url,
            settings,
        })
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.settings.api_key.as_deref().filter(|key| !key.trim().is_empty()) {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    fn request_body(&self, request: &GenerationRequest) -> Result<Map<String, Value>> {
        let mut body = Map::<String, Value>::new();
        body.insert("model".to_string(), Value::String(self.model.clone()));
        body.insert("prompt".to_string(), Value::String(request.prompt.clone()));
        body.insert("n".to_string(), Value::Number(request.count.into()));
        if let Some(size) = request.size {
            body.insert("size".to_string(), Value::String(size.to_string()));
        }
        let format = match request.response_type {
            ResponseType::Base64 => "b64_json",
            ResponseType::Url | ResponseType::FilePath => "url",
        };
        body.insert("response_format".to_string(), Value::String(format.to_string()));

        let wants_hd = matches!(
            request.quality,
            Some(Quality::Highest | Quality::High | Quality::Detailed)
        );
        if wants_hd && self.capabilities.supported_qualities.iter().any(|q| q == "hd") {
            body.insert("quality".to_string(), Value::String("hd".to_string()));
        }
        if let Some(style) = request.style.as_deref() {
            if self.capabilities.supported_styles.iter().any(|s| s == style) {
                body.insert("style".to_string(), Value::String(style.to_string()));
            }
        }

        for (key, value) in &self.settings.extra {
            if RESERVED_BODY_KEYS.contains(&key.as_str()) {
                debug!(provider = %self.settings.name, key = %key, "ignoring reserved extra body key");
                continue;
            }
            body.insert(key.clone(), serde_json::to_value(value)?);
        }
        Ok(body)
    }
}

#[async_trait]
impl ImageProvider for OpenAiCompatibleImages {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn kind(&self) -> ProviderKind {
        self.settings.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let started = Instant::now();
        let body = self.request_body(request)?;
        let url = join_endpoint(&self.base_url, "images/generations");
        let response = self.apply_auth(self.http.post(url)).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = error_body(response).await;
            return Err(RouterError::from_status(self.name(), status, text));
        }

        let parsed = response.json::<ImagesGenerationResponse>().await?;
        let mut payloads = parsed.data.iter().filter_map(ImageGenerationData::payload);
        let Some(payload) = payloads.next() else {
            return Ok(GenerationResult::failure(format!(
                "{}: response contained no image",
                self.name()
            ))
            .with_metadata("provider", self.name()));
        };
        let extra_images = payloads
            .map(|payload| Value::String(payload.as_str().to_string()))
            .collect::<Vec<_>>();

        let mut result = GenerationResult::success(payload, request.metadata(self.name(), &self.model))
            .with_metadata("generation_time", started.elapsed().as_secs_f64());
        if let Some(created) = parsed.created {
            result = result.with_metadata("created", created);
        }
        if let Some(revised) = parsed
            .data
            .iter()
            .find_map(|item| item.revised_prompt.as_deref().filter(|v| !v.trim().is_empty()))
        {
            result = result.with_metadata("revised_prompt", revised);
        }
        if !extra_images.is_empty() {
            result = result.with_metadata("additional_images", extra_images);
        }
        Ok(result)
    }

    async fn check_connection(&self) -> Result<bool> {
        let url = join_endpoint(&self.base_url, "models");
        let response = self.apply_auth(self.http.get(url)).send().await?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HealthStatus, ImageSize};
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };

    fn settings(server: &MockServer) -> ProviderSettings {
        let mut settings = ProviderSettings::new("openai", ProviderKind::OpenAi).with_api_key("sk-test");
        settings.base_url = Some(server.url("/v1"));
        settings
    }

    #[tokio::test]
    async fn generate_returns_first_image_url() -> Result<()> {
        if crate::utils::test_support::should_skip_httpmock() {
            return Ok(());
        }
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/images/generations")
                    .header("authorization", "Bearer sk-test")
                    .body_includes("\"model\":\"dall-e-3\"")
                    .body_includes("\"prompt\":\"a cat\"")
                    .body_includes("\"size\":\"1024x1024\"")
                    .body_includes("\"response_format\":\"url\"");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(
                        serde_json::json!({
                            "created": 123,
                            "data": [{
                                "url": "https://example.com/cat.png",
                                "revised_prompt": "a fluffy cat"
                            }]
                        })
                        .to_string(),
                    );
            })
            .await;

        let provider = OpenAiCompatibleImages::new(settings(&server))?;
        let request = GenerationRequest::new("a cat").with_size(ImageSize::new(1024, 1024));
        let result = provider.generate(&request).await?;

        mock.assert_async().await;
        assert!(result.is_success());
        assert_eq!(result.image_url(), Some("https://example.com/cat.png"));
        assert_eq!(result.provider(), Some("openai"));
        assert_eq!(result.metadata["revised_prompt"], "a fluffy cat");
        assert_eq!(result.metadata["size"], "1024x1024");
        Ok(())
    }

    #[tokio::test]
    async fn rate_limit_maps_to_taxonomy() -> Result<()> {
        if crate::utils::test_support::should_skip_httpmock() {
            return Ok(());
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/images/generations");
                then.status(429).body("slow down");
            })
            .await;

        let provider = OpenAiCompatibleImages::new(settings(&server))?;
        let err = provider
            .generate(&GenerationRequest::new("a cat"))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::RateLimit { .. }), "{err}");
        assert_eq!(err.provider(), Some("openai"));
        Ok(())
    }

    #[tokio::test]
    async fn health_check_probes_models_endpoint() -> Result<()> {
        if crate::utils::test_support::should_skip_httpmock() {
            return Ok(());
        }
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/models");
                then.status(401);
            })
            .await;

        let provider = OpenAiCompatibleImages::new(settings(&server))?;
        let report = provider.health_check().await;

        mock.assert_async().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.provider, "openai");
        assert_eq!(report.details["model"], "dall-e-3");
        Ok(())
    }

    #[test]
    fn vendors_without_public_endpoint_need_base_url() {
        let settings = ProviderSettings::new("tongyi", ProviderKind::Tongyi).with_api_key("k");
        let err = OpenAiCompatibleImages::new(settings).unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
    }
}
