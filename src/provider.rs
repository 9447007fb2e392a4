use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::capability::ProviderCapabilities;
use crate::config::ProviderSettings;
use crate::providers::ProviderKind;
use crate::types::{GenerationRequest, GenerationResult, HealthStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub provider: String,
    pub status: HealthStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl HealthReport {
    pub fn error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: HealthStatus::Error,
            message: message.into(),
            details: Value::Null,
        }
    }
}

/// One vendor's image generation service behind a uniform, capability-described surface.
///
/// `generate` may fail freely; the router turns every error (and panic) into a failed
/// [`GenerationResult`] and never lets it escape.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> ProviderKind;
    fn model(&self) -> &str;
    fn capabilities(&self) -> &ProviderCapabilities;
    fn settings(&self) -> &ProviderSettings;

    /// One-time setup. Returning `false` keeps the provider out of the registry.
    async fn initialize(&self) -> bool {
        true
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult>;

    async fn check_connection(&self) -> Result<bool>;

    fn preprocess(&self, request: &GenerationRequest) -> GenerationRequest {
        self.capabilities().preprocess(request)
    }

    fn validate(&self, request: &GenerationRequest) -> Vec<String> {
        self.capabilities().validate(request)
    }

    async fn health_check(&self) -> HealthReport {
        let capabilities = self.capabilities();
        let details = serde_json::json!({
            "model": self.model(),
            "supported_sizes": capabilities
                .supported_sizes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            "max_images": capabilities.max_images_per_request,
            "estimated_seconds": capabilities.estimated_seconds,
        });
        let (status, message) = match self.check_connection().await {
            Ok(true) => (HealthStatus::Healthy, "provider is reachable".to_string()),
            Ok(false) => (HealthStatus::Unhealthy, "provider connection failed".to_string()),
            Err(err) => (HealthStatus::Error, format!("health check failed: {err}")),
        };
        HealthReport {
            provider: self.name().to_string(),
            status,
            message,
            details,
        }
    }
}
