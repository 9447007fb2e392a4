//! Routes text-to-image requests across heterogeneous vendor providers.
//!
//! A [`ProviderManager`] owns the registered [`ImageProvider`]s, picks one per request
//! with a [`SelectionStrategy`], retries it under a [`RetryPolicy`], falls back to the
//! next candidate on failure and records every attempt in a [`UsageTracker`]. The
//! [`ParameterExtractor`] turns a free-text chat line into a [`GenerationRequest`].

pub mod capability;
pub mod config;
mod error;
pub mod extract;
pub mod manager;
pub mod provider;
pub mod providers;
pub mod retry;
pub mod selector;
pub mod telemetry;
pub mod tracker;
pub mod types;
pub mod utils;

pub use capability::{ImageFormat, ProviderCapabilities};
pub use config::{ProviderSettings, RouterConfig};
pub use error::{Result, RouterError};
pub use extract::{Extraction, ParameterExtractor};
pub use manager::{ManagerSummary, ProviderManager, ProviderSummary};
pub use provider::{HealthReport, ImageProvider};
pub use providers::ProviderKind;
pub use retry::RetryPolicy;
pub use selector::SelectionStrategy;
pub use tracker::{AttemptOutcome, UsageStats, UsageTracker};
pub use types::{
    GenerationRequest, GenerationResult, HealthStatus, ImagePayload, ImageSize, Quality,
    ResponseType,
};

#[cfg(feature = "provider-openai-compatible")]
pub use providers::OpenAiCompatibleImages;
