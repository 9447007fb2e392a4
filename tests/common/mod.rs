#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use imagegen_router::{
    GenerationRequest, GenerationResult, ImagePayload, ImageProvider, ProviderCapabilities,
    ProviderKind, ProviderSettings, Result, RouterError,
};

#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    Succeed,
    Fail,
    Error,
    Panic,
    Hang,
}

pub struct FakeProvider {
    settings: ProviderSettings,
    capabilities: ProviderCapabilities,
    behavior: Behavior,
    latencies: Vec<Duration>,
    initializes: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        let settings = ProviderSettings::new(name, ProviderKind::Ppio)
            .with_api_key("test-key")
            .with_retries(1, Duration::ZERO);
        Self {
            capabilities: ProviderKind::Ppio.default_capabilities(),
            settings,
            behavior,
            latencies: Vec::new(),
            initializes: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_retries(mut self, max_retries: u32, delay: Duration) -> Self {
        self.settings = self.settings.with_retries(max_retries, delay);
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.with_latencies(vec![latency])
    }

    /// Call `n` sleeps for `latencies[n % len]`.
    pub fn with_latencies(mut self, latencies: Vec<Duration>) -> Self {
        self.latencies = latencies;
        self
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.settings = self.settings.with_enabled(false);
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.initializes = false;
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn shared(self) -> (Arc<dyn ImageProvider>, Arc<AtomicUsize>) {
        let calls = self.calls();
        (Arc::new(self), calls)
    }
}

pub fn count(calls: &AtomicUsize) -> usize {
    calls.load(Ordering::SeqCst)
}

#[async_trait]
impl ImageProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn kind(&self) -> ProviderKind {
        self.settings.kind
    }

    fn model(&self) -> &str {
        "fake-model"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    async fn initialize(&self) -> bool {
        self.initializes
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latencies.is_empty() {
            tokio::time::sleep(self.latencies[call % self.latencies.len()]).await;
        }
        match self.behavior {
            Behavior::Succeed => Ok(GenerationResult::success(
                ImagePayload::Url(format!("https://img.test/{}.png", self.name())),
                request.metadata(self.name(), self.model()),
            )),
            Behavior::Fail => Ok(GenerationResult::failure(format!("{} refused", self.name()))),
            Behavior::Error => Err(RouterError::ServiceUnavailable {
                provider: self.name().to_string(),
                message: "upstream 503".to_string(),
            }),
            Behavior::Panic => panic!("{} adapter bug", self.name()),
            Behavior::Hang => std::future::pending().await,
        }
    }

    async fn check_connection(&self) -> Result<bool> {
        match self.behavior {
            Behavior::Succeed => Ok(true),
            Behavior::Fail => Ok(false),
            Behavior::Error => Err(RouterError::Authentication {
                provider: self.name().to_string(),
                message: "bad key".to_string(),
            }),
            Behavior::Panic => panic!("{} probe bug", self.name()),
            Behavior::Hang => std::future::pending().await,
        }
    }
}
