use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::{FutureExt, StreamExt, stream};
use serde::Serialize;
use tracing::{Instrument, error, info, warn};

use crate::config::{BatchConfig, HealthCheckConfig, ProviderSettings, RouterConfig};
use crate::provider::{HealthReport, ImageProvider};
use crate::providers::ProviderKind;
use crate::retry::{RetryPolicy, panic_message};
use crate::selector::{SelectionStrategy, Selector};
use crate::tracker::{UsageStats, UsageTracker};
use crate::types::{GenerationRequest, GenerationResult, HealthStatus};
use crate::{Result, RouterError};

const MAX_SURFACED_ERROR_CHARS: usize = 300;

struct Entry {
    provider: Arc<dyn ImageProvider>,
    enabled: bool,
}

#[derive(Default)]
struct Registry {
    // Registration order; selection order derives from it.
    entries: Vec<Entry>,
}

impl Registry {
    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.provider.name() == name)
    }

    fn get(&self, name: &str) -> Option<&Entry> {
        self.position(name).map(|idx| &self.entries[idx])
    }
}

/// Registry of providers plus the selection, fallback and retry orchestration over them.
///
/// Constructed explicitly by the host and shared by reference (or `Arc`). Every request is
/// independent; the only cross-request state is the round-robin cursor and the tracker.
pub struct ProviderManager {
    registry: RwLock<Registry>,
    strategy: RwLock<SelectionStrategy>,
    fallback_enabled: AtomicBool,
    selector: Selector,
    tracker: UsageTracker,
    health_check: HealthCheckConfig,
    batch: BatchConfig,
}

impl Default for ProviderManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderManager")
            .field("providers", &self.provider_names())
            .field("enabled", &self.enabled_providers())
            .field("strategy", &self.strategy())
            .field("fallback_enabled", &self.fallback_enabled())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSummary {
    pub name: String,
    pub kind: ProviderKind,
    pub display_name: &'static str,
    pub model: String,
    pub enabled: bool,
    pub stats: UsageStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerSummary {
    pub total_providers: usize,
    pub enabled_providers: usize,
    pub strategy: SelectionStrategy,
    pub fallback_enabled: bool,
    pub total_requests: u64,
    /// Percentage in `[0, 100]`.
    pub success_rate: f64,
    pub providers: Vec<ProviderSummary>,
}

impl ProviderManager {
    pub fn new() -> Self {
        Self::with_tracker(UsageTracker::new())
    }

    pub fn with_tracker(tracker: UsageTracker) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            strategy: RwLock::new(SelectionStrategy::default()),
            fallback_enabled: AtomicBool::new(true),
            selector: Selector::new(),
            tracker,
            health_check: HealthCheckConfig::default(),
            batch: BatchConfig::default(),
        }
    }

    pub fn with_health_check(mut self, health_check: HealthCheckConfig) -> Self {
        self.health_check = health_check;
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Builds the enabled set once from configuration.
    ///
    /// Settings missing a required credential are skipped silently, as are vendors the
    /// factory has no adapter for (`Ok(None)`) and adapters whose `initialize` fails. A
    /// malformed capability table is fatal.
    pub async fn from_config<F>(config: &RouterConfig, mut factory: F) -> Result<Self>
    where
        F: FnMut(&ProviderSettings) -> Result<Option<Arc<dyn ImageProvider>>>,
    {
        let manager = Self::new()
            .with_health_check(config.health_check.clone())
            .with_batch(config.batch.clone());
        manager.set_strategy(config.strategy);
        manager.set_fallback_enabled(config.fallback_enabled);

        for settings in config.providers.iter().filter(|s| !s.has_credentials()) {
            info!(provider = %settings.name, "skipping provider without credentials");
        }
        for settings in config.configured_providers() {
            let Some(provider) = factory(settings)? else {
                warn!(provider = %settings.name, kind = %settings.kind, "no adapter available for provider kind");
                continue;
            };
            if !provider.initialize().await {
                warn!(provider = %settings.name, "provider failed to initialize");
                continue;
            }
            manager.register_provider(provider)?;
        }

        Ok(manager)
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a provider, replacing any previous one with the same name in place. The
    /// initial enabled flag comes from the provider's settings.
    pub fn register_provider(&self, provider: Arc<dyn ImageProvider>) -> Result<()> {
        provider.capabilities().check(provider.name())?;

        let name = provider.name().to_string();
        let enabled = provider.settings().enabled;
        {
            let mut registry = self.write();
            let entry = Entry { provider, enabled };
            match registry.position(&name) {
                Some(idx) => registry.entries[idx] = entry,
                None => registry.entries.push(entry),
            }
        }
        self.tracker.register(&name);
        info!(provider = %name, enabled, "registered provider");
        Ok(())
    }

    pub fn unregister_provider(&self, name: &str) -> bool {
        let removed = {
            let mut registry = self.write();
            match registry.position(name) {
                Some(idx) => {
                    registry.entries.remove(idx);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.tracker.remove(name);
            info!(provider = %name, "unregistered provider");
        }
        removed
    }

    fn lookup(&self, name: &str) -> Option<(Arc<dyn ImageProvider>, bool)> {
        self.read()
            .get(name)
            .map(|entry| (Arc::clone(&entry.provider), entry.enabled))
    }

    pub fn get_provider(&self, name: &str) -> Option<Arc<dyn ImageProvider>> {
        self.read().get(name).map(|entry| Arc::clone(&entry.provider))
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.read()
            .entries
            .iter()
            .map(|entry| entry.provider.name().to_string())
            .collect()
    }

    pub fn enabled_providers(&self) -> Vec<String> {
        self.read()
            .entries
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.provider.name().to_string())
            .collect()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.read().get(name).is_some_and(|entry| entry.enabled)
    }

    pub fn enable(&self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut registry = self.write();
        let Some(idx) = registry.position(name) else {
            return false;
        };
        registry.entries[idx].enabled = enabled;
        info!(provider = %name, enabled, "provider toggled");
        true
    }

    pub fn strategy(&self) -> SelectionStrategy {
        *self
            .strategy
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_strategy(&self, strategy: SelectionStrategy) {
        *self
            .strategy
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = strategy;
        info!(%strategy, "selection strategy set");
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled.load(Ordering::Relaxed)
    }

    pub fn set_fallback_enabled(&self, enabled: bool) {
        self.fallback_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn tracker(&self) -> &UsageTracker {
        &self.tracker
    }

    /// Generates one request, trying `provider_name` (or `request.provider`) first and then
    /// falling back through the selector. Never fails: every outcome is a result.
    ///
    /// `use_fallback` overrides the manager-wide fallback flag for this call. There is no
    /// overall deadline; wrap the call in `tokio::time::timeout` to bound it.
    pub async fn generate_image(
        &self,
        request: &GenerationRequest,
        provider_name: Option<&str>,
        use_fallback: Option<bool>,
    ) -> GenerationResult {
        let use_fallback = use_fallback.unwrap_or_else(|| self.fallback_enabled());
        let explicit = provider_name.or(request.provider.as_deref());
        let span = tracing::info_span!(
            "generate_image",
            provider = explicit.unwrap_or(""),
            strategy = %self.strategy(),
            use_fallback
        );

        async move {
            let mut excluded = HashSet::new();
            let mut last_failure: Option<GenerationResult> = None;

            if let Some(name) = explicit {
                let Some((provider, enabled)) = self.lookup(name) else {
                    warn!(provider = %name, "requested provider not found");
                    return GenerationResult::failure(
                        RouterError::UnknownProvider {
                            name: name.to_string(),
                        }
                        .to_string(),
                    );
                };
                if !enabled {
                    warn!(provider = %name, "requested provider is disabled");
                    return GenerationResult::failure(format!("provider disabled: {name}"));
                }

                let result = self.attempt(provider.as_ref(), request).await;
                if result.is_success() || !use_fallback {
                    return result;
                }
                excluded.insert(name.to_string());
                last_failure = Some(result);
            }

            loop {
                let enabled = self.enabled_providers();
                let Some(name) =
                    self.selector
                        .select(self.strategy(), &enabled, &excluded, |candidate| {
                            self.tracker.avg_response_time(candidate)
                        })
                else {
                    break;
                };

                excluded.insert(name.clone());
                // Unregistered between selection and lookup.
                let Some(provider) = self.get_provider(&name) else {
                    continue;
                };

                let result = self.attempt(provider.as_ref(), request).await;
                if result.is_success() || !use_fallback {
                    return result;
                }
                warn!(
                    provider = %name,
                    error = result.error_message.as_deref().unwrap_or(""),
                    "provider failed, falling back"
                );
                last_failure = Some(result);
            }

            match last_failure {
                None => {
                    warn!("no provider available");
                    GenerationResult::failure(RouterError::NoProviderAvailable.to_string())
                }
                Some(last) => {
                    let attempted = excluded.len();
                    let message = last.error_message.as_deref().unwrap_or("unknown error");
                    error!(attempted, "all providers exhausted");
                    GenerationResult::failure(format!(
                        "all providers exhausted, last error: {} ({attempted} providers attempted)",
                        truncate_chars(message, MAX_SURFACED_ERROR_CHARS)
                    ))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(
        &self,
        provider: &dyn ImageProvider,
        request: &GenerationRequest,
    ) -> GenerationResult {
        let name = provider.name();
        let warnings = provider.validate(request);
        if !warnings.is_empty() {
            warn!(provider = %name, warnings = %warnings.join("; "), "request adjusted for provider capabilities");
        }

        let policy = RetryPolicy::from_settings(provider.settings());
        let result = policy
            .run(provider, request, |elapsed, outcome| {
                self.tracker.record_attempt(name, elapsed, outcome);
            })
            .await;

        if result.is_success() {
            info!(provider = %name, "generation succeeded");
        } else {
            error!(
                provider = %name,
                error = result.error_message.as_deref().unwrap_or(""),
                "generation failed"
            );
        }
        result
    }

    /// Runs every request through [`Self::generate_image`] with at most `max_concurrent`
    /// in flight (the configured batch limit when `None`). Results come back in request order.
    pub async fn batch_generate(
        &self,
        requests: Vec<GenerationRequest>,
        max_concurrent: Option<usize>,
    ) -> Vec<GenerationResult> {
        let limit = max_concurrent.unwrap_or(self.batch.max_concurrent).max(1);
        stream::iter(requests)
            .map(|request| async move { self.generate_image(&request, None, None).await })
            .buffered(limit)
            .collect()
            .await
    }

    /// Probes every registered provider, enabled or not, with bounded concurrency. A probe
    /// that errors, panics or exceeds the timeout yields an `error` report for that
    /// provider only. Only health statuses are updated, never the generation counters.
    pub async fn health_check_all(&self) -> BTreeMap<String, HealthReport> {
        let providers = self
            .read()
            .entries
            .iter()
            .map(|entry| Arc::clone(&entry.provider))
            .collect::<Vec<_>>();
        let timeout = self.health_check.timeout();
        let limit = self.health_check.max_concurrency.max(1);

        let reports = stream::iter(providers)
            .map(|provider| async move {
                let name = provider.name().to_string();
                let probe = AssertUnwindSafe(provider.health_check()).catch_unwind();
                let mut report = match tokio::time::timeout(timeout, probe).await {
                    Ok(Ok(report)) => report,
                    Ok(Err(panic)) => HealthReport::error(
                        &name,
                        format!("health check panicked: {}", panic_message(panic.as_ref())),
                    ),
                    Err(_) => HealthReport::error(
                        &name,
                        format!("health check timed out after {}s", timeout.as_secs()),
                    ),
                };
                report.provider = name.clone();
                (name, report)
            })
            .buffer_unordered(limit)
            .collect::<Vec<_>>()
            .await;

        let mut out = BTreeMap::new();
        for (name, report) in reports {
            self.tracker.record_health(&name, report.status);
            out.insert(name, report);
        }
        let healthy = out
            .values()
            .filter(|report| report.status == HealthStatus::Healthy)
            .count();
        info!(probed = out.len(), healthy, "health sweep finished");
        out
    }

    pub fn get_stats(&self, name: &str) -> Option<UsageStats> {
        self.tracker.get(name)
    }

    pub fn all_stats(&self) -> BTreeMap<String, UsageStats> {
        self.tracker.snapshot()
    }

    pub fn reset_stats(&self, name: Option<&str>) {
        self.tracker.reset(name);
    }

    pub fn summary(&self) -> ManagerSummary {
        let providers = self
            .read()
            .entries
            .iter()
            .map(|entry| ProviderSummary {
                name: entry.provider.name().to_string(),
                kind: entry.provider.kind(),
                display_name: entry.provider.kind().display_name(),
                model: entry.provider.model().to_string(),
                enabled: entry.enabled,
                stats: self.tracker.get(entry.provider.name()).unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        let total_requests = providers.iter().map(|p| p.stats.total_requests).sum::<u64>();
        let successful = providers
            .iter()
            .map(|p| p.stats.successful_requests)
            .sum::<u64>();
        let success_rate = if total_requests == 0 {
            0.0
        } else {
            successful as f64 / total_requests as f64 * 100.0
        };

        ManagerSummary {
            total_providers: providers.len(),
            enabled_providers: providers.iter().filter(|p| p.enabled).count(),
            strategy: self.strategy(),
            fallback_enabled: self.fallback_enabled(),
            total_requests,
            success_rate,
            providers,
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("生成失败了", 2), "生成...");
    }

    #[test]
    fn empty_manager_summary() {
        let manager = ProviderManager::new();
        let summary = manager.summary();
        assert_eq!(summary.total_providers, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.strategy, SelectionStrategy::Priority);
        assert!(summary.fallback_enabled);
    }
}
