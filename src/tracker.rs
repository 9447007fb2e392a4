use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::HealthStatus;

pub trait Clock: Send + Sync {
    fn now_epoch_millis(&self) -> u64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|duration| duration.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
    /// The adapter raised instead of returning a result.
    Error,
}

impl AttemptOutcome {
    fn health_status(self) -> HealthStatus {
        match self {
            Self::Success => HealthStatus::Healthy,
            Self::Failure => HealthStatus::Unhealthy,
            Self::Error => HealthStatus::Error,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Rolling mean over every recorded attempt, in seconds.
    pub avg_response_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_ms: Option<u64>,
    pub health_status: HealthStatus,
}

impl UsageStats {
    fn record(&mut self, elapsed: Duration, outcome: AttemptOutcome, now_ms: u64) {
        self.total_requests = self.total_requests.saturating_add(1);
        if outcome == AttemptOutcome::Success {
            self.successful_requests = self.successful_requests.saturating_add(1);
        } else {
            self.failed_requests = self.failed_requests.saturating_add(1);
        }

        let n = self.total_requests as f64;
        self.avg_response_time = (self.avg_response_time * (n - 1.0) + elapsed.as_secs_f64()) / n;
        self.last_used_ms = Some(now_ms);
        self.health_status = outcome.health_status();
    }
}

/// In-memory per-provider counters. Every update happens under one lock; nothing is
/// persisted and a restart starts from zero.
pub struct UsageTracker {
    stats: Mutex<HashMap<String, UsageStats>>,
    clock: Box<dyn Clock>,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker")
            .field("stats", &*self.lock())
            .finish()
    }
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            stats: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UsageStats>> {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, provider: &str) {
        self.lock().insert(provider.to_string(), UsageStats::default());
    }

    pub fn remove(&self, provider: &str) {
        self.lock().remove(provider);
    }

    /// Samples for a provider that is not registered (or was removed mid-request) are dropped.
    pub fn record_attempt(&self, provider: &str, elapsed: Duration, outcome: AttemptOutcome) {
        let now = self.clock.now_epoch_millis();
        if let Some(stats) = self.lock().get_mut(provider) {
            stats.record(elapsed, outcome, now);
        }
    }

    /// Health probes only touch the status, never the generation counters.
    pub fn record_health(&self, provider: &str, status: HealthStatus) {
        if let Some(stats) = self.lock().get_mut(provider) {
            stats.health_status = status;
        }
    }

    pub fn get(&self, provider: &str) -> Option<UsageStats> {
        self.lock().get(provider).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, UsageStats> {
        self.lock()
            .iter()
            .map(|(name, stats)| (name.clone(), stats.clone()))
            .collect()
    }

    pub fn avg_response_time(&self, provider: &str) -> f64 {
        self.lock()
            .get(provider)
            .map(|stats| stats.avg_response_time)
            .unwrap_or(0.0)
    }

    pub fn reset(&self, provider: Option<&str>) {
        let mut stats = self.lock();
        match provider {
            Some(name) => {
                if let Some(entry) = stats.get_mut(name) {
                    *entry = UsageStats::default();
                }
            }
            None => stats
                .values_mut()
                .for_each(|entry| *entry = UsageStats::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_epoch_millis(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn rolling_average_over_three_successes() {
        let tracker = UsageTracker::with_clock(Box::new(FixedClock(42)));
        tracker.register("a");
        for secs in [1.0, 2.0, 3.0] {
            tracker.record_attempt("a", Duration::from_secs_f64(secs), AttemptOutcome::Success);
        }

        let stats = tracker.get("a").unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.successful_requests, 3);
        assert_eq!(stats.failed_requests, 0);
        assert_eq!(stats.avg_response_time, 2.0);
        assert_eq!(stats.last_used_ms, Some(42));
        assert_eq!(stats.health_status, HealthStatus::Healthy);
    }

    #[test]
    fn outcome_sets_health_status() {
        let tracker = UsageTracker::new();
        tracker.register("a");
        tracker.record_attempt("a", Duration::ZERO, AttemptOutcome::Failure);
        assert_eq!(tracker.get("a").unwrap().health_status, HealthStatus::Unhealthy);
        tracker.record_attempt("a", Duration::ZERO, AttemptOutcome::Error);
        let stats = tracker.get("a").unwrap();
        assert_eq!(stats.health_status, HealthStatus::Error);
        assert_eq!(stats.failed_requests, 2);
    }

    #[test]
    fn health_updates_leave_counters_alone() {
        let tracker = UsageTracker::new();
        tracker.register("a");
        tracker.record_attempt("a", Duration::from_secs(1), AttemptOutcome::Success);
        tracker.record_health("a", HealthStatus::Unhealthy);

        let stats = tracker.get("a").unwrap();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.health_status, HealthStatus::Unhealthy);

        tracker.record_health("missing", HealthStatus::Healthy);
        assert!(tracker.get("missing").is_none());
    }

    #[test]
    fn attempts_for_removed_providers_are_dropped() {
        let tracker = UsageTracker::new();
        tracker.register("a");
        tracker.remove("a");
        tracker.record_attempt("a", Duration::from_secs(1), AttemptOutcome::Success);
        tracker.record_attempt("never", Duration::from_secs(1), AttemptOutcome::Failure);

        assert!(tracker.get("a").is_none());
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn reset_clears_one_or_all() {
        let tracker = UsageTracker::new();
        tracker.register("a");
        tracker.register("b");
        tracker.record_attempt("a", Duration::from_secs(1), AttemptOutcome::Success);
        tracker.record_attempt("b", Duration::from_secs(1), AttemptOutcome::Success);

        tracker.reset(Some("a"));
        assert_eq!(tracker.get("a").unwrap().total_requests, 0);
        assert_eq!(tracker.get("b").unwrap().total_requests, 1);

        tracker.reset(None);
        assert_eq!(tracker.get("b").unwrap(), UsageStats::default());
    }
}
