use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    RoundRobin,
    Random,
    #[default]
    Priority,
    Fastest,
    /// Same ordering as `Priority`; no cost model exists behind it.
    Cheapest,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
            Self::Priority => "priority",
            Self::Fastest => "fastest",
            Self::Cheapest => "cheapest",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            "priority" => Ok(Self::Priority),
            "fastest" => Ok(Self::Fastest),
            "cheapest" => Ok(Self::Cheapest),
            other => Err(format!("unknown selection strategy: {other}")),
        }
    }
}

/// Picks the next candidate out of the enabled providers. `enabled` must be in
/// registration order; that order is what `priority`, `cheapest` and tie-breaking use.
#[derive(Debug, Default)]
pub struct Selector {
    cursor: AtomicUsize,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(
        &self,
        strategy: SelectionStrategy,
        enabled: &[String],
        excluded: &HashSet<String>,
        avg_latency: impl Fn(&str) -> f64,
    ) -> Option<String> {
        let mut available = enabled.iter().filter(|name| !excluded.contains(name.as_str()));

        match strategy {
            SelectionStrategy::Priority | SelectionStrategy::Cheapest => available.next().cloned(),
            SelectionStrategy::Random => {
                let candidates = available.collect::<Vec<_>>();
                candidates
                    .choose(&mut rand::thread_rng())
                    .map(|name| (*name).clone())
            }
            SelectionStrategy::Fastest => {
                let mut best: Option<(&String, f64)> = None;
                for name in available {
                    let latency = avg_latency(name);
                    match best {
                        Some((_, current)) if latency >= current => {}
                        _ => best = Some((name, latency)),
                    }
                }
                best.map(|(name, _)| name.clone())
            }
            SelectionStrategy::RoundRobin => self.next_round_robin(enabled, excluded),
        }
    }

    /// The cursor moves once per call regardless of exclusions. When the slot it lands
    /// on is excluded, the next non-excluded provider after it is used instead.
    fn next_round_robin(&self, enabled: &[String], excluded: &HashSet<String>) -> Option<String> {
        if enabled.is_empty() {
            return None;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % enabled.len();
        (0..enabled.len())
            .map(|offset| &enabled[(start + offset) % enabled.len()])
            .find(|name| !excluded.contains(name.as_str()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    fn excluded(items: &[&str]) -> HashSet<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn round_robin_cycles_in_registration_order() {
        let selector = Selector::new();
        let enabled = names(&["a", "b", "c"]);
        let picks = (0..4)
            .map(|_| {
                selector
                    .select(SelectionStrategy::RoundRobin, &enabled, &HashSet::new(), |_| 0.0)
                    .unwrap()
            })
            .collect::<Vec<_>>();
        assert_eq!(picks, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn round_robin_skips_excluded_slot() {
        let selector = Selector::new();
        let enabled = names(&["a", "b", "c"]);
        let skip_a = excluded(&["a"]);
        assert_eq!(
            selector.select(SelectionStrategy::RoundRobin, &enabled, &skip_a, |_| 0.0),
            Some("b".to_string())
        );
        // Cursor still advanced by exactly one.
        assert_eq!(
            selector.select(SelectionStrategy::RoundRobin, &enabled, &HashSet::new(), |_| 0.0),
            Some("b".to_string())
        );
    }

    #[test]
    fn priority_and_cheapest_pick_first_available() {
        let selector = Selector::new();
        let enabled = names(&["a", "b", "c"]);
        for strategy in [SelectionStrategy::Priority, SelectionStrategy::Cheapest] {
            assert_eq!(
                selector.select(strategy, &enabled, &excluded(&["a"]), |_| 0.0),
                Some("b".to_string())
            );
        }
    }

    #[test]
    fn fastest_uses_latency_and_breaks_ties_by_order() {
        let selector = Selector::new();
        let enabled = names(&["a", "b", "c"]);
        let latency = |name: &str| match name {
            "a" => 3.0,
            "b" => 1.0,
            _ => 1.0,
        };
        assert_eq!(
            selector.select(SelectionStrategy::Fastest, &enabled, &HashSet::new(), latency),
            Some("b".to_string())
        );
        assert_eq!(
            selector.select(SelectionStrategy::Fastest, &enabled, &excluded(&["b"]), latency),
            Some("c".to_string())
        );
    }

    #[test]
    fn random_only_returns_available_candidates() {
        let selector = Selector::new();
        let enabled = names(&["a", "b", "c"]);
        for _ in 0..32 {
            let pick = selector
                .select(SelectionStrategy::Random, &enabled, &excluded(&["a", "c"]), |_| 0.0)
                .unwrap();
            assert_eq!(pick, "b");
        }
    }

    #[test]
    fn none_when_everything_is_excluded() {
        let selector = Selector::new();
        let enabled = names(&["a", "b"]);
        let all = excluded(&["a", "b"]);
        for strategy in [
            SelectionStrategy::RoundRobin,
            SelectionStrategy::Random,
            SelectionStrategy::Priority,
            SelectionStrategy::Fastest,
            SelectionStrategy::Cheapest,
        ] {
            assert_eq!(selector.select(strategy, &enabled, &all, |_| 0.0), None);
            assert_eq!(selector.select(strategy, &[], &HashSet::new(), |_| 0.0), None);
        }
    }

    #[test]
    fn strategy_parses_from_config_strings() {
        assert_eq!("round-robin".parse(), Ok(SelectionStrategy::RoundRobin));
        assert_eq!("FASTEST".parse(), Ok(SelectionStrategy::Fastest));
        assert!("cost_aware".parse::<SelectionStrategy>().is_err());
    }
}
