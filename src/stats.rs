//! Rule Statistics
//!
//! Per-rule counters of signals contributed and signals hit. Purely additive,
//! process-lifetime scope.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Statistics for a single rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleStats {
    /// Rule name
    pub name: String,
    /// Contributions to signals that became active
    pub sent: u64,
    /// Contributions to signals that resolved WIN
    pub hits: u64,
}

impl RuleStats {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Hit percentage (0.0 - 100.0), zero before the first signal
    pub fn accuracy(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.hits as f64 / self.sent as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsTracker {
    stats: HashMap<String, RuleStats>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&mut self, rule: &str) {
        self.stats
            .entry(rule.to_string())
            .or_insert_with(|| RuleStats::new(rule))
            .sent += 1;
    }

    /// Count a hit. Ignored when it would push hits above sends.
    pub fn record_hit(&mut self, rule: &str) {
        match self.stats.get_mut(rule) {
            Some(stats) if stats.hits < stats.sent => stats.hits += 1,
            _ => tracing::debug!(rule, "Hit without a matching send ignored"),
        }
    }

    pub fn get(&self, rule: &str) -> Option<&RuleStats> {
        self.stats.get(rule)
    }

    /// Sorted by rule name
    pub fn snapshot(&self) -> BTreeMap<String, RuleStats> {
        self.stats
            .iter()
            .map(|(name, stats)| (name.clone(), stats.clone()))
            .collect()
    }

    pub fn total_sent(&self) -> u64 {
        self.stats.values().map(|s| s.sent).sum()
    }

    pub fn total_hits(&self) -> u64 {
        self.stats.values().map(|s| s.hits).sum()
    }

    /// Best accuracy first, among rules with at least `min_sent` signals
    pub fn top_performers(&self, limit: usize, min_sent: u64) -> Vec<RuleStats> {
        let mut ranked: Vec<RuleStats> = self
            .stats
            .values()
            .filter(|s| s.sent >= min_sent.max(1))
            .cloned()
            .collect();
        ranked.sort_by(|a, b| {
            b.accuracy()
                .partial_cmp(&a.accuracy())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.sent.cmp(&a.sent))
                .then_with(|| a.name.cmp(&b.name))
        });
        ranked.truncate(limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_stats_creation() {
        let stats = RuleStats::new("win-plus-5");
        assert_eq!(stats.name, "win-plus-5");
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.accuracy(), 0.0);
    }

    #[test]
    fn test_record_sent_and_hit() {
        let mut tracker = StatsTracker::new();
        tracker.record_sent("a");
        tracker.record_sent("a");
        tracker.record_hit("a");

        let stats = tracker.get("a").unwrap();
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.accuracy(), 50.0);
    }

    #[test]
    fn test_hit_without_send_is_ignored() {
        let mut tracker = StatsTracker::new();
        tracker.record_hit("ghost");
        assert!(tracker.get("ghost").is_none());

        tracker.record_sent("a");
        tracker.record_hit("a");
        tracker.record_hit("a");
        assert_eq!(tracker.get("a").unwrap().hits, 1);
    }

    #[test]
    fn test_top_performers() {
        let mut tracker = StatsTracker::new();
        for _ in 0..4 {
            tracker.record_sent("steady");
        }
        tracker.record_hit("steady");
        tracker.record_hit("steady");
        tracker.record_sent("lucky");
        tracker.record_hit("lucky");
        tracker.record_sent("cold");

        let top = tracker.top_performers(2, 1);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "lucky");
        assert_eq!(top[1].name, "steady");

        let seasoned = tracker.top_performers(5, 3);
        assert_eq!(seasoned.len(), 1);
        assert_eq!(seasoned[0].name, "steady");
        assert_eq!(tracker.total_sent(), 6);
        assert_eq!(tracker.total_hits(), 3);
    }
}
