//! Prediction pool
//!
//! Holds live candidates grouped by target minute. Groups keep insertion
//! order and do not dedup: a rule firing twice for one minute counts twice.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::confluence::{classify, ConfluenceThresholds};
use crate::types::{at_second_30, Candidate, ConfluenceLevel, Timestamp};

/// Read-only view of one group for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupView {
    pub target_minute_key: Timestamp,
    pub rules: Vec<String>,
    pub count: usize,
    pub level: ConfluenceLevel,
}

#[derive(Debug, Clone, Default)]
pub struct PredictionPool {
    groups: BTreeMap<Timestamp, Vec<Candidate>>,
}

impl PredictionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a candidate into its minute group and return the group key
    pub fn add(&mut self, candidate: Candidate) -> Timestamp {
        let key = candidate.target_minute_key;
        self.groups.entry(key).or_default().push(candidate);
        key
    }

    pub fn group(&self, key: &Timestamp) -> Option<&[Candidate]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> Vec<Timestamp> {
        self.groups.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Drop candidates and groups whose window has passed.
    ///
    /// A candidate lives until one minute after its window end; a group until
    /// two minutes after its predicted time. Returns the number of candidates
    /// removed.
    pub fn prune(&mut self, now: Timestamp) -> usize {
        let before = self.len();
        self.groups.retain(|key, candidates| {
            candidates.retain(|c| c.window_end + Duration::minutes(1) >= now);
            !candidates.is_empty() && at_second_30(*key) + Duration::minutes(2) >= now
        });
        let removed = before - self.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = self.len(), "Pruned expired candidates");
        }
        removed
    }

    /// Groups in chronological order with their current classification
    pub fn views(&self, thresholds: &ConfluenceThresholds) -> Vec<GroupView> {
        self.groups
            .iter()
            .map(|(key, candidates)| GroupView {
                target_minute_key: *key,
                rules: candidates.iter().map(|c| c.rule_name.clone()).collect(),
                count: candidates.len(),
                level: classify(candidates.len(), thresholds),
            })
            .collect()
    }
}
