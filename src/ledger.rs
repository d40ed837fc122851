//! Signal Ledger
//!
//! Owns the WAITING signals and the bounded most-recent-first history of
//! finalized ones. Lifecycle per signal:
//!
//! - (none) -> WAITING, by confluence promotion or a direct rule
//! - WAITING -> WIN, when a win-category event lands inside the window
//! - WAITING -> LOSS, when the window has elapsed on the wall clock
//!
//! Finalized signals are never reopened.

use std::collections::VecDeque;
use tracing::{debug, info};

use crate::confluence::{classify, ConfluenceThresholds};
use crate::stats::StatsTracker;
use crate::types::{
    truncate_to_minute, Candidate, Category, ConfluenceLevel, Event, Signal, SignalResult,
    Timestamp,
};

/// What a ledger call did to the active set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerUpdate {
    /// Group too small to activate
    BelowMinimum,
    Created,
    Updated,
}

#[derive(Debug, Clone)]
pub struct SignalLedger {
    active: Vec<Signal>,
    finalized: VecDeque<Signal>,
    capacity: usize,
    thresholds: ConfluenceThresholds,
}

impl SignalLedger {
    pub fn new(thresholds: ConfluenceThresholds, capacity: usize) -> Self {
        Self {
            active: Vec::new(),
            finalized: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &ConfluenceThresholds {
        &self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: ConfluenceThresholds) {
        self.thresholds = thresholds;
    }

    /// Create or refresh the signal for a minute group.
    ///
    /// Stats are credited for the group present when it first reaches the
    /// activation threshold. Refreshing a waiting signal updates it in place
    /// without touching the stats.
    pub fn promote_or_update(
        &mut self,
        key: Timestamp,
        group: &[Candidate],
        stats: &mut StatsTracker,
        now: Timestamp,
    ) -> LedgerUpdate {
        if group.len() < self.thresholds.minimum_active {
            return LedgerUpdate::BelowMinimum;
        }

        let thresholds = self.thresholds;
        if let Some(signal) = self.waiting_mut(key) {
            let previous = signal.level;
            // A group reaching a direct-only signal is that group's promotion
            if signal.contributing_rules.is_empty() {
                for candidate in group {
                    stats.record_sent(&candidate.rule_name);
                }
            }
            Self::refresh(signal, group, &thresholds);
            if signal.level != previous {
                info!(
                    key = %key.format("%H:%M"),
                    from = %previous,
                    to = %signal.level,
                    count = signal.confluence_count,
                    "Signal confluence upgraded"
                );
            }
            return LedgerUpdate::Updated;
        }

        let mut signal = Signal::waiting(key, ConfluenceLevel::Min, now);
        Self::refresh(&mut signal, group, &thresholds);
        for candidate in group {
            stats.record_sent(&candidate.rule_name);
        }
        info!(
            key = %key.format("%H:%M"),
            level = %signal.level,
            count = signal.confluence_count,
            rules = ?signal.contributing_rules,
            "🎯 Confluence signal created"
        );
        self.active.push(signal);
        LedgerUpdate::Created
    }

    /// Create a single-rule signal without going through grouping.
    ///
    /// If a signal is already waiting on that minute the rule joins it instead,
    /// so a minute never carries two WAITING signals.
    pub fn add_direct(
        &mut self,
        rule: &str,
        predicted_time: Timestamp,
        stats: &mut StatsTracker,
        now: Timestamp,
    ) -> LedgerUpdate {
        let key = truncate_to_minute(predicted_time);
        stats.record_sent(rule);

        let thresholds = self.thresholds;
        if let Some(signal) = self.waiting_mut(key) {
            signal.direct_rules.push(rule.to_string());
            signal.confluence_count += 1;
            if !signal.is_direct() {
                signal.level = classify(signal.confluence_count, &thresholds);
            }
            debug!(rule, key = %key.format("%H:%M"), "Direct rule joined waiting signal");
            return LedgerUpdate::Updated;
        }

        let mut signal = Signal::waiting(predicted_time, ConfluenceLevel::Direct, now);
        signal.direct_rules.push(rule.to_string());
        signal.confluence_count = 1;
        info!(
            rule,
            key = %key.format("%H:%M"),
            "⚡ Direct signal created"
        );
        self.active.push(signal);
        LedgerUpdate::Created
    }

    /// Resolve waiting signals against a newly ingested event.
    ///
    /// The window test runs on minute-truncated instants. A matching event in
    /// the window wins; any other event in the window leaves the signal
    /// waiting; an event outside the window times the signal out once `now`
    /// is past `window_end`.
    pub fn resolve(
        &mut self,
        event: &Event,
        win_category: Category,
        now: Timestamp,
        stats: &mut StatsTracker,
    ) -> Vec<Signal> {
        let minute = truncate_to_minute(event.timestamp);
        self.settle(stats, |signal| {
            let in_window = truncate_to_minute(signal.window_start) <= minute
                && minute <= truncate_to_minute(signal.window_end);
            if in_window {
                (event.category == win_category).then_some((SignalResult::Win, event.timestamp))
            } else if now > signal.window_end {
                Some((SignalResult::Loss, now))
            } else {
                None
            }
        })
    }

    /// Time out every waiting signal whose window ended before `now`
    pub fn expire(&mut self, now: Timestamp, stats: &mut StatsTracker) -> Vec<Signal> {
        self.settle(stats, |signal| {
            (now > signal.window_end).then_some((SignalResult::Loss, now))
        })
    }

    /// Waiting signals ordered by predicted time
    pub fn waiting(&self) -> Vec<Signal> {
        let mut waiting: Vec<Signal> = self.active.iter().filter(|s| s.is_waiting()).cloned().collect();
        waiting.sort_by_key(|s| s.predicted_time);
        waiting
    }

    pub fn waiting_for(&self, key: Timestamp) -> Option<&Signal> {
        self.active
            .iter()
            .find(|s| s.is_waiting() && s.target_minute_key == key)
    }

    /// Finalized signals, most recent first
    pub fn finalized_history(&self) -> Vec<Signal> {
        self.finalized.iter().cloned().collect()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    fn waiting_mut(&mut self, key: Timestamp) -> Option<&mut Signal> {
        self.active
            .iter_mut()
            .find(|s| s.is_waiting() && s.target_minute_key == key)
    }

    fn refresh(signal: &mut Signal, group: &[Candidate], thresholds: &ConfluenceThresholds) {
        signal.contributing_rules = group.iter().map(|c| c.rule_name.clone()).collect();
        signal.confluence_count = group.len() + signal.direct_rules.len();
        signal.level = classify(signal.confluence_count, thresholds);
    }

    fn settle<F>(&mut self, stats: &mut StatsTracker, mut decide: F) -> Vec<Signal>
    where
        F: FnMut(&Signal) -> Option<(SignalResult, Timestamp)>,
    {
        let mut settled = Vec::new();
        for mut signal in std::mem::take(&mut self.active) {
            let outcome = if signal.is_waiting() { decide(&signal) } else { None };
            match outcome {
                Some((result, at)) => {
                    signal.finalize(result, at);
                    if result == SignalResult::Win {
                        for rule in signal.rules() {
                            stats.record_hit(rule);
                        }
                    }
                    info!(
                        key = %signal.target_minute_key.format("%H:%M"),
                        result = %result,
                        level = %signal.level,
                        count = signal.confluence_count,
                        "Signal finalized"
                    );
                    settled.push(signal.clone());
                    self.archive(signal);
                }
                None => self.active.push(signal),
            }
        }
        settled
    }

    fn archive(&mut self, signal: Signal) {
        self.finalized.push_front(signal);
        while self.finalized.len() > self.capacity {
            self.finalized.pop_back();
        }
    }
}
