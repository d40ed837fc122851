//! Engine
//!
//! Owns every piece of engine state and drives one ingestion at a time:
//!
//! 1. append the event to the history
//! 2. evaluate every enabled rule
//! 3. pool future candidates and promote their groups, or hand direct
//!    predictions to the ledger
//! 4. resolve waiting signals against the event
//! 5. prune expired candidates
//!
//! [`SharedEngine`] wraps it in one reader-writer lock so the display path
//! always sees a consistent point-in-time view.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::confluence::ConfluenceThresholds;
use crate::error::{EngineError, IngestError};
use crate::history::EventHistory;
use crate::ledger::SignalLedger;
use crate::pool::{GroupView, PredictionPool};
use crate::rules::{Prediction, RuleContext, RuleLibrary};
use crate::stats::{RuleStats, StatsTracker};
use crate::types::{Candidate, Category, Event, RawEvent, Signal, SignalResult, Timestamp};

/// Events included in a snapshot
const RECENT_EVENTS: usize = 20;

/// Validated engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub thresholds: ConfluenceThresholds,
    pub history_capacity: usize,
    pub finalized_capacity: usize,
    /// Category that resolves a signal as WIN
    pub win_category: Category,
    /// Rules switched off at startup
    pub disabled_rules: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: ConfluenceThresholds::default(),
            history_capacity: 100,
            finalized_capacity: 60,
            win_category: Category::White,
            disabled_rules: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.thresholds.validate()?;
        if self.history_capacity == 0 {
            return Err(EngineError::InvalidCapacity("history"));
        }
        if self.finalized_capacity == 0 {
            return Err(EngineError::InvalidCapacity("finalized history"));
        }
        Ok(())
    }
}

/// What happened to one ingested event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    /// Id already present in the history
    Duplicate,
    /// Timestamp earlier than the latest event in the history
    OutOfOrder,
    Dropped(IngestError),
}

/// Process-lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub events_accepted: u64,
    pub duplicates_ignored: u64,
    pub out_of_order_dropped: u64,
    pub malformed_dropped: u64,
    pub rule_errors: u64,
    pub candidates_added: u64,
    /// Predictions whose target was not strictly after `now`
    pub candidates_not_future: u64,
    pub signals_won: u64,
    pub signals_lost: u64,
}

/// Read-only view for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub taken_at: Timestamp,
    /// WAITING signals ordered by predicted time
    pub active_signals: Vec<Signal>,
    /// Most recent first
    pub finalized_signals: Vec<Signal>,
    pub stats: BTreeMap<String, RuleStats>,
    /// Most recent first
    pub recent_events: Vec<Event>,
    /// Live candidate groups, including those below the activation threshold
    pub pending_groups: Vec<GroupView>,
    pub thresholds: ConfluenceThresholds,
    pub enabled_rules: Vec<String>,
    pub diagnostics: Diagnostics,
}

pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    history: EventHistory,
    library: RuleLibrary,
    pool: PredictionPool,
    ledger: SignalLedger,
    stats: StatsTracker,
    diagnostics: Diagnostics,
    /// Consecutive non-win events since the last win or startup
    drought: usize,
}

impl Engine {
    /// Build an engine with the default rule catalog
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        Self::with_library(config, clock, RuleLibrary::default())
    }

    pub fn with_library(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        mut library: RuleLibrary,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        for name in &config.disabled_rules {
            library.set_enabled(name, false)?;
        }

        info!(
            rules = library.enabled_names().len(),
            win = %config.win_category,
            low = config.thresholds.low,
            medium = config.thresholds.medium,
            high = config.thresholds.high,
            minimum_active = config.thresholds.minimum_active,
            "🚀 Confluence engine initialized"
        );

        Ok(Self {
            history: EventHistory::new(config.history_capacity),
            ledger: SignalLedger::new(config.thresholds, config.finalized_capacity),
            pool: PredictionPool::new(),
            stats: StatsTracker::new(),
            diagnostics: Diagnostics::default(),
            drought: 0,
            library,
            clock,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ingest unvalidated input. Malformed input is logged and dropped.
    pub fn ingest(&mut self, raw: RawEvent) -> IngestOutcome {
        match raw.parse(self.clock.offset()) {
            Ok(event) => self.ingest_event(event),
            Err(e) => {
                warn!(error = %e, "Dropping malformed event");
                self.diagnostics.malformed_dropped += 1;
                IngestOutcome::Dropped(e)
            }
        }
    }

    pub fn ingest_event(&mut self, event: Event) -> IngestOutcome {
        if let Some(id) = event.id.as_deref() {
            if self.history.contains_id(id) {
                debug!(id, "Duplicate event skipped");
                self.diagnostics.duplicates_ignored += 1;
                return IngestOutcome::Duplicate;
            }
        }

        if let Some(latest) = self.history.latest() {
            if event.timestamp < latest.timestamp {
                warn!(
                    at = %event.timestamp.format("%H:%M:%S"),
                    latest = %latest.timestamp.format("%H:%M:%S"),
                    "Out-of-order event skipped"
                );
                self.diagnostics.out_of_order_dropped += 1;
                return IngestOutcome::OutOfOrder;
            }
        }

        let now = self.clock.now();
        debug!(
            category = %event.category,
            value = event.value,
            at = %event.timestamp.format("%H:%M:%S"),
            "Event ingested"
        );
        self.history.push(event.clone());
        self.diagnostics.events_accepted += 1;
        self.drought = if event.category == self.config.win_category {
            0
        } else {
            self.drought.saturating_add(1)
        };

        let evaluation = {
            let ctx = RuleContext {
                history: &self.history,
                event: &event,
                now,
                win_category: self.config.win_category,
                drought: self.drought,
            };
            self.library.evaluate_all(&ctx)
        };
        self.diagnostics.rule_errors += evaluation.errors as u64;

        for prediction in evaluation.predictions {
            self.apply_prediction(prediction, now);
        }

        let settled = self
            .ledger
            .resolve(&event, self.config.win_category, now, &mut self.stats);
        self.count_settled(&settled);

        self.pool.prune(now);
        IngestOutcome::Accepted
    }

    fn apply_prediction(&mut self, prediction: Prediction, now: Timestamp) {
        if prediction.predicted_time <= now {
            debug!(rule = %prediction.rule_name, "Prediction not in the future, discarded");
            self.diagnostics.candidates_not_future += 1;
            return;
        }

        if prediction.direct {
            self.ledger
                .add_direct(&prediction.rule_name, prediction.predicted_time, &mut self.stats, now);
            return;
        }

        let candidate = Candidate::new(
            prediction.rule_name,
            prediction.predicted_time,
            prediction.base_time,
            now,
        );
        debug!(
            rule = %candidate.rule_name,
            key = %candidate.target_minute_key.format("%H:%M"),
            "Candidate added"
        );
        let key = self.pool.add(candidate);
        self.diagnostics.candidates_added += 1;
        if let Some(group) = self.pool.group(&key) {
            self.ledger.promote_or_update(key, group, &mut self.stats, now);
        }
    }

    /// Time out elapsed signals and prune the pool on wall-clock time
    pub fn tick(&mut self) {
        let now = self.clock.now();
        let settled = self.ledger.expire(now, &mut self.stats);
        self.count_settled(&settled);
        self.pool.prune(now);
    }

    fn count_settled(&mut self, settled: &[Signal]) {
        for signal in settled {
            match signal.result {
                SignalResult::Win => self.diagnostics.signals_won += 1,
                SignalResult::Loss => self.diagnostics.signals_lost += 1,
                SignalResult::Pending => {}
            }
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let thresholds = *self.ledger.thresholds();
        EngineSnapshot {
            taken_at: self.clock.now(),
            active_signals: self.ledger.waiting(),
            finalized_signals: self.ledger.finalized_history(),
            stats: self.stats.snapshot(),
            recent_events: self.history.recent(RECENT_EVENTS),
            pending_groups: self.pool.views(&thresholds),
            thresholds,
            enabled_rules: self.library.enabled_names(),
            diagnostics: self.diagnostics,
        }
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Stats for a known rule, zeroed before its first signal
    pub fn rule_stats(&self, name: &str) -> Option<RuleStats> {
        if !self.library.contains(name) {
            return None;
        }
        Some(self.stats.get(name).cloned().unwrap_or_else(|| RuleStats::new(name)))
    }

    pub fn library(&self) -> &RuleLibrary {
        &self.library
    }

    pub fn set_rule_enabled(&mut self, name: &str, enabled: bool) -> Result<(), EngineError> {
        self.library.set_enabled(name, enabled)?;
        info!(rule = name, enabled, "Rule toggled");
        Ok(())
    }

    /// Replace the thresholds.
    ///
    /// Pending groups are reclassified on the next snapshot. Waiting signals
    /// keep their level, and groups are only promoted when a new candidate
    /// lands in them.
    pub fn set_thresholds(&mut self, thresholds: ConfluenceThresholds) -> Result<(), EngineError> {
        thresholds.validate()?;
        self.config.thresholds = thresholds;
        self.ledger.set_thresholds(thresholds);
        info!(
            low = thresholds.low,
            medium = thresholds.medium,
            high = thresholds.high,
            minimum_active = thresholds.minimum_active,
            "Confluence thresholds updated"
        );
        Ok(())
    }

    /// Signals still waiting on their window
    pub fn active_signals(&self) -> Vec<Signal> {
        self.ledger.waiting()
    }

    pub fn finalized_signals(&self) -> Vec<Signal> {
        self.ledger.finalized_history()
    }

    /// Time left until the earliest waiting signal's window closes
    pub fn next_deadline(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.ledger
            .waiting()
            .first()
            .map(|s| (s.window_end - now).max(Duration::zero()))
    }
}

/// Engine behind a single reader-writer lock, cheap to clone across tasks
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<RwLock<Engine>>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    pub fn ingest(&self, raw: RawEvent) -> IngestOutcome {
        self.write().ingest(raw)
    }

    pub fn ingest_event(&self, event: Event) -> IngestOutcome {
        self.write().ingest_event(event)
    }

    pub fn tick(&self) {
        self.write().tick()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.read().snapshot()
    }

    pub fn top_performers(&self, limit: usize, min_sent: u64) -> Vec<RuleStats> {
        self.read().stats().top_performers(limit, min_sent)
    }

    pub fn rule_stats(&self, name: &str) -> Option<RuleStats> {
        self.read().rule_stats(name)
    }

    pub fn set_rule_enabled(&self, name: &str, enabled: bool) -> Result<(), EngineError> {
        self.write().set_rule_enabled(name, enabled)
    }

    pub fn set_thresholds(&self, thresholds: ConfluenceThresholds) -> Result<(), EngineError> {
        self.write().set_thresholds(thresholds)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Engine> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Engine> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rules::{Rule, RuleKind};
    use crate::types::ConfluenceLevel;
    use chrono::{FixedOffset, TimeZone};

    fn ts(h: u32, m: u32, s: u32) -> Timestamp {
        FixedOffset::west_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 10, h, m, s)
            .unwrap()
    }

    /// Four rules all predicting win minute + 5
    fn agreeing_library() -> RuleLibrary {
        RuleLibrary::new(
            ["a", "b", "c", "d"]
                .iter()
                .map(|n| Rule::new(*n, RuleKind::FixedOffset { minutes: 5 }))
                .collect(),
        )
    }

    fn engine_at(now: Timestamp, library: RuleLibrary) -> (Engine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let engine = Engine::with_library(EngineConfig::default(), clock.clone(), library).unwrap();
        (engine, clock)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let clock = Arc::new(ManualClock::new(ts(14, 0, 0)));
        let config = EngineConfig {
            history_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            Engine::new(config, clock.clone()),
            Err(EngineError::InvalidCapacity(_))
        ));

        let config = EngineConfig {
            disabled_rules: vec!["no-such-rule".into()],
            ..Default::default()
        };
        assert!(matches!(
            Engine::new(config, clock),
            Err(EngineError::UnknownRule(_))
        ));
    }

    #[test]
    fn test_agreeing_rules_promote_signal() {
        let (mut engine, _clock) = engine_at(ts(14, 10, 1), agreeing_library());
        let outcome = engine.ingest_event(Event::new(Category::White, 0, ts(14, 10, 0)));
        assert_eq!(outcome, IngestOutcome::Accepted);

        let active = engine.active_signals();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].predicted_time, ts(14, 15, 30));
        assert_eq!(active[0].confluence_count, 4);
        assert_eq!(active[0].level, ConfluenceLevel::Medium);
        assert_eq!(engine.diagnostics().candidates_added, 4);
    }

    #[test]
    fn test_duplicate_ids_are_ignored() {
        let (mut engine, _clock) = engine_at(ts(14, 10, 1), agreeing_library());
        let event = Event::new(Category::White, 0, ts(14, 10, 0)).with_id("42");
        assert_eq!(engine.ingest_event(event.clone()), IngestOutcome::Accepted);
        assert_eq!(engine.ingest_event(event), IngestOutcome::Duplicate);
        assert_eq!(engine.active_signals()[0].confluence_count, 4);
        assert_eq!(engine.diagnostics().duplicates_ignored, 1);
    }

    #[test]
    fn test_malformed_input_leaves_state_untouched() {
        let (mut engine, _clock) = engine_at(ts(14, 10, 1), agreeing_library());
        let outcome = engine.ingest(RawEvent {
            value: Some(3),
            timestamp: Some("2024-05-10T17:10:00Z".into()),
            ..Default::default()
        });
        assert_eq!(outcome, IngestOutcome::Dropped(IngestError::MissingCategory));
        let snapshot = engine.snapshot();
        assert!(snapshot.recent_events.is_empty());
        assert_eq!(snapshot.diagnostics.malformed_dropped, 1);
    }

    #[test]
    fn test_tick_times_out_signals() {
        let (mut engine, clock) = engine_at(ts(14, 10, 1), agreeing_library());
        engine.ingest_event(Event::new(Category::White, 0, ts(14, 10, 0)));

        clock.set(ts(14, 16, 30));
        engine.tick();
        assert_eq!(engine.active_signals().len(), 1);

        clock.set(ts(14, 16, 31));
        engine.tick();
        assert!(engine.active_signals().is_empty());
        let finalized = engine.finalized_signals();
        assert_eq!(finalized[0].result, SignalResult::Loss);
        assert_eq!(finalized[0].resolved_at, Some(ts(14, 16, 31)));
        assert_eq!(engine.diagnostics().signals_lost, 1);
    }

    #[test]
    fn test_threshold_change_leaves_signals_alone() {
        let (mut engine, _clock) = engine_at(ts(14, 10, 1), agreeing_library());
        engine.ingest_event(Event::new(Category::White, 0, ts(14, 10, 0)));

        let stricter = ConfluenceThresholds {
            low: 2,
            medium: 3,
            high: 4,
            minimum_active: 6,
        };
        engine.set_thresholds(stricter).unwrap();
        let active = engine.active_signals();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].level, ConfluenceLevel::Medium);
        assert_eq!(engine.snapshot().pending_groups[0].level, ConfluenceLevel::High);

        let invalid = ConfluenceThresholds {
            low: 0,
            ..stricter
        };
        assert!(engine.set_thresholds(invalid).is_err());
        assert_eq!(engine.snapshot().thresholds, stricter);
    }

    #[test]
    fn test_threshold_change_reclassifies_pending_groups() {
        let library = RuleLibrary::new(vec![
            Rule::new("a", RuleKind::FixedOffset { minutes: 5 }),
            Rule::new("b", RuleKind::FixedOffset { minutes: 5 }),
        ]);
        let (mut engine, clock) = engine_at(ts(14, 10, 1), library);
        engine.ingest_event(Event::new(Category::White, 0, ts(14, 10, 0)));
        assert_eq!(engine.snapshot().pending_groups[0].level, ConfluenceLevel::Min);

        engine
            .set_thresholds(ConfluenceThresholds {
                low: 1,
                medium: 2,
                high: 3,
                minimum_active: 2,
            })
            .unwrap();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.pending_groups[0].level, ConfluenceLevel::Medium);
        assert!(snapshot.active_signals.is_empty());
        assert!(snapshot.stats.is_empty());

        // The next candidate for that minute promotes the whole group
        clock.set(ts(14, 10, 31));
        engine.ingest_event(Event::new(Category::White, 0, ts(14, 10, 30)));
        let active = engine.active_signals();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].confluence_count, 4);
        assert_eq!(active[0].level, ConfluenceLevel::High);
        assert_eq!(engine.stats().get("a").unwrap().sent, 2);
    }

    #[test]
    fn test_shared_engine_round_trip() {
        let (engine, _clock) = engine_at(ts(14, 10, 1), agreeing_library());
        let shared = SharedEngine::new(engine);
        let reader = shared.clone();
        shared.ingest_event(Event::new(Category::White, 0, ts(14, 10, 0)));
        assert_eq!(reader.snapshot().active_signals.len(), 1);
        assert!(shared.set_rule_enabled("a", false).is_ok());
        assert!(reader.snapshot().enabled_rules.iter().all(|r| r != "a"));
        assert_eq!(reader.rule_stats("a").unwrap().sent, 1);
        assert!(reader.rule_stats("missing").is_none());
    }
}
