//! Rule Library
//!
//! A closed set of tagged rule variants, all evaluated by one dispatcher.
//! Rules only read the event history; they never mutate engine state.
//!
//! Every rule reduces to a minute sum that is folded into `1..=60` and placed
//! at second 30 of the anchor's hour, moving forward hour by hour until the
//! instant is strictly in the future.

mod catalog;

pub use catalog::default_rules;

use chrono::{Duration, Timelike};
use tracing::debug;

use crate::error::{EngineError, RuleError};
use crate::history::EventHistory;
use crate::types::{at_second_30, truncate_to_hour, truncate_to_minute, Category, Event, Timestamp};

/// Hourly steps tried before a target is declared unreachable
const MAX_HOUR_STEPS: usize = 24;

/// Fold an integer sum into the minute range `1..=60` (0 becomes 60)
pub fn normalize_minute(sum: i64) -> u32 {
    match sum.rem_euclid(60) {
        0 => 60,
        minute => minute as u32,
    }
}

/// Minute sum of two terms. Overflow means the rule has no prediction.
fn checked_minutes(a: i64, b: i64) -> Result<i64, RuleError> {
    a.checked_add(b).ok_or(RuleError::OutOfRange(a))
}

/// Place `minute` (1..=60) at second 30 of `base`'s hour, then advance whole
/// hours until strictly after `now`. Minute 60 is the top of the next hour.
pub fn resolve_target(minute: u32, base: Timestamp, now: Timestamp) -> Result<Timestamp, RuleError> {
    if !(1..=60).contains(&minute) {
        return Err(RuleError::OutOfRange(i64::from(minute)));
    }
    let start = truncate_to_hour(base) + Duration::minutes(i64::from(minute)) + Duration::seconds(30);
    first_future(start, now).ok_or(RuleError::TargetNotInFuture(minute))
}

fn first_future(mut t: Timestamp, now: Timestamp) -> Option<Timestamp> {
    for _ in 0..=MAX_HOUR_STEPS {
        if t > now {
            return Some(t);
        }
        t = t + Duration::hours(1);
    }
    None
}

fn minute_of(t: Timestamp) -> i64 {
    i64::from(t.minute())
}

/// Two-digit mirror of a minute: 07 -> 70, 42 -> 24
fn mirror_minute(minute: i64) -> i64 {
    (minute % 10) * 10 + minute / 10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitTransform {
    /// Mirrored minute plus hour plus minute
    Mirror,
    /// Minute plus itself
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookbackTransform {
    /// Value of the n-th non-win event after the win
    Nth,
    /// Sum of the first n non-win values after the win
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairTransform {
    /// Same minute, one hour later
    NextHour,
    /// Minute plus a fixed offset
    Offset(i64),
    /// Minute plus the repeated value plus an offset (value must be non-zero)
    Twins(i64),
}

/// Rule variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    /// On a win: win minute plus `minutes`
    FixedOffset { minutes: i64 },
    /// On a win: digit arithmetic on the win minute
    DigitManipulation { transform: DigitTransform },
    /// On the `count`-th non-win event after a win: win minute plus the
    /// transformed follower values
    Lookback { count: usize, transform: LookbackTransform },
    /// On a non-win event with one of `values`: event minute plus `minutes`
    ValueOffset { values: Vec<i64>, minutes: i64 },
    /// When the last two events share value and minute
    Pair { transform: PairTransform },
    /// Every `every` non-win events after a win: win minute plus `offset`
    DroughtSequence { every: usize, offset: i64 },
    /// Exactly `count` consecutive non-win events: event minute plus
    /// `minutes`, as a direct signal
    CounterThreshold { count: usize, minutes: i64 },
}

/// What a rule sees when it runs
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// History with the triggering event already appended
    pub history: &'a EventHistory,
    pub event: &'a Event,
    pub now: Timestamp,
    pub win_category: Category,
    /// Consecutive non-win events ending with `event`, counted since the
    /// engine started rather than over the bounded history
    pub drought: usize,
}

impl RuleContext<'_> {
    fn is_win(&self, event: &Event) -> bool {
        event.category == self.win_category
    }
}

/// A predicted instant and the instant it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Firing {
    pub predicted_time: Timestamp,
    pub base_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub enabled: bool,
    pub kind: RuleKind,
}

impl Rule {
    pub fn new(name: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            kind,
        }
    }

    /// Direct rules create signals without confluence grouping
    pub fn is_direct(&self) -> bool {
        matches!(self.kind, RuleKind::CounterThreshold { .. })
    }

    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Vec<Firing>, RuleError> {
        let event = ctx.event;
        let at = |sum: i64, base: Timestamp| -> Result<Firing, RuleError> {
            let predicted_time = resolve_target(normalize_minute(sum), base, ctx.now)?;
            Ok(Firing {
                predicted_time,
                base_time: base,
            })
        };

        match &self.kind {
            RuleKind::FixedOffset { minutes } => {
                if !ctx.is_win(event) {
                    return Ok(Vec::new());
                }
                Ok(vec![at(checked_minutes(minute_of(event.timestamp), *minutes)?, event.timestamp)?])
            }
            RuleKind::DigitManipulation { transform } => {
                if !ctx.is_win(event) {
                    return Ok(Vec::new());
                }
                let minute = minute_of(event.timestamp);
                let sum = match transform {
                    DigitTransform::Mirror => {
                        mirror_minute(minute) + i64::from(event.timestamp.hour()) + minute
                    }
                    DigitTransform::Double => minute + minute,
                };
                Ok(vec![at(sum, event.timestamp)?])
            }
            RuleKind::Lookback { count, transform } => {
                if ctx.is_win(event) || *count == 0 {
                    return Ok(Vec::new());
                }
                let mut firings = Vec::new();
                for anchor in ctx.history.iter().filter(|e| ctx.is_win(e)) {
                    let followers =
                        ctx.history
                            .first_after_excluding(anchor.timestamp, ctx.win_category, count + 1);
                    // Fires once, on the event that completes the lookback
                    if followers.len() != *count {
                        continue;
                    }
                    let values = match transform {
                        LookbackTransform::Nth => followers[count - 1].value,
                        LookbackTransform::Sum => followers
                            .iter()
                            .try_fold(0i64, |acc, e| checked_minutes(acc, e.value))?,
                    };
                    firings.push(at(checked_minutes(values, minute_of(anchor.timestamp))?, anchor.timestamp)?);
                }
                Ok(firings)
            }
            RuleKind::ValueOffset { values, minutes } => {
                if ctx.is_win(event) || !values.contains(&event.value) {
                    return Ok(Vec::new());
                }
                Ok(vec![at(checked_minutes(minute_of(event.timestamp), *minutes)?, event.timestamp)?])
            }
            RuleKind::Pair { transform } => {
                let previous = ctx.history.back(1).ok_or(RuleError::MissingHistory(2))?;
                let same_minute =
                    truncate_to_minute(previous.timestamp) == truncate_to_minute(event.timestamp);
                if previous.value != event.value || !same_minute {
                    return Ok(Vec::new());
                }
                let minute = minute_of(event.timestamp);
                match transform {
                    PairTransform::NextHour => {
                        let start = at_second_30(event.timestamp) + Duration::hours(1);
                        let predicted_time = first_future(start, ctx.now)
                            .ok_or(RuleError::TargetNotInFuture(minute as u32))?;
                        Ok(vec![Firing {
                            predicted_time,
                            base_time: event.timestamp,
                        }])
                    }
                    PairTransform::Offset(minutes) => {
                        Ok(vec![at(checked_minutes(minute, *minutes)?, event.timestamp)?])
                    }
                    PairTransform::Twins(minutes) => {
                        if event.value == 0 {
                            return Ok(Vec::new());
                        }
                        let sum = checked_minutes(minute, event.value)?;
                        Ok(vec![at(checked_minutes(sum, *minutes)?, event.timestamp)?])
                    }
                }
            }
            RuleKind::DroughtSequence { every, offset } => {
                if ctx.is_win(event) || *every == 0 {
                    return Ok(Vec::new());
                }
                if ctx.drought == 0 || ctx.drought % every != 0 {
                    return Ok(Vec::new());
                }
                // The anchoring win has to still be in the buffer
                let (_, last_win) = ctx.history.streak_without(ctx.win_category);
                match last_win {
                    Some(win) => Ok(vec![at(
                        checked_minutes(minute_of(win.timestamp), *offset)?,
                        win.timestamp,
                    )?]),
                    None => Ok(Vec::new()),
                }
            }
            RuleKind::CounterThreshold { count, minutes } => {
                if ctx.is_win(event) {
                    return Ok(Vec::new());
                }
                if ctx.drought != *count {
                    return Ok(Vec::new());
                }
                Ok(vec![at(checked_minutes(minute_of(event.timestamp), *minutes)?, event.timestamp)?])
            }
        }
    }
}

/// One rule's output, ready to become a candidate or a direct signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    pub rule_name: String,
    pub predicted_time: Timestamp,
    pub base_time: Timestamp,
    pub direct: bool,
}

/// Result of running every enabled rule once
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub predictions: Vec<Prediction>,
    /// Rules that failed and were treated as "no prediction"
    pub errors: usize,
}

/// Registry of named rules
#[derive(Debug, Clone)]
pub struct RuleLibrary {
    rules: Vec<Rule>,
}

impl Default for RuleLibrary {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl RuleLibrary {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.iter().any(|r| r.name == name)
    }

    pub fn enabled_names(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), EngineError> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| EngineError::UnknownRule(name.to_string()))?;
        rule.enabled = enabled;
        Ok(())
    }

    /// Run every enabled rule. Failures stay local to the rule.
    pub fn evaluate_all(&self, ctx: &RuleContext<'_>) -> Evaluation {
        let mut evaluation = Evaluation::default();
        for rule in self.rules.iter().filter(|r| r.enabled) {
            match rule.evaluate(ctx) {
                Ok(firings) => {
                    evaluation
                        .predictions
                        .extend(firings.into_iter().map(|f| Prediction {
                            rule_name: rule.name.clone(),
                            predicted_time: f.predicted_time,
                            base_time: f.base_time,
                            direct: rule.is_direct(),
                        }));
                }
                Err(e) => {
                    debug!(rule = %rule.name, error = %e, "Rule produced no prediction");
                    evaluation.errors += 1;
                }
            }
        }
        evaluation
    }
}
