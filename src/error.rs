//! Error types for the engine core

use thiserror::Error;

/// A single rule invocation that produced no usable prediction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// Not enough events in the history for this rule's lookback
    #[error("not enough history (need {0} events)")]
    MissingHistory(usize),

    /// No future instant found within 24 hourly steps
    #[error("target minute {0} never lands in the future")]
    TargetNotInFuture(u32),

    /// Derived minute outside the 1..=60 range
    #[error("minute {0} out of range")]
    OutOfRange(i64),
}

/// Malformed ingestion input. The event is dropped, never raised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("event has no category")]
    MissingCategory,

    #[error("event has no value")]
    MissingValue,

    #[error("event has no timestamp")]
    MissingTimestamp,

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Configuration rejected at construction time
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid confluence thresholds: {0}")]
    InvalidThresholds(String),

    #[error("{0} capacity must be greater than zero")]
    InvalidCapacity(&'static str),

    #[error("unknown rule: {0}")]
    UnknownRule(String),
}
