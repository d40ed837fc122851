//! Confluence Library
//!
//! Rule-driven timing signals over a stream of categorical outcomes

pub mod clock;
pub mod config;
pub mod confluence;
pub mod engine;
pub mod error;
pub mod feed;
pub mod history;
pub mod ledger;
pub mod pool;
pub mod rules;
pub mod stats;
pub mod types;

#[cfg(feature = "dashboard")]
pub mod dashboard;

pub use clock::{Clock, ManualClock, SystemClock};
pub use confluence::ConfluenceThresholds;
pub use engine::{Engine, EngineConfig, EngineSnapshot, IngestOutcome, SharedEngine};
pub use error::{EngineError, IngestError, RuleError};
pub use types::{Category, Event, RawEvent, Signal, SignalResult};
