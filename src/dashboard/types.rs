//! Dashboard response types

use serde::{Deserialize, Serialize};

use crate::engine::Diagnostics;
use crate::stats::RuleStats;
use crate::types::{Signal, Timestamp};

/// Active and finalized signals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsResponse {
    pub active: Vec<Signal>,
    pub finalized: Vec<Signal>,
}

/// Per-rule statistics with a ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Sorted by rule name
    pub rules: Vec<RuleStatsResponse>,
    pub top_performers: Vec<RuleStatsResponse>,
    pub total_sent: u64,
    pub total_hits: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleStatsResponse {
    pub name: String,
    pub sent: u64,
    pub hits: u64,
    pub accuracy: f64,
}

impl From<&RuleStats> for RuleStatsResponse {
    fn from(stats: &RuleStats) -> Self {
        Self {
            name: stats.name.clone(),
            sent: stats.sent,
            hits: stats.hits,
            accuracy: stats.accuracy(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_signals: usize,
    pub pending_groups: usize,
    pub last_event_at: Option<Timestamp>,
    pub diagnostics: Diagnostics,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
