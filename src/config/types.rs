//! Configuration sections

use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub engine: EngineSection,
    pub confluence: ConfluenceSection,
    pub rules: RulesSection,
    pub feed: FeedConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Category that resolves signals as WIN (white, red, black)
    pub win_category: String,
    /// Reference timezone as a whole-hour UTC offset
    pub utc_offset_hours: i32,
    /// Recent events kept for rule evaluation
    pub history_capacity: usize,
    /// Finalized signals kept for display
    pub finalized_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfluenceSection {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    /// Group size needed before a signal is created
    pub minimum_active: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesSection {
    /// Rule names switched off at startup
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Outcome feed endpoint
    pub url: String,
    /// Delay between polls in milliseconds
    pub poll_interval_ms: u64,
    /// Delay after a failed poll in milliseconds
    pub error_backoff_ms: u64,
    /// HTTP request timeout in milliseconds
    pub timeout_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}
