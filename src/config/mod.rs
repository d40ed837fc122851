//! Configuration management for the confluence engine
//!
//! Loads from optional config files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{anyhow, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};

use crate::clock::SystemClock;
use crate::confluence::ConfluenceThresholds;
use crate::engine::EngineConfig;
use crate::rules::RuleLibrary;
use crate::types::Category;

/// Built-in defaults, lowest precedence
fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        // Engine defaults
        .set_default("engine.win_category", "white")?
        .set_default("engine.utc_offset_hours", -3)?
        .set_default("engine.history_capacity", 100)?
        .set_default("engine.finalized_capacity", 60)?
        // Confluence defaults
        .set_default("confluence.low", 3)?
        .set_default("confluence.medium", 4)?
        .set_default("confluence.high", 5)?
        .set_default("confluence.minimum_active", 4)?
        // Rules defaults
        .set_default("rules.disabled", Vec::<String>::new())?
        // Feed defaults
        .set_default(
            "feed.url",
            "https://blaze.bet.br/api/singleplayer-originals/originals/roulette_games/recent/1",
        )?
        .set_default("feed.poll_interval_ms", 3000)?
        .set_default("feed.error_backoff_ms", 5000)?
        .set_default("feed.timeout_ms", 5000)?
        // The feed answers 451 to non-browser agents
        .set_default(
            "feed.user_agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
        )?
        // Dashboard defaults
        .set_default("dashboard.bind_addr", "0.0.0.0:10000")?
        // Logging defaults
        .set_default("logging.json", false)
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = defaults()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (CONFLUENCE__*)
            .add_source(
                Environment::with_prefix("CONFLUENCE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("rules.disabled")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Validated engine settings. Rejects anything the engine would refuse.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let win_category = Category::from_str(&self.engine.win_category)
            .ok_or_else(|| anyhow!("unknown win category: {}", self.engine.win_category))?;

        let library = RuleLibrary::default();
        if let Some(unknown) = self.rules.disabled.iter().find(|n| !library.contains(n)) {
            return Err(anyhow!("cannot disable unknown rule: {}", unknown));
        }

        let config = EngineConfig {
            thresholds: ConfluenceThresholds {
                low: self.confluence.low,
                medium: self.confluence.medium,
                high: self.confluence.high,
                minimum_active: self.confluence.minimum_active,
            },
            history_capacity: self.engine.history_capacity,
            finalized_capacity: self.engine.finalized_capacity,
            win_category,
            disabled_rules: self.rules.disabled.clone(),
        };
        config.validate().context("Invalid engine configuration")?;
        Ok(config)
    }

    /// Wall clock in the configured reference timezone
    pub fn clock(&self) -> Result<SystemClock> {
        SystemClock::from_utc_offset_hours(self.engine.utc_offset_hours)
            .ok_or_else(|| anyhow!("invalid UTC offset: {}h", self.engine.utc_offset_hours))
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "win={} utc{:+} thresholds={}/{}/{} min_active={} disabled={:?} poll={}ms",
            self.engine.win_category,
            self.engine.utc_offset_hours,
            self.confluence.low,
            self.confluence.medium,
            self.confluence.high,
            self.confluence.minimum_active,
            self.rules.disabled,
            self.feed.poll_interval_ms
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(overrides: &[(&str, &str)]) -> AppConfig {
        let mut builder = defaults().unwrap();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap().try_deserialize().unwrap()
    }

    #[test]
    fn test_defaults_produce_valid_engine_config() {
        let config = build(&[]);
        let engine = config.engine_config().unwrap();
        assert_eq!(engine.thresholds, ConfluenceThresholds::default());
        assert_eq!(engine.win_category, Category::White);
        assert_eq!(engine.history_capacity, 100);
        assert_eq!(engine.finalized_capacity, 60);
        assert!(config.clock().is_ok());
        assert!(config.digest().contains("thresholds=3/4/5"));
    }

    #[test]
    fn test_invalid_thresholds_are_fatal() {
        let config = build(&[("confluence.low", "0")]);
        assert!(config.engine_config().is_err());

        let config = build(&[("confluence.low", "6")]);
        assert!(config.engine_config().is_err());
    }

    #[test]
    fn test_unknown_category_and_offset() {
        let config = build(&[("engine.win_category", "green")]);
        assert!(config.engine_config().is_err());

        let config = build(&[("engine.utc_offset_hours", "30")]);
        assert!(config.clock().is_err());
    }
}
