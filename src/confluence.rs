//! Confluence classification
//!
//! Maps the number of agreeing rule contributions to a [`ConfluenceLevel`].

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::ConfluenceLevel;

/// Confluence thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfluenceThresholds {
    /// At or above this count a group is LOW
    pub low: usize,
    /// At or above this count a group is MED
    pub medium: usize,
    /// At or above this count a group is HIGH
    pub high: usize,
    /// Group size needed to promote a signal
    pub minimum_active: usize,
}

impl Default for ConfluenceThresholds {
    fn default() -> Self {
        Self {
            low: 3,
            medium: 4,
            high: 5,
            minimum_active: 4,
        }
    }
}

impl ConfluenceThresholds {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.low == 0 || self.medium == 0 || self.high == 0 || self.minimum_active == 0 {
            return Err(EngineError::InvalidThresholds(format!(
                "all thresholds must be positive (low={} medium={} high={} minimum_active={})",
                self.low, self.medium, self.high, self.minimum_active
            )));
        }
        if !(self.low <= self.medium && self.medium <= self.high) {
            return Err(EngineError::InvalidThresholds(format!(
                "expected low <= medium <= high, got {} / {} / {}",
                self.low, self.medium, self.high
            )));
        }
        Ok(())
    }
}

pub fn classify(count: usize, thresholds: &ConfluenceThresholds) -> ConfluenceLevel {
    if count >= thresholds.high {
        ConfluenceLevel::High
    } else if count >= thresholds.medium {
        ConfluenceLevel::Medium
    } else if count >= thresholds.low {
        ConfluenceLevel::Low
    } else {
        ConfluenceLevel::Min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_defaults() {
        let t = ConfluenceThresholds::default();
        assert_eq!(classify(1, &t), ConfluenceLevel::Min);
        assert_eq!(classify(3, &t), ConfluenceLevel::Low);
        assert_eq!(classify(4, &t), ConfluenceLevel::Medium);
        assert_eq!(classify(5, &t), ConfluenceLevel::High);
        assert_eq!(classify(12, &t), ConfluenceLevel::High);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let t = ConfluenceThresholds {
            low: 0,
            ..Default::default()
        };
        assert!(matches!(t.validate(), Err(EngineError::InvalidThresholds(_))));

        let t = ConfluenceThresholds {
            minimum_active: 0,
            ..Default::default()
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unordered() {
        let t = ConfluenceThresholds {
            low: 5,
            medium: 4,
            high: 3,
            minimum_active: 4,
        };
        assert!(t.validate().is_err());
        assert!(ConfluenceThresholds::default().validate().is_ok());
    }
}
