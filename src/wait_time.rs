//! Queue wait estimation from historical time-to-match samples
//!
//! Every commit records how long each consumed entry sat in the queue. The
//! estimate reported by `QueueStatus` is `mean + std_dev` over the recent
//! sample window, clamped to configured bounds, with a configured default
//! while samples are sparse.

use crate::error::{MatchmakingError, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Configuration for wait estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitTimeConfig {
    /// Lower clamp on reported estimates
    pub min_wait_seconds: u64,
    /// Upper clamp on reported estimates
    pub max_wait_seconds: u64,
    /// Estimate reported while fewer than `min_samples` are recorded
    pub default_wait_seconds: u64,
    /// Samples needed before the dynamic estimate is trusted
    pub min_samples: usize,
    /// Size of the rolling sample window
    pub max_samples: usize,
}

impl Default for WaitTimeConfig {
    fn default() -> Self {
        Self {
            min_wait_seconds: 10,
            max_wait_seconds: 600,
            default_wait_seconds: 90,
            min_samples: 5,
            max_samples: 500,
        }
    }
}

impl WaitTimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_wait_seconds >= self.max_wait_seconds {
            return Err(MatchmakingError::ConfigurationError {
                message: "min_wait_seconds must be less than max_wait_seconds".to_string(),
            }
            .into());
        }
        if self.default_wait_seconds < self.min_wait_seconds
            || self.default_wait_seconds > self.max_wait_seconds
        {
            return Err(MatchmakingError::ConfigurationError {
                message: "default_wait_seconds must be within min/max bounds".to_string(),
            }
            .into());
        }
        if self.min_samples == 0 || self.max_samples < self.min_samples {
            return Err(MatchmakingError::ConfigurationError {
                message: "sample window bounds are inconsistent".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Rolling tracker of time-to-match samples
pub struct WaitTimeTracker {
    config: WaitTimeConfig,
    samples: Arc<Mutex<VecDeque<Duration>>>,
}

impl WaitTimeTracker {
    pub fn new(config: WaitTimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            samples: Arc::new(Mutex::new(VecDeque::new())),
        })
    }

    /// Record how long one consumed entry waited before matching
    pub fn record_time_to_match(&self, waited: Duration) {
        if let Ok(mut samples) = self.samples.lock() {
            if samples.len() == self.config.max_samples {
                samples.pop_front();
            }
            samples.push_back(waited);
        }
    }

    /// Current wait estimate in seconds
    pub fn estimate_seconds(&self) -> u64 {
        let samples = match self.samples.lock() {
            Ok(samples) => samples,
            Err(_) => return self.config.default_wait_seconds,
        };

        if samples.len() < self.config.min_samples {
            return self.config.default_wait_seconds;
        }

        let mean = samples.iter().map(|d| d.as_secs_f64()).sum::<f64>() / samples.len() as f64;
        let variance = samples
            .iter()
            .map(|d| {
                let diff = d.as_secs_f64() - mean;
                diff * diff
            })
            .sum::<f64>()
            / samples.len() as f64;

        let estimate = mean + variance.sqrt();
        (estimate as u64)
            .max(self.config.min_wait_seconds)
            .min(self.config.max_wait_seconds)
    }

    /// Number of recorded samples
    pub fn sample_count(&self) -> usize {
        self.samples.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_until_enough_samples() {
        let tracker = WaitTimeTracker::new(WaitTimeConfig::default()).unwrap();
        assert_eq!(tracker.estimate_seconds(), 90);

        tracker.record_time_to_match(Duration::from_secs(40));
        assert_eq!(tracker.estimate_seconds(), 90);
    }

    #[test]
    fn test_estimate_tracks_samples() {
        let tracker = WaitTimeTracker::new(WaitTimeConfig::default()).unwrap();
        for _ in 0..10 {
            tracker.record_time_to_match(Duration::from_secs(60));
        }

        // Identical samples: std_dev is zero, estimate equals the mean.
        assert_eq!(tracker.estimate_seconds(), 60);
    }

    #[test]
    fn test_estimate_is_clamped() {
        let tracker = WaitTimeTracker::new(WaitTimeConfig::default()).unwrap();
        for _ in 0..10 {
            tracker.record_time_to_match(Duration::from_secs(10_000));
        }
        assert_eq!(tracker.estimate_seconds(), 600);

        let tracker = WaitTimeTracker::new(WaitTimeConfig::default()).unwrap();
        for _ in 0..10 {
            tracker.record_time_to_match(Duration::from_secs(1));
        }
        assert_eq!(tracker.estimate_seconds(), 10);
    }

    #[test]
    fn test_window_rolls_over() {
        let config = WaitTimeConfig {
            max_samples: 5,
            ..WaitTimeConfig::default()
        };
        let tracker = WaitTimeTracker::new(config).unwrap();

        for _ in 0..5 {
            tracker.record_time_to_match(Duration::from_secs(300));
        }
        for _ in 0..5 {
            tracker.record_time_to_match(Duration::from_secs(30));
        }

        assert_eq!(tracker.sample_count(), 5);
        assert_eq!(tracker.estimate_seconds(), 30);
    }

    #[test]
    fn test_invalid_config() {
        let config = WaitTimeConfig {
            min_wait_seconds: 100,
            max_wait_seconds: 50,
            ..WaitTimeConfig::default()
        };
        assert!(WaitTimeTracker::new(config).is_err());
    }
}
