use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::serde_utils::{duration_millis, duration_vec_millis};
use crate::model::RefreshReason;

/// Delay ladders for authoritative root re-fetches, one per refresh reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshLadders {
    /// Backend resume work fans out asynchronously, so this ladder is longer.
    #[serde(with = "duration_vec_millis")]
    pub resume_all: Vec<Duration>,
    #[serde(with = "duration_vec_millis")]
    pub emergency_stop: Vec<Duration>,
    #[serde(with = "duration_vec_millis")]
    pub marker_interrupted: Vec<Duration>,
    #[serde(with = "duration_vec_millis")]
    pub marker_resumed: Vec<Duration>,
}

fn millis(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_millis).collect()
}

impl Default for RefreshLadders {
    fn default() -> Self {
        Self {
            resume_all: millis(&[300, 1_000, 2_500, 5_000]),
            emergency_stop: millis(&[200, 800, 2_000]),
            marker_interrupted: millis(&[250, 1_000]),
            marker_resumed: millis(&[250, 1_000]),
        }
    }
}

impl RefreshLadders {
    pub fn for_reason(&self, reason: RefreshReason) -> &[Duration] {
        match reason {
            RefreshReason::ResumeAll => &self.resume_all,
            RefreshReason::EmergencyStop => &self.emergency_stop,
            RefreshReason::RunStateMarkerInterrupted => &self.marker_interrupted,
            RefreshReason::RunStateMarkerResumed => &self.marker_resumed,
        }
    }
}

/// Tunables for the sync engine. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Repeat refresh requests for the same reason inside this window are dropped.
    #[serde(with = "duration_millis")]
    pub refresh_debounce: Duration,
    pub refresh_ladders: RefreshLadders,
    /// Max transcript entries kept per dialog view.
    pub transcript_capacity: usize,
    /// Max toasts kept for status display.
    pub toast_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_debounce: Duration::from_millis(200),
            refresh_ladders: RefreshLadders::default(),
            transcript_capacity: 10_000,
            toast_capacity: 100,
        }
    }
}

impl SyncConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SyncConfig::default();
        assert_eq!(config.refresh_debounce, Duration::from_millis(200));
        assert_eq!(config.transcript_capacity, 10_000);
        assert_eq!(config.toast_capacity, 100);
    }

    #[test]
    fn resume_all_ladder_is_longest() {
        let ladders = RefreshLadders::default();
        let span = |r| ladders.for_reason(r).last().copied().unwrap_or_default();
        assert!(span(RefreshReason::ResumeAll) > span(RefreshReason::EmergencyStop));
        assert!(span(RefreshReason::ResumeAll) > span(RefreshReason::RunStateMarkerResumed));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"refreshDebounce":50,"refreshLadders":{"resumeAll":[10]}}"#)
                .unwrap();
        assert_eq!(config.refresh_debounce, Duration::from_millis(50));
        assert_eq!(config.refresh_ladders.resume_all, vec![Duration::from_millis(10)]);
        assert_eq!(
            config.refresh_ladders.emergency_stop,
            RefreshLadders::default().emergency_stop
        );
        assert_eq!(config.toast_capacity, 100);
    }
}
