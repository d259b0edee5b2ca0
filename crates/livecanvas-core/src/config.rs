//! Session configuration.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default minimum time between two outbound presence updates.
pub const DEFAULT_PRESENCE_THROTTLE_MS: u64 = 16;
/// Default lower zoom bound.
pub const DEFAULT_MIN_SCALE: f64 = 0.01;
/// Default upper zoom bound.
pub const DEFAULT_MAX_SCALE: f64 = 20.0;
/// How long a reaction stays on screen.
pub const DEFAULT_REACTION_TTL_MS: u64 = 4000;
/// How often expired reactions are purged.
pub const DEFAULT_REACTION_SWEEP_MS: u64 = 1000;
/// How often a held reaction is re-emitted.
pub const DEFAULT_REACTION_INTERVAL_MS: u64 = 100;

/// What to do with a shape whose drawn size is zero on pointer release.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ZeroSizePolicy {
    /// Drop the transient shape without committing anything.
    #[default]
    Discard,
    /// Commit the shape grown to at least `size` on each axis.
    Minimum { size: f64 },
}

/// What a disconnected transport does with local mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflinePolicy {
    /// Apply locally and replay on reconnect.
    #[default]
    Queue,
    /// Reject with a warning.
    Drop,
}

/// Per-client session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Room to join.
    pub room_id: String,
    pub presence_throttle_ms: u64,
    pub min_scale: f64,
    pub max_scale: f64,
    pub reaction_ttl_ms: u64,
    pub reaction_sweep_ms: u64,
    pub reaction_interval_ms: u64,
    pub zero_size: ZeroSizePolicy,
    pub offline: OfflinePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            room_id: "lobby".to_string(),
            presence_throttle_ms: DEFAULT_PRESENCE_THROTTLE_MS,
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
            reaction_ttl_ms: DEFAULT_REACTION_TTL_MS,
            reaction_sweep_ms: DEFAULT_REACTION_SWEEP_MS,
            reaction_interval_ms: DEFAULT_REACTION_INTERVAL_MS,
            zero_size: ZeroSizePolicy::default(),
            offline: OfflinePolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Config for the given room with every other setting at its default.
    pub fn for_room(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Reject settings the rest of the core can't work with.
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.min_scale > 0.0 && self.min_scale <= self.max_scale) {
            return Err(CoreError::Config(format!(
                "scale range [{}, {}] is empty or non-positive",
                self.min_scale, self.max_scale
            )));
        }
        if let ZeroSizePolicy::Minimum { size } = self.zero_size {
            if !(size.is_finite() && size > 0.0) {
                return Err(CoreError::Config(format!("minimum shape size {size} must be positive")));
            }
        }
        if self.reaction_interval_ms == 0 || self.reaction_sweep_ms == 0 {
            return Err(CoreError::Config("reaction intervals must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn presence_throttle(&self) -> Duration {
        Duration::from_millis(self.presence_throttle_ms)
    }

    pub fn reaction_ttl(&self) -> Duration {
        Duration::from_millis(self.reaction_ttl_ms)
    }

    pub fn reaction_sweep(&self) -> Duration {
        Duration::from_millis(self.reaction_sweep_ms)
    }

    pub fn reaction_interval(&self) -> Duration {
        Duration::from_millis(self.reaction_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.presence_throttle_ms, 16);
        assert!((config.min_scale - 0.01).abs() < f64::EPSILON);
        assert!((config.max_scale - 20.0).abs() < f64::EPSILON);
        assert_eq!(config.reaction_ttl(), Duration::from_millis(4000));
        assert_eq!(config.zero_size, ZeroSizePolicy::Discard);
        assert_eq!(config.offline, OfflinePolicy::Queue);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SessionConfig::from_json(
            r#"{"room_id": "design-review", "zero_size": {"mode": "minimum", "size": 4.0}}"#,
        )
        .unwrap();
        assert_eq!(config.room_id, "design-review");
        assert_eq!(config.zero_size, ZeroSizePolicy::Minimum { size: 4.0 });
        assert_eq!(config.presence_throttle_ms, DEFAULT_PRESENCE_THROTTLE_MS);
    }

    #[test]
    fn test_invalid_scale_range_rejected() {
        let result = SessionConfig::from_json(r#"{"min_scale": 5.0, "max_scale": 1.0}"#);
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"room_id": "from-disk", "offline": "drop"}}"#).unwrap();

        let config = SessionConfig::load(file.path()).unwrap();
        assert_eq!(config.room_id, "from-disk");
        assert_eq!(config.offline, OfflinePolicy::Drop);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = SessionConfig::load(dir.path().join("missing.json"));
        assert!(matches!(result, Err(CoreError::Config(_))));
    }
}
