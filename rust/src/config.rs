/// Centralized configuration for the zone spawn core
///
/// The constant modules are the single source of truth for the reference
/// cadences and tuning knobs. `ZoneConfig` lets a deployment override them
/// from a JSON file; every field falls back to the constant below.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Scheduler cadences (milliseconds)
pub mod timing {
    /// Dormant NPC queue polling interval
    pub const DORMANT_INTERVAL_MS: u64 = 2500;
    /// Ready NPC queue polling interval
    pub const READY_INTERVAL_MS: u64 = 1000;
    /// Active NPC queue polling interval
    pub const ACTIVE_INTERVAL_MS: u64 = 250;
    /// Corpse deletion / region despawn timers
    pub const GENERAL_TIMERS_INTERVAL_MS: u64 = 2000;
    /// Spawn region player polling
    pub const REGION_UPDATE_INTERVAL_MS: u64 = 4500;
    /// Occupied region revisit (spawn_area) interval
    pub const REGION_HANDLING_INTERVAL_MS: u64 = 5000;
    /// Simulation frame length used by the hosting server
    pub const FRAME_MS: u64 = 50;
}

/// Spawn region tuning
pub mod region {
    /// Empty region waits this long before despawning its lairs
    pub const DESPAWN_DELAY_MS: u64 = 10_000;
    /// Region density is clamped to at least this value
    pub const MIN_DENSITY: u32 = 50;
    /// Minimum distance between two lairs of the same region
    pub const MIN_LAIR_SPACING: f32 = 10.0;
    /// Rejection sampling attempts for one lair placement
    pub const MAX_PLACEMENT_ATTEMPTS: u32 = 500;
}

/// Ephemeral identifier pool
pub mod ids {
    /// First id handed out for non-persistent objects
    pub const NP_ID_BASE: u64 = 422_212_465_065_984;
    /// Size of the non-persistent id window
    pub const NP_ID_RANGE: u64 = 1_000_000;
    /// Attempts for a single free id before reporting exhaustion
    pub const SINGLE_ID_ATTEMPTS: u32 = 10_000;
    /// Attempts for a free (id, id + 1) pair before reporting exhaustion
    pub const PAIR_ATTEMPTS: u32 = 1_000;
}

/// NPC defaults applied by the factory and the default npc manager
pub mod npc {
    /// Default health/action/mind hit points
    pub const DEFAULT_HAM: i32 = 500;
    /// Creature inventory capacity
    pub const INVENTORY_CAPACITY: u32 = 50;
    /// Creatures a lair keeps alive
    pub const LAIR_CREATURE_COUNT: usize = 3;
    /// Lair re-check interval once its roster is out
    pub const LAIR_CHECK_MS: u64 = 10_000;
    /// Players closer than this keep a creature in the active tier
    pub const ACTIVE_RANGE: f32 = 64.0;
    /// Players closer than this keep a creature in the ready tier
    pub const READY_RANGE: f32 = 128.0;
    /// Corpses linger this long before deletion
    pub const CORPSE_DELAY_MS: u64 = 30_000;
    /// Default respawn delay for lair creatures
    pub const RESPAWN_DELAY_MS: u64 = 60_000;
}

/// Configuration load error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-zone configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub zone_id: u32,
    /// Tutorial zones run aggressive, armed creatures
    pub tutorial: bool,
    /// SQLite file; `None` opens an in-memory database
    pub database_path: Option<PathBuf>,

    pub dormant_interval_ms: u64,
    pub ready_interval_ms: u64,
    pub active_interval_ms: u64,
    pub general_timers_interval_ms: u64,
    pub region_update_interval_ms: u64,
    pub region_handling_interval_ms: u64,
    pub frame_ms: u64,

    pub despawn_delay_ms: u64,
    pub min_density: u32,
    pub min_lair_spacing: f32,
    pub max_placement_attempts: u32,

    pub np_id_base: u64,
    pub np_id_range: u64,

    /// Edge length of the square world the spatial index covers
    pub world_size: f32,
    /// HTTP bind address of the hosting server
    pub bind_addr: String,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            zone_id: 0,
            tutorial: false,
            database_path: None,
            dormant_interval_ms: timing::DORMANT_INTERVAL_MS,
            ready_interval_ms: timing::READY_INTERVAL_MS,
            active_interval_ms: timing::ACTIVE_INTERVAL_MS,
            general_timers_interval_ms: timing::GENERAL_TIMERS_INTERVAL_MS,
            region_update_interval_ms: timing::REGION_UPDATE_INTERVAL_MS,
            region_handling_interval_ms: timing::REGION_HANDLING_INTERVAL_MS,
            frame_ms: timing::FRAME_MS,
            despawn_delay_ms: region::DESPAWN_DELAY_MS,
            min_density: region::MIN_DENSITY,
            min_lair_spacing: region::MIN_LAIR_SPACING,
            max_placement_attempts: region::MAX_PLACEMENT_ATTEMPTS,
            np_id_base: ids::NP_ID_BASE,
            np_id_range: ids::NP_ID_RANGE,
            world_size: 16_384.0,
            bind_addr: "127.0.0.1:8088".to_string(),
        }
    }
}

impl ZoneConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ZoneConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let cadences = [
            ("dormant_interval_ms", self.dormant_interval_ms),
            ("ready_interval_ms", self.ready_interval_ms),
            ("active_interval_ms", self.active_interval_ms),
            ("general_timers_interval_ms", self.general_timers_interval_ms),
            ("region_update_interval_ms", self.region_update_interval_ms),
            ("region_handling_interval_ms", self.region_handling_interval_ms),
            ("frame_ms", self.frame_ms),
        ];
        if let Some((name, _)) = cadences.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
        }
        if self.min_density == 0 {
            return Err(ConfigError::Invalid("min_density must be non-zero".into()));
        }
        // Pairs need id and id + 1 inside the window.
        if self.np_id_range < 2 {
            return Err(ConfigError::Invalid("np_id_range must be at least 2".into()));
        }
        if self.world_size <= 0.0 {
            return Err(ConfigError::Invalid("world_size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_cadence() {
        let config = ZoneConfig::default();
        assert_eq!(config.dormant_interval_ms, 2500);
        assert_eq!(config.ready_interval_ms, 1000);
        assert_eq!(config.active_interval_ms, 250);
        assert_eq!(config.general_timers_interval_ms, 2000);
        assert_eq!(config.despawn_delay_ms, 10_000);
        assert_eq!(config.min_density, 50);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ZoneConfig::from_json_str(r#"{ "zone_id": 8, "tutorial": true }"#).unwrap();
        assert_eq!(config.zone_id, 8);
        assert!(config.tutorial);
        assert_eq!(config.ready_interval_ms, timing::READY_INTERVAL_MS);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_zero_cadence_rejected() {
        let err = ZoneConfig::from_json_str(r#"{ "active_interval_ms": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            ZoneConfig::from_json_str("{ zone_id: }"),
            Err(ConfigError::Parse(_))
        ));
    }
}
