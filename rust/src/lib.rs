//! Zone spawn core
//!
//! Brings non-persistent npcs and lairs in and out of a zone: spawn region
//! occupancy, the dormant/ready/active activity tiers, timed deletion and
//! despawn, and the database-driven object construction chains.

pub mod config;  // Centralized configuration constants
pub mod db;  // Async query seam + SQLite backend
pub mod error;
pub mod npc;
pub mod scheduler;
pub mod storage;
pub mod utility;
pub mod world;

pub use config::ZoneConfig;
pub use error::SpawnError;
pub use npc::{LairNpcManager, NpcManager, SpawnManager, SpawnStats};
pub use world::{SpatialIndex, Vec3, World, WorldObject};
