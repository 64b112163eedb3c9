pub mod entity;  // Npc data, families, equipment
pub mod lair;
pub mod spawn_data;  // Spawn definitions as loaded from the db
pub mod spawn_region;  // Region occupancy state machine + placement
pub mod queues;
pub mod query;  // Async continuations and SQL
pub mod factory;  // Query rows -> lairs and npcs
pub mod npc_manager;
pub mod spawn_manager;

#[cfg(test)]
pub(crate) mod testing;

pub use entity::{AiState, Npc, NpcFamily, NpcKind, PvpStatus};
pub use factory::NpcFactory;
pub use lair::Lair;
pub use npc_manager::{LairNpcManager, NpcManager};
pub use query::ReadyTarget;
pub use spawn_data::{LairTypeEntry, SpawnDefinition};
pub use spawn_manager::{SpawnManager, SpawnStats, Tier};
pub use spawn_region::{SpawnRegion, SpawnStatus};
