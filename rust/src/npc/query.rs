/// Continuations for in-flight database queries
///
/// Every submitted query is paired with one of these values, keyed by its
/// job id. When the result comes back the value says which step of which
/// chain to resume, and carries everything that step needs.

use super::entity::SpawnPlacement;
use crate::world::Vec3;

/// Who gets told when an object chain completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyTarget {
    /// Respawns requested by the spawn manager itself
    SpawnManager,
    NpcManager,
}

/// Spawn data carried through the direct npc path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnParams {
    pub template_id: u64,
    pub placement: SpawnPlacement,
    /// Controlling lair; 0 for free-standing npcs
    pub lair_id: u64,
}

/// Steps of the npc construction chains
///
/// Lair path: `LairTemplate -> LairCreatureTemplates -> Attributes`.
/// Npc path: `CreatureTemplate | NpcTemplate -> Attributes`.
#[derive(Debug, Clone, PartialEq)]
pub enum NpcQueryStep {
    LairTemplate {
        lairs_id: u64,
        region_id: u64,
        /// Region population the lair was placed for
        population: u32,
        position: Vec3,
        first_spawn: bool,
    },
    LairCreatureTemplates {
        lairs_id: u64,
    },
    CreatureTemplate(SpawnParams),
    NpcTemplate(SpawnParams),
    Attributes,
}

impl NpcQueryStep {
    pub fn name(&self) -> &'static str {
        match self {
            NpcQueryStep::LairTemplate { .. } => "lair template",
            NpcQueryStep::LairCreatureTemplates { .. } => "lair creature templates",
            NpcQueryStep::CreatureTemplate(_) => "creature template",
            NpcQueryStep::NpcTemplate(_) => "npc template",
            NpcQueryStep::Attributes => "attributes",
        }
    }

    /// Steps that register the object in the world when they succeed
    pub fn registers_object(&self) -> bool {
        matches!(
            self,
            NpcQueryStep::LairTemplate { .. } | NpcQueryStep::CreatureTemplate(_) | NpcQueryStep::NpcTemplate(_)
        )
    }
}

/// One pending step of an object chain
#[derive(Debug, Clone, PartialEq)]
pub struct NpcQuery {
    /// Id reserved for the object under construction
    pub object_id: u64,
    pub step: NpcQueryStep,
    pub notify: ReadyTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AsyncQueryContext {
    /// Spawn definitions of the zone
    Spawns,
    /// Lair roster of one definition
    SpawnGroup { definition_id: u32 },
    Npc(NpcQuery),
}

// ============================================================================
// SQL
// ============================================================================
//
// Column order is bound positionally by `db::schema`; keep the SELECT lists
// and the row schemas in step.

pub const SPAWNS_SQL: &str = "SELECT s.id, s.spawn_x, s.spawn_z, s.spawn_width, s.spawn_length, s.spawn_density \
     FROM spawns s WHERE s.spawn_planet = ?1";

pub const SPAWN_GROUP_SQL: &str = "SELECT sg.id, l.id, l.lair_template, l.creature_group \
     FROM spawn_groups sg \
     INNER JOIN lairs l ON (l.creature_spawn_region = sg.id) \
     WHERE sg.spawn_id = ?1 ORDER BY l.id";

pub const LAIR_TEMPLATE_SQL: &str = "SELECT lairs.creature_spawn_region, lairs.lair_template, lairs.creature_group, \
     lairs.family, lair_templates.lair_object_string, lair_templates.stf_name, lair_templates.stf_file, \
     faction.name \
     FROM lairs \
     INNER JOIN spawn_groups ON (lairs.creature_spawn_region = spawn_groups.id) \
     INNER JOIN spawns ON (spawn_groups.spawn_id = spawns.id AND spawns.spawn_planet = ?1) \
     INNER JOIN lair_templates ON (lairs.lair_template = lair_templates.id) \
     INNER JOIN faction ON (lairs.faction = faction.id) \
     WHERE lairs.id = ?2";

pub const CREATURE_GROUP_SQL: &str = "SELECT creature_groups.creature_id FROM creature_groups \
     WHERE creature_groups.creature_group_id = ?1";

pub const LAIR_ATTRIBUTES_SQL: &str = "SELECT attributes.name, lair_attributes.value, attributes.internal \
     FROM lair_attributes \
     INNER JOIN attributes ON (lair_attributes.attribute_id = attributes.id) \
     WHERE lair_attributes.lair_id = ?1 ORDER BY lair_attributes.\"order\"";

pub const CREATURE_TEMPLATE_SQL: &str = "SELECT c.creature_species_id, c.loot_group_id, \
     c.creature_posture, c.creature_state, c.creature_level, \
     c.creature_type, c.stf_variable_id, c.stf_file_id, \
     f.name, c.creature_moodID, c.creature_scale, c.creature_family \
     FROM creatures c \
     INNER JOIN faction f ON (c.creature_faction = f.id) \
     WHERE c.id = ?1";

pub const CREATURE_ATTRIBUTES_SQL: &str = "SELECT attributes.name, c.value, attributes.internal \
     FROM creature_attributes c \
     INNER JOIN attributes ON (c.attribute_id = attributes.id) \
     WHERE c.creature_id = ?1 ORDER BY c.\"order\"";

pub const NPC_TEMPLATE_SQL: &str = "SELECT n.species_id, n.loot_group_id, \
     n.posture, n.state, n.level, \
     n.type, n.stf_variable_id, n.stf_file_id, \
     f.name, n.moodID, n.scale, n.family \
     FROM non_persistent_npcs n \
     INNER JOIN faction f ON (n.faction = f.id) \
     WHERE n.id = ?1";

pub const NPC_ATTRIBUTES_SQL: &str = "SELECT attributes.name, a.value, attributes.internal \
     FROM non_persistent_npc_attributes a \
     INNER JOIN attributes ON (a.attribute_id = attributes.id) \
     WHERE a.npc_id = ?1 ORDER BY a.\"order\"";
