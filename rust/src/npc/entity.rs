use std::collections::HashMap;

use bitflags::bitflags;
use serde::Serialize;

use crate::config::npc as npc_config;
use crate::db::schema::BoundRow;
use crate::db::DbError;
use crate::world::{Heading, Vec3};

/// Family id stored with every creature/npc template row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NpcFamily {
    Trainer = 1,
    Filler = 2,
    QuestGiver = 3,
    AttackableObject = 4,     // debris and other static targets
    AttackableCreatures = 5,  // lair creatures
    NaturalLairs = 6,         // built through the lair path only
}

impl NpcFamily {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(NpcFamily::Trainer),
            2 => Some(NpcFamily::Filler),
            3 => Some(NpcFamily::QuestGiver),
            4 => Some(NpcFamily::AttackableObject),
            5 => Some(NpcFamily::AttackableCreatures),
            6 => Some(NpcFamily::NaturalLairs),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NpcFamily::Trainer => "trainer",
            NpcFamily::Filler => "filler",
            NpcFamily::QuestGiver => "quest giver",
            NpcFamily::AttackableObject => "attackable object",
            NpcFamily::AttackableCreatures => "attackable creature",
            NpcFamily::NaturalLairs => "natural lair",
        }
    }
}

/// Concrete npc variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NpcKind {
    Trainer,
    Filler,
    QuestGiver,
    AttackableStatic,
    /// Controlled by a lair; the id is a back-reference only
    AttackableCreature { lair_id: u64 },
}

impl NpcKind {
    pub fn lair_id(&self) -> Option<u64> {
        match self {
            NpcKind::AttackableCreature { lair_id } => Some(*lair_id),
            _ => None,
        }
    }
}

/// How far the construction chain has come
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadState {
    /// Registered, template rows still being applied
    Loading,
    /// Template applied, waiting for attributes
    Attributes,
    Loaded,
}

/// Scheduling tier the npc manager currently keeps the object in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AiState {
    Dormant,
    Ready,
    Active,
    Dead,
}

bitflags! {
    /// PvP status bits sent to clients
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct PvpStatus: u32 {
        const ATTACKABLE = 1 << 0;
        const AGGRESSIVE = 1 << 1;
        const OVERT      = 1 << 2;
        const ENEMY      = 1 << 5;
    }
}

/// Controls which health bar layout clients show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CreoGroup {
    Npc,
    Creature,
    /// Single H(am) bar
    AttackableObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HamBar {
    pub current: i32,
    pub max: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ham {
    pub health: HamBar,
    pub action: HamBar,
    pub mind: HamBar,
}

impl Ham {
    pub fn uniform(points: i32) -> Self {
        let bar = HamBar {
            current: points,
            max: points,
        };
        Self {
            health: bar,
            action: bar,
            mind: bar,
        }
    }
}

impl Default for Ham {
    fn default() -> Self {
        Self::uniform(npc_config::DEFAULT_HAM)
    }
}

/// Creature inventory; always lives at owner id + 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inventory {
    pub id: u64,
    pub parent_id: u64,
    pub capacity: u32,
    pub credits: u32,
}

impl Inventory {
    pub fn for_owner(owner_id: u64) -> Self {
        Self {
            id: owner_id + 1,
            parent_id: owner_id,
            capacity: npc_config::INVENTORY_CAPACITY,
            credits: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WeaponGroup {
    Unarmed,
    Pistol,
    TwoHanded,
}

impl WeaponGroup {
    /// Value of the internal `weapon_group` attribute
    pub fn attribute(self) -> &'static str {
        match self {
            WeaponGroup::Unarmed => "1",
            WeaponGroup::TwoHanded => "4",
            WeaponGroup::Pistol => "32",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Weapon {
    pub id: u64,
    pub parent_id: u64,
    pub model: &'static str,
    pub group: WeaponGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum WeaponSlot {
    #[default]
    Default,
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Equipment {
    pub default_weapon: Option<Weapon>,
    pub primary: Option<Weapon>,
    pub secondary: Option<Weapon>,
    pub equipped: WeaponSlot,
}

impl Equipment {
    /// Ids of every weapon object (each drawn from the id pool)
    pub fn weapon_ids(&self) -> Vec<u64> {
        [&self.default_weapon, &self.primary, &self.secondary]
            .into_iter()
            .flatten()
            .map(|weapon| weapon.id)
            .collect()
    }

    pub fn equipped_weapon(&self) -> Option<&Weapon> {
        match self.equipped {
            WeaponSlot::Default => self.default_weapon.as_ref(),
            WeaponSlot::Primary => self.primary.as_ref(),
            WeaponSlot::Secondary => self.secondary.as_ref(),
        }
    }
}

/// Attribute rows, split by visibility
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attributes {
    /// Client-visible attributes in query order
    pub visible: Vec<(String, String)>,
    pub internal: HashMap<String, String>,
}

impl Attributes {
    pub fn insert(&mut self, name: String, value: String, internal: bool) {
        if internal {
            self.internal.insert(name, value);
        } else {
            self.visible.push((name, value));
        }
    }

    pub fn len(&self) -> usize {
        self.visible.len() + self.internal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Template columns shared by creature and npc rows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NpcTemplate {
    pub species_id: u64,
    pub loot_group_id: u64,
    pub posture: u8,
    pub state: u64,
    pub level: u16,
    pub model: String,
    pub species: String,
    pub species_group: String,
    pub faction: String,
    pub mood_id: u8,
    pub scale: f32,
}

impl NpcTemplate {
    pub fn from_row(row: &BoundRow) -> Result<Self, DbError> {
        Ok(Self {
            species_id: row.u64("species_id")?,
            loot_group_id: row.u64("loot_group_id")?,
            posture: row.u8("posture")?,
            state: row.u64("state")?,
            level: row.u16("level")?,
            model: row.text("model")?,
            species: row.text("species")?,
            species_group: row.text("species_group")?,
            faction: row.text("faction")?,
            mood_id: row.u8("mood_id")?,
            scale: row.f32("scale")?,
        })
    }
}

/// Where (and how often) an npc comes back
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SpawnPlacement {
    pub cell_id: u64,
    pub position: Vec3,
    pub heading: Heading,
    pub respawn_delay_ms: u64,
    /// First spawn appears in place without movement or animation
    pub first_spawn: bool,
}

/// A non-persistent npc
#[derive(Debug, Clone, Serialize)]
pub struct Npc {
    pub id: u64,
    pub kind: NpcKind,
    /// Template row the npc was built from; reused on respawn
    pub template_id: u64,
    pub template: NpcTemplate,
    pub load_state: LoadState,
    pub ai_state: AiState,
    pub position: Vec3,
    pub heading: Heading,
    pub placement: SpawnPlacement,
    pub inventory: Inventory,
    pub equipment: Equipment,
    pub ham: Ham,
    pub pvp: PvpStatus,
    pub creo_group: CreoGroup,
    pub type_options: u32,
    pub attributes: Attributes,
}

impl Npc {
    pub fn new(id: u64, kind: NpcKind, template_id: u64) -> Self {
        Self {
            id,
            kind,
            template_id,
            template: NpcTemplate::default(),
            load_state: LoadState::Loading,
            ai_state: AiState::Dormant,
            position: Vec3::default(),
            heading: Heading::default(),
            placement: SpawnPlacement::default(),
            inventory: Inventory::for_owner(id),
            equipment: Equipment::default(),
            ham: Ham::default(),
            pvp: PvpStatus::empty(),
            creo_group: CreoGroup::Npc,
            type_options: 0,
            attributes: Attributes::default(),
        }
    }

    pub fn lair_id(&self) -> Option<u64> {
        self.kind.lair_id()
    }

    pub fn is_dead(&self) -> bool {
        self.ai_state == AiState::Dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_ids_round_trip_known_values_only() {
        assert_eq!(NpcFamily::from_u32(5), Some(NpcFamily::AttackableCreatures));
        assert_eq!(NpcFamily::from_u32(0), None);
        assert_eq!(NpcFamily::from_u32(99), None);
    }

    #[test]
    fn test_new_npc_defaults() {
        let npc = Npc::new(100, NpcKind::AttackableCreature { lair_id: 40 }, 9);
        assert_eq!(npc.inventory.id, 101);
        assert_eq!(npc.inventory.capacity, 50);
        assert_eq!(npc.ham.health.current, 500);
        assert_eq!(npc.lair_id(), Some(40));
        assert_eq!(npc.load_state, LoadState::Loading);
        assert!(npc.equipment.weapon_ids().is_empty());
    }

    #[test]
    fn test_attribute_visibility_split() {
        let mut attributes = Attributes::default();
        attributes.insert("creature_name".into(), "womp rat".into(), false);
        attributes.insert("aggro".into(), "1".into(), true);
        assert_eq!(attributes.visible.len(), 1);
        assert_eq!(attributes.internal.get("aggro").map(String::as_str), Some("1"));
        assert_eq!(attributes.len(), 2);
    }
}
