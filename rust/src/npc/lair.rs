use rand::Rng;
use serde::Serialize;

use super::entity::{AiState, Attributes, CreoGroup, Ham, Inventory, LoadState, PvpStatus};
use crate::db::schema::BoundRow;
use crate::db::DbError;
use crate::world::{Heading, Vec3};

/// One creature template a lair can put out
///
/// `spawn_rate` is a cumulative threshold in 0..=99: a roll r in 0..100
/// picks the first entry with r <= spawn_rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub template_id: u64,
    pub spawn_rate: u32,
}

/// Strings from the lair template row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LairAppearance {
    pub model: String,
    pub species: String,
    pub species_group: String,
    pub faction: String,
}

impl LairAppearance {
    pub fn from_row(row: &BoundRow) -> Result<Self, DbError> {
        Ok(Self {
            model: row.text("model")?,
            species: row.text("species")?,
            species_group: row.text("species_group")?,
            faction: row.text("faction")?,
        })
    }
}

/// A non-persistent spawn source owned by a spawn region
#[derive(Debug, Clone, Serialize)]
pub struct Lair {
    pub id: u64,
    /// Row in the `lairs` table this lair was built from
    pub lairs_id: u64,
    pub template_id: u64,
    pub region_id: u64,
    /// Region population this lair was placed for
    pub population: u32,
    pub position: Vec3,
    pub heading: Heading,
    pub appearance: LairAppearance,
    pub roster: Vec<RosterEntry>,
    pub ai_state: AiState,
    pub first_spawn: bool,
    /// Creatures currently out; back-references only
    pub spawned: Vec<u64>,
    pub load_state: LoadState,
    pub ham: Ham,
    pub pvp: PvpStatus,
    pub creo_group: CreoGroup,
    pub inventory: Inventory,
    pub attributes: Attributes,
}

impl Lair {
    pub fn new(id: u64, lairs_id: u64, template_id: u64, position: Vec3, first_spawn: bool) -> Self {
        Self {
            id,
            lairs_id,
            template_id,
            region_id: 0,
            population: 0,
            position,
            heading: Heading::default(),
            appearance: LairAppearance::default(),
            roster: Vec::new(),
            ai_state: AiState::Dormant,
            first_spawn,
            spawned: Vec::new(),
            load_state: LoadState::Loading,
            ham: Ham::default(),
            pvp: PvpStatus::ATTACKABLE,
            creo_group: CreoGroup::AttackableObject,
            inventory: Inventory::for_owner(id),
            attributes: Attributes::default(),
        }
    }

    /// Fill the roster from the creature group rows
    ///
    /// Thresholds step by 100 / n starting from -1; the last entry is
    /// forced to 99 so every roll lands somewhere.
    pub fn set_roster(&mut self, template_ids: &[u64]) {
        self.roster.clear();
        if template_ids.is_empty() {
            return;
        }
        let step = 100 / template_ids.len() as i32;
        let mut rate = -1i32;
        for &template_id in template_ids {
            rate += step;
            self.roster.push(RosterEntry {
                template_id,
                spawn_rate: rate.max(0) as u32,
            });
        }
        if let Some(last) = self.roster.last_mut() {
            last.spawn_rate = 99;
        }
    }

    /// Weighted pick of the next creature template
    pub fn pick_template<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<u64> {
        if self.roster.is_empty() {
            return None;
        }
        let roll = rng.random_range(0..100u32);
        self.roster
            .iter()
            .find(|entry| roll <= entry.spawn_rate)
            .or(self.roster.last())
            .map(|entry| entry.template_id)
    }

    pub fn add_spawn(&mut self, creature_id: u64) {
        if !self.spawned.contains(&creature_id) {
            self.spawned.push(creature_id);
        }
    }

    /// Forget a creature; true if it was tracked
    pub fn remove_spawn(&mut self, creature_id: u64) -> bool {
        let before = self.spawned.len();
        self.spawned.retain(|&id| id != creature_id);
        self.spawned.len() != before
    }

    /// Hand over every tracked creature id, leaving the lair empty
    pub fn take_spawned(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.spawned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn lair() -> Lair {
        Lair::new(10, 3, 7, Vec3::default(), true)
    }

    #[test]
    fn test_roster_thresholds() {
        let mut lair = lair();
        lair.set_roster(&[100, 200, 300]);
        let rates: Vec<u32> = lair.roster.iter().map(|e| e.spawn_rate).collect();
        assert_eq!(rates, vec![32, 65, 99]);

        lair.set_roster(&[5]);
        assert_eq!(lair.roster[0].spawn_rate, 99);

        lair.set_roster(&[]);
        assert!(lair.roster.is_empty());
    }

    #[test]
    fn test_pick_stays_in_roster() {
        let mut lair = lair();
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(lair.pick_template(&mut rng), None);

        lair.set_roster(&[100, 200, 300, 400, 500, 600, 700]);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            let id = lair.pick_template(&mut rng).unwrap();
            assert!(id % 100 == 0 && (100..=700).contains(&id));
            seen.insert(id);
        }
        assert_eq!(seen.len(), 7);
    }

    #[test]
    fn test_spawn_tracking() {
        let mut lair = lair();
        lair.add_spawn(1);
        lair.add_spawn(1);
        lair.add_spawn(2);
        assert_eq!(lair.spawned, vec![1, 2]);
        assert!(lair.remove_spawn(1));
        assert!(!lair.remove_spawn(1));
        assert_eq!(lair.take_spawned(), vec![2]);
        assert!(lair.spawned.is_empty());
    }
}
