/// NPC tier decisions
///
/// The spawn manager owns the queues and timers but never decides what a
/// lair or npc should do. Each time an entry comes due it asks the
/// `NpcManager`, which may move the object between tiers, request more
/// objects, or answer with the delay until its next check.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::entity::{AiState, NpcKind, SpawnPlacement};
use super::query::{ReadyTarget, SpawnParams};
use super::spawn_manager::{SpawnManager, Tier};
use super::spawn_region::SpawnStatus;
use crate::config::npc as npc_config;
use crate::world::{SpatialIndex, Vec3, WorldObject};

/// Creatures are scattered this far around their lair
const LAIR_SPREAD: f32 = 8.0;

pub trait NpcManager {
    /// One tier check for a lair or npc
    ///
    /// `overdue_ms` is how late the check runs. Returns the delay until the
    /// next check in the same tier, or 0 to drop the entry from that tier.
    fn handle_npc(&mut self, manager: &mut SpawnManager, id: u64, overdue_ms: u64) -> u64;

    /// Timed deletion fired; the manager destroys the object afterwards
    fn handle_expired(&mut self, manager: &mut SpawnManager, id: u64);

    /// A region wants a lair of type `lairs_id` at `point`
    fn spawn_lair(&mut self, manager: &mut SpawnManager, lairs_id: u64, region_id: u64, point: Vec3);

    /// An object requested on behalf of this manager finished loading
    fn handle_object_ready(&mut self, manager: &mut SpawnManager, id: u64);
}

/// Default manager: lairs keep a roster of creatures alive, creatures
/// follow the nearest player into the matching tier.
pub struct LairNpcManager {
    rng: StdRng,
    /// Creature ids requested per lair whose chains are still running
    pending: HashMap<u64, Vec<u64>>,
}

impl LairNpcManager {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            pending: HashMap::new(),
        }
    }

    /// Creatures requested for `lair_id` that have not reported ready yet
    pub fn pending_for(&self, lair_id: u64) -> usize {
        self.pending.get(&lair_id).map_or(0, Vec::len)
    }

    fn handle_lair(&mut self, manager: &mut SpawnManager, lair_id: u64) -> u64 {
        let Some(lair) = manager.world().lair(lair_id) else {
            return 0;
        };
        let position = lair.position;
        let first_spawn = lair.first_spawn;
        let spawned = lair.spawned.len();
        let picks: Vec<Option<u64>> = {
            let pending = self.pending.entry(lair_id).or_default();
            pending.retain(|id| manager.is_constructing(*id));
            let missing = npc_config::LAIR_CREATURE_COUNT.saturating_sub(spawned + pending.len());
            (0..missing).map(|_| lair.pick_template(&mut self.rng)).collect()
        };

        for template_id in picks {
            let Some(template_id) = template_id else {
                tracing::warn!(lair_id, "lair has an empty creature roster");
                break;
            };
            let offset_x = self.rng.random_range(-LAIR_SPREAD..=LAIR_SPREAD);
            let offset_z = self.rng.random_range(-LAIR_SPREAD..=LAIR_SPREAD);
            let params = SpawnParams {
                template_id,
                placement: SpawnPlacement {
                    position: Vec3::new(position.x + offset_x, position.y, position.z + offset_z),
                    respawn_delay_ms: npc_config::RESPAWN_DELAY_MS,
                    first_spawn,
                    ..SpawnPlacement::default()
                },
                lair_id,
            };
            match manager.request_creature_object(params, ReadyTarget::NpcManager) {
                Ok(creature_id) => self.pending.entry(lair_id).or_default().push(creature_id),
                Err(e) => {
                    tracing::warn!(lair_id, error = %e, "creature request failed");
                    break;
                }
            }
        }

        if let Some(lair) = manager.world_mut().lair_mut(lair_id) {
            lair.first_spawn = false;
        }
        npc_config::LAIR_CHECK_MS
    }

    fn handle_creature(&mut self, manager: &mut SpawnManager, npc_id: u64) -> u64 {
        let Some(npc) = manager.world().npc(npc_id) else {
            return 0;
        };
        if npc.is_dead() {
            manager.add_creature_object_for_timed_deletion(npc_id, npc_config::CORPSE_DELAY_MS);
            return 0;
        }

        let distance = manager.world().nearest_player_distance(npc.position);
        let wanted = match distance {
            Some(d) if d <= npc_config::ACTIVE_RANGE => Tier::Active,
            Some(d) if d <= npc_config::READY_RANGE => Tier::Ready,
            _ => Tier::Dormant,
        };
        let interval = manager.tier_interval(wanted);

        if manager.tier_of(npc_id) == Some(wanted) {
            return interval;
        }
        if let Some(npc) = manager.world_mut().npc_mut(npc_id) {
            npc.ai_state = wanted.ai_state();
        }
        manager.move_npc(npc_id, wanted, interval);
        0
    }
}

impl Default for LairNpcManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NpcManager for LairNpcManager {
    fn handle_npc(&mut self, manager: &mut SpawnManager, id: u64, _overdue_ms: u64) -> u64 {
        match manager.world().get(id) {
            Some(WorldObject::Lair(_)) => self.handle_lair(manager, id),
            Some(WorldObject::Npc(_)) => self.handle_creature(manager, id),
            _ => 0,
        }
    }

    fn handle_expired(&mut self, manager: &mut SpawnManager, id: u64) {
        let Some(npc) = manager.world().npc(id) else {
            return;
        };
        // Lair creatures come back through the lair's own check.
        if npc.lair_id().is_some() {
            return;
        }
        let placement = SpawnPlacement {
            first_spawn: false,
            ..npc.placement
        };
        let params = SpawnParams {
            template_id: npc.template_id,
            placement,
            lair_id: 0,
        };
        let kind = npc.kind;
        let result = match kind {
            NpcKind::AttackableCreature { .. } => {
                manager.request_creature_object(params, ReadyTarget::SpawnManager)
            }
            _ => manager.request_npc_object(params, ReadyTarget::SpawnManager),
        };
        match result {
            Ok(respawn_id) => tracing::debug!(npc_id = id, respawn_id, "respawn requested"),
            Err(e) => tracing::warn!(npc_id = id, error = %e, "respawn request failed"),
        }
    }

    fn spawn_lair(&mut self, manager: &mut SpawnManager, lairs_id: u64, region_id: u64, point: Vec3) {
        if let Err(e) = manager.request_lair_object(lairs_id, region_id, point, true, ReadyTarget::NpcManager) {
            tracing::warn!(lairs_id, region_id, error = %e, "lair request failed");
        }
    }

    fn handle_object_ready(&mut self, manager: &mut SpawnManager, id: u64) {
        match manager.world().get(id) {
            Some(WorldObject::Lair(lair)) => {
                let orphaned = manager.world().region(lair.region_id).is_none_or(|region| {
                    region.status() == SpawnStatus::Unspawned || region.population() != lair.population
                });
                if orphaned {
                    tracing::debug!(lair_id = id, "region despawned while the lair loaded");
                    manager.un_spawn_entity(id);
                    return;
                }
                manager.move_npc(id, Tier::Dormant, 0);
            }
            Some(WorldObject::Npc(npc)) => {
                if let Some(lair_id) = npc.lair_id() {
                    if let Some(pending) = self.pending.get_mut(&lair_id) {
                        pending.retain(|&pending_id| pending_id != id);
                    }
                    match manager.world_mut().lair_mut(lair_id) {
                        Some(lair) => lair.add_spawn(id),
                        None => {
                            tracing::debug!(npc_id = id, lair_id, "lair gone before its creature loaded");
                            manager.un_spawn_entity(id);
                            return;
                        }
                    }
                }
                if let Some(npc) = manager.world_mut().npc_mut(id) {
                    npc.ai_state = AiState::Dormant;
                }
                manager.move_npc(id, Tier::Dormant, 0);
            }
            Some(other) => {
                tracing::error!(object_id = id, kind = other.kind_name(), "ready object is not a lair or npc");
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ZoneConfig;
    use crate::db::MemoryDatabase;
    use crate::npc::entity::Npc;
    use crate::npc::lair::Lair;
    use crate::npc::spawn_data::SpawnDefinition;
    use crate::npc::spawn_region::SpawnRegion;
    use crate::utility::{IdPool, ManualClock};

    fn manager() -> SpawnManager {
        SpawnManager::with_seed(
            ZoneConfig::default(),
            Arc::new(MemoryDatabase::empty()),
            Arc::new(ManualClock::new(0)),
            Arc::new(IdPool::with_seed(1_000, 100_000, 2)),
            11,
        )
    }

    fn add_lair(manager: &mut SpawnManager, id: u64, roster: &[u64]) {
        let mut lair = Lair::new(id, 3, 8, Vec3::ground(500.0, 500.0), true);
        lair.set_roster(roster);
        manager.world_mut().add_object(WorldObject::Lair(lair)).unwrap();
    }

    #[test]
    fn test_lair_requests_missing_creatures_once() {
        let mut manager = manager();
        let mut npcs = LairNpcManager::with_seed(1);
        add_lair(&mut manager, 40, &[70, 71]);

        assert_eq!(npcs.handle_npc(&mut manager, 40, 0), npc_config::LAIR_CHECK_MS);
        assert_eq!(npcs.pending_for(40), npc_config::LAIR_CREATURE_COUNT);
        assert_eq!(manager.pending_queries(), npc_config::LAIR_CREATURE_COUNT);
        assert!(!manager.world().lair(40).unwrap().first_spawn);

        // Chains still running: nothing new is requested.
        npcs.handle_npc(&mut manager, 40, 0);
        assert_eq!(manager.pending_queries(), npc_config::LAIR_CREATURE_COUNT);
    }

    #[test]
    fn test_empty_roster_requests_nothing() {
        let mut manager = manager();
        let mut npcs = LairNpcManager::with_seed(1);
        add_lair(&mut manager, 40, &[]);
        npcs.handle_npc(&mut manager, 40, 0);
        assert_eq!(manager.pending_queries(), 0);
    }

    #[test]
    fn test_creature_follows_nearest_player() {
        let mut manager = manager();
        let mut npcs = LairNpcManager::with_seed(1);
        let mut npc = Npc::new(300, NpcKind::Filler, 1);
        npc.position = Vec3::ground(100.0, 100.0);
        manager.world_mut().add_object(WorldObject::Npc(npc)).unwrap();
        manager.add_dormant_npc(300, 0);

        // Nobody around: stays dormant.
        assert_eq!(npcs.handle_npc(&mut manager, 300, 0), manager.tier_interval(Tier::Dormant));

        manager.world_mut().upsert_player(1, Vec3::ground(110.0, 100.0), 0).unwrap();
        assert_eq!(npcs.handle_npc(&mut manager, 300, 0), 0);
        assert_eq!(manager.tier_of(300), Some(Tier::Active));
        assert_eq!(manager.world().npc(300).unwrap().ai_state, AiState::Active);

        manager.world_mut().upsert_player(1, Vec3::ground(200.0, 100.0), 0).unwrap();
        assert_eq!(npcs.handle_npc(&mut manager, 300, 0), 0);
        assert_eq!(manager.tier_of(300), Some(Tier::Ready));
    }

    #[test]
    fn test_ready_creature_joins_its_lair() {
        let mut manager = manager();
        let mut npcs = LairNpcManager::with_seed(1);
        add_lair(&mut manager, 40, &[70]);
        let npc = Npc::new(300, NpcKind::AttackableCreature { lair_id: 40 }, 70);
        manager.world_mut().add_object(WorldObject::Npc(npc)).unwrap();

        npcs.handle_object_ready(&mut manager, 300);
        assert_eq!(manager.world().lair(40).unwrap().spawned, vec![300]);
        assert_eq!(manager.tier_of(300), Some(Tier::Dormant));
    }

    #[test]
    fn test_orphaned_lair_is_unspawned_on_ready() {
        let mut manager = manager();
        let mut npcs = LairNpcManager::with_seed(1);
        add_lair(&mut manager, 40, &[70]);

        npcs.handle_object_ready(&mut manager, 40);
        assert!(manager.world().lair(40).is_none());
        assert_eq!(manager.tier_of(40), None);
    }

    #[test]
    fn test_lair_from_older_population_is_unspawned_on_ready() {
        let mut manager = manager();
        let mut npcs = LairNpcManager::with_seed(1);
        let definition = SpawnDefinition {
            id: 1,
            pos_x: 0.0,
            pos_z: 0.0,
            width: 200,
            height: 200,
            density: 50,
            lair_types: Vec::new(),
        };
        let mut region = SpawnRegion::new(900, &definition, 50);
        region.on_enter(1, 0);
        region.on_leave(1);
        region.mark_unspawned();
        region.on_enter(1, 0);
        assert_eq!(region.population(), 2);
        manager.world_mut().add_object(WorldObject::Region(region)).unwrap();

        for (id, population) in [(40, 1), (50, 2)] {
            let mut lair = Lair::new(id, 3, 8, Vec3::ground(20.0, 20.0), true);
            lair.region_id = 900;
            lair.population = population;
            manager.world_mut().add_object(WorldObject::Lair(lair)).unwrap();
            npcs.handle_object_ready(&mut manager, id);
        }

        assert!(manager.world().lair(40).is_none());
        assert_eq!(manager.tier_of(50), Some(Tier::Dormant));
    }

    #[test]
    fn test_dead_creature_is_queued_for_deletion() {
        let mut manager = manager();
        let mut npcs = LairNpcManager::with_seed(1);
        let mut npc = Npc::new(300, NpcKind::AttackableCreature { lair_id: 40 }, 70);
        npc.ai_state = AiState::Dead;
        manager.world_mut().add_object(WorldObject::Npc(npc)).unwrap();
        manager.add_dormant_npc(300, 0);

        assert_eq!(npcs.handle_npc(&mut manager, 300, 0), 0);
        assert_eq!(manager.deletion_expiry(300), Some(npc_config::CORPSE_DELAY_MS));

        // A second check does not push the deletion back.
        assert_eq!(npcs.handle_npc(&mut manager, 300, 0), 0);
        assert_eq!(manager.deletion_expiry(300), Some(npc_config::CORPSE_DELAY_MS));
    }

    #[test]
    fn test_free_npc_respawns_on_expiry() {
        let mut manager = manager();
        let mut npcs = LairNpcManager::with_seed(1);
        let npc = Npc::new(300, NpcKind::Trainer, 12);
        manager.world_mut().add_object(WorldObject::Npc(npc)).unwrap();

        npcs.handle_expired(&mut manager, 300);
        assert_eq!(manager.pending_queries(), 1);
    }
}
