/// Zone spawn manager
///
/// Owns everything a zone needs to bring non-persistent npcs and lairs in
/// and out of existence:
///
/// - spawn definitions and the regions built from them
/// - the dormant/ready/active activity tiers
/// - corpse deletion, region despawn and region handling timers
/// - the continuation table for in-flight database queries
///
/// All of it lives on the simulation thread. The database is the only
/// async boundary: queries are submitted now and their results handed
/// back by `process` on a later frame.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use super::entity::{AiState, NpcKind};
use super::factory::{FactoryStep, NpcFactory, PendingQuery};
use super::npc_manager::NpcManager;
use super::queues::{ActivityQueue, DeadlineMap};
use super::query::{AsyncQueryContext, NpcQuery, ReadyTarget, SpawnParams, SPAWNS_SQL, SPAWN_GROUP_SQL};
use super::spawn_data::{LairTypeEntry, SpawnDefinition};
use super::spawn_region::{RegionTransition, SpawnRegion, SpawnStatus};
use crate::config::ZoneConfig;
use crate::db::{schema, CompletedJob, Database, JobId, QueryJob, QueryResult, Value};
use crate::error::SpawnError;
use crate::scheduler::{Scheduler, SpawnTask};
use crate::utility::{Clock, IdPool};
use crate::world::{Vec3, World, WorldObject};

/// Scheduler priority shared by every spawn task
const TASK_PRIORITY: u8 = 5;

/// Activity tier an npc or lair is queued in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Tier {
    Dormant,
    Ready,
    Active,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Dormant, Tier::Ready, Tier::Active];

    pub fn ai_state(self) -> AiState {
        match self {
            Tier::Dormant => AiState::Dormant,
            Tier::Ready => AiState::Ready,
            Tier::Active => AiState::Active,
        }
    }
}

/// Point-in-time counters for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpawnStats {
    pub now_ms: u64,
    pub definitions: usize,
    pub regions_unspawned: usize,
    pub regions_spawned: usize,
    pub regions_awaiting_despawn: usize,
    pub lairs: usize,
    pub npcs: usize,
    pub players: usize,
    pub dormant: usize,
    pub ready: usize,
    pub active: usize,
    pub pending_queries: usize,
    pub timed_deletions: usize,
    pub timed_unspawns: usize,
    pub handled_regions: usize,
    pub ids_in_use: usize,
}

pub struct SpawnManager {
    config: ZoneConfig,
    world: World,
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    ids: Arc<IdPool>,
    factory: NpcFactory,
    scheduler: Scheduler,
    rng: StdRng,

    definitions: BTreeMap<u32, SpawnDefinition>,
    pending: HashMap<JobId, AsyncQueryContext>,

    dormant: ActivityQueue,
    ready: ActivityQueue,
    active: ActivityQueue,

    /// Corpses; an earlier expiry always wins
    creature_deletions: DeadlineMap,
    /// Empty regions; the first scheduled expiry sticks
    region_unspawns: DeadlineMap,
    /// Occupied regions revisited by `spawn_area`
    region_handling: DeadlineMap,
}

impl SpawnManager {
    pub fn new(config: ZoneConfig, db: Arc<dyn Database>, clock: Arc<dyn Clock>, ids: Arc<IdPool>) -> Self {
        Self::with_rng(config, db, clock, ids, StdRng::from_os_rng())
    }

    /// Deterministic placement sampling for tests and replays
    pub fn with_seed(
        config: ZoneConfig,
        db: Arc<dyn Database>,
        clock: Arc<dyn Clock>,
        ids: Arc<IdPool>,
        seed: u64,
    ) -> Self {
        Self::with_rng(config, db, clock, ids, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        config: ZoneConfig,
        db: Arc<dyn Database>,
        clock: Arc<dyn Clock>,
        ids: Arc<IdPool>,
        rng: StdRng,
    ) -> Self {
        let now = clock.now_ms();
        let mut scheduler = Scheduler::new();
        scheduler.add_task(SpawnTask::DormantNpcs, TASK_PRIORITY, config.dormant_interval_ms, now);
        scheduler.add_task(SpawnTask::ReadyNpcs, TASK_PRIORITY, config.ready_interval_ms, now);
        scheduler.add_task(SpawnTask::ActiveNpcs, TASK_PRIORITY, config.active_interval_ms, now);
        scheduler.add_task(SpawnTask::GeneralTimers, TASK_PRIORITY, config.general_timers_interval_ms, now);
        scheduler.add_task(SpawnTask::RegionUpdates, TASK_PRIORITY, config.region_update_interval_ms, now);

        tracing::info!(zone_id = config.zone_id, tutorial = config.tutorial, "SpawnManager: created");

        Self {
            world: World::new(config.world_size),
            factory: NpcFactory::new(config.zone_id, config.tutorial),
            config,
            db,
            clock,
            ids,
            scheduler,
            rng,
            definitions: BTreeMap::new(),
            pending: HashMap::new(),
            dormant: ActivityQueue::new(),
            ready: ActivityQueue::new(),
            active: ActivityQueue::new(),
            creature_deletions: DeadlineMap::new(),
            region_unspawns: DeadlineMap::new(),
            region_handling: DeadlineMap::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn ids(&self) -> &IdPool {
        &self.ids
    }

    pub fn definition(&self, id: u32) -> Option<&SpawnDefinition> {
        self.definitions.get(&id)
    }

    pub fn pending_queries(&self) -> usize {
        self.pending.len()
    }

    /// True while a construction chain for `object_id` is in flight
    pub fn is_constructing(&self, object_id: u64) -> bool {
        self.pending.values().any(|context| {
            matches!(context, AsyncQueryContext::Npc(NpcQuery { object_id: id, .. }) if *id == object_id)
        })
    }

    // ========================================================================
    // FRAME
    // ========================================================================

    /// Run one simulation frame
    ///
    /// Completed queries are handed back first, then every periodic task
    /// that has come due.
    pub fn process(&mut self, npcs: &mut dyn NpcManager) {
        self.poll_database(npcs);

        let now = self.now();
        for task in self.scheduler.due(now) {
            match task {
                SpawnTask::DormantNpcs => self.handle_dormant_npcs(npcs, now),
                SpawnTask::ReadyNpcs => self.handle_ready_npcs(npcs, now),
                SpawnTask::ActiveNpcs => self.handle_active_npcs(npcs, now),
                SpawnTask::GeneralTimers => self.handle_general_object_timers(npcs, now),
                SpawnTask::RegionUpdates => self.update_regions(npcs),
            }
        }
    }

    pub fn poll_database(&mut self, npcs: &mut dyn NpcManager) {
        for job in self.db.poll_completed() {
            self.handle_database_job_complete(npcs, job);
        }
    }

    pub fn stats(&self) -> SpawnStats {
        let mut stats = SpawnStats {
            now_ms: self.now(),
            definitions: self.definitions.len(),
            players: self.world.player_count(),
            dormant: self.dormant.len(),
            ready: self.ready.len(),
            active: self.active.len(),
            pending_queries: self.pending.len(),
            timed_deletions: self.creature_deletions.len(),
            timed_unspawns: self.region_unspawns.len(),
            handled_regions: self.region_handling.len(),
            ids_in_use: self.ids.in_use(),
            ..SpawnStats::default()
        };
        for object in self.world.objects() {
            match object {
                WorldObject::Region(region) => match region.status() {
                    SpawnStatus::Unspawned => stats.regions_unspawned += 1,
                    SpawnStatus::Spawned => stats.regions_spawned += 1,
                    SpawnStatus::AwaitingDespawn => stats.regions_awaiting_despawn += 1,
                },
                WorldObject::Lair(_) => stats.lairs += 1,
                WorldObject::Npc(_) => stats.npcs += 1,
                WorldObject::Player(_) => {}
            }
        }
        stats
    }

    // ========================================================================
    // ASYNC QUERIES
    // ========================================================================

    fn submit(&mut self, context: AsyncQueryContext, sql: &'static str, params: Vec<Value>) -> Result<JobId, SpawnError> {
        let job = QueryJob::new(sql, params);
        let id = job.id;
        self.db.execute_async(job)?;
        tracing::trace!(job = %id, "query submitted");
        self.pending.insert(id, context);
        Ok(id)
    }

    fn submit_pending(&mut self, pending: PendingQuery) -> Result<JobId, SpawnError> {
        self.submit(AsyncQueryContext::Npc(pending.query), pending.sql, pending.params)
    }

    /// Resume whatever was waiting on `job`
    pub fn handle_database_job_complete(&mut self, npcs: &mut dyn NpcManager, job: CompletedJob) {
        let Some(context) = self.pending.remove(&job.id) else {
            tracing::error!(job = %job.id, "completion for a job nobody is waiting on");
            return;
        };

        let result = match job.result {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(job = %job.id, error = %e, "query failed");
                if let AsyncQueryContext::Npc(query) = context {
                    self.abort_chain(query.object_id, query.step.registers_object());
                }
                return;
            }
        };

        match context {
            AsyncQueryContext::Spawns => self.on_spawns_loaded(&result),
            AsyncQueryContext::SpawnGroup { definition_id } => {
                if let Err(e) = self.on_spawn_roster_loaded(definition_id, &result) {
                    tracing::error!(definition_id, error = %e, "spawn roster dropped");
                }
            }
            AsyncQueryContext::Npc(query) => self.continue_chain(npcs, query, &result),
        }
    }

    fn continue_chain(&mut self, npcs: &mut dyn NpcManager, query: NpcQuery, result: &QueryResult) {
        let object_id = query.object_id;
        let step = query.step.name();
        let registers = query.step.registers_object();

        match self.factory.handle_result(&mut self.world, &self.ids, &mut self.rng, query, result) {
            Ok(FactoryStep::Next(next)) => {
                if let Err(e) = self.submit_pending(next) {
                    tracing::warn!(object_id, step, error = %e, "follow-up query not submitted");
                    self.abort_chain(object_id, false);
                }
            }
            Ok(FactoryStep::Ready { object_id, notify }) => {
                tracing::debug!(object_id, "object ready");
                match notify {
                    ReadyTarget::SpawnManager => self.handle_object_ready(object_id),
                    ReadyTarget::NpcManager => npcs.handle_object_ready(self, object_id),
                }
            }
            Err(e) => {
                match &e {
                    SpawnError::ObjectGone(_) => tracing::debug!(object_id, step, "target gone, chain dropped"),
                    SpawnError::WrongObjectType { .. } => tracing::error!(object_id, step, error = %e, "chain aborted"),
                    SpawnError::UnknownFamily(_) | SpawnError::UnsupportedFamily(_) => {
                        tracing::debug!(object_id, step, error = %e, "chain aborted")
                    }
                    _ => tracing::warn!(object_id, step, error = %e, "chain aborted"),
                }
                self.abort_chain(object_id, registers);
            }
        }
    }

    /// Drop a chain that will never report ready
    ///
    /// A partly built object is destroyed. When the failed step was the one
    /// that registers the object, its reserved id pair goes back to the
    /// pool; later steps find their target gone only after an unspawn has
    /// already released it.
    fn abort_chain(&mut self, object_id: u64, registering_step: bool) {
        if self.world.contains(object_id) {
            self.destroy_entity(object_id);
        } else if registering_step {
            self.ids.release_pair(object_id);
        }
    }

    // ========================================================================
    // SPAWN DEFINITIONS
    // ========================================================================

    /// Ask for every spawn definition of this zone
    pub fn load_spawns(&mut self) -> Result<(), SpawnError> {
        let zone_id = self.config.zone_id;
        self.submit(AsyncQueryContext::Spawns, SPAWNS_SQL, vec![Value::from(zone_id)])?;
        tracing::debug!(zone_id, "loading spawn definitions");
        Ok(())
    }

    fn on_spawns_loaded(&mut self, result: &QueryResult) {
        let mut loaded = 0usize;
        for row in result.rows() {
            let definition = match schema::SPAWN.bind(row).and_then(|bound| SpawnDefinition::from_row(&bound)) {
                Ok(definition) => definition,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed spawn row");
                    continue;
                }
            };
            let id = definition.id;
            self.definitions.insert(id, definition);
            if let Err(e) = self.load_spawn_group(id) {
                tracing::warn!(definition_id = id, error = %e, "spawn roster request failed");
            }
            loaded += 1;
        }
        tracing::info!(zone_id = self.config.zone_id, count = loaded, "spawn definitions loaded");
    }

    /// Ask for the lair roster of one definition
    pub fn load_spawn_group(&mut self, definition_id: u32) -> Result<(), SpawnError> {
        self.submit(
            AsyncQueryContext::SpawnGroup { definition_id },
            SPAWN_GROUP_SQL,
            vec![Value::from(definition_id)],
        )?;
        Ok(())
    }

    /// Attach a roster to its definition and build the region for it
    ///
    /// Returns the new region's id.
    pub fn on_spawn_roster_loaded(&mut self, definition_id: u32, result: &QueryResult) -> Result<u64, SpawnError> {
        let Some(definition) = self.definitions.get_mut(&definition_id) else {
            tracing::error!(definition_id, "roster for an unknown spawn definition");
            return Err(SpawnError::UnknownDefinition(definition_id));
        };

        for row in result.rows() {
            let entry = schema::SPAWN_GROUP.bind(row).and_then(|bound| LairTypeEntry::from_row(&bound))?;
            definition.lair_types.push(entry);
        }

        let region_id = self.ids.allocate_pair().ok_or(SpawnError::IdPoolExhausted)?;
        let region = SpawnRegion::new(region_id, definition, self.config.min_density);
        if let Err(e) = self.world.add_object(WorldObject::Region(region)) {
            self.ids.release_pair(region_id);
            return Err(e);
        }

        tracing::debug!(
            definition_id,
            region_id,
            lair_types = definition.lair_types.len(),
            "spawn region registered"
        );
        Ok(region_id)
    }

    // ========================================================================
    // ACTIVITY TIERS
    // ========================================================================

    fn queue(&self, tier: Tier) -> &ActivityQueue {
        match tier {
            Tier::Dormant => &self.dormant,
            Tier::Ready => &self.ready,
            Tier::Active => &self.active,
        }
    }

    fn queue_mut(&mut self, tier: Tier) -> &mut ActivityQueue {
        match tier {
            Tier::Dormant => &mut self.dormant,
            Tier::Ready => &mut self.ready,
            Tier::Active => &mut self.active,
        }
    }

    /// Configured polling interval of a tier
    pub fn tier_interval(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Dormant => self.config.dormant_interval_ms,
            Tier::Ready => self.config.ready_interval_ms,
            Tier::Active => self.config.active_interval_ms,
        }
    }

    /// Tier the id is queued in, if any
    pub fn tier_of(&self, id: u64) -> Option<Tier> {
        Tier::ALL.into_iter().find(|&tier| self.queue(tier).contains(id))
    }

    fn add_to_tier(&mut self, tier: Tier, id: u64, delay_ms: u64) {
        for other in Tier::ALL {
            if other != tier && self.queue_mut(other).remove(id) {
                tracing::warn!(npc_id = id, from = ?other, to = ?tier, "npc was queued in another tier");
            }
        }
        let due = self.now() + delay_ms;
        self.queue_mut(tier).insert(id, due);
    }

    pub fn add_dormant_npc(&mut self, id: u64, delay_ms: u64) {
        self.add_to_tier(Tier::Dormant, id, delay_ms);
    }

    pub fn add_ready_npc(&mut self, id: u64, delay_ms: u64) {
        self.add_to_tier(Tier::Ready, id, delay_ms);
    }

    pub fn add_active_npc(&mut self, id: u64, delay_ms: u64) {
        self.add_to_tier(Tier::Active, id, delay_ms);
    }

    pub fn remove_dormant_npc(&mut self, id: u64) -> bool {
        self.dormant.remove(id)
    }

    pub fn remove_ready_npc(&mut self, id: u64) -> bool {
        self.ready.remove(id)
    }

    pub fn remove_active_npc(&mut self, id: u64) -> bool {
        self.active.remove(id)
    }

    /// Move an npc to `tier` from wherever it is queued now
    pub fn move_npc(&mut self, id: u64, tier: Tier, delay_ms: u64) {
        for other in Tier::ALL {
            if other != tier {
                self.queue_mut(other).remove(id);
            }
        }
        let due = self.now() + delay_ms;
        self.queue_mut(tier).insert(id, due);
    }

    /// Make a dormant entry due right now
    pub fn force_handling_of_dormant_npc(&mut self, id: u64) -> bool {
        let now = self.now();
        self.dormant.reschedule(id, now)
    }

    /// Make a ready entry due right now
    pub fn force_handling_of_ready_npc(&mut self, id: u64) -> bool {
        let now = self.now();
        self.ready.reschedule(id, now)
    }

    pub fn handle_dormant_npcs(&mut self, npcs: &mut dyn NpcManager, call_time: u64) {
        self.handle_tier(npcs, Tier::Dormant, call_time);
    }

    pub fn handle_ready_npcs(&mut self, npcs: &mut dyn NpcManager, call_time: u64) {
        self.handle_tier(npcs, Tier::Ready, call_time);
    }

    pub fn handle_active_npcs(&mut self, npcs: &mut dyn NpcManager, call_time: u64) {
        self.handle_tier(npcs, Tier::Active, call_time);
    }

    /// Tier check for every entry due at `call_time`
    ///
    /// Handlers may move or reschedule other entries, so each snapshot entry
    /// is re-read before it runs and written back only if still queued here.
    fn handle_tier(&mut self, npcs: &mut dyn NpcManager, tier: Tier, call_time: u64) {
        for (id, _) in self.queue(tier).due(call_time) {
            let Some(due) = self.queue(tier).due_time(id).filter(|&due| due <= call_time) else {
                continue;
            };

            if !self.world.get(id).is_some_and(WorldObject::is_creature) {
                tracing::debug!(npc_id = id, ?tier, "dropping queue entry for a missing object");
                self.queue_mut(tier).remove(id);
                continue;
            }

            let wait = npcs.handle_npc(self, id, call_time - due);
            if wait > 0 {
                self.queue_mut(tier).reschedule(id, call_time + wait);
            } else {
                self.queue_mut(tier).remove(id);
            }
        }
    }

    // ========================================================================
    // TIMERS
    // ========================================================================

    /// Schedule a corpse for deletion; an earlier pending deletion wins
    pub fn add_creature_object_for_timed_deletion(&mut self, id: u64, delay_ms: u64) -> bool {
        let expiry = self.now() + delay_ms;
        self.creature_deletions.insert_earliest(id, expiry)
    }

    /// When a scheduled corpse deletion fires, if one is pending
    pub fn deletion_expiry(&self, id: u64) -> Option<u64> {
        self.creature_deletions.expiry(id)
    }

    /// Schedule an empty region's despawn; no-op if one is already pending
    pub fn add_spawn_region_for_timed_unspawn(&mut self, region_id: u64, delay_ms: u64) -> bool {
        let expiry = self.now() + delay_ms;
        self.region_unspawns.insert_if_absent(region_id, expiry)
    }

    pub fn remove_spawn_region_from_timed_unspawn(&mut self, region_id: u64) -> bool {
        self.region_unspawns.remove(region_id)
    }

    pub fn add_spawn_region_handling(&mut self, region_id: u64, delay_ms: u64) -> bool {
        let expiry = self.now() + delay_ms;
        self.region_handling.insert_if_absent(region_id, expiry)
    }

    pub fn remove_spawn_region_handling(&mut self, region_id: u64) -> bool {
        self.region_handling.remove(region_id)
    }

    pub fn handle_general_object_timers(&mut self, npcs: &mut dyn NpcManager, call_time: u64) {
        for id in self.creature_deletions.take_expired(call_time) {
            match self.world.get(id) {
                Some(object) if object.is_creature() => {
                    npcs.handle_expired(self, id);
                    self.destroy_entity(id);
                }
                Some(object) => {
                    tracing::error!(object_id = id, kind = object.kind_name(), "timed deletion for a non-creature");
                }
                None => tracing::error!(object_id = id, "timed deletion for a missing object"),
            }
        }

        for region_id in self.region_unspawns.take_expired(call_time) {
            if self.world.region(region_id).is_some() {
                self.despawn_area(region_id);
            } else {
                tracing::error!(region_id, "timed unspawn for a missing region");
            }
        }

        let interval = self.config.region_handling_interval_ms;
        for region_id in self.region_handling.expired(call_time) {
            if self.world.region(region_id).is_none() {
                tracing::error!(region_id, "region handling for a missing region");
                self.region_handling.remove(region_id);
                continue;
            }
            self.spawn_area(npcs, region_id);
            self.region_handling.reschedule(region_id, call_time + interval);
        }
    }

    // ========================================================================
    // ENTITY REMOVAL
    // ========================================================================

    /// Take a lair or attackable creature out of the zone
    ///
    /// A lair unspawns every creature it still tracks before itself.
    pub fn un_spawn_entity(&mut self, id: u64) {
        match self.world.get_mut(id) {
            Some(WorldObject::Npc(npc)) if matches!(npc.kind, NpcKind::AttackableCreature { .. }) => {
                self.destroy_entity(id)
            }
            Some(WorldObject::Lair(lair)) => {
                for creature_id in lair.take_spawned() {
                    self.un_spawn_entity(creature_id);
                }
                self.destroy_entity(id);
            }
            Some(other) => {
                tracing::error!(object_id = id, kind = other.kind_name(), "refusing to unspawn");
            }
            None => tracing::debug!(object_id = id, "unspawn of an unknown object"),
        }
    }

    /// Destroy a creature or lair and hand its ids back to the pool
    fn destroy_entity(&mut self, id: u64) {
        for tier in Tier::ALL {
            self.queue_mut(tier).remove(id);
        }
        self.creature_deletions.remove(id);

        let Some(object) = self.world.destroy_object(id) else {
            return;
        };
        match object {
            WorldObject::Npc(npc) => {
                if let Some(lair) = npc.lair_id().and_then(|lair_id| self.world.lair_mut(lair_id)) {
                    lair.remove_spawn(id);
                }
                for weapon_id in npc.equipment.weapon_ids() {
                    self.ids.release(weapon_id);
                }
            }
            WorldObject::Lair(lair) => {
                if let Some(region) = self.world.region_mut(lair.region_id) {
                    region.remove_lair(id);
                }
            }
            _ => {}
        }
        self.ids.release_pair(id);
        tracing::trace!(object_id = id, "destroyed");
    }

    // ========================================================================
    // REGIONS
    // ========================================================================

    pub fn update_regions(&mut self, npcs: &mut dyn NpcManager) {
        for region_id in self.world.region_ids() {
            self.update_region(npcs, region_id);
        }
    }

    /// Diff one region's players against the spatial index
    pub fn update_region(&mut self, npcs: &mut dyn NpcManager, region_id: u64) {
        let diff = match self.world.region_with_index(region_id) {
            Some((region, index)) => region.poll(index),
            None => return,
        };

        for player_id in diff.entered {
            let parent_id = self.world.player(player_id).map_or(0, |player| player.parent_id);
            let transition = self
                .world
                .region_mut(region_id)
                .and_then(|region| region.on_enter(player_id, parent_id));
            if let Some(transition) = transition {
                self.apply_region_transition(npcs, region_id, transition);
            }
        }

        for player_id in diff.left {
            let transition = self
                .world
                .region_mut(region_id)
                .and_then(|region| region.on_leave(player_id));
            if let Some(transition) = transition {
                self.apply_region_transition(npcs, region_id, transition);
            }
        }
    }

    fn apply_region_transition(&mut self, npcs: &mut dyn NpcManager, region_id: u64, transition: RegionTransition) {
        let handling = self.config.region_handling_interval_ms;
        match transition {
            RegionTransition::Populate => {
                let placed = self.populate_area(npcs, region_id);
                self.add_spawn_region_handling(region_id, handling);
                tracing::info!(region_id, placed, "region spawned");
            }
            RegionTransition::CancelDespawn => {
                self.remove_spawn_region_from_timed_unspawn(region_id);
                self.add_spawn_region_handling(region_id, handling);
                tracing::debug!(region_id, "region despawn cancelled");
            }
            RegionTransition::ScheduleDespawn => {
                let delay = self.config.despawn_delay_ms;
                self.add_spawn_region_for_timed_unspawn(region_id, delay);
                self.remove_spawn_region_handling(region_id);
                tracing::debug!(region_id, delay, "region empty, despawn scheduled");
            }
        }
    }

    /// Place lairs across a freshly occupied region
    ///
    /// Every lair type gets `lairs_per_type` placement attempts; a failed
    /// placement is skipped. Returns how many lairs were asked for.
    pub fn populate_area(&mut self, npcs: &mut dyn NpcManager, region_id: u64) -> usize {
        let Some(region) = self.world.region(region_id) else {
            return 0;
        };
        let Some(definition) = self.definitions.get(&region.definition_id) else {
            tracing::error!(region_id, definition_id = region.definition_id, "region has no spawn definition");
            return 0;
        };

        let per_type = region.lairs_per_type(definition.lair_types.len());
        let existing: Vec<Vec3> = region
            .lairs()
            .iter()
            .filter_map(|&lair_id| self.world.creature_position(lair_id))
            .collect();

        let mut placements = Vec::new();
        for entry in &definition.lair_types {
            for _ in 0..per_type {
                match region.get_spawn_location(
                    &mut self.rng,
                    &existing,
                    self.config.min_lair_spacing,
                    self.config.max_placement_attempts,
                ) {
                    Some(point) => placements.push((entry.lair_id as u64, point)),
                    None => tracing::debug!(region_id, lair_id = entry.lair_id, "lair placement skipped"),
                }
            }
        }

        let placed = placements.len();
        for (lairs_id, point) in placements {
            npcs.spawn_lair(self, lairs_id, region_id, point);
        }
        placed
    }

    /// Unspawn every lair the region owns and mark it unspawned
    pub fn despawn_area(&mut self, region_id: u64) {
        let Some(region) = self.world.region_mut(region_id) else {
            tracing::error!(region_id, "despawn of a missing region");
            return;
        };
        let lairs = region.take_lairs();
        let count = lairs.len();
        for lair_id in lairs {
            self.un_spawn_entity(lair_id);
        }
        if let Some(region) = self.world.region_mut(region_id) {
            region.mark_unspawned();
        }
        self.region_handling.remove(region_id);
        tracing::info!(region_id, lairs = count, "region despawned");
    }

    /// Give each owned lair that has never spawned its first tier check
    pub fn spawn_area(&mut self, npcs: &mut dyn NpcManager, region_id: u64) {
        let Some(region) = self.world.region(region_id) else {
            return;
        };
        let waiting: Vec<u64> = region
            .lairs()
            .iter()
            .copied()
            .filter(|&lair_id| {
                self.world
                    .lair(lair_id)
                    .is_some_and(|lair| lair.ai_state == AiState::Dormant && lair.first_spawn)
            })
            .collect();
        for lair_id in waiting {
            npcs.handle_npc(self, lair_id, 1);
        }
    }

    // ========================================================================
    // OBJECT REQUESTS
    // ========================================================================

    /// Start the lair chain for row `lairs_id` of the lairs table
    pub fn request_lair_object(
        &mut self,
        lairs_id: u64,
        region_id: u64,
        position: Vec3,
        first_spawn: bool,
        notify: ReadyTarget,
    ) -> Result<u64, SpawnError> {
        let population = self.world.region(region_id).map_or(0, SpawnRegion::population);
        let object_id = self.ids.allocate_pair().ok_or(SpawnError::IdPoolExhausted)?;
        let pending = self
            .factory
            .lair_request(lairs_id, object_id, region_id, population, position, first_spawn, notify);
        self.start_chain(object_id, pending)
    }

    pub fn request_creature_object(&mut self, params: SpawnParams, notify: ReadyTarget) -> Result<u64, SpawnError> {
        let object_id = self.ids.allocate_pair().ok_or(SpawnError::IdPoolExhausted)?;
        let pending = self.factory.creature_request(object_id, params, notify);
        self.start_chain(object_id, pending)
    }

    pub fn request_npc_object(&mut self, params: SpawnParams, notify: ReadyTarget) -> Result<u64, SpawnError> {
        let object_id = self.ids.allocate_pair().ok_or(SpawnError::IdPoolExhausted)?;
        let pending = self.factory.npc_request(object_id, params, notify);
        self.start_chain(object_id, pending)
    }

    fn start_chain(&mut self, object_id: u64, pending: PendingQuery) -> Result<u64, SpawnError> {
        if let Err(e) = self.submit_pending(pending) {
            self.ids.release_pair(object_id);
            return Err(e);
        }
        Ok(object_id)
    }

    /// Respawned creatures requested by the manager itself
    pub fn handle_object_ready(&mut self, id: u64) {
        let Some(npc) = self.world.npc_mut(id) else {
            tracing::error!(object_id = id, "ready object is not an npc");
            return;
        };
        npc.ai_state = AiState::Ready;
        let lair_id = npc.lair_id();
        if let Some(lair) = lair_id.and_then(|lair_id| self.world.lair_mut(lair_id)) {
            lair.add_spawn(id);
        }
        self.add_ready_npc(id, 0);
    }
}
