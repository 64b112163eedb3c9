/// Non-persistent npc factory
///
/// Turns query rows into live lairs and npcs. Each handler consumes one
/// completed step, updates the world, and says what happens next: another
/// query, a finished object, or nothing. Handlers never submit queries
/// themselves; the spawn manager owns the database and the pending table.

use rand::Rng;

use super::entity::{
    AiState, CreoGroup, Equipment, LoadState, Npc, NpcFamily, NpcKind, NpcTemplate, PvpStatus,
    Weapon, WeaponGroup, WeaponSlot,
};
use super::lair::{Lair, LairAppearance};
use super::query::{
    NpcQuery, NpcQueryStep, ReadyTarget, SpawnParams, CREATURE_ATTRIBUTES_SQL,
    CREATURE_GROUP_SQL, CREATURE_TEMPLATE_SQL, LAIR_ATTRIBUTES_SQL, LAIR_TEMPLATE_SQL,
    NPC_ATTRIBUTES_SQL, NPC_TEMPLATE_SQL,
};
use crate::db::schema;
use crate::db::{QueryResult, Value};
use crate::error::SpawnError;
use crate::utility::IdPool;
use crate::world::{Vec3, World, WorldObject};

const UNARMED_MODEL: &str = "object/weapon/melee/unarmed/shared_unarmed_default_player.iff";
const PISTOL_MODEL: &str = "object/weapon/ranged/pistol/shared_pistol_cdef.iff";
const SABER_MODEL: &str = "object/weapon/melee/sword/shared_sword_lightsaber_vader.iff";

/// Type options for npcs that are not attack targets
const NPC_TYPE_OPTIONS: u32 = 0x108;

/// A query the manager should submit next
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuery {
    pub sql: &'static str,
    pub params: Vec<Value>,
    pub query: NpcQuery,
}

/// Outcome of one completed chain step
#[derive(Debug, Clone, PartialEq)]
pub enum FactoryStep {
    Next(PendingQuery),
    Ready { object_id: u64, notify: ReadyTarget },
}

#[derive(Debug, Clone, Copy)]
pub struct NpcFactory {
    zone_id: u32,
    /// Tutorial creatures are aggressive and start armed
    tutorial: bool,
}

impl NpcFactory {
    pub fn new(zone_id: u32, tutorial: bool) -> Self {
        Self { zone_id, tutorial }
    }

    // ------------------------------------------------------------------------
    // Chain entry points
    // ------------------------------------------------------------------------

    pub fn lair_request(
        &self,
        lairs_id: u64,
        object_id: u64,
        region_id: u64,
        population: u32,
        position: Vec3,
        first_spawn: bool,
        notify: ReadyTarget,
    ) -> PendingQuery {
        PendingQuery {
            sql: LAIR_TEMPLATE_SQL,
            params: vec![Value::from(self.zone_id), Value::from(lairs_id)],
            query: NpcQuery {
                object_id,
                step: NpcQueryStep::LairTemplate {
                    lairs_id,
                    region_id,
                    population,
                    position,
                    first_spawn,
                },
                notify,
            },
        }
    }

    pub fn creature_request(&self, object_id: u64, params: SpawnParams, notify: ReadyTarget) -> PendingQuery {
        PendingQuery {
            sql: CREATURE_TEMPLATE_SQL,
            params: vec![Value::from(params.template_id)],
            query: NpcQuery {
                object_id,
                step: NpcQueryStep::CreatureTemplate(params),
                notify,
            },
        }
    }

    pub fn npc_request(&self, object_id: u64, params: SpawnParams, notify: ReadyTarget) -> PendingQuery {
        PendingQuery {
            sql: NPC_TEMPLATE_SQL,
            params: vec![Value::from(params.template_id)],
            query: NpcQuery {
                object_id,
                step: NpcQueryStep::NpcTemplate(params),
                notify,
            },
        }
    }

    // ------------------------------------------------------------------------
    // Step handlers
    // ------------------------------------------------------------------------

    /// Apply one completed step to the world
    ///
    /// An error aborts the chain; the object (if registered) stays in the
    /// world without ever being reported ready.
    pub fn handle_result<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        ids: &IdPool,
        rng: &mut R,
        query: NpcQuery,
        result: &QueryResult,
    ) -> Result<FactoryStep, SpawnError> {
        let NpcQuery {
            object_id,
            step,
            notify,
        } = query;

        match step {
            NpcQueryStep::LairTemplate {
                lairs_id,
                region_id,
                population,
                position,
                first_spawn,
            } => {
                let row = result.first().ok_or(SpawnError::MissingData("lair template"))?;
                let head = schema::LAIR_TEMPLATE.bind(row)?;
                let appearance = LairAppearance::from_row(&schema::LAIR_APPEARANCE.bind(row)?)?;

                let mut lair = Lair::new(object_id, lairs_id, head.u64("template_id")?, position, first_spawn);
                lair.appearance = appearance;
                lair.population = population;

                if let Some(region) = world.region_mut(region_id) {
                    lair.region_id = region_id;
                    if region.population() == population {
                        region.add_lair(object_id);
                    }
                }
                world.add_object(WorldObject::Lair(lair))?;

                Ok(FactoryStep::Next(PendingQuery {
                    sql: CREATURE_GROUP_SQL,
                    params: vec![Value::from(head.u32("creature_group")?)],
                    query: NpcQuery {
                        object_id,
                        step: NpcQueryStep::LairCreatureTemplates { lairs_id },
                        notify,
                    },
                }))
            }

            NpcQueryStep::LairCreatureTemplates { lairs_id } => {
                if world.lair(object_id).is_none() {
                    return Err(SpawnError::ObjectGone(object_id));
                }
                if result.is_empty() {
                    return Err(SpawnError::MissingData("lair creature group"));
                }
                let templates = result
                    .rows()
                    .iter()
                    .map(|row| schema::CREATURE_GROUP.bind(row)?.u64("creature_id"))
                    .collect::<Result<Vec<u64>, _>>()?;

                let lair = world
                    .lair_mut(object_id)
                    .ok_or(SpawnError::ObjectGone(object_id))?;
                lair.set_roster(&templates);
                lair.load_state = LoadState::Attributes;

                Ok(FactoryStep::Next(PendingQuery {
                    sql: LAIR_ATTRIBUTES_SQL,
                    params: vec![Value::from(lairs_id)],
                    query: NpcQuery {
                        object_id,
                        step: NpcQueryStep::Attributes,
                        notify,
                    },
                }))
            }

            NpcQueryStep::CreatureTemplate(params) => {
                self.build_npc(world, ids, rng, object_id, params, result)?;
                Ok(FactoryStep::Next(PendingQuery {
                    sql: CREATURE_ATTRIBUTES_SQL,
                    params: vec![Value::from(params.template_id)],
                    query: NpcQuery {
                        object_id,
                        step: NpcQueryStep::Attributes,
                        notify,
                    },
                }))
            }

            NpcQueryStep::NpcTemplate(params) => {
                self.build_npc(world, ids, rng, object_id, params, result)?;
                Ok(FactoryStep::Next(PendingQuery {
                    sql: NPC_ATTRIBUTES_SQL,
                    params: vec![Value::from(params.template_id)],
                    query: NpcQuery {
                        object_id,
                        step: NpcQueryStep::Attributes,
                        notify,
                    },
                }))
            }

            NpcQueryStep::Attributes => {
                if !world.contains(object_id) {
                    return Err(SpawnError::ObjectGone(object_id));
                }
                if result.is_empty() {
                    return Err(SpawnError::MissingData("attributes"));
                }
                let mut parsed = Vec::with_capacity(result.row_count());
                for row in result.rows() {
                    let bound = schema::ATTRIBUTE.bind(row)?;
                    parsed.push((bound.text("name")?, bound.text("value")?, bound.u8("internal")? != 0));
                }

                let (attributes, load_state) = match world.get_mut(object_id) {
                    Some(WorldObject::Lair(lair)) => (&mut lair.attributes, &mut lair.load_state),
                    Some(WorldObject::Npc(npc)) => (&mut npc.attributes, &mut npc.load_state),
                    Some(other) => {
                        return Err(SpawnError::WrongObjectType {
                            id: object_id,
                            expected: "lair or npc",
                            found: other.kind_name(),
                        })
                    }
                    None => return Err(SpawnError::ObjectGone(object_id)),
                };
                for (name, value, internal) in parsed {
                    attributes.insert(name, value, internal);
                }
                *load_state = LoadState::Loaded;

                Ok(FactoryStep::Ready { object_id, notify })
            }
        }
    }

    fn build_npc<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        ids: &IdPool,
        rng: &mut R,
        object_id: u64,
        params: SpawnParams,
        result: &QueryResult,
    ) -> Result<(), SpawnError> {
        let row = result.first().ok_or(SpawnError::MissingData("npc template"))?;
        let family = schema::NPC_IDENTIFIER.bind(row)?.u32("family")?;
        let mut npc = self.create_non_persistent_npc(ids, rng, row, params.template_id, object_id, family, params.lair_id)?;

        npc.placement = params.placement;
        npc.position = params.placement.position;
        npc.heading = params.placement.heading;

        let weapon_ids = npc.equipment.weapon_ids();
        world.add_object(WorldObject::Npc(npc)).inspect_err(|_| {
            for id in &weapon_ids {
                ids.release(*id);
            }
        })
    }

    /// Build the concrete npc for `family` from a template row
    ///
    /// Nothing is registered here; a failure leaves no trace besides any
    /// weapon ids, which are returned to the pool before the error.
    #[allow(clippy::too_many_arguments)]
    pub fn create_non_persistent_npc<R: Rng + ?Sized>(
        &self,
        ids: &IdPool,
        rng: &mut R,
        row: &[Value],
        template_id: u64,
        object_id: u64,
        family: u32,
        lair_id: u64,
    ) -> Result<Npc, SpawnError> {
        let kind = match NpcFamily::from_u32(family) {
            Some(NpcFamily::Trainer) => NpcKind::Trainer,
            Some(NpcFamily::Filler) => NpcKind::Filler,
            Some(NpcFamily::QuestGiver) => NpcKind::QuestGiver,
            Some(NpcFamily::AttackableObject) => NpcKind::AttackableStatic,
            Some(NpcFamily::AttackableCreatures) => NpcKind::AttackableCreature { lair_id },
            Some(NpcFamily::NaturalLairs) => {
                tracing::warn!(family, template_id, "natural lairs are built through the lair path");
                return Err(SpawnError::UnsupportedFamily(NpcFamily::NaturalLairs.name()));
            }
            None => {
                tracing::warn!(family, template_id, "unknown npc family");
                return Err(SpawnError::UnknownFamily(family));
            }
        };

        let mut npc = Npc::new(object_id, kind, template_id);
        npc.template = NpcTemplate::from_row(&schema::NPC_TEMPLATE.bind(row)?)?;

        match kind {
            NpcKind::AttackableStatic => {
                // Debris and the like start out non-attackable.
                npc.creo_group = CreoGroup::AttackableObject;
                npc.type_options = 0;
            }
            NpcKind::AttackableCreature { .. } => {
                npc.creo_group = CreoGroup::Creature;
                npc.type_options = 0;
                npc.pvp = if self.tutorial {
                    PvpStatus::ATTACKABLE | PvpStatus::AGGRESSIVE | PvpStatus::ENEMY
                } else {
                    PvpStatus::ATTACKABLE
                };
                npc.equipment = self.arm_creature(ids, object_id)?;
                npc.inventory.credits = rng.random_range(10..35);
            }
            _ => {
                npc.type_options = NPC_TYPE_OPTIONS;
            }
        }

        npc.ai_state = AiState::Dormant;
        npc.load_state = LoadState::Attributes;
        Ok(npc)
    }

    /// Default unarmed weapon plus a pistol and a saber, one pool id each
    fn arm_creature(&self, ids: &IdPool, owner_id: u64) -> Result<Equipment, SpawnError> {
        let specs = [
            (UNARMED_MODEL, WeaponGroup::Unarmed),
            (PISTOL_MODEL, WeaponGroup::Pistol),
            (SABER_MODEL, WeaponGroup::TwoHanded),
        ];

        let mut weapons: Vec<Weapon> = Vec::with_capacity(specs.len());
        for (model, group) in specs {
            let Some(id) = ids.allocate() else {
                for weapon in &weapons {
                    ids.release(weapon.id);
                }
                return Err(SpawnError::IdPoolExhausted);
            };
            weapons.push(Weapon {
                id,
                parent_id: owner_id,
                model,
                group,
            });
        }

        let mut weapons = weapons.into_iter();
        Ok(Equipment {
            default_weapon: weapons.next(),
            primary: weapons.next(),
            secondary: weapons.next(),
            equipped: if self.tutorial {
                WeaponSlot::Primary
            } else {
                WeaponSlot::Default
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npc::entity::SpawnPlacement;
    use crate::npc::spawn_data::SpawnDefinition;
    use crate::npc::spawn_region::SpawnRegion;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn template_row(family: u32) -> Vec<Value> {
        vec![
            Value::Integer(12),
            Value::Integer(3),
            Value::Integer(0),
            Value::Integer(0),
            Value::Integer(14),
            Value::from("object/mobile/shared_womp_rat.iff"),
            Value::from("womp_rat"),
            Value::from("monster_name"),
            Value::from("neutral"),
            Value::Integer(0),
            Value::Real(1.0),
            Value::Integer(family as i64),
        ]
    }

    fn setup() -> (World, IdPool, StdRng) {
        (World::new(4096.0), IdPool::with_seed(1_000, 10_000, 1), StdRng::seed_from_u64(3))
    }

    #[test]
    fn test_attackable_creature_is_armed() {
        let (_, ids, mut rng) = setup();
        let factory = NpcFactory::new(1, false);
        let npc = factory
            .create_non_persistent_npc(&ids, &mut rng, &template_row(5), 77, 500, 5, 40)
            .unwrap();

        assert_eq!(npc.kind, NpcKind::AttackableCreature { lair_id: 40 });
        assert_eq!(npc.pvp, PvpStatus::ATTACKABLE);
        assert_eq!(npc.creo_group, CreoGroup::Creature);
        assert_eq!(npc.equipment.weapon_ids().len(), 3);
        assert_eq!(npc.equipment.equipped, WeaponSlot::Default);
        assert_eq!(
            npc.equipment.primary.as_ref().map(|w| w.group),
            Some(WeaponGroup::Pistol)
        );
        assert!((10..35).contains(&npc.inventory.credits));
        assert_eq!(npc.template.level, 14);
        assert_eq!(npc.load_state, LoadState::Attributes);
        for id in npc.equipment.weapon_ids() {
            assert!(ids.is_in_use(id));
        }
    }

    #[test]
    fn test_tutorial_creatures_are_hostile_and_equipped() {
        let (_, ids, mut rng) = setup();
        let factory = NpcFactory::new(1, true);
        let npc = factory
            .create_non_persistent_npc(&ids, &mut rng, &template_row(5), 77, 500, 5, 40)
            .unwrap();
        assert!(npc.pvp.contains(PvpStatus::ATTACKABLE | PvpStatus::AGGRESSIVE | PvpStatus::ENEMY));
        assert_eq!(npc.equipment.equipped, WeaponSlot::Primary);
        assert_eq!(npc.equipment.equipped_weapon().map(|w| w.group), Some(WeaponGroup::Pistol));
    }

    #[test]
    fn test_family_dispatch() {
        let (_, ids, mut rng) = setup();
        let factory = NpcFactory::new(1, false);
        let build = |family: u32, rng: &mut StdRng| {
            factory.create_non_persistent_npc(&ids, rng, &template_row(family), 1, 600, family, 0)
        };

        let trainer = build(1, &mut rng).unwrap();
        assert_eq!(trainer.kind, NpcKind::Trainer);
        assert_eq!(trainer.type_options, NPC_TYPE_OPTIONS);

        let debris = build(4, &mut rng).unwrap();
        assert_eq!(debris.kind, NpcKind::AttackableStatic);
        assert!(debris.pvp.is_empty());

        assert!(matches!(build(6, &mut rng), Err(SpawnError::UnsupportedFamily(_))));
        assert!(matches!(build(42, &mut rng), Err(SpawnError::UnknownFamily(42))));
        assert_eq!(ids.in_use(), 0);
    }

    #[test]
    fn test_weapon_ids_returned_when_pool_runs_dry() {
        let (_, _, mut rng) = setup();
        let ids = IdPool::with_seed(0, 2, 9);
        let factory = NpcFactory::new(1, false);
        let err = factory
            .create_non_persistent_npc(&ids, &mut rng, &template_row(5), 1, 600, 5, 0)
            .unwrap_err();
        assert!(matches!(err, SpawnError::IdPoolExhausted));
        assert_eq!(ids.in_use(), 0);
    }

    #[test]
    fn test_lair_chain_steps() {
        let (mut world, ids, mut rng) = setup();
        let definition = SpawnDefinition {
            id: 1,
            pos_x: 0.0,
            pos_z: 0.0,
            width: 200,
            height: 200,
            density: 50,
            lair_types: Vec::new(),
        };
        world
            .add_object(WorldObject::Region(SpawnRegion::new(900, &definition, 50)))
            .unwrap();
        let factory = NpcFactory::new(1, false);

        let pending = factory.lair_request(3, 100, 900, 0, Vec3::ground(10.0, 20.0), true, ReadyTarget::NpcManager);
        assert_eq!(pending.sql, LAIR_TEMPLATE_SQL);

        let lair_row = QueryResult::new(vec![vec![
            Value::Integer(2),
            Value::Integer(8),
            Value::Integer(31),
            Value::Integer(6),
            Value::from("object/tangible/lair/shared_lair_womp_rat.iff"),
            Value::from("lair_n"),
            Value::from("womp_rat"),
            Value::from("neutral"),
        ]]);
        let next = match factory.handle_result(&mut world, &ids, &mut rng, pending.query, &lair_row).unwrap() {
            FactoryStep::Next(next) => next,
            other => panic!("unexpected step {other:?}"),
        };
        assert_eq!(next.sql, CREATURE_GROUP_SQL);
        assert_eq!(next.params, vec![Value::Integer(31)]);
        assert_eq!(world.region(900).unwrap().lairs(), &[100]);
        let lair = world.lair(100).unwrap();
        assert_eq!(lair.template_id, 8);
        assert_eq!(lair.ham.health.current, 500);
        assert_eq!(lair.inventory.id, 101);
        assert_eq!(lair.appearance.species, "lair_n");

        let roster = QueryResult::new(vec![vec![Value::Integer(70)], vec![Value::Integer(71)]]);
        let next = match factory.handle_result(&mut world, &ids, &mut rng, next.query, &roster).unwrap() {
            FactoryStep::Next(next) => next,
            other => panic!("unexpected step {other:?}"),
        };
        assert_eq!(next.sql, LAIR_ATTRIBUTES_SQL);
        assert_eq!(next.params, vec![Value::Integer(3)]);
        assert_eq!(world.lair(100).unwrap().roster.len(), 2);

        let attributes = QueryResult::new(vec![vec![
            Value::from("lair_type"),
            Value::from("womp"),
            Value::Integer(1),
        ]]);
        let done = factory
            .handle_result(&mut world, &ids, &mut rng, next.query, &attributes)
            .unwrap();
        assert_eq!(
            done,
            FactoryStep::Ready {
                object_id: 100,
                notify: ReadyTarget::NpcManager
            }
        );
        assert_eq!(world.lair(100).unwrap().load_state, LoadState::Loaded);
    }

    #[test]
    fn test_creature_template_registers_npc() {
        let (mut world, ids, mut rng) = setup();
        let factory = NpcFactory::new(1, false);
        let params = SpawnParams {
            template_id: 77,
            placement: SpawnPlacement {
                position: Vec3::ground(5.0, 6.0),
                first_spawn: true,
                ..SpawnPlacement::default()
            },
            lair_id: 100,
        };
        let pending = factory.creature_request(300, params, ReadyTarget::NpcManager);
        let result = QueryResult::new(vec![template_row(5)]);
        let next = factory
            .handle_result(&mut world, &ids, &mut rng, pending.query, &result)
            .unwrap();
        assert!(matches!(next, FactoryStep::Next(PendingQuery { sql: CREATURE_ATTRIBUTES_SQL, .. })));

        let npc = world.npc(300).unwrap();
        assert_eq!(npc.position, Vec3::ground(5.0, 6.0));
        assert!(npc.placement.first_spawn);
        assert_eq!(npc.lair_id(), Some(100));
    }

    #[test]
    fn test_empty_template_aborts_without_registration() {
        let (mut world, ids, mut rng) = setup();
        let factory = NpcFactory::new(1, false);
        let params = SpawnParams {
            template_id: 77,
            placement: SpawnPlacement::default(),
            lair_id: 0,
        };
        let pending = factory.npc_request(300, params, ReadyTarget::SpawnManager);
        let err = factory
            .handle_result(&mut world, &ids, &mut rng, pending.query, &QueryResult::empty())
            .unwrap_err();
        assert!(matches!(err, SpawnError::MissingData(_)));
        assert!(world.is_empty());
    }
}
