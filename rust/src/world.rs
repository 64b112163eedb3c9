/// Id-keyed object registry for one zone
///
/// The world is the single owner of every live object. Everything else
/// (regions owning lairs, lairs tracking their creatures, queue entries)
/// holds plain ids and resolves them here, tolerating ids that no longer
/// resolve.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::SpawnError;
use crate::npc::entity::Npc;
use crate::npc::lair::Lair;
use crate::npc::spawn_region::SpawnRegion;
use crate::storage::{PlayerPoint, QuadTree, Rect};

/// Position in zone space (y is height)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Point on the ground plane
    pub const fn ground(x: f32, z: f32) -> Self {
        Self { x, y: 0.0, z }
    }

    pub fn distance(&self, other: &Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Rotation about the vertical axis, stored as the (y, w) quaternion pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Heading {
    pub y: f32,
    pub w: f32,
}

impl Default for Heading {
    fn default() -> Self {
        Self { y: 0.0, w: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: u64,
    pub position: Vec3,
    /// Containing cell (building interior); 0 when outdoors
    pub parent_id: u64,
}

/// Every object kind the spawn core registers or observes
#[derive(Debug)]
pub enum WorldObject {
    Player(Player),
    Region(SpawnRegion),
    Lair(Lair),
    Npc(Npc),
}

impl WorldObject {
    pub fn id(&self) -> u64 {
        match self {
            WorldObject::Player(p) => p.id,
            WorldObject::Region(r) => r.id,
            WorldObject::Lair(l) => l.id,
            WorldObject::Npc(n) => n.id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            WorldObject::Player(_) => "player",
            WorldObject::Region(_) => "spawn region",
            WorldObject::Lair(_) => "lair",
            WorldObject::Npc(_) => "npc",
        }
    }

    /// Lairs and npcs are the only objects the activity tiers drive
    pub fn is_creature(&self) -> bool {
        matches!(self, WorldObject::Lair(_) | WorldObject::Npc(_))
    }
}

/// Range queries the spawn core needs from the zone's spatial index
pub trait SpatialIndex {
    fn players_in_rect(&self, rect: &Rect) -> Vec<u64>;
    fn players_in_range(&self, center: Vec3, radius: f32) -> Vec<u64>;
    /// Spatial cell holding (x, z), if inside the zone
    fn cell_at(&self, x: f32, z: f32) -> Option<u32>;
    fn nearest_player_distance(&self, position: Vec3) -> Option<f32>;
}

pub struct World {
    objects: HashMap<u64, WorldObject>,
    players: QuadTree,
}

impl World {
    pub fn new(size: f32) -> Self {
        Self {
            objects: HashMap::new(),
            players: QuadTree::for_zone(size),
        }
    }

    /// Register an object under its own id
    pub fn add_object(&mut self, object: WorldObject) -> Result<(), SpawnError> {
        let id = object.id();
        if self.objects.contains_key(&id) {
            return Err(SpawnError::DuplicateObject(id));
        }
        if let WorldObject::Player(player) = &object {
            let Vec3 { x, z, .. } = player.position;
            if !self.players.insert(PlayerPoint::new(id, x, z)) {
                return Err(SpawnError::OutOfBounds { id, x, z });
            }
        }
        self.objects.insert(id, object);
        Ok(())
    }

    pub fn get(&self, id: u64) -> Option<&WorldObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut WorldObject> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.objects.contains_key(&id)
    }

    /// Remove and return an object; None if it was already gone
    pub fn destroy_object(&mut self, id: u64) -> Option<WorldObject> {
        let object = self.objects.remove(&id)?;
        if matches!(object, WorldObject::Player(_)) {
            self.players.remove(id);
        }
        Some(object)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    // ------------------------------------------------------------------------
    // Typed accessors
    // ------------------------------------------------------------------------

    pub fn region(&self, id: u64) -> Option<&SpawnRegion> {
        match self.objects.get(&id) {
            Some(WorldObject::Region(region)) => Some(region),
            _ => None,
        }
    }

    pub fn region_mut(&mut self, id: u64) -> Option<&mut SpawnRegion> {
        match self.objects.get_mut(&id) {
            Some(WorldObject::Region(region)) => Some(region),
            _ => None,
        }
    }

    pub fn lair(&self, id: u64) -> Option<&Lair> {
        match self.objects.get(&id) {
            Some(WorldObject::Lair(lair)) => Some(lair),
            _ => None,
        }
    }

    pub fn lair_mut(&mut self, id: u64) -> Option<&mut Lair> {
        match self.objects.get_mut(&id) {
            Some(WorldObject::Lair(lair)) => Some(lair),
            _ => None,
        }
    }

    pub fn npc(&self, id: u64) -> Option<&Npc> {
        match self.objects.get(&id) {
            Some(WorldObject::Npc(npc)) => Some(npc),
            _ => None,
        }
    }

    pub fn npc_mut(&mut self, id: u64) -> Option<&mut Npc> {
        match self.objects.get_mut(&id) {
            Some(WorldObject::Npc(npc)) => Some(npc),
            _ => None,
        }
    }

    pub fn player(&self, id: u64) -> Option<&Player> {
        match self.objects.get(&id) {
            Some(WorldObject::Player(player)) => Some(player),
            _ => None,
        }
    }

    /// Ids of every registered spawn region, in ascending order
    pub fn region_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .objects
            .values()
            .filter_map(|object| match object {
                WorldObject::Region(region) => Some(region.id),
                _ => None,
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    /// A region borrowed mutably alongside the player index
    pub fn region_with_index(&mut self, id: u64) -> Option<(&mut SpawnRegion, &dyn SpatialIndex)> {
        let index: &dyn SpatialIndex = &self.players;
        match self.objects.get_mut(&id) {
            Some(WorldObject::Region(region)) => Some((region, index)),
            _ => None,
        }
    }

    pub fn objects(&self) -> impl Iterator<Item = &WorldObject> {
        self.objects.values()
    }

    pub fn regions(&self) -> impl Iterator<Item = &SpawnRegion> {
        self.objects.values().filter_map(|object| match object {
            WorldObject::Region(region) => Some(region),
            _ => None,
        })
    }

    /// Current position of a lair or npc
    pub fn creature_position(&self, id: u64) -> Option<Vec3> {
        match self.objects.get(&id)? {
            WorldObject::Lair(lair) => Some(lair.position),
            WorldObject::Npc(npc) => Some(npc.position),
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------------

    /// Place a player, or move one that is already in the zone
    ///
    /// A position outside the zone is refused and leaves the player where it was.
    pub fn upsert_player(&mut self, id: u64, position: Vec3, parent_id: u64) -> Result<(), SpawnError> {
        if !self.players.bounds().contains_point(position.x, position.z) {
            return Err(SpawnError::OutOfBounds {
                id,
                x: position.x,
                z: position.z,
            });
        }
        match self.objects.get_mut(&id) {
            Some(WorldObject::Player(player)) => {
                player.position = position;
                player.parent_id = parent_id;
                self.players.update(PlayerPoint::new(id, position.x, position.z));
                Ok(())
            }
            Some(other) => Err(SpawnError::WrongObjectType {
                id,
                expected: "player",
                found: other.kind_name(),
            }),
            None => self.add_object(WorldObject::Player(Player {
                id,
                position,
                parent_id,
            })),
        }
    }

    pub fn remove_player(&mut self, id: u64) -> bool {
        if self.player(id).is_none() {
            return false;
        }
        self.destroy_object(id).is_some()
    }

    pub fn player_count(&self) -> usize {
        self.players.count()
    }
}

impl SpatialIndex for QuadTree {
    fn players_in_rect(&self, rect: &Rect) -> Vec<u64> {
        let mut found = Vec::new();
        self.query_rect(rect, &mut found);
        found.into_iter().map(|p| p.id).collect()
    }

    fn players_in_range(&self, center: Vec3, radius: f32) -> Vec<u64> {
        let mut found = Vec::new();
        self.query_radius(center.x, center.z, radius, &mut found);
        found.into_iter().map(|p| p.id).collect()
    }

    fn cell_at(&self, x: f32, z: f32) -> Option<u32> {
        QuadTree::cell_at(self, x, z)
    }

    fn nearest_player_distance(&self, position: Vec3) -> Option<f32> {
        self.find_nearest(position.x, position.z).map(|p| {
            let dx = p.x - position.x;
            let dz = p.z - position.z;
            (dx * dx + dz * dz).sqrt()
        })
    }
}

impl SpatialIndex for World {
    fn players_in_rect(&self, rect: &Rect) -> Vec<u64> {
        self.players.players_in_rect(rect)
    }

    fn players_in_range(&self, center: Vec3, radius: f32) -> Vec<u64> {
        self.players.players_in_range(center, radius)
    }

    fn cell_at(&self, x: f32, z: f32) -> Option<u32> {
        SpatialIndex::cell_at(&self.players, x, z)
    }

    fn nearest_player_distance(&self, position: Vec3) -> Option<f32> {
        self.players.nearest_player_distance(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut world = World::new(1000.0);
        world.upsert_player(1, Vec3::ground(0.0, 0.0), 0).unwrap();
        let err = world
            .add_object(WorldObject::Player(Player {
                id: 1,
                position: Vec3::default(),
                parent_id: 0,
            }))
            .unwrap_err();
        assert!(matches!(err, SpawnError::DuplicateObject(1)));
    }

    #[test]
    fn test_player_outside_zone_is_refused() {
        let mut world = World::new(1000.0);
        let err = world.upsert_player(3, Vec3::ground(900.0, 0.0), 0).unwrap_err();
        assert!(matches!(err, SpawnError::OutOfBounds { id: 3, .. }));
        assert!(world.player(3).is_none());
        assert_eq!(world.player_count(), 0);

        world.upsert_player(3, Vec3::ground(10.0, 10.0), 0).unwrap();
        assert!(world.upsert_player(3, Vec3::ground(-600.0, 10.0), 0).is_err());
        assert_eq!(world.player(3).map(|p| p.position), Some(Vec3::ground(10.0, 10.0)));
        assert_eq!(world.players_in_range(Vec3::ground(10.0, 10.0), 1.0), vec![3]);
    }

    #[test]
    fn test_player_moves_follow_spatial_index() {
        let mut world = World::new(1000.0);
        world.upsert_player(7, Vec3::ground(10.0, 10.0), 0).unwrap();
        assert_eq!(world.players_in_range(Vec3::ground(0.0, 0.0), 20.0), vec![7]);

        world.upsert_player(7, Vec3::ground(300.0, 300.0), 0).unwrap();
        assert!(world.players_in_range(Vec3::ground(0.0, 0.0), 20.0).is_empty());
        assert_eq!(
            world.players_in_rect(&Rect::new(250.0, 250.0, 100.0, 100.0)),
            vec![7]
        );

        assert!(world.remove_player(7));
        assert!(!world.remove_player(7));
        assert_eq!(world.player_count(), 0);
        assert!(world.is_empty());
    }

    #[test]
    fn test_nearest_player_distance() {
        let mut world = World::new(1000.0);
        assert_eq!(world.nearest_player_distance(Vec3::default()), None);
        world.upsert_player(1, Vec3::ground(30.0, 40.0), 0).unwrap();
        assert_eq!(world.nearest_player_distance(Vec3::default()), Some(50.0));
    }
}
