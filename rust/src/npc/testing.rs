//! Test doubles for the npc seams

use super::npc_manager::NpcManager;
use super::spawn_manager::SpawnManager;
use crate::world::Vec3;

/// Records every call and answers tier checks with a fixed wait
#[derive(Debug, Default)]
pub struct RecordingNpcManager {
    /// Returned from every `handle_npc`
    pub wait_ms: u64,
    pub handled: Vec<(u64, u64)>,
    pub expired: Vec<u64>,
    pub lairs: Vec<(u64, u64, Vec3)>,
    pub ready: Vec<u64>,
}

impl RecordingNpcManager {
    pub fn with_wait(wait_ms: u64) -> Self {
        Self {
            wait_ms,
            ..Self::default()
        }
    }
}

impl NpcManager for RecordingNpcManager {
    fn handle_npc(&mut self, _manager: &mut SpawnManager, id: u64, overdue_ms: u64) -> u64 {
        self.handled.push((id, overdue_ms));
        self.wait_ms
    }

    fn handle_expired(&mut self, _manager: &mut SpawnManager, id: u64) {
        self.expired.push(id);
    }

    fn spawn_lair(&mut self, _manager: &mut SpawnManager, lairs_id: u64, region_id: u64, point: Vec3) {
        self.lairs.push((lairs_id, region_id, point));
    }

    fn handle_object_ready(&mut self, _manager: &mut SpawnManager, id: u64) {
        self.ready.push(id);
    }
}
