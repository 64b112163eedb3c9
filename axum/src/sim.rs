//! Simulation thread hosting one zone
//!
//! The spawn manager is single-threaded: it lives on its own OS thread and
//! is driven one frame at a time. HTTP handlers never touch it directly;
//! they send `SimCommand`s over a channel and read the stats snapshot the
//! thread republishes after every frame.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use parking_lot::RwLock;
use tokio::sync::oneshot;

use zone_spawn::db::Database;
use zone_spawn::utility::{IdPool, SystemClock};
use zone_spawn::{LairNpcManager, SpawnError, SpawnManager, SpawnStats, Vec3, ZoneConfig};

pub enum SimCommand {
    UpsertPlayer {
        id: u64,
        position: Vec3,
        parent_id: u64,
        reply: oneshot::Sender<Result<(), SpawnError>>,
    },
    RemovePlayer {
        id: u64,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Cloneable handle used by request handlers
#[derive(Clone)]
pub struct SimClient {
    commands: Sender<SimCommand>,
    stats: Arc<RwLock<SpawnStats>>,
}

impl SimClient {
    pub fn send(&self, command: SimCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn stats(&self) -> SpawnStats {
        self.stats.read().clone()
    }
}

pub struct SimHandle {
    client: SimClient,
    worker: Option<JoinHandle<()>>,
}

impl SimHandle {
    pub fn client(&self) -> SimClient {
        self.client.clone()
    }

    /// Stop the simulation thread and wait for it to exit
    pub fn shutdown(mut self) {
        let _ = self.client.commands.send(SimCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("simulation thread panicked");
            }
        }
    }
}

pub fn spawn(config: ZoneConfig, db: Arc<dyn Database>) -> anyhow::Result<SimHandle> {
    let (tx, rx) = unbounded::<SimCommand>();
    let stats = Arc::new(RwLock::new(SpawnStats::default()));
    let published = stats.clone();

    let worker = thread::Builder::new()
        .name(format!("zone-{}", config.zone_id))
        .spawn(move || run(config, db, rx, published))?;

    Ok(SimHandle {
        client: SimClient { commands: tx, stats },
        worker: Some(worker),
    })
}

fn run(config: ZoneConfig, db: Arc<dyn Database>, rx: Receiver<SimCommand>, stats: Arc<RwLock<SpawnStats>>) {
    let frame = Duration::from_millis(config.frame_ms);
    let ids = Arc::new(IdPool::new(config.np_id_base, config.np_id_range));
    let zone_id = config.zone_id;
    let mut manager = SpawnManager::new(config, db, Arc::new(SystemClock::new()), ids);
    let mut npcs = LairNpcManager::new();

    if let Err(e) = manager.load_spawns() {
        tracing::error!(zone_id, error = %e, "could not request spawn definitions");
    }
    tracing::info!(zone_id, frame_ms = frame.as_millis() as u64, "simulation thread started");

    'frames: loop {
        let started = Instant::now();

        loop {
            match rx.try_recv() {
                Ok(SimCommand::UpsertPlayer {
                    id,
                    position,
                    parent_id,
                    reply,
                }) => {
                    let result = manager.world_mut().upsert_player(id, position, parent_id);
                    let _ = reply.send(result);
                }
                Ok(SimCommand::RemovePlayer { id, reply }) => {
                    let _ = reply.send(manager.world_mut().remove_player(id));
                }
                Ok(SimCommand::Shutdown) | Err(TryRecvError::Disconnected) => break 'frames,
                Err(TryRecvError::Empty) => break,
            }
        }

        manager.process(&mut npcs);
        *stats.write() = manager.stats();

        if let Some(rest) = frame.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    tracing::info!(zone_id, "simulation thread stopped");
}
