/// Periodic task table driving the spawn core
///
/// The hosting loop calls `due(now)` once per frame and runs each returned
/// task. Tasks fire at most once per call even if several intervals were
/// missed; the next fire time is rebased on `now`.

use serde::Serialize;

/// Periodic work owned by the spawn manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SpawnTask {
    DormantNpcs,
    ReadyNpcs,
    ActiveNpcs,
    GeneralTimers,
    RegionUpdates,
}

#[derive(Debug, Clone)]
struct TaskEntry {
    task: SpawnTask,
    priority: u8,
    interval_ms: u64,
    next_ms: u64,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<TaskEntry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` to fire every `interval_ms`, first at `now + interval`
    ///
    /// Re-adding a task replaces its previous registration.
    pub fn add_task(&mut self, task: SpawnTask, priority: u8, interval_ms: u64, now: u64) {
        self.tasks.retain(|entry| entry.task != task);
        self.tasks.push(TaskEntry {
            task,
            priority,
            interval_ms: interval_ms.max(1),
            next_ms: now + interval_ms.max(1),
        });
        // Stable sort keeps registration order within a priority.
        self.tasks.sort_by_key(|entry| entry.priority);
    }

    pub fn remove_task(&mut self, task: SpawnTask) {
        self.tasks.retain(|entry| entry.task != task);
    }

    /// Tasks due at `now`, lowest priority value first
    pub fn due(&mut self, now: u64) -> Vec<SpawnTask> {
        let mut fired = Vec::new();
        for entry in &mut self.tasks {
            if entry.next_ms <= now {
                fired.push(entry.task);
                entry.next_ms = now + entry.interval_ms;
            }
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_fire_on_their_interval() {
        let mut scheduler = Scheduler::new();
        scheduler.add_task(SpawnTask::ActiveNpcs, 1, 250, 0);
        scheduler.add_task(SpawnTask::ReadyNpcs, 1, 1000, 0);

        assert!(scheduler.due(100).is_empty());
        assert_eq!(scheduler.due(250), vec![SpawnTask::ActiveNpcs]);
        assert!(scheduler.due(400).is_empty());
        assert_eq!(
            scheduler.due(1000),
            vec![SpawnTask::ActiveNpcs, SpawnTask::ReadyNpcs]
        );
    }

    #[test]
    fn test_priority_orders_same_frame_tasks() {
        let mut scheduler = Scheduler::new();
        scheduler.add_task(SpawnTask::GeneralTimers, 5, 10, 0);
        scheduler.add_task(SpawnTask::DormantNpcs, 1, 10, 0);
        assert_eq!(
            scheduler.due(10),
            vec![SpawnTask::DormantNpcs, SpawnTask::GeneralTimers]
        );
    }

    #[test]
    fn test_missed_intervals_fire_once() {
        let mut scheduler = Scheduler::new();
        scheduler.add_task(SpawnTask::RegionUpdates, 1, 100, 0);
        assert_eq!(scheduler.due(1000).len(), 1);
        assert!(scheduler.due(1050).is_empty());
        assert_eq!(scheduler.due(1100).len(), 1);
    }
}
