use std::collections::BTreeMap;
use std::fmt;

/// Which entity a repeating tick belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    Alarms,
    Timer(String),
    Stopwatch,
    WorldClock(String),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Alarms => write!(f, "alarms"),
            EntityKey::Timer(id) => write!(f, "timer:{id}"),
            EntityKey::Stopwatch => write!(f, "stopwatch"),
            EntityKey::WorldClock(id) => write!(f, "worldclock:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickHandle {
    pub cadence_ms: u64,
    pub next_due_ms: i64,
    pub generation: u64,
}

/// One repeating tick per active entity. Starting replaces, cancelling
/// removes the handle outright so nothing stale can fire later.
#[derive(Debug, Default)]
pub struct TickScheduler {
    handles: BTreeMap<EntityKey, TickHandle>,
    next_generation: u64,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, key: EntityKey, cadence_ms: u64, now_ms: i64) -> u64 {
        let cadence_ms = cadence_ms.max(1);
        self.next_generation += 1;
        let generation = self.next_generation;
        let handle = TickHandle {
            cadence_ms,
            next_due_ms: now_ms.saturating_add(cadence_ms_i64(cadence_ms)),
            generation,
        };
        if let Some(previous) = self.handles.insert(key.clone(), handle) {
            tracing::trace!(%key, old_cadence = previous.cadence_ms, cadence_ms, "tick restarted");
        } else {
            tracing::trace!(%key, cadence_ms, "tick started");
        }
        generation
    }

    pub fn cancel(&mut self, key: &EntityKey) -> bool {
        let removed = self.handles.remove(key).is_some();
        if removed {
            tracing::trace!(%key, "tick cancelled");
        }
        removed
    }

    pub fn is_active(&self, key: &EntityKey) -> bool {
        self.handles.contains_key(key)
    }

    pub fn is_current(&self, key: &EntityKey, generation: u64) -> bool {
        self.handles
            .get(key)
            .map(|handle| handle.generation == generation)
            .unwrap_or(false)
    }

    pub fn cadence(&self, key: &EntityKey) -> Option<u64> {
        self.handles.get(key).map(|handle| handle.cadence_ms)
    }

    pub fn handle(&self, key: &EntityKey) -> Option<&TickHandle> {
        self.handles.get(key)
    }

    /// Due ticks ordered by deadline, ties broken by key.
    pub fn due(&self, now_ms: i64) -> Vec<(EntityKey, u64)> {
        let mut due = self
            .handles
            .iter()
            .filter(|(_, handle)| handle.next_due_ms <= now_ms)
            .map(|(key, handle)| (handle.next_due_ms, key.clone(), handle.generation))
            .collect::<Vec<_>>();
        due.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        due.into_iter()
            .map(|(_, key, generation)| (key, generation))
            .collect()
    }

    /// Re-arms a fired tick. Missed periods are skipped rather than replayed.
    pub fn complete(&mut self, key: &EntityKey, generation: u64, now_ms: i64) {
        let Some(handle) = self.handles.get_mut(key) else {
            return;
        };
        if handle.generation != generation {
            return;
        }
        let cadence = cadence_ms_i64(handle.cadence_ms);
        if handle.next_due_ms <= now_ms {
            let behind = now_ms - handle.next_due_ms;
            let skipped = behind.div_euclid(cadence) + 1;
            handle.next_due_ms = handle
                .next_due_ms
                .saturating_add(skipped.saturating_mul(cadence));
        }
    }

    pub fn next_deadline(&self) -> Option<i64> {
        self.handles.values().map(|handle| handle.next_due_ms).min()
    }

    pub fn active_keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.handles.keys()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

fn cadence_ms_i64(cadence_ms: u64) -> i64 {
    i64::try_from(cadence_ms).unwrap_or(i64::MAX)
}
