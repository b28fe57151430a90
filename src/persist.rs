use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::alarm::model::{Alarm, AlarmOrigin, AlarmRecord, default_alarms};
use crate::config::EngineConfig;
use crate::stopwatch::{Stopwatch, StopwatchRecord};
use crate::storage::{
    DEFAULT_ALARMS_ORDER_SLOT, DEFAULT_TIMERS_ORDER_SLOT, STOPWATCH_SLOT, Storage,
    USER_ALARMS_SLOT, USER_TIMERS_SLOT, WORLD_CLOCKS_SLOT,
};
use crate::timer::model::{Timer, TimerOrigin, TimerRecord, default_timers};
use crate::worldclock::{WorldClock, WorldClockRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus {
    Missing,
    Valid(usize),
    Malformed(String),
}

pub fn inspect_slot(storage: &dyn Storage, slot: &str) -> SlotStatus {
    let text = match storage.get(slot) {
        Ok(Some(text)) => text,
        Ok(None) => return SlotStatus::Missing,
        Err(err) => return SlotStatus::Malformed(format!("{err:#}")),
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Array(items)) => SlotStatus::Valid(items.len()),
        Ok(Value::Object(_)) => SlotStatus::Valid(1),
        Ok(_) => SlotStatus::Malformed("expected a JSON array or object".to_string()),
        Err(err) => SlotStatus::Malformed(format!(
            "invalid JSON at line {}, column {}",
            err.line(),
            err.column()
        )),
    }
}

fn read_slot(storage: &dyn Storage, slot: &str) -> Option<Value> {
    let text = match storage.get(slot) {
        Ok(Some(text)) => text,
        Ok(None) => return None,
        Err(err) => {
            tracing::warn!(slot, error = %format!("{err:#}"), "unable to read slot, starting empty");
            return None;
        }
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(slot, error = %err, "malformed slot, starting empty");
            None
        }
    }
}

/// Reads an array slot record by record. Records that fail to parse are
/// skipped; a slot that is not an array yields nothing.
pub fn load_records<R: DeserializeOwned>(storage: &dyn Storage, slot: &str) -> Vec<R> {
    let Some(value) = read_slot(storage, slot) else {
        return Vec::new();
    };
    let Value::Array(items) = value else {
        tracing::warn!(slot, "slot is not a JSON array, starting empty");
        return Vec::new();
    };
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<R>(item) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(slot, index, error = %err, "skipping malformed record");
                None
            }
        })
        .collect()
}

fn write_slot<T: Serialize + ?Sized>(storage: &dyn Storage, slot: &str, value: &T) -> Result<()> {
    let text = serde_json::to_string(value)?;
    storage.set(slot, &text)
}

/// Seeded defaults first, in their persisted order, then user alarms.
pub fn load_alarms(storage: &dyn Storage, config: &EngineConfig) -> Vec<Alarm> {
    let sound = config.default_sound.as_str();
    let mut seen = HashSet::new();
    let mut alarms = Vec::new();

    if config.seed_defaults {
        let records = load_records::<AlarmRecord>(storage, DEFAULT_ALARMS_ORDER_SLOT)
            .into_iter()
            .map(|record| record.into_alarm(sound))
            .collect::<Vec<_>>();
        for alarm in merge_seeded(default_alarms(sound), records, |a| &a.id, |seed, saved| {
            seed.title = saved.title;
            seed.hour = saved.hour;
            seed.minute = saved.minute;
            seed.sound = saved.sound;
            seed.enabled = saved.enabled;
            seed.is_ringing = saved.is_ringing;
            seed.last_rung_slot = saved.last_rung_slot;
        }) {
            seen.insert(alarm.id.clone());
            alarms.push(alarm);
        }
    }

    for record in load_records::<AlarmRecord>(storage, USER_ALARMS_SLOT) {
        let mut alarm = record.into_alarm(sound);
        alarm.origin = AlarmOrigin::User;
        if !seen.insert(alarm.id.clone()) {
            tracing::warn!(id = %alarm.id, "skipping duplicate alarm id");
            continue;
        }
        alarms.push(alarm);
    }
    alarms
}

pub fn save_alarms(storage: &dyn Storage, alarms: &[Alarm]) -> Result<()> {
    let (defaults, users): (Vec<&Alarm>, Vec<&Alarm>) =
        alarms.iter().partition(|alarm| alarm.is_default());
    let users = users
        .into_iter()
        .map(AlarmRecord::from_alarm)
        .collect::<Vec<_>>();
    let defaults = defaults
        .into_iter()
        .map(AlarmRecord::from_alarm)
        .collect::<Vec<_>>();
    write_slot(storage, USER_ALARMS_SLOT, &users)?;
    write_slot(storage, DEFAULT_ALARMS_ORDER_SLOT, &defaults)
}

/// Stored fields only; running timers are reconstructed by the engine.
pub fn load_timers(storage: &dyn Storage, config: &EngineConfig) -> Vec<Timer> {
    let sound = config.default_sound.as_str();
    let mut seen = HashSet::new();
    let mut timers = Vec::new();

    if config.seed_defaults {
        let records = load_records::<TimerRecord>(storage, DEFAULT_TIMERS_ORDER_SLOT)
            .into_iter()
            .filter_map(|record| record.into_timer(sound))
            .collect::<Vec<_>>();
        for timer in merge_seeded(default_timers(sound), records, |t| &t.id, |seed, saved| {
            let origin = seed.origin;
            *seed = saved;
            seed.origin = origin;
        }) {
            seen.insert(timer.id.clone());
            timers.push(timer);
        }
    }

    for record in load_records::<TimerRecord>(storage, USER_TIMERS_SLOT) {
        let id = record.id.clone();
        let Some(mut timer) = record.into_timer(sound) else {
            tracing::warn!(%id, "skipping timer with inconsistent fields");
            continue;
        };
        timer.origin = TimerOrigin::User;
        if !seen.insert(timer.id.clone()) {
            tracing::warn!(id = %timer.id, "skipping duplicate timer id");
            continue;
        }
        timers.push(timer);
    }
    timers
}

pub fn save_timers(storage: &dyn Storage, timers: &[Timer]) -> Result<()> {
    let (defaults, users): (Vec<&Timer>, Vec<&Timer>) = timers
        .iter()
        .partition(|timer| timer.origin == TimerOrigin::Default);
    let users = users
        .into_iter()
        .map(TimerRecord::from_timer)
        .collect::<Vec<_>>();
    let defaults = defaults
        .into_iter()
        .map(TimerRecord::from_timer)
        .collect::<Vec<_>>();
    write_slot(storage, USER_TIMERS_SLOT, &users)?;
    write_slot(storage, DEFAULT_TIMERS_ORDER_SLOT, &defaults)
}

pub fn load_stopwatch(storage: &dyn Storage, lap_cap: usize, now_ms: i64) -> Stopwatch {
    let Some(value) = read_slot(storage, STOPWATCH_SLOT) else {
        return Stopwatch::new(lap_cap);
    };
    match serde_json::from_value::<StopwatchRecord>(value) {
        Ok(record) => Stopwatch::from_record(record, lap_cap, now_ms),
        Err(err) => {
            tracing::warn!(error = %err, "malformed stopwatch state, starting idle");
            Stopwatch::new(lap_cap)
        }
    }
}

pub fn save_stopwatch(storage: &dyn Storage, stopwatch: &Stopwatch) -> Result<()> {
    write_slot(storage, STOPWATCH_SLOT, &stopwatch.to_record())
}

pub fn load_world_clocks(storage: &dyn Storage) -> Vec<WorldClock> {
    let mut seen = HashSet::new();
    load_records::<WorldClockRecord>(storage, WORLD_CLOCKS_SLOT)
        .into_iter()
        .filter(|record| seen.insert(record.id.clone()))
        .map(WorldClock::from_record)
        .collect()
}

pub fn save_world_clocks(storage: &dyn Storage, clocks: &[WorldClock]) -> Result<()> {
    let records = clocks
        .iter()
        .map(WorldClock::to_record)
        .collect::<Vec<_>>();
    write_slot(storage, WORLD_CLOCKS_SLOT, &records)
}

/// Orders code-seeded entries by the saved sequence and applies the saved
/// edits. Saved ids with no seed are dropped; unsaved seeds go last.
fn merge_seeded<T>(
    seeds: Vec<T>,
    saved: Vec<T>,
    id_of: impl Fn(&T) -> &String,
    apply: impl Fn(&mut T, T),
) -> Vec<T> {
    let mut pending = seeds.into_iter().map(Some).collect::<Vec<_>>();
    let mut merged = Vec::with_capacity(pending.len());
    for entry in saved {
        let slot = pending
            .iter_mut()
            .find(|candidate| matches!(candidate, Some(seed) if id_of(seed) == id_of(&entry)));
        if let Some(slot) = slot
            && let Some(mut seed) = slot.take()
        {
            apply(&mut seed, entry);
            merged.push(seed);
        }
    }
    merged.extend(pending.into_iter().flatten());
    merged
}
