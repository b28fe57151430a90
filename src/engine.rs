use std::sync::Arc;

use crate::alarm::model::{Alarm, AlarmDraft, AlarmOrigin, normalize_hour_minute};
use crate::alarm::scheduler::{AlarmBook, AlarmState};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::limits::{ToolKind, check_capacity};
use crate::notify::{Category, EventKey, Notification, Notifier, SoundPlayer, play_or_log};
use crate::persist;
use crate::stopwatch::{DisplayFormat, Lap, LapError, Stopwatch};
use crate::storage::Storage;
use crate::tick::{EntityKey, TickScheduler};
use crate::timer::machine::{self, TimerBook, Transition};
use crate::timer::model::{Timer, TimerDraft, TimerState};
use crate::worldclock::WorldClock;

/// External collaborators the engine talks to.
pub struct Collaborators {
    pub storage: Box<dyn Storage>,
    pub notifier: Box<dyn Notifier>,
    pub sound: Box<dyn SoundPlayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fired: Vec<EntityKey>,
    pub alarms_ringing: Vec<String>,
    pub timers_expired: Vec<String>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }
}

/// Owns every entity collection plus the tick scheduler. All mutations,
/// including the ones that span several records, go through `&mut self`.
pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    storage: Box<dyn Storage>,
    notifier: Box<dyn Notifier>,
    sound: Box<dyn SoundPlayer>,
    ticks: TickScheduler,
    alarms: AlarmBook,
    timers: TimerBook,
    stopwatch: Stopwatch,
    world_clocks: Vec<WorldClock>,
    next_id: u64,
}

impl Engine {
    /// Restores every collection from storage and restarts the ticks of
    /// entities that were running when they were saved.
    pub fn load(config: EngineConfig, clock: Arc<dyn Clock>, parts: Collaborators) -> Self {
        let now_ms = clock.now_ms();
        let storage = parts.storage;
        let alarms = persist::load_alarms(storage.as_ref(), &config);
        let timers = persist::load_timers(storage.as_ref(), &config);
        let stopwatch = persist::load_stopwatch(storage.as_ref(), config.limits.laps, now_ms);
        let world_clocks = persist::load_world_clocks(storage.as_ref());

        let mut engine = Self {
            config,
            clock,
            storage,
            notifier: parts.notifier,
            sound: parts.sound,
            ticks: TickScheduler::new(),
            alarms: AlarmBook::new(alarms),
            timers: TimerBook::new(timers),
            stopwatch,
            world_clocks,
            next_id: 1,
        };
        engine.reconstruct(now_ms);
        tracing::debug!(
            alarms = engine.alarms.len(),
            timers = engine.timers.len(),
            world_clocks = engine.world_clocks.len(),
            ticks = engine.ticks.len(),
            "engine loaded"
        );
        engine
    }

    fn reconstruct(&mut self, now_ms: i64) {
        for id in self.alarms.ringing_ids() {
            if let Some(alarm) = self.alarms.get(&id) {
                play_or_log(self.sound.as_ref(), &alarm.sound);
            }
        }
        self.sync_alarm_tick(now_ms);

        let mut expired = Vec::new();
        for id in self.timers.running_ids() {
            let Ok(timer) = self.timers.get_mut(&id) else {
                continue;
            };
            match machine::recompute(timer, now_ms) {
                Transition::Expired => expired.push(id),
                _ => {
                    self.ticks
                        .start(EntityKey::Timer(id), self.config.cadence.timer_ms, now_ms);
                }
            }
        }
        for id in &expired {
            self.announce_timer_expired(id);
        }
        if !expired.is_empty() {
            self.persist_timers();
        }

        if self.stopwatch.is_running() {
            self.ticks.start(
                EntityKey::Stopwatch,
                self.stopwatch.tick_cadence_ms(),
                now_ms,
            );
        }

        for index in 0..self.world_clocks.len() {
            let clock = &mut self.world_clocks[index];
            if clock.is_valid() {
                clock.refresh(now_ms);
                let key = EntityKey::WorldClock(clock.id.clone());
                self.ticks
                    .start(key, self.config.cadence.world_clock_ms, now_ms);
            }
        }
    }

    /// Fires every due tick. Each entity's recomputation and any resulting
    /// transition finish before the next tick is looked at.
    pub fn pump(&mut self) -> TickReport {
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();
        let mut report = TickReport::default();
        for (key, generation) in self.ticks.due(now_ms) {
            if !self.ticks.is_current(&key, generation) {
                continue;
            }
            match &key {
                EntityKey::Alarms => {
                    let started = self.alarms.evaluate(now);
                    for id in &started {
                        self.announce_alarm_ringing(id);
                    }
                    if !started.is_empty() {
                        self.persist_alarms();
                    }
                    report.alarms_ringing.extend(started);
                }
                EntityKey::Timer(id) => {
                    let transition = match self.timers.get_mut(id) {
                        Ok(timer) => machine::recompute(timer, now_ms),
                        Err(_) => {
                            self.ticks.cancel(&key);
                            continue;
                        }
                    };
                    if transition == Transition::Expired {
                        self.ticks.cancel(&key);
                        self.announce_timer_expired(id);
                        self.persist_timers();
                        report.timers_expired.push(id.clone());
                    }
                }
                EntityKey::Stopwatch => {
                    if !self.stopwatch.is_running() {
                        self.ticks.cancel(&key);
                        continue;
                    }
                }
                EntityKey::WorldClock(id) => {
                    let refreshed = self
                        .world_clocks
                        .iter_mut()
                        .find(|clock| &clock.id == id)
                        .and_then(|clock| clock.refresh(now_ms));
                    if refreshed.is_none() {
                        self.ticks.cancel(&key);
                        continue;
                    }
                }
            }
            self.ticks.complete(&key, generation, now_ms);
            report.fired.push(key);
        }
        report
    }

    pub fn next_tick_deadline_ms(&self) -> Option<i64> {
        self.ticks.next_deadline()
    }

    // ---- alarms ----

    pub fn add_alarm(&mut self, draft: AlarmDraft) -> Result<String, EngineError> {
        if self.config.rules.block_alarm_creation_while_ringing && self.alarms.any_ringing() {
            return Err(EngineError::CreationBlocked {
                tool: ToolKind::Alarm,
                reason: "an alarm is ringing",
            });
        }
        self.enforce_capacity(ToolKind::Alarm, self.alarms.len())?;

        let (hour, minute) = normalize_hour_minute(draft.hour, draft.minute);
        let id = self.generate_id("alarm", |engine, id| engine.alarms.contains(id));
        let alarm = Alarm {
            id: id.clone(),
            title: draft.title.trim().to_string(),
            hour,
            minute,
            sound: self.sound_or_default(draft.sound.as_deref()),
            enabled: true,
            origin: AlarmOrigin::User,
            is_ringing: false,
            last_rung_slot: None,
        };
        self.alarms.insert(alarm);
        self.sync_alarm_tick(self.clock.now_ms());
        self.persist_alarms();
        self.notify(Notification::new(Category::Alarm, EventKey::Created).with("id", id.as_str()));
        Ok(id)
    }

    pub fn update_alarm(&mut self, id: &str, draft: AlarmDraft) -> Result<(), EngineError> {
        self.alarms.edit(id, &draft)?;
        self.persist_alarms();
        self.notify(Notification::new(Category::Alarm, EventKey::Updated).with("id", id));
        Ok(())
    }

    pub fn delete_alarm(&mut self, id: &str) -> Result<(), EngineError> {
        self.alarms.remove(id)?;
        self.sync_alarm_tick(self.clock.now_ms());
        self.persist_alarms();
        self.notify(Notification::new(Category::Alarm, EventKey::Deleted).with("id", id));
        Ok(())
    }

    pub fn set_alarm_enabled(&mut self, id: &str, enabled: bool) -> Result<AlarmState, EngineError> {
        let state = self.alarms.set_enabled(id, enabled)?;
        self.sync_alarm_tick(self.clock.now_ms());
        self.persist_alarms();
        self.notify(Notification::new(Category::Alarm, EventKey::Updated).with("id", id));
        Ok(state)
    }

    pub fn dismiss_alarm(&mut self, id: &str) -> Result<bool, EngineError> {
        let dismissed = self.alarms.dismiss(id)?;
        if dismissed {
            self.persist_alarms();
            self.notify(
                Notification::new(Category::Alarm, EventKey::Updated)
                    .with("id", id)
                    .with("state", "armed"),
            );
        }
        Ok(dismissed)
    }

    pub fn reorder_alarms(&mut self, ids: &[String]) {
        self.alarms.reorder(ids);
        self.persist_alarms();
    }

    fn sync_alarm_tick(&mut self, now_ms: i64) {
        let active = self.ticks.is_active(&EntityKey::Alarms);
        if self.alarms.any_enabled() {
            if !active {
                self.ticks
                    .start(EntityKey::Alarms, self.config.cadence.alarm_ms, now_ms);
            }
        } else if active {
            self.ticks.cancel(&EntityKey::Alarms);
        }
    }

    fn announce_alarm_ringing(&self, id: &str) {
        let Some(alarm) = self.alarms.get(id) else {
            return;
        };
        tracing::info!(id, hour = alarm.hour, minute = alarm.minute, "alarm ringing");
        play_or_log(self.sound.as_ref(), &alarm.sound);
        self.notify(
            Notification::new(Category::Alarm, EventKey::Ringing)
                .with("id", id)
                .with("title", alarm.title.as_str())
                .with("time", format!("{:02}:{:02}", alarm.hour, alarm.minute)),
        );
    }

    // ---- timers ----

    pub fn add_timer(&mut self, draft: TimerDraft) -> Result<String, EngineError> {
        if self.config.rules.block_timer_creation_while_expired && self.timers.any_expired() {
            return Err(EngineError::CreationBlocked {
                tool: ToolKind::Timer,
                reason: "a timer has expired",
            });
        }
        self.enforce_capacity(ToolKind::Timer, self.timers.len())?;

        let now_ms = self.clock.now_ms();
        let id = self.generate_id("timer", |engine, id| engine.timers.contains(id));
        let sound = self.config.default_sound.clone();
        let timer = machine::timer_from_draft(id.clone(), &draft, now_ms, &sound)?;
        self.timers.insert(timer);
        self.notify(Notification::new(Category::Timer, EventKey::Created).with("id", id.as_str()));
        if draft.start_immediately {
            self.start_timer(&id)?;
        } else {
            self.persist_timers();
        }
        Ok(id)
    }

    pub fn update_timer(&mut self, id: &str, draft: TimerDraft) -> Result<(), EngineError> {
        let now_ms = self.clock.now_ms();
        let timer = self.timers.get_mut(id)?;
        machine::apply_draft(timer, &draft, now_ms)?;
        self.ticks.cancel(&EntityKey::Timer(id.to_string()));
        self.persist_timers();
        self.notify(Notification::new(Category::Timer, EventKey::Updated).with("id", id));
        Ok(())
    }

    pub fn delete_timer(&mut self, id: &str) -> Result<(), EngineError> {
        self.timers.remove(id)?;
        self.ticks.cancel(&EntityKey::Timer(id.to_string()));
        self.persist_timers();
        self.notify(Notification::new(Category::Timer, EventKey::Deleted).with("id", id));
        Ok(())
    }

    pub fn start_timer(&mut self, id: &str) -> Result<TimerState, EngineError> {
        let now_ms = self.clock.now_ms();
        let timer = self.timers.get_mut(id)?;
        let transition = machine::start(timer, now_ms);
        let state = timer.state;
        let key = EntityKey::Timer(id.to_string());
        match transition {
            Transition::Unchanged => return Ok(state),
            Transition::Changed => {
                self.ticks.start(key, self.config.cadence.timer_ms, now_ms);
            }
            Transition::Expired => {
                self.ticks.cancel(&key);
                self.announce_timer_expired(id);
            }
        }
        self.persist_timers();
        Ok(state)
    }

    pub fn pause_timer(&mut self, id: &str) -> Result<TimerState, EngineError> {
        let now_ms = self.clock.now_ms();
        let timer = self.timers.get_mut(id)?;
        let transition = machine::pause(timer, now_ms);
        let state = timer.state;
        if transition == Transition::Unchanged {
            return Ok(state);
        }
        self.ticks.cancel(&EntityKey::Timer(id.to_string()));
        if transition == Transition::Expired {
            self.announce_timer_expired(id);
        }
        self.persist_timers();
        Ok(state)
    }

    pub fn reset_timer(&mut self, id: &str) -> Result<TimerState, EngineError> {
        let timer = self.timers.get_mut(id)?;
        let transition = machine::reset(timer);
        self.ticks.cancel(&EntityKey::Timer(id.to_string()));
        if transition == Transition::Changed {
            self.persist_timers();
        }
        Ok(TimerState::Idle)
    }

    pub fn pin_timer(&mut self, id: &str) -> Result<(), EngineError> {
        let previous = self.timers.pin(id)?;
        if let Some(previous) = previous {
            tracing::debug!(id, %previous, "pin moved");
        }
        self.persist_timers();
        Ok(())
    }

    pub fn unpin_timer(&mut self, id: &str) -> Result<bool, EngineError> {
        let was_pinned = self.timers.unpin(id)?;
        if was_pinned {
            self.persist_timers();
        }
        Ok(was_pinned)
    }

    pub fn reorder_timers(&mut self, ids: &[String]) {
        self.timers.reorder(ids);
        self.persist_timers();
    }

    fn announce_timer_expired(&self, id: &str) {
        let Some(timer) = self.timers.get(id) else {
            return;
        };
        tracing::info!(id, "timer expired");
        play_or_log(self.sound.as_ref(), &timer.sound);
        self.notify(
            Notification::new(Category::Timer, EventKey::Ringing)
                .with("id", id)
                .with("title", timer.title.as_str()),
        );
    }

    // ---- stopwatch ----

    pub fn start_stopwatch(&mut self) -> bool {
        let now_ms = self.clock.now_ms();
        if !self.stopwatch.start(now_ms) {
            return false;
        }
        self.ticks.start(
            EntityKey::Stopwatch,
            self.stopwatch.tick_cadence_ms(),
            now_ms,
        );
        self.persist_stopwatch();
        true
    }

    pub fn stop_stopwatch(&mut self) -> bool {
        let now_ms = self.clock.now_ms();
        if !self.stopwatch.stop(now_ms) {
            return false;
        }
        self.ticks.cancel(&EntityKey::Stopwatch);
        self.persist_stopwatch();
        true
    }

    pub fn reset_stopwatch(&mut self) -> bool {
        self.ticks.cancel(&EntityKey::Stopwatch);
        let changed = self.stopwatch.reset();
        if changed {
            self.persist_stopwatch();
        }
        changed
    }

    pub fn lap(&mut self) -> Result<Lap, EngineError> {
        let now_ms = self.clock.now_ms();
        match self.stopwatch.lap(now_ms) {
            Ok(lap) => {
                self.persist_stopwatch();
                Ok(lap)
            }
            Err(LapError::NotRunning) => Err(EngineError::StopwatchNotRunning),
            Err(LapError::CapReached { cap }) => {
                self.notify_limit(ToolKind::Stopwatch, cap);
                Err(EngineError::LimitReached {
                    tool: ToolKind::Stopwatch,
                    limit: cap,
                })
            }
        }
    }

    /// Switching format re-derives the tick cadence only; elapsed time is
    /// untouched.
    pub fn set_stopwatch_format(&mut self, format: DisplayFormat) -> bool {
        if !self.stopwatch.set_format(format) {
            return false;
        }
        if self.stopwatch.is_running() {
            self.ticks.start(
                EntityKey::Stopwatch,
                self.stopwatch.tick_cadence_ms(),
                self.clock.now_ms(),
            );
        }
        self.persist_stopwatch();
        true
    }

    // ---- world clocks ----

    pub fn add_world_clock(&mut self, title: &str, timezone: &str) -> Result<String, EngineError> {
        self.enforce_capacity(ToolKind::WorldClock, self.world_clocks.len())?;
        let id = self.generate_id("clock", |engine, id| {
            engine.world_clocks.iter().any(|clock| clock.id == id)
        });
        let mut clock = WorldClock::new(id.clone(), title, timezone)?;
        let now_ms = self.clock.now_ms();
        clock.refresh(now_ms);
        self.world_clocks.push(clock);
        self.ticks.start(
            EntityKey::WorldClock(id.clone()),
            self.config.cadence.world_clock_ms,
            now_ms,
        );
        self.persist_world_clocks();
        self.notify(
            Notification::new(Category::Worldclock, EventKey::Created).with("id", id.as_str()),
        );
        Ok(id)
    }

    pub fn delete_world_clock(&mut self, id: &str) -> Result<(), EngineError> {
        let index = self
            .world_clocks
            .iter()
            .position(|clock| clock.id == id)
            .ok_or_else(|| EngineError::not_found(ToolKind::WorldClock, id))?;
        self.world_clocks.remove(index);
        self.ticks.cancel(&EntityKey::WorldClock(id.to_string()));
        self.persist_world_clocks();
        self.notify(Notification::new(Category::Worldclock, EventKey::Deleted).with("id", id));
        Ok(())
    }

    pub fn reorder_world_clocks(&mut self, ids: &[String]) {
        crate::alarm::scheduler::reorder_by_ids(&mut self.world_clocks, ids, |clock| &clock.id);
        self.persist_world_clocks();
    }

    // ---- accessors ----

    pub fn alarms(&self) -> &[Alarm] {
        self.alarms.alarms()
    }

    pub fn alarm(&self, id: &str) -> Option<&Alarm> {
        self.alarms.get(id)
    }

    pub fn timers(&self) -> &[Timer] {
        self.timers.timers()
    }

    pub fn timer(&self, id: &str) -> Option<&Timer> {
        self.timers.get(id)
    }

    pub fn pinned_timer(&self) -> Option<&Timer> {
        self.timers.pinned()
    }

    pub fn stopwatch(&self) -> &Stopwatch {
        &self.stopwatch
    }

    pub fn world_clocks(&self) -> &[WorldClock] {
        &self.world_clocks
    }

    pub fn ticks(&self) -> &TickScheduler {
        &self.ticks
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    // ---- shared plumbing ----

    fn enforce_capacity(&self, tool: ToolKind, count: usize) -> Result<(), EngineError> {
        let result = check_capacity(tool, count, &self.config.limits);
        if let Err(EngineError::LimitReached { tool, limit }) = &result {
            self.notify_limit(*tool, *limit);
        }
        result
    }

    fn notify_limit(&self, tool: ToolKind, limit: usize) {
        let category = match tool {
            ToolKind::Alarm => Category::Alarm,
            ToolKind::Timer => Category::Timer,
            ToolKind::WorldClock => Category::Worldclock,
            ToolKind::Stopwatch => Category::Stopwatch,
        };
        self.notify(
            Notification::new(category, EventKey::LimitReached)
                .with("tool", tool.display_name())
                .with("limit", limit.to_string()),
        );
    }

    fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    fn sound_or_default(&self, sound: Option<&str>) -> String {
        sound
            .map(str::trim)
            .filter(|sound| !sound.is_empty())
            .unwrap_or(self.config.default_sound.as_str())
            .to_string()
    }

    fn generate_id(&mut self, prefix: &str, taken: impl Fn(&Self, &str) -> bool) -> String {
        let stamp = self.clock.now_ms().div_euclid(1_000);
        loop {
            let id = format!("{prefix}-{stamp}-{}", self.next_id);
            self.next_id += 1;
            if !taken(&*self, &id) {
                return id;
            }
        }
    }

    fn persist_alarms(&self) {
        if let Err(err) = persist::save_alarms(self.storage.as_ref(), self.alarms.alarms()) {
            tracing::error!(error = ?err, "failed to persist alarms");
        }
    }

    fn persist_timers(&self) {
        if let Err(err) = persist::save_timers(self.storage.as_ref(), self.timers.timers()) {
            tracing::error!(error = ?err, "failed to persist timers");
        }
    }

    fn persist_stopwatch(&self) {
        if let Err(err) = persist::save_stopwatch(self.storage.as_ref(), &self.stopwatch) {
            tracing::error!(error = ?err, "failed to persist stopwatch");
        }
    }

    fn persist_world_clocks(&self) {
        if let Err(err) = persist::save_world_clocks(self.storage.as_ref(), &self.world_clocks) {
            tracing::error!(error = ?err, "failed to persist world clocks");
        }
    }
}
