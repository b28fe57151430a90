use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::ManualClock;
use crate::engine::{Engine, TickReport};

/// How the run loop waits between pumps.
pub trait Pacer {
    fn wait(&mut self, duration: Duration);
}

/// Sleeps on the real monotonic clock.
#[derive(Debug, Default)]
pub struct WallPacer;

impl Pacer for WallPacer {
    fn wait(&mut self, duration: Duration) {
        sleep_until(Instant::now() + duration);
    }
}

/// Advances a manual clock instead of sleeping.
pub struct SimulatedPacer {
    clock: Arc<ManualClock>,
}

impl SimulatedPacer {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self { clock }
    }
}

impl Pacer for SimulatedPacer {
    fn wait(&mut self, duration: Duration) {
        let ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.clock.advance_ms(ms);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pumps: u64,
    pub ticks_fired: usize,
    pub alarms_rung: Vec<String>,
    pub timers_expired: Vec<String>,
}

impl RunSummary {
    fn absorb(&mut self, report: TickReport) {
        self.pumps += 1;
        self.ticks_fired += report.fired.len();
        self.alarms_rung.extend(report.alarms_ringing);
        self.timers_expired.extend(report.timers_expired);
    }
}

/// Pumps the engine until `duration` of engine time has passed, waiting for
/// the next tick deadline between pumps.
pub fn run_for(engine: &mut Engine, duration: chrono::Duration, pacer: &mut dyn Pacer) -> RunSummary {
    let end_ms = engine.now_ms().saturating_add(duration.num_milliseconds());
    let mut summary = RunSummary::default();
    loop {
        summary.absorb(engine.pump());
        let now_ms = engine.now_ms();
        if now_ms >= end_ms {
            break;
        }
        let next_ms = engine.next_tick_deadline_ms().unwrap_or(end_ms).min(end_ms);
        let wait_ms = u64::try_from((next_ms - now_ms).max(1)).unwrap_or(1);
        pacer.wait(Duration::from_millis(wait_ms));
    }
    tracing::debug!(
        pumps = summary.pumps,
        ticks = summary.ticks_fired,
        "run finished"
    );
    summary
}

pub fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if now >= deadline {
        return;
    }

    let mut remaining = deadline.saturating_duration_since(now);
    if remaining > Duration::from_millis(1) {
        std::thread::sleep(remaining - Duration::from_micros(250));
    }

    loop {
        let current = Instant::now();
        if current >= deadline {
            break;
        }
        remaining = deadline.saturating_duration_since(current);
        if remaining > Duration::from_micros(50) {
            std::thread::yield_now();
        } else {
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::*;
    use crate::clock::Clock;
    use crate::config::EngineConfig;
    use crate::engine::Collaborators;
    use crate::notify::{RecordingNotifier, TracingSoundPlayer};
    use crate::storage::MemoryStorage;
    use crate::timer::model::{TimerDraft, TimerState};

    #[test]
    fn sleep_until_past_deadline_returns_immediately() {
        let started = Instant::now();
        sleep_until(started);
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn simulated_run_expires_a_timer() {
        let start = Local
            .with_ymd_and_hms(2026, 3, 10, 9, 0, 0)
            .single()
            .expect("valid");
        let clock = Arc::new(ManualClock::new(start));
        let mut engine = Engine::load(
            EngineConfig {
                seed_defaults: false,
                ..EngineConfig::default()
            },
            clock.clone(),
            Collaborators {
                storage: Box::new(MemoryStorage::new()),
                notifier: Box::new(RecordingNotifier::new()),
                sound: Box::new(TracingSoundPlayer),
            },
        );
        let id = engine
            .add_timer(TimerDraft::countdown("tea", 3_000).started(true))
            .expect("add");

        let mut pacer = SimulatedPacer::new(clock.clone());
        let summary = run_for(&mut engine, chrono::Duration::seconds(10), &mut pacer);

        assert_eq!(summary.timers_expired, vec![id.clone()]);
        assert_eq!(engine.timer(&id).map(|t| t.state), Some(TimerState::Expired));
        assert_eq!(clock.now_ms(), start.timestamp_millis() + 10_000);
    }
}
