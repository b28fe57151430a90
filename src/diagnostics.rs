use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::clock::{Clock, SelectedClock};
use crate::config::EngineConfig;
use crate::persist::{SlotStatus, inspect_slot};
use crate::runner::sleep_until;
use crate::storage::{ALL_SLOTS, Storage};

/// Lateness of paced wake-ups against their deadlines.
pub struct PacingStats {
    total: u64,
    late: u64,
    worst: Duration,
    tolerance: Duration,
}

impl PacingStats {
    pub fn new(tolerance: Duration) -> Self {
        Self {
            total: 0,
            late: 0,
            worst: Duration::ZERO,
            tolerance,
        }
    }

    pub fn record(&mut self, lateness: Duration) {
        self.total += 1;
        if lateness > self.tolerance {
            self.late += 1;
        }
        self.worst = self.worst.max(lateness);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn late(&self) -> u64 {
        self.late
    }

    pub fn worst(&self) -> Duration {
        self.worst
    }
}

pub fn run_diagnostics(
    selected: &SelectedClock,
    storage: &dyn Storage,
    data_dir: &Path,
    config: &EngineConfig,
) -> Result<()> {
    println!("multiclock diagnostics");
    println!("Selected clock source: {}", selected.label);
    println!(
        "Current time: {}",
        selected.clock.now().format("%Y-%m-%d %H:%M:%S")
    );
    println!("Data directory: {}", data_dir.display());
    println!(
        "Limits: alarms={} timers={} world_clocks={} laps={}",
        config.limits.alarms, config.limits.timers, config.limits.world_clocks, config.limits.laps
    );
    println!(
        "Cadence (ms): alarm={} timer={} world_clock={}",
        config.cadence.alarm_ms, config.cadence.timer_ms, config.cadence.world_clock_ms
    );

    println!("Storage slots:");
    for slot in ALL_SLOTS {
        match inspect_slot(storage, slot) {
            SlotStatus::Missing => println!("  {slot}: missing"),
            SlotStatus::Valid(count) => println!("  {slot}: ok ({count} entries)"),
            SlotStatus::Malformed(reason) => println!("  {slot}: malformed ({reason})"),
        }
    }

    let cadence = Duration::from_millis(10);
    let stats = measure_pacing(cadence, 20);
    println!("Tick pacing over {} ticks of {} ms:", stats.total(), cadence.as_millis());
    println!("  Late (>1 ms): {}", stats.late());
    println!("  Worst lateness: {} us", stats.worst().as_micros());
    Ok(())
}

fn measure_pacing(cadence: Duration, ticks: u32) -> PacingStats {
    let mut stats = PacingStats::new(Duration::from_millis(1));
    let mut deadline = Instant::now() + cadence;
    for _ in 0..ticks {
        sleep_until(deadline);
        stats.record(Instant::now().saturating_duration_since(deadline));
        deadline += cadence;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacing_stats_count_late_wakeups() {
        let mut stats = PacingStats::new(Duration::from_millis(1));
        stats.record(Duration::from_micros(200));
        stats.record(Duration::from_millis(3));
        assert_eq!(stats.total(), 2);
        assert_eq!(stats.late(), 1);
        assert_eq!(stats.worst(), Duration::from_millis(3));
    }
}
