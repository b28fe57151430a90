use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Wall-clock source. Every elapsed/remaining value in the engine is derived
/// as `now - anchor`, so implementations only need to report wall time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// 9999-12-31T23:59:59.999Z, the last instant a stored timestamp may name.
pub const MAX_TIMESTAMP_MS: i64 = 253_402_300_799_999;

/// Stored epoch milliseconds outside 1970..=9999 are treated as corrupt.
pub fn is_plausible_timestamp_ms(ms: i64) -> bool {
    (0..=MAX_TIMESTAMP_MS).contains(&ms)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    unix_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self::from_unix_ms(start.timestamp_millis())
    }

    pub fn from_unix_ms(unix_ms: i64) -> Self {
        Self {
            unix_ms: AtomicI64::new(unix_ms),
        }
    }

    pub fn set(&self, at: DateTime<Local>) {
        self.unix_ms.store(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.unix_ms
            .fetch_add(by.num_milliseconds(), Ordering::Relaxed);
    }

    pub fn advance_ms(&self, ms: i64) {
        self.unix_ms.fetch_add(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        let ms = self.unix_ms.load(Ordering::Relaxed);
        Local
            .timestamp_millis_opt(ms)
            .single()
            .unwrap_or_else(Local::now)
    }

    fn now_ms(&self) -> i64 {
        self.unix_ms.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClockSourceKind {
    System,
    Fixed(NaiveDateTime),
}

pub struct SelectedClock {
    pub clock: Arc<dyn Clock>,
    pub label: &'static str,
    /// Present for a fixed clock so a host can advance it in simulated runs.
    pub manual: Option<Arc<ManualClock>>,
}

pub fn select_clock(kind: ClockSourceKind) -> Result<SelectedClock> {
    match kind {
        ClockSourceKind::System => Ok(SelectedClock {
            clock: Arc::new(SystemClock),
            label: "SYSTEM_WALL",
            manual: None,
        }),
        ClockSourceKind::Fixed(naive) => {
            let start = Local
                .from_local_datetime(&naive)
                .earliest()
                .ok_or_else(|| anyhow!("local time {naive} does not exist in this time zone"))?;
            let manual = Arc::new(ManualClock::new(start));
            Ok(SelectedClock {
                clock: manual.clone(),
                label: "FIXED_MANUAL",
                manual: Some(manual),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Timelike};

    use super::*;

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let start = Local
            .with_ymd_and_hms(2026, 6, 1, 13, 0, 0)
            .single()
            .expect("valid");
        let clock = ManualClock::new(start);
        assert_eq!(clock.now_ms(), start.timestamp_millis());

        clock.advance(chrono::Duration::milliseconds(1_230));
        assert_eq!(clock.now_ms(), start.timestamp_millis() + 1_230);
        assert_eq!(clock.now().hour(), 13);
    }

    #[test]
    fn fixed_source_starts_at_requested_time() {
        let naive = NaiveDate::from_ymd_opt(2026, 6, 1)
            .expect("date")
            .and_hms_opt(9, 30, 0)
            .expect("time");
        let selected = select_clock(ClockSourceKind::Fixed(naive)).expect("fixed clock");
        assert_eq!(selected.label, "FIXED_MANUAL");
        assert_eq!(selected.clock.now().naive_local(), naive);
    }

    #[test]
    fn system_source_reports_wall_time() {
        let selected = select_clock(ClockSourceKind::System).expect("system clock");
        assert_eq!(selected.label, "SYSTEM_WALL");
        let drift = (selected.clock.now_ms() - Local::now().timestamp_millis()).abs();
        assert!(drift < 5_000);
    }
}
