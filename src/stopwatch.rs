use serde::{Deserialize, Serialize};

use crate::clock::is_plausible_timestamp_ms;
use crate::limits::DEFAULT_LAP_LIMIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayFormat {
    #[default]
    Seconds,
    Deciseconds,
    Centiseconds,
    Milliseconds,
}

impl DisplayFormat {
    pub fn tick_cadence_ms(self) -> u64 {
        match self {
            DisplayFormat::Seconds => 1_000,
            DisplayFormat::Deciseconds => 100,
            DisplayFormat::Centiseconds | DisplayFormat::Milliseconds => 10,
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "seconds" => Some(DisplayFormat::Seconds),
            "ds" | "deciseconds" => Some(DisplayFormat::Deciseconds),
            "cs" | "centiseconds" => Some(DisplayFormat::Centiseconds),
            "ms" | "milliseconds" => Some(DisplayFormat::Milliseconds),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopwatchState {
    Idle,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lap {
    #[serde(rename = "lapIndex")]
    pub index: u32,
    pub split_ms: i64,
    pub total_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LapError {
    NotRunning,
    CapReached { cap: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stopwatch {
    running: bool,
    anchor_ms: i64,
    accumulated_ms: i64,
    laps: Vec<Lap>,
    format: DisplayFormat,
    lap_cap: usize,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new(DEFAULT_LAP_LIMIT)
    }
}

impl Stopwatch {
    pub fn new(lap_cap: usize) -> Self {
        Self {
            running: false,
            anchor_ms: 0,
            accumulated_ms: 0,
            laps: Vec::new(),
            format: DisplayFormat::default(),
            lap_cap,
        }
    }

    pub fn state(&self) -> StopwatchState {
        if self.running {
            StopwatchState::Running
        } else if self.accumulated_ms == 0 && self.laps.is_empty() {
            StopwatchState::Idle
        } else {
            StopwatchState::Paused
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn elapsed_ms(&self, now_ms: i64) -> i64 {
        if self.running {
            now_ms.saturating_sub(self.anchor_ms).max(0)
        } else {
            self.accumulated_ms
        }
    }

    /// Resumes from the accumulated time. Returns false if already running.
    pub fn start(&mut self, now_ms: i64) -> bool {
        if self.running {
            return false;
        }
        self.anchor_ms = now_ms.saturating_sub(self.accumulated_ms);
        self.running = true;
        true
    }

    pub fn stop(&mut self, now_ms: i64) -> bool {
        if !self.running {
            return false;
        }
        self.accumulated_ms = now_ms.saturating_sub(self.anchor_ms).max(0);
        self.running = false;
        true
    }

    pub fn reset(&mut self) -> bool {
        let changed = self.state() != StopwatchState::Idle;
        self.running = false;
        self.anchor_ms = 0;
        self.accumulated_ms = 0;
        self.laps.clear();
        changed
    }

    pub fn lap(&mut self, now_ms: i64) -> Result<Lap, LapError> {
        if !self.running {
            return Err(LapError::NotRunning);
        }
        if self.laps.len() >= self.lap_cap {
            return Err(LapError::CapReached { cap: self.lap_cap });
        }
        let previous_total = self.laps.last().map(|lap| lap.total_ms).unwrap_or(0);
        let total_ms = self.elapsed_ms(now_ms).max(previous_total);
        let lap = Lap {
            index: self.laps.len() as u32 + 1,
            split_ms: total_ms - previous_total,
            total_ms,
        };
        self.laps.push(lap);
        Ok(lap)
    }

    /// Only the display format changes; anchor and accumulated time stay.
    pub fn set_format(&mut self, format: DisplayFormat) -> bool {
        if self.format == format {
            return false;
        }
        self.format = format;
        true
    }

    pub fn format(&self) -> DisplayFormat {
        self.format
    }

    pub fn tick_cadence_ms(&self) -> u64 {
        self.format.tick_cadence_ms()
    }

    pub fn anchor_ms(&self) -> i64 {
        self.anchor_ms
    }

    pub fn accumulated_ms(&self) -> i64 {
        self.accumulated_ms
    }

    pub fn lap_cap(&self) -> usize {
        self.lap_cap
    }

    /// Chronological order.
    pub fn laps(&self) -> &[Lap] {
        &self.laps
    }

    pub fn laps_newest_first(&self) -> impl Iterator<Item = &Lap> {
        self.laps.iter().rev()
    }

    pub fn to_record(&self) -> StopwatchRecord {
        StopwatchRecord {
            is_running: self.running,
            start_time: self.anchor_ms,
            elapsed_time: self.accumulated_ms,
            laps: self.laps.clone(),
            lap_number: self.laps.len() as u32,
            format: self.format,
        }
    }

    /// Rebuilds from a persisted record. A running stopwatch keeps its
    /// anchor, so elapsed time continues from the wall clock. Out-of-range
    /// times reset it to idle.
    pub fn from_record(record: StopwatchRecord, lap_cap: usize, now_ms: i64) -> Self {
        let anchor_ok = !record.is_running || is_plausible_timestamp_ms(record.start_time);
        if !anchor_ok || !is_plausible_timestamp_ms(record.elapsed_time) {
            tracing::warn!(
                start_time = record.start_time,
                elapsed_time = record.elapsed_time,
                "stopwatch times out of range, starting idle"
            );
            return Self {
                format: record.format,
                ..Self::new(lap_cap)
            };
        }
        let mut laps = record.laps;
        if !laps_are_consistent(&laps) {
            tracing::warn!(laps = laps.len(), "discarding inconsistent stopwatch laps");
            laps.clear();
        }
        laps.truncate(lap_cap);
        let accumulated_ms = record.elapsed_time;
        Self {
            running: record.is_running,
            anchor_ms: if record.is_running {
                record.start_time.min(now_ms)
            } else {
                0
            },
            accumulated_ms,
            laps,
            format: record.format,
            lap_cap,
        }
    }
}

fn laps_are_consistent(laps: &[Lap]) -> bool {
    let mut previous_total = 0;
    for (position, lap) in laps.iter().enumerate() {
        if lap.index as usize != position + 1
            || lap.total_ms < previous_total
            || !is_plausible_timestamp_ms(lap.total_ms)
            || lap.split_ms != lap.total_ms - previous_total
        {
            return false;
        }
        previous_total = lap.total_ms;
    }
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopwatchRecord {
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub elapsed_time: i64,
    #[serde(default)]
    pub laps: Vec<Lap>,
    #[serde(default)]
    pub lap_number: u32,
    #[serde(default)]
    pub format: DisplayFormat,
}

pub fn format_elapsed(elapsed_ms: i64, format: DisplayFormat) -> String {
    let ms = elapsed_ms.max(0);
    let total_secs = ms / 1_000;
    let hours = total_secs / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    let fraction = ms % 1_000;
    match format {
        DisplayFormat::Seconds => format!("{hours:02}:{minutes:02}:{seconds:02}"),
        DisplayFormat::Deciseconds => {
            format!("{hours:02}:{minutes:02}:{seconds:02}.{}", fraction / 100)
        }
        DisplayFormat::Centiseconds => {
            format!("{hours:02}:{minutes:02}:{seconds:02}.{:02}", fraction / 10)
        }
        DisplayFormat::Milliseconds => {
            format!("{hours:02}:{minutes:02}:{seconds:02}.{fraction:03}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn laps_record_split_and_total() {
        let mut stopwatch = Stopwatch::default();
        stopwatch.start(10_000);
        let first = stopwatch.lap(11_230).expect("lap 1");
        assert_eq!((first.index, first.total_ms, first.split_ms), (1, 1_230, 1_230));
        let second = stopwatch.lap(11_730).expect("lap 2");
        assert_eq!((second.index, second.total_ms, second.split_ms), (2, 1_730, 500));

        let newest = stopwatch.laps_newest_first().next().expect("newest");
        assert_eq!(newest.index, 2);
        assert_eq!(stopwatch.laps()[0].index, 1);
    }

    #[test]
    fn lap_requires_running() {
        let mut stopwatch = Stopwatch::default();
        assert_eq!(stopwatch.lap(0), Err(LapError::NotRunning));
    }

    #[test]
    fn lap_cap_leaves_state_unchanged() {
        let mut stopwatch = Stopwatch::new(3);
        stopwatch.start(0);
        for now in [10, 20, 30] {
            stopwatch.lap(now).expect("lap");
        }
        assert_eq!(stopwatch.lap(40), Err(LapError::CapReached { cap: 3 }));
        assert_eq!(stopwatch.laps().len(), 3);
    }

    #[test]
    fn stop_and_resume_preserve_accumulation() {
        let mut stopwatch = Stopwatch::default();
        assert!(stopwatch.start(0));
        assert!(!stopwatch.start(50));
        assert!(stopwatch.stop(1_000));
        assert!(!stopwatch.stop(1_500));
        assert_eq!(stopwatch.state(), StopwatchState::Paused);
        assert_eq!(stopwatch.elapsed_ms(99_999), 1_000);

        stopwatch.start(5_000);
        assert_eq!(stopwatch.anchor_ms(), 4_000);
        assert_eq!(stopwatch.elapsed_ms(5_500), 1_500);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut stopwatch = Stopwatch::default();
        stopwatch.start(0);
        stopwatch.lap(100).expect("lap");
        assert!(stopwatch.reset());
        assert_eq!(stopwatch.state(), StopwatchState::Idle);
        assert!(stopwatch.laps().is_empty());
        assert!(!stopwatch.reset());
    }

    #[test]
    fn format_switch_keeps_anchor() {
        let mut stopwatch = Stopwatch::default();
        stopwatch.start(2_000);
        let anchor = stopwatch.anchor_ms();
        assert!(stopwatch.set_format(DisplayFormat::Milliseconds));
        assert_eq!(stopwatch.anchor_ms(), anchor);
        assert_eq!(stopwatch.tick_cadence_ms(), 10);
        assert!(!stopwatch.set_format(DisplayFormat::Milliseconds));
    }

    #[test]
    fn running_record_continues_from_wall_clock() {
        let record = StopwatchRecord {
            is_running: true,
            start_time: 1_000,
            elapsed_time: 0,
            laps: vec![Lap {
                index: 1,
                split_ms: 400,
                total_ms: 400,
            }],
            lap_number: 1,
            format: DisplayFormat::Centiseconds,
        };
        let stopwatch = Stopwatch::from_record(record, 1_000, 61_000);
        assert!(stopwatch.is_running());
        assert_eq!(stopwatch.elapsed_ms(61_000), 60_000);
        assert_eq!(stopwatch.laps().len(), 1);
    }

    #[test]
    fn out_of_range_start_time_loads_idle() {
        let record: StopwatchRecord = serde_json::from_str(
            r#"{"isRunning":true,"startTime":-9223372036854775808,"format":"milliseconds"}"#,
        )
        .expect("record");
        let mut stopwatch = Stopwatch::from_record(record, 1_000, 61_000);
        assert_eq!(stopwatch.state(), StopwatchState::Idle);
        assert_eq!(stopwatch.format(), DisplayFormat::Milliseconds);
        assert_eq!(stopwatch.lap(61_000), Err(LapError::NotRunning));
    }

    #[test]
    fn extreme_anchor_saturates_instead_of_overflowing() {
        let mut stopwatch = Stopwatch::default();
        stopwatch.start(i64::MIN);
        assert_eq!(stopwatch.elapsed_ms(i64::MAX), i64::MAX);
        assert!(stopwatch.stop(i64::MAX));
        assert_eq!(stopwatch.elapsed_ms(0), i64::MAX);
    }

    #[test]
    fn gapped_laps_are_discarded_on_load() {
        let record = StopwatchRecord {
            is_running: false,
            start_time: 0,
            elapsed_time: 900,
            laps: vec![
                Lap {
                    index: 1,
                    split_ms: 100,
                    total_ms: 100,
                },
                Lap {
                    index: 3,
                    split_ms: 200,
                    total_ms: 300,
                },
            ],
            lap_number: 3,
            format: DisplayFormat::Seconds,
        };
        let stopwatch = Stopwatch::from_record(record, 1_000, 0);
        assert!(stopwatch.laps().is_empty());
        assert_eq!(stopwatch.elapsed_ms(0), 900);
    }

    #[test]
    fn elapsed_formats_per_display_format() {
        assert_eq!(format_elapsed(3_723_456, DisplayFormat::Seconds), "01:02:03");
        assert_eq!(format_elapsed(1_230, DisplayFormat::Deciseconds), "00:00:01.2");
        assert_eq!(format_elapsed(1_230, DisplayFormat::Centiseconds), "00:00:01.23");
        assert_eq!(format_elapsed(1_234, DisplayFormat::Milliseconds), "00:00:01.234");
    }
}
