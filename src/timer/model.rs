use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::clock::is_plausible_timestamp_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Countdown,
    CountToDate { target_ms: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerOrigin {
    User,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    pub id: String,
    pub title: String,
    pub kind: TimerKind,
    pub initial_duration_ms: i64,
    pub remaining_ms: i64,
    pub sound: String,
    pub state: TimerState,
    /// Start instant shifted back by the time already consumed, so that
    /// `remaining = initial - (now - anchor)` holds across pauses.
    pub anchor_ms: Option<i64>,
    pub is_pinned: bool,
    pub origin: TimerOrigin,
}

impl Timer {
    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn target_ms(&self) -> Option<i64> {
        match self.kind {
            TimerKind::Countdown => None,
            TimerKind::CountToDate { target_ms } => Some(target_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerSpec {
    Countdown { duration_ms: i64 },
    Until { target: DateTime<Local> },
}

/// Creation/edit form input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerDraft {
    pub title: String,
    pub spec: TimerSpec,
    pub sound: Option<String>,
    pub start_immediately: bool,
}

impl TimerDraft {
    pub fn countdown(title: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            title: title.into(),
            spec: TimerSpec::Countdown { duration_ms },
            sound: None,
            start_immediately: false,
        }
    }

    pub fn until(title: impl Into<String>, target: DateTime<Local>) -> Self {
        Self {
            title: title.into(),
            spec: TimerSpec::Until { target },
            sound: None,
            start_immediately: true,
        }
    }

    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    pub fn started(mut self, start: bool) -> Self {
        self.start_immediately = start;
        self
    }
}

pub fn default_timers(sound: &str) -> Vec<Timer> {
    [
        ("default-timer-tea", "Tea", 3 * 60_000),
        ("default-timer-focus", "Focus", 25 * 60_000),
        ("default-timer-break", "Break", 5 * 60_000),
    ]
    .into_iter()
    .map(|(id, title, duration_ms)| Timer {
        id: id.to_string(),
        title: title.to_string(),
        kind: TimerKind::Countdown,
        initial_duration_ms: duration_ms,
        remaining_ms: duration_ms,
        sound: sound.to_string(),
        state: TimerState::Idle,
        anchor_ms: None,
        is_pinned: false,
        origin: TimerOrigin::Default,
    })
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKindToken {
    Countdown,
    CountToDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub kind: TimerKindToken,
    pub initial_duration_ms: i64,
    pub remaining_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_timestamp: Option<i64>,
    #[serde(default)]
    pub sound: Option<String>,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub state: Option<TimerState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default = "default_origin")]
    pub origin: TimerOrigin,
}

impl TimerRecord {
    pub fn from_timer(timer: &Timer) -> Self {
        Self {
            id: timer.id.clone(),
            title: timer.title.clone(),
            kind: match timer.kind {
                TimerKind::Countdown => TimerKindToken::Countdown,
                TimerKind::CountToDate { .. } => TimerKindToken::CountToDate,
            },
            initial_duration_ms: timer.initial_duration_ms,
            remaining_ms: timer.remaining_ms,
            target_timestamp: timer.target_ms(),
            sound: Some(timer.sound.clone()),
            is_running: timer.is_running(),
            state: Some(timer.state),
            start_time: timer.anchor_ms,
            is_pinned: timer.is_pinned,
            origin: timer.origin,
        }
    }

    /// Rebuilds the stored fields. Running timers still need their derived
    /// remaining time recomputed against the current clock.
    pub fn into_timer(self, fallback_sound: &str) -> Option<Timer> {
        let kind = match (self.kind, self.target_timestamp) {
            (TimerKindToken::Countdown, _) => TimerKind::Countdown,
            (TimerKindToken::CountToDate, Some(target_ms))
                if is_plausible_timestamp_ms(target_ms) =>
            {
                TimerKind::CountToDate { target_ms }
            }
            (TimerKindToken::CountToDate, _) => return None,
        };
        if self.initial_duration_ms <= 0 || !is_plausible_timestamp_ms(self.initial_duration_ms) {
            return None;
        }
        let start_time = self.start_time.filter(|ms| is_plausible_timestamp_ms(*ms));
        let mut state = self.state.unwrap_or(if self.is_running {
            TimerState::Running
        } else if self.remaining_ms < self.initial_duration_ms {
            TimerState::Paused
        } else {
            TimerState::Idle
        });
        if state == TimerState::Running && start_time.is_none() {
            state = TimerState::Paused;
        }
        let remaining_ms = match state {
            TimerState::Idle => self.initial_duration_ms,
            TimerState::Expired => 0,
            _ => self.remaining_ms.clamp(0, self.initial_duration_ms),
        };
        Some(Timer {
            id: self.id,
            title: self.title,
            kind,
            initial_duration_ms: self.initial_duration_ms,
            remaining_ms,
            sound: self
                .sound
                .filter(|sound| !sound.trim().is_empty())
                .unwrap_or_else(|| fallback_sound.to_string()),
            state,
            anchor_ms: if state == TimerState::Running {
                start_time
            } else {
                None
            },
            is_pinned: self.is_pinned,
            origin: self.origin,
        })
    }
}

fn default_origin() -> TimerOrigin {
    TimerOrigin::User
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_to_date_record_without_target_is_rejected() {
        let record: TimerRecord = serde_json::from_str(
            r#"{"id":"t","kind":"count_to_date","initialDurationMs":1000,"remainingMs":1000}"#,
        )
        .expect("record");
        assert!(record.into_timer("chime").is_none());
    }

    #[test]
    fn out_of_range_target_is_rejected() {
        let record: TimerRecord = serde_json::from_str(
            r#"{"id":"t","kind":"count_to_date","initialDurationMs":1000,"remainingMs":1000,
                "targetTimestamp":9223372036854775807,"state":"running","startTime":0}"#,
        )
        .expect("record");
        assert!(record.into_timer("chime").is_none());
    }

    #[test]
    fn out_of_range_start_time_degrades_to_paused() {
        let record: TimerRecord = serde_json::from_str(
            r#"{"id":"t","kind":"countdown","initialDurationMs":60000,"remainingMs":30000,
                "state":"running","startTime":-9223372036854775808}"#,
        )
        .expect("record");
        let timer = record.into_timer("chime").expect("timer");
        assert_eq!(timer.state, TimerState::Paused);
        assert_eq!(timer.anchor_ms, None);
        assert_eq!(timer.remaining_ms, 30_000);
    }

    #[test]
    fn legacy_running_flag_without_state_is_honoured() {
        let record: TimerRecord = serde_json::from_str(
            r#"{"id":"t","kind":"countdown","initialDurationMs":60000,"remainingMs":30000,
                "isRunning":true,"startTime":1000}"#,
        )
        .expect("record");
        let timer = record.into_timer("chime").expect("timer");
        assert_eq!(timer.state, TimerState::Running);
        assert_eq!(timer.anchor_ms, Some(1_000));
    }

    #[test]
    fn running_record_without_anchor_degrades_to_paused() {
        let record: TimerRecord = serde_json::from_str(
            r#"{"id":"t","kind":"countdown","initialDurationMs":60000,"remainingMs":90000,
                "state":"running"}"#,
        )
        .expect("record");
        let timer = record.into_timer("chime").expect("timer");
        assert_eq!(timer.state, TimerState::Paused);
        assert_eq!(timer.remaining_ms, 60_000);
    }

    #[test]
    fn record_preserves_target_and_pin() {
        let timer = Timer {
            id: "t".to_string(),
            title: "Launch".to_string(),
            kind: TimerKind::CountToDate { target_ms: 50_000 },
            initial_duration_ms: 40_000,
            remaining_ms: 40_000,
            sound: "gong".to_string(),
            state: TimerState::Idle,
            anchor_ms: None,
            is_pinned: true,
            origin: TimerOrigin::User,
        };
        let json = serde_json::to_string(&TimerRecord::from_timer(&timer)).expect("json");
        assert!(json.contains("\"targetTimestamp\":50000"));
        let restored: TimerRecord = serde_json::from_str(&json).expect("record");
        assert_eq!(restored.into_timer("chime"), Some(timer));
    }
}
