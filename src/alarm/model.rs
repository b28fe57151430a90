use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmOrigin {
    User,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub id: String,
    pub title: String,
    pub hour: u32,
    pub minute: u32,
    pub sound: String,
    pub enabled: bool,
    pub origin: AlarmOrigin,
    pub is_ringing: bool,
    /// Minute slot (unix seconds / 60) in which the alarm last started ringing.
    pub last_rung_slot: Option<i64>,
}

impl Alarm {
    pub fn is_default(&self) -> bool {
        self.origin == AlarmOrigin::Default
    }
}

/// Creation/edit form input. Hour and minute may be out of range; they are
/// wrapped on the way in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmDraft {
    pub title: String,
    pub hour: i64,
    pub minute: i64,
    pub sound: Option<String>,
}

impl AlarmDraft {
    pub fn new(title: impl Into<String>, hour: i64, minute: i64) -> Self {
        Self {
            title: title.into(),
            hour,
            minute,
            sound: None,
        }
    }

    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }
}

/// Wraps each field independently: hour 24 is 0, minute -1 is 59.
pub fn normalize_hour_minute(hour: i64, minute: i64) -> (u32, u32) {
    (hour.rem_euclid(24) as u32, minute.rem_euclid(60) as u32)
}

pub fn default_alarms(sound: &str) -> Vec<Alarm> {
    [
        ("default-alarm-wake", "Wake up", 7, 0),
        ("default-alarm-lunch", "Lunch", 12, 30),
    ]
    .into_iter()
    .map(|(id, title, hour, minute)| Alarm {
        id: id.to_string(),
        title: title.to_string(),
        hour,
        minute,
        sound: sound.to_string(),
        enabled: false,
        origin: AlarmOrigin::Default,
        is_ringing: false,
        last_rung_slot: None,
    })
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub hour: i64,
    pub minute: i64,
    #[serde(default)]
    pub sound: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_origin")]
    pub origin: AlarmOrigin,
    #[serde(default)]
    pub is_ringing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rung_slot: Option<i64>,
}

impl AlarmRecord {
    pub fn from_alarm(alarm: &Alarm) -> Self {
        Self {
            id: alarm.id.clone(),
            title: alarm.title.clone(),
            hour: i64::from(alarm.hour),
            minute: i64::from(alarm.minute),
            sound: Some(alarm.sound.clone()),
            enabled: alarm.enabled,
            origin: alarm.origin,
            is_ringing: alarm.is_ringing,
            last_rung_slot: alarm.last_rung_slot,
        }
    }

    pub fn into_alarm(self, fallback_sound: &str) -> Alarm {
        let (hour, minute) = normalize_hour_minute(self.hour, self.minute);
        Alarm {
            id: self.id,
            title: self.title,
            hour,
            minute,
            sound: self
                .sound
                .filter(|sound| !sound.trim().is_empty())
                .unwrap_or_else(|| fallback_sound.to_string()),
            enabled: self.enabled,
            origin: self.origin,
            is_ringing: self.enabled && self.is_ringing,
            last_rung_slot: self.last_rung_slot,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_origin() -> AlarmOrigin {
    AlarmOrigin::User
}
