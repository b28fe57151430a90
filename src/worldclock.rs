use std::str::FromStr;

use chrono::{NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const WORLD_CLOCK_TICK_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq)]
pub struct WorldClock {
    pub id: String,
    pub title: String,
    pub timezone: String,
    /// Set when the zone cannot be resolved; such a clock is never scheduled.
    pub error: Option<String>,
    pub local_time: Option<NaiveDateTime>,
    zone: Option<Tz>,
}

impl WorldClock {
    pub fn new(id: String, title: &str, timezone: &str) -> Result<Self, EngineError> {
        let zone = parse_zone(timezone).map_err(EngineError::InvalidInput)?;
        let title = if title.trim().is_empty() {
            zone.name().to_string()
        } else {
            title.trim().to_string()
        };
        Ok(Self {
            id,
            title,
            timezone: zone.name().to_string(),
            error: None,
            local_time: None,
            zone: Some(zone),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.zone.is_some()
    }

    /// Recomputes the displayed local time for this zone.
    pub fn refresh(&mut self, now_ms: i64) -> Option<NaiveDateTime> {
        let zone = self.zone?;
        let utc = Utc.timestamp_millis_opt(now_ms).single()?;
        let local = utc.with_timezone(&zone).naive_local();
        self.local_time = Some(local);
        Some(local)
    }

    pub fn to_record(&self) -> WorldClockRecord {
        WorldClockRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            timezone: self.timezone.clone(),
        }
    }

    pub fn from_record(record: WorldClockRecord) -> Self {
        match parse_zone(&record.timezone) {
            Ok(zone) => Self {
                id: record.id,
                title: record.title,
                timezone: record.timezone,
                error: None,
                local_time: None,
                zone: Some(zone),
            },
            Err(reason) => {
                tracing::warn!(id = %record.id, timezone = %record.timezone, "world clock has an unknown time zone");
                Self {
                    id: record.id,
                    title: record.title,
                    timezone: record.timezone,
                    error: Some(reason),
                    local_time: None,
                    zone: None,
                }
            }
        }
    }
}

fn parse_zone(timezone: &str) -> Result<Tz, String> {
    Tz::from_str(timezone.trim()).map_err(|_| format!("unknown time zone '{}'", timezone.trim()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldClockRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub timezone: String,
}
