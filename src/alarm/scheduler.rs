use chrono::{DateTime, Local, Timelike};

use crate::alarm::model::{Alarm, AlarmDraft, normalize_hour_minute};
use crate::error::EngineError;
use crate::limits::ToolKind;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AlarmState {
    Idle,
    Armed,
    Ringing,
}

pub fn alarm_state(alarm: &Alarm) -> AlarmState {
    if !alarm.enabled {
        AlarmState::Idle
    } else if alarm.is_ringing {
        AlarmState::Ringing
    } else {
        AlarmState::Armed
    }
}

/// The alarm collection in display order, defaults and user entries mixed.
#[derive(Debug, Default)]
pub struct AlarmBook {
    alarms: Vec<Alarm>,
    last_minute_slot: Option<i64>,
}

impl AlarmBook {
    pub fn new(alarms: Vec<Alarm>) -> Self {
        Self {
            alarms,
            last_minute_slot: None,
        }
    }

    /// Checks armed alarms against the current local hour:minute. Runs at
    /// most once per wall-clock minute, and an alarm rings at most once per
    /// minute slot even across reloads. Returns the ids that started ringing.
    pub fn evaluate(&mut self, now: DateTime<Local>) -> Vec<String> {
        let slot = now.timestamp().div_euclid(60);
        if self.last_minute_slot == Some(slot) {
            return Vec::new();
        }
        self.last_minute_slot = Some(slot);

        let (hour, minute) = (now.hour(), now.minute());
        let mut started = Vec::new();
        for alarm in &mut self.alarms {
            if alarm_state(alarm) != AlarmState::Armed {
                continue;
            }
            if alarm.last_rung_slot == Some(slot) {
                continue;
            }
            if alarm.hour == hour && alarm.minute == minute {
                alarm.is_ringing = true;
                alarm.last_rung_slot = Some(slot);
                started.push(alarm.id.clone());
            }
        }
        started
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<AlarmState, EngineError> {
        let alarm = self.get_mut(id)?;
        alarm.enabled = enabled;
        if !enabled {
            alarm.is_ringing = false;
        }
        Ok(alarm_state(alarm))
    }

    /// Ringing -> Armed. Returns false when the alarm was not ringing.
    pub fn dismiss(&mut self, id: &str) -> Result<bool, EngineError> {
        let alarm = self.get_mut(id)?;
        if !alarm.is_ringing {
            return Ok(false);
        }
        alarm.is_ringing = false;
        Ok(true)
    }

    /// Changes trigger parameters only; the alarm keeps its state.
    pub fn edit(&mut self, id: &str, draft: &AlarmDraft) -> Result<&Alarm, EngineError> {
        let alarm = self.get_mut(id)?;
        if alarm.is_ringing {
            return Err(EngineError::Busy {
                tool: ToolKind::Alarm,
                id: id.to_string(),
                reason: "dismiss the ringing alarm before editing it",
            });
        }
        let (hour, minute) = normalize_hour_minute(draft.hour, draft.minute);
        alarm.title = draft.title.trim().to_string();
        alarm.hour = hour;
        alarm.minute = minute;
        if let Some(sound) = draft.sound.as_deref().filter(|s| !s.trim().is_empty()) {
            alarm.sound = sound.to_string();
        }
        Ok(&*alarm)
    }

    pub fn insert(&mut self, alarm: Alarm) {
        self.alarms.push(alarm);
    }

    pub fn remove(&mut self, id: &str) -> Result<Alarm, EngineError> {
        let index = self.index_of(id)?;
        if self.alarms[index].is_default() {
            return Err(EngineError::NotDeletable {
                tool: ToolKind::Alarm,
                id: id.to_string(),
            });
        }
        Ok(self.alarms.remove(index))
    }

    pub fn reorder(&mut self, ids: &[String]) {
        reorder_by_ids(&mut self.alarms, ids, |alarm| &alarm.id);
    }

    pub fn any_ringing(&self) -> bool {
        self.alarms.iter().any(|alarm| alarm.is_ringing)
    }

    pub fn any_enabled(&self) -> bool {
        self.alarms.iter().any(|alarm| alarm.enabled)
    }

    pub fn ringing_ids(&self) -> Vec<String> {
        self.alarms
            .iter()
            .filter(|alarm| alarm.is_ringing)
            .map(|alarm| alarm.id.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Alarm> {
        self.alarms.iter().find(|alarm| alarm.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn alarms(&self) -> &[Alarm] {
        &self.alarms
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    fn index_of(&self, id: &str) -> Result<usize, EngineError> {
        self.alarms
            .iter()
            .position(|alarm| alarm.id == id)
            .ok_or_else(|| EngineError::not_found(ToolKind::Alarm, id))
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Alarm, EngineError> {
        let index = self.index_of(id)?;
        Ok(&mut self.alarms[index])
    }
}

/// Stable re-sort to match `ids`; entries not listed keep their relative
/// order after the listed ones.
pub(crate) fn reorder_by_ids<T>(items: &mut [T], ids: &[String], id_of: impl Fn(&T) -> &String) {
    items.sort_by_key(|item| {
        ids.iter()
            .position(|id| id == id_of(item))
            .unwrap_or(usize::MAX)
    });
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::alarm::model::AlarmOrigin;

    fn alarm(id: &str, hour: u32, minute: u32) -> Alarm {
        Alarm {
            id: id.to_string(),
            title: id.to_string(),
            hour,
            minute,
            sound: "chime".to_string(),
            enabled: true,
            origin: AlarmOrigin::User,
            is_ringing: false,
            last_rung_slot: None,
        }
    }

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 6, 1, hour, minute, second)
            .single()
            .expect("valid local time")
    }

    #[test]
    fn matching_alarm_rings_and_other_stays_armed() {
        let mut book = AlarmBook::new(vec![alarm("one", 13, 0), alarm("five", 13, 5)]);
        let started = book.evaluate(at(13, 0, 0));
        assert_eq!(started, vec!["one".to_string()]);
        assert_eq!(alarm_state(book.get("one").expect("one")), AlarmState::Ringing);
        assert_eq!(alarm_state(book.get("five").expect("five")), AlarmState::Armed);
    }

    #[test]
    fn dismissed_alarm_does_not_ring_again_in_same_minute() {
        let mut book = AlarmBook::new(vec![alarm("one", 13, 0)]);
        assert_eq!(book.evaluate(at(13, 0, 1)).len(), 1);
        assert!(book.dismiss("one").expect("dismiss"));
        assert!(book.evaluate(at(13, 0, 30)).is_empty());
        assert_eq!(alarm_state(book.get("one").expect("one")), AlarmState::Armed);
        assert!(!book.dismiss("one").expect("second dismiss is a no-op"));
    }

    #[test]
    fn fresh_book_skips_alarm_already_rung_this_minute() {
        let mut book = AlarmBook::new(vec![alarm("one", 13, 0)]);
        book.evaluate(at(13, 0, 1));
        book.dismiss("one").expect("dismiss");
        let saved = book.alarms().to_vec();

        let mut reloaded = AlarmBook::new(saved);
        assert!(reloaded.evaluate(at(13, 0, 40)).is_empty());
        assert!(!reloaded.any_ringing());
    }

    #[test]
    fn disabling_a_ringing_alarm_forces_idle() {
        let mut book = AlarmBook::new(vec![alarm("one", 13, 0)]);
        book.evaluate(at(13, 0, 0));
        let state = book.set_enabled("one", false).expect("toggle");
        assert_eq!(state, AlarmState::Idle);
        assert!(!book.any_ringing());
    }

    #[test]
    fn disabled_alarm_never_rings() {
        let mut disabled = alarm("off", 13, 0);
        disabled.enabled = false;
        let mut book = AlarmBook::new(vec![disabled]);
        assert!(book.evaluate(at(13, 0, 0)).is_empty());
    }

    #[test]
    fn edit_keeps_state_and_wraps_time() {
        let mut book = AlarmBook::new(vec![alarm("one", 6, 0)]);
        let edited = book
            .edit("one", &AlarmDraft::new("Gym", 25, 61).with_sound("gong"))
            .expect("edit");
        assert_eq!((edited.hour, edited.minute), (1, 1));
        assert_eq!(edited.sound, "gong");
        assert_eq!(alarm_state(edited), AlarmState::Armed);
    }

    #[test]
    fn edit_is_rejected_while_ringing() {
        let mut book = AlarmBook::new(vec![alarm("one", 13, 0)]);
        book.evaluate(at(13, 0, 0));
        let err = book
            .edit("one", &AlarmDraft::new("x", 1, 1))
            .expect_err("busy");
        assert!(matches!(err, EngineError::Busy { .. }));
    }

    #[test]
    fn default_alarms_cannot_be_removed() {
        let mut seeded = alarm("seed", 7, 0);
        seeded.origin = AlarmOrigin::Default;
        let mut book = AlarmBook::new(vec![seeded, alarm("mine", 8, 0)]);
        assert!(matches!(
            book.remove("seed"),
            Err(EngineError::NotDeletable { .. })
        ));
        assert_eq!(book.remove("mine").expect("remove").id, "mine");
        assert!(matches!(
            book.remove("mine"),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn reorder_follows_given_sequence() {
        let mut book = AlarmBook::new(vec![alarm("a", 1, 0), alarm("b", 2, 0), alarm("c", 3, 0)]);
        book.reorder(&["c".to_string(), "a".to_string()]);
        let order = book
            .alarms()
            .iter()
            .map(|alarm| alarm.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["c", "a", "b"]);
    }
}
