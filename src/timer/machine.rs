use crate::alarm::scheduler::reorder_by_ids;
use crate::error::EngineError;
use crate::limits::ToolKind;
use crate::timer::model::{Timer, TimerDraft, TimerKind, TimerOrigin, TimerSpec, TimerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Changed,
    Expired,
}

pub fn timer_from_draft(
    id: String,
    draft: &TimerDraft,
    now_ms: i64,
    fallback_sound: &str,
) -> Result<Timer, EngineError> {
    let (kind, initial_duration_ms) = kind_from_spec(&draft.spec, now_ms)?;
    Ok(Timer {
        id,
        title: draft.title.trim().to_string(),
        kind,
        initial_duration_ms,
        remaining_ms: initial_duration_ms,
        sound: draft
            .sound
            .as_deref()
            .filter(|sound| !sound.trim().is_empty())
            .unwrap_or(fallback_sound)
            .to_string(),
        state: TimerState::Idle,
        anchor_ms: None,
        is_pinned: false,
        origin: TimerOrigin::User,
    })
}

/// Replaces the timer's parameters and returns it to Idle. Rejected while running.
pub fn apply_draft(timer: &mut Timer, draft: &TimerDraft, now_ms: i64) -> Result<(), EngineError> {
    if timer.is_running() {
        return Err(EngineError::Busy {
            tool: ToolKind::Timer,
            id: timer.id.clone(),
            reason: "pause or reset the timer before editing it",
        });
    }
    let (kind, initial_duration_ms) = kind_from_spec(&draft.spec, now_ms)?;
    timer.title = draft.title.trim().to_string();
    timer.kind = kind;
    timer.initial_duration_ms = initial_duration_ms;
    if let Some(sound) = draft.sound.as_deref().filter(|s| !s.trim().is_empty()) {
        timer.sound = sound.to_string();
    }
    timer.state = TimerState::Idle;
    timer.remaining_ms = initial_duration_ms;
    timer.anchor_ms = None;
    Ok(())
}

fn kind_from_spec(spec: &TimerSpec, now_ms: i64) -> Result<(TimerKind, i64), EngineError> {
    match spec {
        TimerSpec::Countdown { duration_ms } => {
            if *duration_ms <= 0 {
                return Err(EngineError::InvalidInput(
                    "countdown duration must be greater than zero".to_string(),
                ));
            }
            Ok((TimerKind::Countdown, *duration_ms))
        }
        TimerSpec::Until { target } => {
            let target_ms = target.timestamp_millis();
            let duration_ms = target_ms.saturating_sub(now_ms);
            if duration_ms <= 0 {
                return Err(EngineError::InvalidInput(format!(
                    "target date {} is not in the future",
                    target.format("%Y-%m-%d %H:%M:%S")
                )));
            }
            Ok((TimerKind::CountToDate { target_ms }, duration_ms))
        }
    }
}

/// Idle/Paused -> Running. A count-to-date timer whose target already
/// passed expires immediately.
pub fn start(timer: &mut Timer, now_ms: i64) -> Transition {
    match timer.state {
        TimerState::Running | TimerState::Expired => return Transition::Unchanged,
        TimerState::Idle | TimerState::Paused => {}
    }
    if let TimerKind::CountToDate { target_ms } = timer.kind {
        timer.remaining_ms = target_ms
            .saturating_sub(now_ms)
            .clamp(0, timer.initial_duration_ms);
    }
    timer.anchor_ms = Some(now_ms.saturating_sub(timer.initial_duration_ms - timer.remaining_ms));
    timer.state = TimerState::Running;
    match recompute(timer, now_ms) {
        Transition::Expired => Transition::Expired,
        _ => Transition::Changed,
    }
}

/// Derives remaining time from the anchor. Never increases remaining time
/// while running, and clamps to exactly zero at expiry.
pub fn recompute(timer: &mut Timer, now_ms: i64) -> Transition {
    if timer.state != TimerState::Running {
        return Transition::Unchanged;
    }
    let computed = match (timer.kind, timer.anchor_ms) {
        (TimerKind::CountToDate { target_ms }, _) => target_ms.saturating_sub(now_ms),
        (TimerKind::Countdown, Some(anchor_ms)) => {
            timer
                .initial_duration_ms
                .saturating_sub(now_ms.saturating_sub(anchor_ms))
        }
        (TimerKind::Countdown, None) => timer.remaining_ms,
    };
    let remaining = computed
        .clamp(0, timer.initial_duration_ms)
        .min(timer.remaining_ms);
    let changed = remaining != timer.remaining_ms;
    timer.remaining_ms = remaining;
    if remaining == 0 {
        timer.state = TimerState::Expired;
        timer.anchor_ms = None;
        return Transition::Expired;
    }
    if changed {
        Transition::Changed
    } else {
        Transition::Unchanged
    }
}

/// Running -> Paused with remaining time frozen. May expire instead if the
/// time ran out before the pause landed.
pub fn pause(timer: &mut Timer, now_ms: i64) -> Transition {
    if timer.state != TimerState::Running {
        return Transition::Unchanged;
    }
    if recompute(timer, now_ms) == Transition::Expired {
        return Transition::Expired;
    }
    timer.state = TimerState::Paused;
    timer.anchor_ms = None;
    Transition::Changed
}

pub fn reset(timer: &mut Timer) -> Transition {
    if timer.state == TimerState::Idle && timer.remaining_ms == timer.initial_duration_ms {
        return Transition::Unchanged;
    }
    timer.state = TimerState::Idle;
    timer.remaining_ms = timer.initial_duration_ms;
    timer.anchor_ms = None;
    Transition::Changed
}

#[derive(Debug, Default)]
pub struct TimerBook {
    timers: Vec<Timer>,
}

impl TimerBook {
    pub fn new(mut timers: Vec<Timer>) -> Self {
        let mut seen_pin = false;
        for timer in &mut timers {
            if timer.is_pinned {
                if seen_pin {
                    timer.is_pinned = false;
                }
                seen_pin = true;
            }
        }
        Self { timers }
    }

    /// Pins `id` and unpins the previous holder in one step. Returns the
    /// previously pinned id, if it was a different timer.
    pub fn pin(&mut self, id: &str) -> Result<Option<String>, EngineError> {
        if !self.contains(id) {
            return Err(EngineError::not_found(ToolKind::Timer, id));
        }
        let mut previous = None;
        for timer in &mut self.timers {
            let pin = timer.id == id;
            if timer.is_pinned && !pin {
                previous = Some(timer.id.clone());
            }
            timer.is_pinned = pin;
        }
        Ok(previous)
    }

    pub fn unpin(&mut self, id: &str) -> Result<bool, EngineError> {
        let timer = self.get_mut(id)?;
        let was_pinned = timer.is_pinned;
        timer.is_pinned = false;
        Ok(was_pinned)
    }

    pub fn pinned(&self) -> Option<&Timer> {
        self.timers.iter().find(|timer| timer.is_pinned)
    }

    pub fn insert(&mut self, timer: Timer) {
        self.timers.push(timer);
    }

    pub fn remove(&mut self, id: &str) -> Result<Timer, EngineError> {
        let index = self
            .timers
            .iter()
            .position(|timer| timer.id == id)
            .ok_or_else(|| EngineError::not_found(ToolKind::Timer, id))?;
        if self.timers[index].origin == TimerOrigin::Default {
            return Err(EngineError::NotDeletable {
                tool: ToolKind::Timer,
                id: id.to_string(),
            });
        }
        Ok(self.timers.remove(index))
    }

    pub fn reorder(&mut self, ids: &[String]) {
        reorder_by_ids(&mut self.timers, ids, |timer| &timer.id);
    }

    pub fn get(&self, id: &str) -> Option<&Timer> {
        self.timers.iter().find(|timer| timer.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut Timer, EngineError> {
        self.timers
            .iter_mut()
            .find(|timer| timer.id == id)
            .ok_or_else(|| EngineError::not_found(ToolKind::Timer, id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn any_expired(&self) -> bool {
        self.timers
            .iter()
            .any(|timer| timer.state == TimerState::Expired)
    }

    pub fn running_ids(&self) -> Vec<String> {
        self.timers
            .iter()
            .filter(|timer| timer.is_running())
            .map(|timer| timer.id.clone())
            .collect()
    }

    pub fn timers(&self) -> &[Timer] {
        &self.timers
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::*;

    const MIN: i64 = 60_000;

    fn countdown(id: &str, duration_ms: i64) -> Timer {
        timer_from_draft(id.to_string(), &TimerDraft::countdown(id, duration_ms), 0, "chime")
            .expect("valid draft")
    }

    #[test]
    fn running_countdown_is_derived_from_anchor() {
        let mut timer = countdown("t", 5 * MIN);
        assert_eq!(start(&mut timer, 1_000), Transition::Changed);
        assert_eq!(timer.anchor_ms, Some(1_000));

        recompute(&mut timer, 1_000 + 2 * MIN);
        assert_eq!(timer.remaining_ms, 3 * MIN);
        assert_eq!(timer.state, TimerState::Running);
    }

    #[test]
    fn remaining_never_increases_and_clamps_to_zero() {
        let mut timer = countdown("t", 3_000);
        start(&mut timer, 0);
        let mut last = timer.remaining_ms;
        for now in [500, 400, 1_700, 2_999] {
            recompute(&mut timer, now);
            assert!(timer.remaining_ms <= last);
            last = timer.remaining_ms;
        }
        assert_eq!(recompute(&mut timer, 9_000), Transition::Expired);
        assert_eq!(timer.remaining_ms, 0);
        assert_eq!(timer.state, TimerState::Expired);
        assert_eq!(recompute(&mut timer, 10_000), Transition::Unchanged);
    }

    #[test]
    fn pause_freezes_and_resume_continues() {
        let mut timer = countdown("t", 10_000);
        start(&mut timer, 0);
        assert_eq!(pause(&mut timer, 4_000), Transition::Changed);
        assert_eq!(timer.state, TimerState::Paused);
        assert_eq!(timer.remaining_ms, 6_000);

        // time spent paused does not count
        start(&mut timer, 100_000);
        recompute(&mut timer, 101_000);
        assert_eq!(timer.remaining_ms, 5_000);
    }

    #[test]
    fn pause_after_deadline_expires_instead() {
        let mut timer = countdown("t", 1_000);
        start(&mut timer, 0);
        assert_eq!(pause(&mut timer, 5_000), Transition::Expired);
        assert_eq!(timer.remaining_ms, 0);
    }

    #[test]
    fn duplicate_start_and_pause_are_no_ops() {
        let mut timer = countdown("t", 1_000);
        assert_eq!(pause(&mut timer, 0), Transition::Unchanged);
        start(&mut timer, 0);
        assert_eq!(start(&mut timer, 10), Transition::Unchanged);
        assert_eq!(timer.anchor_ms, Some(0));
    }

    #[test]
    fn reset_restores_initial_duration() {
        let mut timer = countdown("t", 1_000);
        start(&mut timer, 0);
        recompute(&mut timer, 2_000);
        assert_eq!(reset(&mut timer), Transition::Changed);
        assert_eq!(timer.state, TimerState::Idle);
        assert_eq!(timer.remaining_ms, 1_000);
        assert_eq!(reset(&mut timer), Transition::Unchanged);
    }

    #[test]
    fn count_to_date_tracks_target() {
        let now = Local
            .with_ymd_and_hms(2026, 6, 1, 12, 0, 0)
            .single()
            .expect("valid");
        let target = now + chrono::Duration::minutes(10);
        let now_ms = now.timestamp_millis();
        let mut timer = timer_from_draft(
            "d".to_string(),
            &TimerDraft::until("Launch", target),
            now_ms,
            "chime",
        )
        .expect("draft");
        assert_eq!(timer.initial_duration_ms, 10 * MIN);

        start(&mut timer, now_ms + MIN);
        assert_eq!(timer.remaining_ms, 9 * MIN);
        assert_eq!(recompute(&mut timer, now_ms + 11 * MIN), Transition::Expired);
    }

    #[test]
    fn past_target_is_invalid_input() {
        let now = Local
            .with_ymd_and_hms(2026, 6, 1, 12, 0, 0)
            .single()
            .expect("valid");
        let result = timer_from_draft(
            "d".to_string(),
            &TimerDraft::until("Late", now),
            now.timestamp_millis(),
            "chime",
        );
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn edit_is_rejected_while_running() {
        let mut timer = countdown("t", 1_000);
        start(&mut timer, 0);
        let err = apply_draft(&mut timer, &TimerDraft::countdown("t", 5_000), 10)
            .expect_err("busy");
        assert!(matches!(err, EngineError::Busy { .. }));

        pause(&mut timer, 100);
        apply_draft(&mut timer, &TimerDraft::countdown("t2", 5_000), 200).expect("edit");
        assert_eq!(timer.state, TimerState::Idle);
        assert_eq!(timer.remaining_ms, 5_000);
        assert_eq!(timer.title, "t2");
    }

    #[test]
    fn pinning_moves_the_single_pin() {
        let mut book = TimerBook::new(vec![countdown("a", 1_000), countdown("b", 1_000)]);
        assert_eq!(book.pin("a").expect("pin a"), None);
        assert_eq!(book.pin("b").expect("pin b"), Some("a".to_string()));
        assert!(!book.get("a").expect("a").is_pinned);
        assert!(book.get("b").expect("b").is_pinned);
        assert_eq!(book.pin("b").expect("re-pin"), None);
        assert_eq!(
            book.timers().iter().filter(|timer| timer.is_pinned).count(),
            1
        );
        assert!(book.pin("missing").is_err());
        assert!(book.pinned().is_some());
    }

    #[test]
    fn loading_two_pins_keeps_only_the_first() {
        let mut a = countdown("a", 1_000);
        let mut b = countdown("b", 1_000);
        a.is_pinned = true;
        b.is_pinned = true;
        let book = TimerBook::new(vec![a, b]);
        assert_eq!(book.pinned().map(|timer| timer.id.as_str()), Some("a"));
        assert!(!book.get("b").expect("b").is_pinned);
    }
}
