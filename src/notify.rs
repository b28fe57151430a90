use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    System,
    Alarm,
    Timer,
    Stopwatch,
    Worldclock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKey {
    Created,
    Updated,
    Deleted,
    LimitReached,
    Ringing,
}

impl EventKey {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKey::Created => "created",
            EventKey::Updated => "updated",
            EventKey::Deleted => "deleted",
            EventKey::LimitReached => "limit_reached",
            EventKey::Ringing => "ringing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub category: Category,
    pub event: EventKey,
    pub message: String,
    pub translation_category: Option<String>,
    pub context: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(category: Category, event: EventKey) -> Self {
        Self {
            category,
            event,
            message: event.as_str().to_string(),
            translation_category: Some("notifications".to_string()),
            context: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

pub trait Notifier {
    fn notify(&self, notification: Notification);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let context = serde_json::to_string(&notification.context).unwrap_or_default();
        match notification.event {
            EventKey::LimitReached | EventKey::Ringing => tracing::warn!(
                category = ?notification.category,
                event = notification.event.as_str(),
                %context,
                "{}",
                notification.message
            ),
            _ => tracing::info!(
                category = ?notification.category,
                event = notification.event.as_str(),
                %context,
                "{}",
                notification.message
            ),
        }
    }
}

impl<A: Notifier, B: Notifier> Notifier for (A, B) {
    fn notify(&self, notification: Notification) {
        self.0.notify(notification.clone());
        self.1.notify(notification);
    }
}

/// Keeps every dispatched notification; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    entries: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .map(|mut entries| std::mem::take(&mut *entries))
            .unwrap_or_default()
    }

    pub fn count(&self, category: Category, event: EventKey) -> usize {
        self.snapshot()
            .iter()
            .filter(|entry| entry.category == category && entry.event == event)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(notification);
        }
    }
}

pub trait SoundPlayer {
    fn play(&self, sound: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSoundPlayer;

impl SoundPlayer for TracingSoundPlayer {
    fn play(&self, sound: &str) -> Result<()> {
        tracing::info!(sound, "playing sound");
        Ok(())
    }
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBell;

impl SoundPlayer for TerminalBell {
    fn play(&self, sound: &str) -> Result<()> {
        let mut stderr = std::io::stderr();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(|err| anyhow!("unable to ring bell for '{sound}': {err}"))
    }
}

/// Plays a sound, logging instead of propagating failures.
pub fn play_or_log(player: &dyn SoundPlayer, sound: &str) {
    if let Err(err) = player.play(sound) {
        tracing::warn!(sound, error = %err, "sound playback failed");
    }
}
