use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow, bail};

pub const USER_ALARMS_SLOT: &str = "userAlarms";
pub const DEFAULT_ALARMS_ORDER_SLOT: &str = "defaultAlarmsOrder";
pub const USER_TIMERS_SLOT: &str = "userTimers";
pub const DEFAULT_TIMERS_ORDER_SLOT: &str = "defaultTimersOrder";
pub const STOPWATCH_SLOT: &str = "stopwatchState";
pub const WORLD_CLOCKS_SLOT: &str = "worldClocks";

pub const ALL_SLOTS: [&str; 6] = [
    USER_ALARMS_SLOT,
    DEFAULT_ALARMS_ORDER_SLOT,
    USER_TIMERS_SLOT,
    DEFAULT_TIMERS_ORDER_SLOT,
    STOPWATCH_SLOT,
    WORLD_CLOCKS_SLOT,
];

/// Named-blob persistence primitive.
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-process storage; clones share the same slots.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("failed to lock memory storage"))?;
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("failed to lock memory storage"))?;
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<slot>.json` file per slot inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("unable to create data directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            bail!("invalid storage slot name '{key}'");
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.slot_path(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("unable to read slot file {}", path.display()))
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.slot_path(key)?;
        fs::write(&path, format!("{value}\n"))
            .with_context(|| format!("unable to write slot file {}", path.display()))
    }
}
