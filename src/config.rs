use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::limits::{
    CreationRules, DEFAULT_ALARM_LIMIT, DEFAULT_LAP_LIMIT, DEFAULT_TIMER_LIMIT,
    DEFAULT_WORLD_CLOCK_LIMIT, Limits,
};
use crate::worldclock::WORLD_CLOCK_TICK_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    /// Alarm checks run on this cadence but only act once per minute.
    pub alarm_ms: u64,
    pub timer_ms: u64,
    pub world_clock_ms: u64,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            alarm_ms: 1_000,
            timer_ms: 1_000,
            world_clock_ms: WORLD_CLOCK_TICK_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub limits: Limits,
    pub rules: CreationRules,
    pub cadence: Cadence,
    pub default_sound: String,
    pub seed_defaults: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            rules: CreationRules::default(),
            cadence: Cadence::default(),
            default_sound: default_sound(),
            seed_defaults: true,
        }
    }
}

pub fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file {}", path.display()))?;
    parse_engine_config_text(&content)
}

pub fn parse_engine_config_text(content: &str) -> Result<EngineConfig> {
    let raw = serde_json::from_str::<EngineConfigFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != 1 {
        bail!(
            "unsupported config version {}; expected version 1",
            raw.version
        );
    }
    if raw.cadence.alarm_ms == 0 || raw.cadence.timer_ms == 0 || raw.cadence.world_clock_ms == 0 {
        bail!("tick cadences must be greater than zero");
    }
    if raw.default_sound.trim().is_empty() {
        bail!("default_sound must not be empty");
    }

    Ok(EngineConfig {
        limits: Limits {
            alarms: raw.limits.alarms,
            timers: raw.limits.timers,
            world_clocks: raw.limits.world_clocks,
            laps: raw.limits.laps,
        },
        rules: CreationRules {
            block_alarm_creation_while_ringing: raw.rules.block_alarm_creation_while_ringing,
            block_timer_creation_while_expired: raw.rules.block_timer_creation_while_expired,
        },
        cadence: Cadence {
            alarm_ms: raw.cadence.alarm_ms,
            timer_ms: raw.cadence.timer_ms,
            world_clock_ms: raw.cadence.world_clock_ms,
        },
        default_sound: raw.default_sound.trim().to_string(),
        seed_defaults: raw.seed_defaults,
    })
}

#[derive(Debug, Deserialize)]
struct EngineConfigFile {
    version: u32,
    #[serde(default)]
    limits: LimitsFile,
    #[serde(default)]
    rules: RulesFile,
    #[serde(default)]
    cadence: CadenceFile,
    #[serde(default = "default_sound")]
    default_sound: String,
    #[serde(default = "default_true")]
    seed_defaults: bool,
}

#[derive(Debug, Deserialize)]
struct LimitsFile {
    #[serde(default = "default_alarm_limit")]
    alarms: usize,
    #[serde(default = "default_timer_limit")]
    timers: usize,
    #[serde(default = "default_world_clock_limit")]
    world_clocks: usize,
    #[serde(default = "default_lap_limit")]
    laps: usize,
}

impl Default for LimitsFile {
    fn default() -> Self {
        Self {
            alarms: DEFAULT_ALARM_LIMIT,
            timers: DEFAULT_TIMER_LIMIT,
            world_clocks: DEFAULT_WORLD_CLOCK_LIMIT,
            laps: DEFAULT_LAP_LIMIT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default = "default_true")]
    block_alarm_creation_while_ringing: bool,
    #[serde(default)]
    block_timer_creation_while_expired: bool,
}

impl Default for RulesFile {
    fn default() -> Self {
        Self {
            block_alarm_creation_while_ringing: true,
            block_timer_creation_while_expired: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CadenceFile {
    #[serde(default = "default_cadence_ms")]
    alarm_ms: u64,
    #[serde(default = "default_cadence_ms")]
    timer_ms: u64,
    #[serde(default = "default_world_clock_cadence_ms")]
    world_clock_ms: u64,
}

impl Default for CadenceFile {
    fn default() -> Self {
        Self {
            alarm_ms: default_cadence_ms(),
            timer_ms: default_cadence_ms(),
            world_clock_ms: WORLD_CLOCK_TICK_MS,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sound() -> String {
    "chime".to_string()
}

fn default_cadence_ms() -> u64 {
    1_000
}

fn default_world_clock_cadence_ms() -> u64 {
    WORLD_CLOCK_TICK_MS
}

fn default_alarm_limit() -> usize {
    DEFAULT_ALARM_LIMIT
}

fn default_timer_limit() -> usize {
    DEFAULT_TIMER_LIMIT
}

fn default_world_clock_limit() -> usize {
    DEFAULT_WORLD_CLOCK_LIMIT
}

fn default_lap_limit() -> usize {
    DEFAULT_LAP_LIMIT
}
