use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Alarm,
    Timer,
    WorldClock,
    Stopwatch,
}

impl ToolKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ToolKind::Alarm => "Alarms",
            ToolKind::Timer => "Timers",
            ToolKind::WorldClock => "World clocks",
            ToolKind::Stopwatch => "Stopwatch laps",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolKind::Alarm => "alarm",
            ToolKind::Timer => "timer",
            ToolKind::WorldClock => "world clock",
            ToolKind::Stopwatch => "stopwatch",
        };
        f.write_str(name)
    }
}

pub const DEFAULT_ALARM_LIMIT: usize = 50;
pub const DEFAULT_TIMER_LIMIT: usize = 50;
pub const DEFAULT_WORLD_CLOCK_LIMIT: usize = 50;
pub const DEFAULT_LAP_LIMIT: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub alarms: usize,
    pub timers: usize,
    pub world_clocks: usize,
    pub laps: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            alarms: DEFAULT_ALARM_LIMIT,
            timers: DEFAULT_TIMER_LIMIT,
            world_clocks: DEFAULT_WORLD_CLOCK_LIMIT,
            laps: DEFAULT_LAP_LIMIT,
        }
    }
}

impl Limits {
    pub fn for_tool(&self, tool: ToolKind) -> usize {
        match tool {
            ToolKind::Alarm => self.alarms,
            ToolKind::Timer => self.timers,
            ToolKind::WorldClock => self.world_clocks,
            ToolKind::Stopwatch => self.laps,
        }
    }
}

/// Guards that block creation for reasons other than count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationRules {
    pub block_alarm_creation_while_ringing: bool,
    pub block_timer_creation_while_expired: bool,
}

impl Default for CreationRules {
    fn default() -> Self {
        Self {
            block_alarm_creation_while_ringing: true,
            block_timer_creation_while_expired: false,
        }
    }
}

pub fn check_capacity(tool: ToolKind, count: usize, limits: &Limits) -> Result<(), EngineError> {
    let limit = limits.for_tool(tool);
    if count >= limit {
        return Err(EngineError::LimitReached { tool, limit });
    }
    Ok(())
}
