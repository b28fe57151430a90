pub mod alarm;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod input;
pub mod limits;
pub mod notify;
pub mod persist;
pub mod runner;
pub mod stopwatch;
pub mod storage;
pub mod tick;
pub mod timer;
pub mod worldclock;

pub use engine::{Collaborators, Engine, TickReport};
pub use error::EngineError;
