// sfx-relay library
// Serial button receiver to sound and indicator feedback

#[macro_use]
pub mod logging;

pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod event_log;
pub mod event_loop;
pub mod health;
pub mod indicator;
pub mod serial;
pub mod shutdown;
pub mod sound;

pub use classifier::{classify, Event};
pub use cli::Cli;
pub use config::Options;
pub use error::RelayError;
pub use event_loop::{Components, EventLoop, LoopSettings, LoopState};
pub use logging::LogLevel;
