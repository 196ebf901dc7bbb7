//! Leveled logging front end
//!
//! Every message goes to the console through `tracing`. Messages at info
//! level and above are also appended to the event log (see
//! [`crate::event_log`]); debug messages stay on the console.

/// Event log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Health,
    Debug,
}

impl LogLevel {
    /// Tag written between brackets in the event log
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Info => "INFO",
            LogLevel::Health => "HEALTH",
            LogLevel::Debug => "DEBUG",
        }
    }

    /// Whether entries at this level are copied into the health log
    pub fn mirrors_to_health(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Warning | LogLevel::Health)
    }

    /// Whether entries at this level are written to the event log at all
    pub fn is_recorded(&self) -> bool {
        !matches!(self, LogLevel::Debug)
    }
}

/// Add a log entry at the given level.
pub fn log_add(level: LogLevel, message: &str) {
    match level {
        LogLevel::Error => tracing::error!("{}", message),
        LogLevel::Warning => tracing::warn!("{}", message),
        LogLevel::Info => tracing::info!("{}", message),
        LogLevel::Health => tracing::info!(target: "sfx_relay::health", "{}", message),
        LogLevel::Debug => tracing::debug!("{}", message),
    }

    if level.is_recorded() {
        crate::event_log::append(level, message);
    }
}

/// Install the console subscriber.
///
/// `RUST_LOG` overrides the default filter. Safe to call more than once;
/// later calls are ignored.
pub fn init_console(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default = if verbose { "sfx_relay=debug" } else { "sfx_relay=info" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Convenience macro for errors
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_add($crate::logging::LogLevel::Error, &format!($($arg)*))
    };
}

/// Convenience macro for warnings
#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        $crate::logging::log_add($crate::logging::LogLevel::Warning, &format!($($arg)*))
    };
}

/// Convenience macro for info messages
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_add($crate::logging::LogLevel::Info, &format!($($arg)*))
    };
}

/// Convenience macro for health records
#[macro_export]
macro_rules! log_health {
    ($($arg:tt)*) => {
        $crate::logging::log_add($crate::logging::LogLevel::Health, &format!($($arg)*))
    };
}

/// Convenience macro for debug messages (console only)
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_add($crate::logging::LogLevel::Debug, &format!($($arg)*))
    };
}
