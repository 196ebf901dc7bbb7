//! Error types for the relay
//!
//! Each hardware capability reports its own error enum. Only the conditions
//! that must end the process are lifted into [`RelayError`]; everything else
//! is absorbed at the component boundary, logged once and counted.

use std::io;
use std::path::PathBuf;

/// Serial link errors
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Every candidate port failed for the configured number of passes
    #[error("serial connection failed after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// Shutdown was requested while connecting
    #[error("connect interrupted by shutdown request")]
    Interrupted,

    /// No port is open
    #[error("serial link is not connected")]
    NotConnected,

    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Audio capability errors
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio output device: {0}")]
    DeviceUnavailable(String),

    #[error("cannot open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot decode {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("audio thread is not running")]
    ThreadGone,
}

/// Indicator capability errors
#[derive(Debug, thiserror::Error)]
pub enum IndicatorError {
    #[error("indicator unavailable: {0}")]
    Unavailable(String),

    #[error("indicator I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Conditions that end the process with a non-zero exit code
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("serial link lost: {0}")]
    Link(#[from] LinkError),

    #[error("startup failed: {0}")]
    Setup(String),
}

impl RelayError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// Convenience Result type for fatal relay paths
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_exhausted_message() {
        let err = LinkError::Exhausted { attempts: 10 };
        assert_eq!(err.to_string(), "serial connection failed after 10 attempts");
    }

    #[test]
    fn test_relay_error_wraps_link_error() {
        let err: RelayError = LinkError::Exhausted { attempts: 3 }.into();
        assert!(matches!(err, RelayError::Link(LinkError::Exhausted { attempts: 3 })));
        assert_eq!(err.exit_code(), 1);
    }
}
