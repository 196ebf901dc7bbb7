//! Sound feedback
//!
//! - `source` finds the active sound files (removable media first)
//! - `output` is the audio hardware capability, with a rodio backend
//! - `controller` owns the lazily opened playback session

pub mod controller;
pub mod output;
pub mod source;

pub use controller::{AudioController, AudioSettings, SessionState, PRIMARY_CHANNEL, SECONDARY_CHANNEL};
pub use output::{output_device_present, AudioDevice, AudioDriver, RodioDriver, CHANNEL_COUNT};
pub use source::{is_mount_point, NamePattern, Provenance, Resolution, SoundSet, SourceResolver};
