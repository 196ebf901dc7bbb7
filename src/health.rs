//! Health reporting
//!
//! [`HealthMonitor`] keeps the press and error counters and decides when a
//! periodic [`HealthSnapshot`] is due. Snapshots are written to the event
//! log as `Health check: <json>`, which also lands in the health log.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Point-in-time relay status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub uptime_seconds: u64,
    pub button_press_count: u64,
    pub error_count: u64,
    pub link_connected: bool,
    pub audio_subsystem_available: bool,
    pub indicator_available: bool,
}

impl HealthSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"serialization_error\":\"{}\"}}", e))
    }
}

/// Capability and link flags sampled when a snapshot is taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthInputs {
    pub link_connected: bool,
    pub audio_available: bool,
    pub indicator_available: bool,
    /// Failures counted outside the monitor, e.g. by the audio controller
    pub external_errors: u64,
}

pub struct HealthMonitor {
    started: Instant,
    last_report: Instant,
    interval: Duration,
    enabled: bool,
    press_count: u64,
    error_count: u64,
}

impl HealthMonitor {
    pub fn new(interval: Duration, enabled: bool) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_report: now,
            interval,
            enabled,
            press_count: 0,
            error_count: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_press(&mut self) {
        self.press_count += 1;
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn press_count(&self) -> u64 {
        self.press_count
    }

    /// Errors counted by the loop itself
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether a periodic report is due at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        self.enabled && now.duration_since(self.last_report) >= self.interval
    }

    pub fn snapshot(&self, inputs: HealthInputs) -> HealthSnapshot {
        HealthSnapshot {
            uptime_seconds: self.uptime().as_secs(),
            button_press_count: self.press_count,
            error_count: self.error_count + inputs.external_errors,
            link_connected: inputs.link_connected,
            audio_subsystem_available: inputs.audio_available,
            indicator_available: inputs.indicator_available,
        }
    }

    /// Log a snapshot and restart the interval.
    pub fn report(&mut self, inputs: HealthInputs) -> HealthSnapshot {
        let snapshot = self.snapshot(inputs);
        crate::log_health!("Health check: {}", snapshot.to_json());
        self.last_report = Instant::now();
        snapshot
    }
}
