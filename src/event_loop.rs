//! Relay orchestrator
//!
//! One cooperative loop owns every component. Each iteration:
//!
//! 1. emit a health snapshot when the interval has elapsed
//! 2. reconnect the serial link if it is unhealthy
//! 3. re-resolve sound sources on the rescan interval and swap on change
//! 4. read one line (empty on timeout)
//! 5. classify it and dispatch
//! 6. let the audio controller close an idle session
//!
//! All waits are bounded by the serial read timeout, the reconnect delay or
//! the blink delay, so a shutdown request is seen within one iteration.

use std::time::{Duration, Instant};

use crate::classifier::{classify, Event};
use crate::error::{LinkError, Result};
use crate::health::{HealthInputs, HealthMonitor, HealthSnapshot};
use crate::indicator::IndicatorController;
use crate::serial::SerialLink;
use crate::shutdown::ShutdownFlag;
use crate::sound::{AudioController, Resolution, SourceResolver};

/// Consecutive read failures that force a reconnect
pub const READ_ERROR_LIMIT: u32 = 3;

// Pause after a failed read before trying again
const READ_ERROR_PAUSE: Duration = Duration::from_millis(50);

/// Orchestrator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    WaitingForLink,
    Ready,
    ShuttingDown,
}

// Tracks what has already been reported about the link so each transition
// is logged once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connection {
    Connected,
    Lost,
    ReadError,
}

/// Loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub rescan_interval: Duration,
    pub health_interval: Duration,
    pub health_checks: bool,
    /// Pause after a reconnect pass that did not succeed
    pub reconnect_backoff: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            rescan_interval: Duration::from_secs(1),
            health_interval: Duration::from_secs(30),
            health_checks: true,
            reconnect_backoff: Duration::from_secs(1),
        }
    }
}

/// Everything the loop drives
pub struct Components {
    pub link: SerialLink,
    pub audio: AudioController,
    pub ready_indicator: IndicatorController,
    /// Lit while sounds come from removable media
    pub media_indicator: IndicatorController,
    pub resolver: SourceResolver,
}

pub struct EventLoop {
    link: SerialLink,
    audio: AudioController,
    ready_led: IndicatorController,
    media_led: IndicatorController,
    resolver: SourceResolver,
    health: HealthMonitor,
    settings: LoopSettings,
    shutdown: ShutdownFlag,
    state: LoopState,
    active: Option<Resolution>,
    last_scan: Instant,
    connection: Connection,
    read_errors: u32,
}

impl EventLoop {
    pub fn new(components: Components, settings: LoopSettings, shutdown: ShutdownFlag) -> Self {
        Self {
            link: components.link,
            audio: components.audio,
            ready_led: components.ready_indicator,
            media_led: components.media_indicator,
            resolver: components.resolver,
            health: HealthMonitor::new(settings.health_interval, settings.health_checks),
            settings,
            shutdown,
            state: LoopState::Starting,
            active: None,
            last_scan: Instant::now(),
            connection: Connection::Lost,
            read_errors: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn press_count(&self) -> u64 {
        self.health.press_count()
    }

    /// Loop errors plus audio failures
    pub fn error_count(&self) -> u64 {
        self.health.error_count() + self.audio.failures()
    }

    pub fn link(&self) -> &SerialLink {
        &self.link
    }

    pub fn audio(&self) -> &AudioController {
        &self.audio
    }

    pub fn ready_indicator(&self) -> &IndicatorController {
        &self.ready_led
    }

    pub fn media_indicator(&self) -> &IndicatorController {
        &self.media_led
    }

    /// Sound source currently in use
    pub fn active_source(&self) -> Option<&Resolution> {
        self.active.as_ref()
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.health.snapshot(self.health_inputs())
    }

    /// Run until shutdown is requested or a fatal condition occurs.
    ///
    /// Indicators, link and audio are released on every exit path.
    pub fn run(&mut self) -> Result<()> {
        let mut result = self.start();
        if result.is_ok() {
            while !self.shutdown.is_requested() {
                if let Err(e) = self.step() {
                    result = Err(e);
                    break;
                }
            }
        }

        if let Err(ref e) = result {
            crate::log_error!("Fatal: {}", e);
        }
        self.stop();
        result
    }

    /// Resolve sounds and open the link. Returns `Ok` without connecting if
    /// shutdown was requested meanwhile.
    pub fn start(&mut self) -> Result<()> {
        self.state = LoopState::Starting;
        self.ready_led.off();
        crate::log_info!("Relay started");

        self.refresh_sources();

        self.state = LoopState::WaitingForLink;
        match self.link.connect() {
            Ok(_) => {}
            Err(LinkError::Interrupted) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.connection = Connection::Connected;

        self.ready_led.on();
        self.state = LoopState::Ready;
        crate::log_info!("System ready");
        Ok(())
    }

    /// One loop iteration.
    pub fn step(&mut self) -> Result<()> {
        if self.health.is_due(Instant::now()) {
            self.health.report(self.health_inputs());
        }

        if !self.link.is_healthy() {
            return self.reconnect();
        }

        if self.last_scan.elapsed() >= self.settings.rescan_interval {
            self.refresh_sources();
        }

        match self.link.read_line() {
            Ok(line) => {
                if !line.is_empty() {
                    self.note_data_received();
                    self.handle_line(&line);
                }
            }
            Err(e) => {
                self.note_read_error(&e);
                self.shutdown.sleep(READ_ERROR_PAUSE);
            }
        }

        self.audio.tick_idle();
        Ok(())
    }

    /// Classify one line and perform its side effects.
    pub fn handle_line(&mut self, line: &str) -> Event {
        let event = classify(line);
        let text = line.trim();

        match &event {
            Event::RightPress => {
                crate::log_info!("RIGHT button pressed");
                self.health.record_press();
                self.audio.play_primary();
                self.ready_led.blink();
            }
            Event::WrongPress => {
                crate::log_info!("WRONG button pressed");
                self.health.record_press();
                self.audio.play_secondary();
                self.ready_led.blink();
            }
            Event::TransmitterConnected | Event::ReceiverStarting | Event::ReceiverReady => {
                crate::log_info!("Receiver: {}", text);
            }
            Event::StatusUpdate => tracing::info!("Receiver status: {}", text),
            Event::SecurityRejected => crate::log_warning!("Security: {}", text),
            Event::LinkInitFailed => {
                crate::log_error!("Receiver error: {}", text);
                self.health.record_error();
            }
            Event::Unclassified(raw) => tracing::info!("Receiver: {}", raw.trim()),
            Event::Empty => {}
        }

        event
    }

    /// Re-resolve sound sources and swap them in if anything changed.
    pub fn refresh_sources(&mut self) {
        let resolution = self.resolver.resolve();
        self.last_scan = Instant::now();

        if self.active.as_ref() == Some(&resolution) {
            return;
        }

        self.audio.set_active_sets(&resolution.primary, &resolution.secondary);
        self.media_led.set(resolution.provenance.is_removable());

        let (primary, secondary) = self.audio.active_counts();
        if self.active.is_none() {
            crate::log_info!(
                "Audio source: {}, Right sounds: {}, Wrong sounds: {}",
                resolution.provenance,
                primary,
                secondary
            );
        } else {
            crate::log_info!("Audio files reloaded: {}", resolution.provenance);
        }
        self.active = Some(resolution);
    }

    fn reconnect(&mut self) -> Result<()> {
        if self.connection == Connection::Connected {
            crate::log_error!("Serial connection lost");
            self.ready_led.off();
        }
        self.connection = Connection::Lost;
        self.state = LoopState::WaitingForLink;

        match self.link.connect() {
            Ok(_) => {
                self.connection = Connection::Connected;
                self.read_errors = 0;
                self.state = LoopState::Ready;
                self.ready_led.on();
                crate::log_info!("Serial connection restored");
                Ok(())
            }
            Err(LinkError::Interrupted) => Ok(()),
            Err(e @ LinkError::Exhausted { .. }) => Err(e.into()),
            Err(e) => {
                crate::log_warning!("Reconnect failed: {}", e);
                self.shutdown.sleep(self.settings.reconnect_backoff);
                Ok(())
            }
        }
    }

    fn note_data_received(&mut self) {
        self.read_errors = 0;
        if self.connection != Connection::Connected {
            self.connection = Connection::Connected;
            crate::log_info!("Serial connection restored");
        }
    }

    fn note_read_error(&mut self, error: &LinkError) {
        self.health.record_error();
        self.read_errors += 1;
        if self.connection == Connection::Connected {
            crate::log_error!("Serial read error: {}", error);
            self.connection = Connection::ReadError;
        }
        if self.read_errors >= READ_ERROR_LIMIT {
            self.read_errors = 0;
            crate::log_error!("Serial connection lost");
            self.ready_led.off();
            self.connection = Connection::Lost;
            self.state = LoopState::WaitingForLink;
            self.link.close();
        }
    }

    /// Release indicators, link and audio, then log the final entries.
    pub fn stop(&mut self) {
        self.state = LoopState::ShuttingDown;
        if self.health.is_enabled() {
            self.health.report(self.health_inputs());
        }
        self.ready_led.off();
        self.media_led.off();
        self.link.close();
        self.audio.teardown();
        crate::log_info!("Relay stopped");
    }

    fn health_inputs(&self) -> HealthInputs {
        HealthInputs {
            link_connected: self.link.is_healthy(),
            audio_available: self.audio.is_available(),
            indicator_available: self.ready_led.is_available(),
            external_errors: self.audio.failures(),
        }
    }
}
