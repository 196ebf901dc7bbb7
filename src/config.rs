use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::event_loop::LoopSettings;
use crate::serial::{LinkSettings, PortSettings};
use crate::sound::AudioSettings;

/// Environment variable that overrides the receiver port
pub const SERIAL_PORT_ENV: &str = "SFX_RELAY_SERIAL";

pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";

/// Conventional device names for USB and on-board UARTs
pub const FALLBACK_PORTS: [&str; 7] = [
    "/dev/ttyACM0",
    "/dev/ttyACM1",
    "/dev/ttyUSB0",
    "/dev/ttyUSB1",
    "/dev/serial0",
    "/dev/ttyAMA0",
    "/dev/ttyS0",
];

const EVENT_LOG_NAME: &str = "event_log.txt";
const HEALTH_LOG_NAME: &str = "health_log.txt";

/// Relay options, filled from defaults, an optional config file and the
/// command line, in that order
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    // Serial link
    pub serial_port: String,
    pub fallback_ports: Vec<String>,
    pub baud: u32,
    pub read_timeout: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,

    // Sounds
    pub media_roots: Vec<PathBuf>,
    pub local_sound_dir: PathBuf,
    pub primary_pattern: String,
    pub secondary_pattern: String,
    pub rescan_interval: Duration,
    pub idle_shutoff: Duration,
    pub audio_init_attempts: u32,
    pub audio_init_delay: Duration,

    // Indicators
    pub ready_pin: Option<u32>,
    pub indicator_active_low: bool,
    pub media_pin: Option<u32>,
    pub blink_duration: Duration,

    // Health and logs
    pub health_checks: bool,
    pub health_interval: Duration,
    pub log_file: Option<PathBuf>,
    pub health_log_file: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            serial_port: DEFAULT_SERIAL_PORT.to_string(),
            fallback_ports: FALLBACK_PORTS.iter().map(|p| p.to_string()).collect(),
            baud: 115_200,
            read_timeout: Duration::from_millis(100),
            max_reconnect_attempts: 10,
            reconnect_delay: Duration::from_secs(2),
            media_roots: vec![PathBuf::from("/media")],
            local_sound_dir: default_sound_dir(),
            primary_pattern: "right*.wav".to_string(),
            secondary_pattern: "wrong*.wav".to_string(),
            rescan_interval: Duration::from_secs(1),
            idle_shutoff: Duration::from_secs(1),
            audio_init_attempts: 8,
            audio_init_delay: Duration::from_millis(200),
            ready_pin: Some(18),
            indicator_active_low: true,
            media_pin: None,
            blink_duration: Duration::from_millis(40),
            health_checks: true,
            health_interval: Duration::from_secs(30),
            log_file: None,
            health_log_file: None,
        }
    }
}

impl Options {
    /// Event log location, next to the local sounds unless configured
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.local_sound_dir.join(EVENT_LOG_NAME))
    }

    pub fn health_log_path(&self) -> PathBuf {
        self.health_log_file
            .clone()
            .unwrap_or_else(|| self.local_sound_dir.join(HEALTH_LOG_NAME))
    }

    /// Reject combinations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.serial_port.is_empty() {
            anyhow::bail!("Serial port must not be empty");
        }
        if self.baud == 0 {
            anyhow::bail!("Baud rate must be positive");
        }
        if self.read_timeout.is_zero() {
            anyhow::bail!("Read timeout must be positive");
        }
        if self.max_reconnect_attempts == 0 {
            anyhow::bail!("Reconnect attempts must be at least 1");
        }
        if self.audio_init_attempts == 0 {
            anyhow::bail!("Audio init attempts must be at least 1");
        }
        if self.health_checks && self.health_interval.is_zero() {
            anyhow::bail!("Health interval must be positive");
        }
        if self.ready_pin.is_some() && self.ready_pin == self.media_pin {
            anyhow::bail!("Ready and media indicators cannot share a pin");
        }
        Ok(())
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            preferred_port: self.serial_port.clone(),
            fallback_ports: self.fallback_ports.clone(),
            max_attempts: self.max_reconnect_attempts,
            retry_delay: self.reconnect_delay,
            port: PortSettings {
                baud: self.baud,
                read_timeout: self.read_timeout,
            },
        }
    }

    pub fn audio_settings(&self) -> AudioSettings {
        AudioSettings {
            init_attempts: self.audio_init_attempts,
            init_retry_delay: self.audio_init_delay,
            idle_shutoff: self.idle_shutoff,
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            rescan_interval: self.rescan_interval,
            health_interval: self.health_interval,
            health_checks: self.health_checks,
            ..LoopSettings::default()
        }
    }
}

/// `$HOME/sfx-relay`, or `./sfx-relay` without a home directory
pub fn default_sound_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join("sfx-relay"),
        _ => PathBuf::from("sfx-relay"),
    }
}

// =============================================================================
// Config file
// =============================================================================

/// On-disk layout of the TOML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub serial: SerialSection,
    #[serde(default)]
    pub sounds: SoundsSection,
    #[serde(default)]
    pub indicators: IndicatorsSection,
    #[serde(default)]
    pub health: HealthSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialSection {
    pub port: Option<String>,
    pub fallback_ports: Option<Vec<String>>,
    pub baud: Option<u32>,
    pub read_timeout_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoundsSection {
    pub media_roots: Option<Vec<PathBuf>>,
    pub local_dir: Option<PathBuf>,
    pub right_pattern: Option<String>,
    pub wrong_pattern: Option<String>,
    pub rescan_interval_ms: Option<u64>,
    pub idle_shutoff_ms: Option<u64>,
    pub init_attempts: Option<u32>,
    pub init_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndicatorsSection {
    /// `false` runs without the ready indicator
    pub ready_enabled: Option<bool>,
    pub ready_pin: Option<u32>,
    pub active_low: Option<bool>,
    pub media_pin: Option<u32>,
    pub blink_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthSection {
    pub enabled: Option<bool>,
    pub interval_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
    pub health_log_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid config file")
    }

    /// Overlay every key present in the file onto `opts`.
    pub fn apply(self, opts: &mut Options) {
        let FileConfig {
            serial,
            sounds,
            indicators,
            health,
        } = self;

        if let Some(port) = serial.port {
            opts.serial_port = port;
        }
        if let Some(ports) = serial.fallback_ports {
            opts.fallback_ports = ports;
        }
        if let Some(baud) = serial.baud {
            opts.baud = baud;
        }
        if let Some(ms) = serial.read_timeout_ms {
            opts.read_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = serial.max_reconnect_attempts {
            opts.max_reconnect_attempts = n;
        }
        if let Some(ms) = serial.reconnect_delay_ms {
            opts.reconnect_delay = Duration::from_millis(ms);
        }

        if let Some(roots) = sounds.media_roots {
            opts.media_roots = roots;
        }
        if let Some(dir) = sounds.local_dir {
            opts.local_sound_dir = dir;
        }
        if let Some(pattern) = sounds.right_pattern {
            opts.primary_pattern = pattern;
        }
        if let Some(pattern) = sounds.wrong_pattern {
            opts.secondary_pattern = pattern;
        }
        if let Some(ms) = sounds.rescan_interval_ms {
            opts.rescan_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = sounds.idle_shutoff_ms {
            opts.idle_shutoff = Duration::from_millis(ms);
        }
        if let Some(n) = sounds.init_attempts {
            opts.audio_init_attempts = n;
        }
        if let Some(ms) = sounds.init_delay_ms {
            opts.audio_init_delay = Duration::from_millis(ms);
        }

        if let Some(pin) = indicators.ready_pin {
            opts.ready_pin = Some(pin);
        }
        if indicators.ready_enabled == Some(false) {
            opts.ready_pin = None;
        }
        if let Some(active_low) = indicators.active_low {
            opts.indicator_active_low = active_low;
        }
        if let Some(pin) = indicators.media_pin {
            opts.media_pin = Some(pin);
        }
        if let Some(ms) = indicators.blink_ms {
            opts.blink_duration = Duration::from_millis(ms);
        }

        if let Some(enabled) = health.enabled {
            opts.health_checks = enabled;
        }
        if let Some(secs) = health.interval_secs {
            opts.health_interval = Duration::from_secs(secs);
        }
        if let Some(path) = health.log_file {
            opts.log_file = Some(path);
        }
        if let Some(path) = health.health_log_file {
            opts.health_log_file = Some(path);
        }
    }
}

/// Load options from `path`, or defaults when no file is given
pub fn load_config(path: Option<&Path>) -> Result<Options> {
    let mut opts = Options::default();
    let Some(path) = path else {
        return Ok(opts);
    };

    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read config file {}", path.display()))?;
    FileConfig::parse(&text)
        .with_context(|| format!("Config file {}", path.display()))?
        .apply(&mut opts);
    Ok(opts)
}

// =============================================================================
// Value parsers
// =============================================================================

/// Parse a duration such as `250`, `250ms`, `2s` or `1.5s`. Bare numbers
/// are milliseconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let ms: u64 = ms.trim().parse().context("Invalid millisecond value")?;
        return Ok(Duration::from_millis(ms));
    }
    if let Some(secs) = s.strip_suffix('s') {
        let secs: f64 = secs.trim().parse().context("Invalid second value")?;
        if !secs.is_finite() || secs < 0.0 {
            anyhow::bail!("Duration must be a non-negative number of seconds");
        }
        return Ok(Duration::from_secs_f64(secs));
    }
    let ms: u64 = s.parse().context("Invalid duration value")?;
    Ok(Duration::from_millis(ms))
}

/// Parse a GPIO pin number; `none` or `off` disables the indicator.
pub fn parse_pin(s: &str) -> Result<Option<u32>> {
    match s.trim().to_lowercase().as_str() {
        "none" | "off" => Ok(None),
        other => {
            let pin: u32 = other.parse().context("Invalid GPIO pin")?;
            Ok(Some(pin))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default() {
        let opts = Options::default();
        assert_eq!(opts.serial_port, "/dev/ttyACM0");
        assert_eq!(opts.fallback_ports.len(), 7);
        assert_eq!(opts.baud, 115_200);
        assert_eq!(opts.max_reconnect_attempts, 10);
        assert_eq!(opts.ready_pin, Some(18));
        assert!(opts.media_pin.is_none());
        assert!(opts.health_checks);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_log_paths_follow_sound_dir() {
        let opts = Options {
            local_sound_dir: PathBuf::from("/srv/sfx"),
            ..Options::default()
        };
        assert_eq!(opts.log_path(), PathBuf::from("/srv/sfx/event_log.txt"));
        assert_eq!(opts.health_log_path(), PathBuf::from("/srv/sfx/health_log.txt"));

        let opts = Options {
            log_file: Some(PathBuf::from("/var/log/sfx.log")),
            ..opts
        };
        assert_eq!(opts.log_path(), PathBuf::from("/var/log/sfx.log"));
    }

    #[test]
    fn test_file_config_overlay() {
        let file = FileConfig::parse(
            r#"
            [serial]
            port = "/dev/ttyUSB3"
            reconnect_delay_ms = 500

            [sounds]
            local_dir = "/srv/sfx"
            wrong_pattern = "buzz*.ogg"

            [indicators]
            media_pin = 23
            blink_ms = 80

            [health]
            enabled = false
            "#,
        )
        .unwrap();

        let mut opts = Options::default();
        file.apply(&mut opts);

        assert_eq!(opts.serial_port, "/dev/ttyUSB3");
        assert_eq!(opts.reconnect_delay, Duration::from_millis(500));
        assert_eq!(opts.local_sound_dir, PathBuf::from("/srv/sfx"));
        assert_eq!(opts.primary_pattern, "right*.wav");
        assert_eq!(opts.secondary_pattern, "buzz*.ogg");
        assert_eq!(opts.media_pin, Some(23));
        assert_eq!(opts.blink_duration, Duration::from_millis(80));
        assert!(!opts.health_checks);
    }

    #[test]
    fn test_file_config_disables_ready_indicator() {
        let file = FileConfig::parse("[indicators]\nready_enabled = false\n").unwrap();
        let mut opts = Options::default();
        file.apply(&mut opts);
        assert_eq!(opts.ready_pin, None);
    }

    #[test]
    fn test_file_config_rejects_unknown_keys() {
        assert!(FileConfig::parse("[serial]\nspeed = 9600\n").is_err());
        assert!(FileConfig::parse("[bogus]\n").is_err());
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        fs::write(&path, "[serial]\nbaud = 57600\n").unwrap();

        let opts = load_config(Some(&path)).unwrap();
        assert_eq!(opts.baud, 57_600);

        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
        assert_eq!(load_config(None).unwrap().baud, 115_200);
    }

    #[test]
    fn test_validate() {
        let bad = Options {
            max_reconnect_attempts: 0,
            ..Options::default()
        };
        assert!(bad.validate().is_err());

        let shared_pin = Options {
            media_pin: Some(18),
            ..Options::default()
        };
        assert!(shared_pin.validate().is_err());

        let no_health = Options {
            health_checks: false,
            health_interval: Duration::ZERO,
            ..Options::default()
        };
        assert!(no_health.validate().is_ok());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("40ms").unwrap(), Duration::from_millis(40));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_parse_pin() {
        assert_eq!(parse_pin("18").unwrap(), Some(18));
        assert_eq!(parse_pin("none").unwrap(), None);
        assert_eq!(parse_pin("OFF").unwrap(), None);
        assert!(parse_pin("gpio18").is_err());
    }

    #[test]
    fn test_settings_conversion() {
        let opts = Options::default();
        let link = opts.link_settings();
        assert_eq!(link.preferred_port, "/dev/ttyACM0");
        assert_eq!(link.max_attempts, 10);
        assert_eq!(link.port.read_timeout, Duration::from_millis(100));

        let audio = opts.audio_settings();
        assert_eq!(audio.init_attempts, 8);

        let looped = opts.loop_settings();
        assert_eq!(looped.health_interval, Duration::from_secs(30));
    }
}
