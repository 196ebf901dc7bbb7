use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::{parse_duration, parse_pin, Options};

/// Serial button-receiver relay
#[derive(Parser, Debug, Default)]
#[command(name = "sfx-relay")]
#[command(version)]
#[command(about = "Plays sound feedback for wireless button presses reported by a serial receiver", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Receiver serial device, tried before the fallback ports
    #[arg(short, long, value_name = "DEVICE", env = "SFX_RELAY_SERIAL")]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(short, long, value_name = "RATE")]
    pub baud: Option<u32>,

    /// Full passes over the port list before giving up
    #[arg(long, value_name = "COUNT")]
    pub reconnect_attempts: Option<u32>,

    /// Pause between reconnect passes (e.g. 2s, 500ms)
    #[arg(long, value_name = "DURATION")]
    pub reconnect_delay: Option<String>,

    /// Local sound directory
    #[arg(short = 'd', long, value_name = "DIR")]
    pub sound_dir: Option<PathBuf>,

    /// Removable media base directory (can be specified multiple times)
    #[arg(long = "media-root", value_name = "DIR")]
    pub media_roots: Vec<PathBuf>,

    /// File pattern for the RIGHT sound
    #[arg(long, value_name = "GLOB")]
    pub right_pattern: Option<String>,

    /// File pattern for the WRONG sounds
    #[arg(long, value_name = "GLOB")]
    pub wrong_pattern: Option<String>,

    /// GPIO pin of the ready indicator, or "none"
    #[arg(long, value_name = "PIN")]
    pub ready_pin: Option<String>,

    /// GPIO pin of the media indicator, or "none"
    #[arg(long, value_name = "PIN")]
    pub media_pin: Option<String>,

    /// Disable periodic health reports
    #[arg(long)]
    pub no_health: bool,

    /// Interval between health reports (e.g. 30s)
    #[arg(long, value_name = "DURATION")]
    pub health_interval: Option<String>,

    /// Event log file
    #[arg(short, long, value_name = "FILE")]
    pub logfile: Option<PathBuf>,

    /// Health log file
    #[arg(long, value_name = "FILE")]
    pub health_logfile: Option<PathBuf>,

    /// Debug output on the console
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Merge CLI arguments into the options struct
    pub fn merge_into_options(&self, mut opts: Options) -> Result<Options> {
        if let Some(ref port) = self.port {
            opts.serial_port = port.clone();
        }

        if let Some(baud) = self.baud {
            opts.baud = baud;
        }

        if let Some(attempts) = self.reconnect_attempts {
            opts.max_reconnect_attempts = attempts;
        }

        if let Some(ref delay) = self.reconnect_delay {
            opts.reconnect_delay = parse_duration(delay).context("Invalid reconnect delay")?;
        }

        if let Some(ref dir) = self.sound_dir {
            opts.local_sound_dir = dir.clone();
        }

        if !self.media_roots.is_empty() {
            opts.media_roots = self.media_roots.clone();
        }

        if let Some(ref pattern) = self.right_pattern {
            opts.primary_pattern = pattern.clone();
        }

        if let Some(ref pattern) = self.wrong_pattern {
            opts.secondary_pattern = pattern.clone();
        }

        if let Some(ref pin) = self.ready_pin {
            opts.ready_pin = parse_pin(pin).context("Invalid ready indicator pin")?;
        }

        if let Some(ref pin) = self.media_pin {
            opts.media_pin = parse_pin(pin).context("Invalid media indicator pin")?;
        }

        if self.no_health {
            opts.health_checks = false;
        }

        if let Some(ref interval) = self.health_interval {
            opts.health_interval = parse_duration(interval).context("Invalid health interval")?;
        }

        if let Some(ref log_file) = self.logfile {
            opts.log_file = Some(log_file.clone());
        }

        if let Some(ref log_file) = self.health_logfile {
            opts.health_log_file = Some(log_file.clone());
        }

        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SERIAL_PORT_ENV;
    use serial_test::serial;
    use std::time::Duration;

    #[test]
    fn test_merge_basic_options() {
        let cli = Cli {
            port: Some("/dev/ttyUSB0".to_string()),
            reconnect_delay: Some("500ms".to_string()),
            media_pin: Some("23".to_string()),
            no_health: true,
            ..Default::default()
        };

        let opts = cli.merge_into_options(Options::default()).unwrap();
        assert_eq!(opts.serial_port, "/dev/ttyUSB0");
        assert_eq!(opts.reconnect_delay, Duration::from_millis(500));
        assert_eq!(opts.media_pin, Some(23));
        assert!(!opts.health_checks);
        assert_eq!(opts.ready_pin, Some(18));
    }

    #[test]
    fn test_merge_keeps_unset_values() {
        let base = Options {
            serial_port: "/dev/serial0".to_string(),
            ..Options::default()
        };
        let opts = Cli::default().merge_into_options(base.clone()).unwrap();
        assert_eq!(opts, base);
    }

    #[test]
    fn test_invalid_pin() {
        let cli = Cli {
            ready_pin: Some("gpio18".to_string()),
            ..Default::default()
        };
        assert!(cli.merge_into_options(Options::default()).is_err());
    }

    #[test]
    fn test_ready_pin_none() {
        let cli = Cli {
            ready_pin: Some("none".to_string()),
            ..Default::default()
        };
        let opts = cli.merge_into_options(Options::default()).unwrap();
        assert_eq!(opts.ready_pin, None);
    }

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::try_parse_from([
            "sfx-relay",
            "--port",
            "/dev/ttyACM1",
            "--media-root",
            "/media",
            "--media-root",
            "/run/media",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(cli.media_roots.len(), 2);
        assert!(cli.verbose);
    }

    #[test]
    #[serial]
    fn test_port_from_environment() {
        std::env::set_var(SERIAL_PORT_ENV, "/dev/ttyAMA0");
        let from_env = Cli::try_parse_from(["sfx-relay"]).unwrap();
        let from_flag = Cli::try_parse_from(["sfx-relay", "-p", "/dev/ttyS0"]).unwrap();
        std::env::remove_var(SERIAL_PORT_ENV);

        assert_eq!(from_env.port.as_deref(), Some("/dev/ttyAMA0"));
        assert_eq!(from_flag.port.as_deref(), Some("/dev/ttyS0"));
    }
}
