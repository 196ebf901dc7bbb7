//! Status indicators
//!
//! An [`Indicator`] is anything that accepts an output level between 0.0
//! and 1.0. The relay drives LEDs through the Linux sysfs GPIO interface
//! ([`SysfsGpio`]); [`IndicatorController`] adds on/off/blink on top and
//! turns a missing indicator into a silent no-op.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::error::IndicatorError;

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Output-level capability
pub trait Indicator {
    fn set_level(&mut self, level: f32) -> Result<(), IndicatorError>;
}

// =============================================================================
// Sysfs GPIO backend
// =============================================================================

/// LED on a GPIO line, driven through `/sys/class/gpio`
#[derive(Debug)]
pub struct SysfsGpio {
    pin: u32,
    active_low: bool,
    value_path: PathBuf,
}

impl SysfsGpio {
    pub fn open(pin: u32, active_low: bool) -> Result<Self, IndicatorError> {
        Self::open_at(Path::new(SYSFS_GPIO_ROOT), pin, active_low)
    }

    /// Export `pin` under `root` if needed and configure it as an output.
    pub fn open_at(root: &Path, pin: u32, active_low: bool) -> Result<Self, IndicatorError> {
        if !root.is_dir() {
            return Err(IndicatorError::Unavailable(format!(
                "{} not present",
                root.display()
            )));
        }

        let line_dir = root.join(format!("gpio{}", pin));
        if !line_dir.is_dir() {
            fs::write(root.join("export"), pin.to_string())?;
            // udev needs a moment to create the line directory
            for _ in 0..10 {
                if line_dir.is_dir() {
                    break;
                }
                thread::sleep(Duration::from_millis(10));
            }
            if !line_dir.is_dir() {
                return Err(IndicatorError::Unavailable(format!("gpio{} did not appear", pin)));
            }
        }

        fs::write(line_dir.join("direction"), "out")?;

        Ok(Self {
            pin,
            active_low,
            value_path: line_dir.join("value"),
        })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }
}

impl Indicator for SysfsGpio {
    fn set_level(&mut self, level: f32) -> Result<(), IndicatorError> {
        let lit = level >= 0.5;
        let high = lit != self.active_low;
        fs::write(&self.value_path, if high { "1" } else { "0" })?;
        Ok(())
    }
}

// =============================================================================
// Controller
// =============================================================================

/// On/off/blink control over an optional indicator
pub struct IndicatorController {
    name: &'static str,
    indicator: Option<Box<dyn Indicator>>,
    blink_duration: Duration,
    lit: Option<bool>,
}

impl IndicatorController {
    pub fn new(name: &'static str, indicator: Option<Box<dyn Indicator>>, blink_duration: Duration) -> Self {
        Self {
            name,
            indicator,
            blink_duration,
            lit: None,
        }
    }

    /// Controller for an indicator that is not fitted
    pub fn absent(name: &'static str) -> Self {
        Self::new(name, None, Duration::ZERO)
    }

    pub fn is_available(&self) -> bool {
        self.indicator.is_some()
    }

    /// Last level successfully applied, `None` before the first command
    pub fn is_lit(&self) -> Option<bool> {
        self.lit
    }

    pub fn on(&mut self) {
        self.apply(true);
    }

    pub fn off(&mut self) {
        self.apply(false);
    }

    pub fn set(&mut self, lit: bool) {
        self.apply(lit);
    }

    /// Off, short pause, on. Blocks for the blink duration.
    pub fn blink(&mut self) {
        if self.indicator.is_none() {
            return;
        }
        self.apply(false);
        thread::sleep(self.blink_duration);
        self.apply(true);
    }

    fn apply(&mut self, lit: bool) {
        let Some(ref mut indicator) = self.indicator else {
            return;
        };
        match indicator.set_level(if lit { 1.0 } else { 0.0 }) {
            Ok(()) => self.lit = Some(lit),
            Err(e) => crate::log_warning!("{} indicator update failed: {}", self.name, e),
        }
    }
}
