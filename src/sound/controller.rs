//! Playback control
//!
//! [`AudioController`] owns the sound output session and the two active sound
//! sets. The session is opened lazily on the first play and closed again
//! after a quiet period, so the audio hardware is only claimed while it is
//! actually needed.
//!
//! Session states:
//!
//! ```text
//! Uninitialized --play--> Ready --tick_idle (quiet, not busy)--> Uninitialized
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;

use super::output::{AudioDevice, AudioDriver};
use super::source::SoundSet;
use crate::error::AudioError;

/// Channel used for the primary sound
pub const PRIMARY_CHANNEL: usize = 0;
/// Channel used for the secondary sounds
pub const SECONDARY_CHANNEL: usize = 1;

/// Tunables for session management
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSettings {
    /// Open attempts before giving up on a play request
    pub init_attempts: u32,
    /// Pause between open attempts
    pub init_retry_delay: Duration,
    /// Quiet period after which the session is closed
    pub idle_shutoff: Duration,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            init_attempts: 8,
            init_retry_delay: Duration::from_millis(200),
            idle_shutoff: Duration::from_secs(1),
        }
    }
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SoundKind {
    Primary,
    Secondary,
}

impl SoundKind {
    fn label(&self) -> &'static str {
        match self {
            SoundKind::Primary => "RIGHT",
            SoundKind::Secondary => "WRONG",
        }
    }

    fn channel(&self) -> usize {
        match self {
            SoundKind::Primary => PRIMARY_CHANNEL,
            SoundKind::Secondary => SECONDARY_CHANNEL,
        }
    }
}

/// Existence-checked file lists, swapped as a whole
#[derive(Debug, Default)]
struct ActiveSets {
    primary: Vec<PathBuf>,
    secondary: Vec<PathBuf>,
}

pub struct AudioController {
    driver: Box<dyn AudioDriver>,
    device: Option<Box<dyn AudioDevice>>,
    settings: AudioSettings,
    active: Arc<ActiveSets>,
    last_play: Option<Instant>,
    failures: u64,
    available: bool,
}

impl AudioController {
    /// `available` is the startup capability check; when false every play
    /// request is a logged no-op.
    pub fn new(driver: Box<dyn AudioDriver>, settings: AudioSettings, available: bool) -> Self {
        Self {
            driver,
            device: None,
            settings,
            active: Arc::new(ActiveSets::default()),
            last_play: None,
            failures: 0,
            available,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn state(&self) -> SessionState {
        if self.device.is_some() {
            SessionState::Ready
        } else {
            SessionState::Uninitialized
        }
    }

    /// Playback and session failures since startup
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Number of playable (primary, secondary) files
    pub fn active_counts(&self) -> (usize, usize) {
        (self.active.primary.len(), self.active.secondary.len())
    }

    /// Replace both active lists. Files that no longer exist are dropped with
    /// one warning per category. The session is left untouched.
    pub fn set_active_sets(&mut self, primary: &SoundSet, secondary: &SoundSet) {
        let next = ActiveSets {
            primary: existing_files(SoundKind::Primary, &primary.paths),
            secondary: existing_files(SoundKind::Secondary, &secondary.paths),
        };
        self.active = Arc::new(next);
    }

    /// Play the first primary file on the primary channel.
    pub fn play_primary(&mut self) -> bool {
        let active = Arc::clone(&self.active);
        self.play(SoundKind::Primary, active.primary.first().map(PathBuf::as_path))
    }

    /// Play a uniformly chosen secondary file on the secondary channel.
    pub fn play_secondary(&mut self) -> bool {
        let active = Arc::clone(&self.active);
        let choice = active.secondary.choose(&mut rand::thread_rng());
        self.play(SoundKind::Secondary, choice.map(PathBuf::as_path))
    }

    /// Close the session if it has been quiet for longer than the idle
    /// threshold and nothing is playing.
    pub fn tick_idle(&mut self) {
        let Some(ref device) = self.device else {
            return;
        };
        let quiet = self
            .last_play
            .map_or(true, |at| at.elapsed() > self.settings.idle_shutoff);
        if quiet && !device.is_busy() {
            self.device = None;
            crate::log_debug!("audio: mixer closed (idle)");
        }
    }

    /// Close the session unconditionally.
    pub fn teardown(&mut self) {
        if self.device.take().is_some() {
            crate::log_debug!("audio: mixer closed");
        }
    }

    fn play(&mut self, kind: SoundKind, path: Option<&Path>) -> bool {
        let Some(path) = path else {
            crate::log_info!("{} sound skipped (no files)", kind.label());
            return false;
        };
        if !self.available {
            crate::log_debug!("{} sound skipped (audio unavailable)", kind.label());
            return false;
        }
        if !self.ensure_ready() {
            return false;
        }

        let Some(ref mut device) = self.device else {
            return false;
        };
        match device.play(kind.channel(), path) {
            Ok(()) => {
                self.last_play = Some(Instant::now());
                crate::log_info!("Played {} sound: {}", kind.label(), display_name(path));
                true
            }
            Err(e) => {
                self.failures += 1;
                crate::log_error!("Failed to play {} sound: {}", kind.label(), e);
                if matches!(e, AudioError::ThreadGone) {
                    self.device = None;
                }
                false
            }
        }
    }

    fn ensure_ready(&mut self) -> bool {
        if self.device.is_some() {
            return true;
        }

        let attempts = self.settings.init_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.driver.open() {
                Ok(device) => {
                    self.device = Some(device);
                    crate::log_info!("Audio mixer initialized ({})", self.driver.name());
                    return true;
                }
                Err(e) => {
                    crate::log_debug!("audio init retry {}: {}", attempt, e);
                    last_error = Some(e);
                    if attempt < attempts {
                        thread::sleep(self.settings.init_retry_delay);
                    }
                }
            }
        }

        self.failures += 1;
        match last_error {
            Some(e) => crate::log_error!(
                "Audio mixer initialization failed after {} attempts: {}",
                attempts,
                e
            ),
            None => crate::log_error!("Audio mixer initialization failed after {} attempts", attempts),
        }
        false
    }
}

fn existing_files(kind: SoundKind, paths: &[PathBuf]) -> Vec<PathBuf> {
    let kept: Vec<PathBuf> = paths.iter().filter(|p| p.exists()).cloned().collect();
    let missing = paths.len() - kept.len();
    if missing > 0 {
        crate::log_warning!(
            "Some {} sound files not found: {} missing",
            kind.label().to_lowercase(),
            missing
        );
    }
    kept
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::source::Provenance;
    use serial_test::serial;
    use std::cell::{Cell, RefCell};
    use std::fs::{self, File};
    use std::rc::Rc;

    #[derive(Default)]
    struct Probe {
        opens: Cell<u32>,
        failing_opens: Cell<u32>,
        plays: RefCell<Vec<(usize, PathBuf)>>,
        busy: Cell<bool>,
        fail_play: Cell<bool>,
    }

    struct FakeDevice(Rc<Probe>);

    impl AudioDevice for FakeDevice {
        fn play(&mut self, channel: usize, path: &Path) -> Result<(), AudioError> {
            if self.0.fail_play.get() {
                return Err(AudioError::Playback("corrupt".to_string()));
            }
            self.0.plays.borrow_mut().push((channel, path.to_path_buf()));
            Ok(())
        }

        fn is_busy(&self) -> bool {
            self.0.busy.get()
        }
    }

    struct FakeDriver(Rc<Probe>);

    impl AudioDriver for FakeDriver {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn open(&mut self) -> Result<Box<dyn AudioDevice>, AudioError> {
            self.0.opens.set(self.0.opens.get() + 1);
            if self.0.failing_opens.get() > 0 {
                self.0.failing_opens.set(self.0.failing_opens.get() - 1);
                return Err(AudioError::DeviceUnavailable("busy".to_string()));
            }
            Ok(Box::new(FakeDevice(Rc::clone(&self.0))))
        }
    }

    fn fast_settings() -> AudioSettings {
        AudioSettings {
            init_attempts: 8,
            init_retry_delay: Duration::ZERO,
            idle_shutoff: Duration::ZERO,
        }
    }

    fn controller(probe: &Rc<Probe>) -> AudioController {
        AudioController::new(Box::new(FakeDriver(Rc::clone(probe))), fast_settings(), true)
    }

    fn sound_files(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                File::create(&path).unwrap();
                path
            })
            .collect()
    }

    fn set(paths: Vec<PathBuf>) -> SoundSet {
        SoundSet::new(Provenance::Local(PathBuf::from("/tmp")), paths)
    }

    #[test]
    fn test_play_primary_initializes_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Rc::new(Probe::default());
        let mut audio = controller(&probe);
        let files = sound_files(dir.path(), &["right.wav"]);
        audio.set_active_sets(&set(files.clone()), &set(Vec::new()));

        assert_eq!(audio.state(), SessionState::Uninitialized);
        assert!(audio.play_primary());
        assert_eq!(audio.state(), SessionState::Ready);
        assert!(audio.play_primary());

        assert_eq!(probe.opens.get(), 1);
        assert_eq!(
            *probe.plays.borrow(),
            vec![(PRIMARY_CHANNEL, files[0].clone()), (PRIMARY_CHANNEL, files[0].clone())]
        );
    }

    #[test]
    fn test_play_secondary_chooses_from_set() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Rc::new(Probe::default());
        let mut audio = controller(&probe);
        let files = sound_files(dir.path(), &["wrong1.wav", "wrong2.wav", "wrong3.wav"]);
        audio.set_active_sets(&set(Vec::new()), &set(files.clone()));

        for _ in 0..20 {
            assert!(audio.play_secondary());
        }
        for (channel, path) in probe.plays.borrow().iter() {
            assert_eq!(*channel, SECONDARY_CHANNEL);
            assert!(files.contains(path));
        }
    }

    #[test]
    fn test_empty_set_is_noop() {
        let probe = Rc::new(Probe::default());
        let mut audio = controller(&probe);

        assert!(!audio.play_primary());
        assert!(!audio.play_secondary());
        assert_eq!(probe.opens.get(), 0);
        assert_eq!(audio.failures(), 0);
    }

    #[test]
    fn test_init_retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Rc::new(Probe::default());
        probe.failing_opens.set(7);
        let mut audio = controller(&probe);
        audio.set_active_sets(&set(sound_files(dir.path(), &["right.wav"])), &set(Vec::new()));

        assert!(audio.play_primary());
        assert_eq!(probe.opens.get(), 8);
        assert_eq!(audio.failures(), 0);
    }

    #[test]
    fn test_init_gives_up_after_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Rc::new(Probe::default());
        probe.failing_opens.set(100);
        let mut audio = controller(&probe);
        audio.set_active_sets(&set(sound_files(dir.path(), &["right.wav"])), &set(Vec::new()));

        assert!(!audio.play_primary());
        assert_eq!(probe.opens.get(), 8);
        assert_eq!(audio.failures(), 1);
        assert_eq!(audio.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_playback_error_is_counted_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Rc::new(Probe::default());
        probe.fail_play.set(true);
        let mut audio = controller(&probe);
        audio.set_active_sets(&set(sound_files(dir.path(), &["right.wav"])), &set(Vec::new()));

        assert!(!audio.play_primary());
        assert_eq!(audio.failures(), 1);
        assert_eq!(audio.state(), SessionState::Ready);
    }

    #[test]
    fn test_unavailable_audio_never_opens() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Rc::new(Probe::default());
        let mut audio =
            AudioController::new(Box::new(FakeDriver(Rc::clone(&probe))), fast_settings(), false);
        audio.set_active_sets(&set(sound_files(dir.path(), &["right.wav"])), &set(Vec::new()));

        assert!(!audio.is_available());
        assert!(!audio.play_primary());
        assert_eq!(probe.opens.get(), 0);
    }

    #[test]
    fn test_idle_teardown_waits_for_busy_channels() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Rc::new(Probe::default());
        let mut audio = controller(&probe);
        audio.set_active_sets(&set(sound_files(dir.path(), &["right.wav"])), &set(Vec::new()));
        assert!(audio.play_primary());

        probe.busy.set(true);
        thread::sleep(Duration::from_millis(2));
        audio.tick_idle();
        assert_eq!(audio.state(), SessionState::Ready);

        probe.busy.set(false);
        audio.tick_idle();
        assert_eq!(audio.state(), SessionState::Uninitialized);

        // Next play reopens the session
        assert!(audio.play_primary());
        assert_eq!(probe.opens.get(), 2);
    }

    #[test]
    fn test_idle_teardown_respects_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Rc::new(Probe::default());
        let settings = AudioSettings {
            idle_shutoff: Duration::from_secs(3600),
            ..fast_settings()
        };
        let mut audio = AudioController::new(Box::new(FakeDriver(Rc::clone(&probe))), settings, true);
        audio.set_active_sets(&set(sound_files(dir.path(), &["right.wav"])), &set(Vec::new()));
        assert!(audio.play_primary());

        audio.tick_idle();
        assert_eq!(audio.state(), SessionState::Ready);

        audio.teardown();
        assert_eq!(audio.state(), SessionState::Uninitialized);
    }

    #[test]
    #[serial]
    fn test_set_active_sets_drops_missing_files_with_one_warning() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("events.txt");
        crate::event_log::init(&log_path, None).unwrap();

        let probe = Rc::new(Probe::default());
        let mut audio = controller(&probe);
        let mut paths = sound_files(dir.path(), &["wrong1.wav", "wrong2.wav"]);
        paths.insert(1, dir.path().join("wrong_missing.wav"));
        audio.set_active_sets(&set(Vec::new()), &set(paths));
        crate::event_log::close();

        assert_eq!(audio.active_counts(), (0, 2));
        let text = fs::read_to_string(&log_path).unwrap();
        let warnings: Vec<&str> = text.lines().filter(|l| l.contains("[WARNING]")).collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("1 missing"));
    }
}
