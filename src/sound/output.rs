//! Audio output capability
//!
//! The controller only needs three things from the sound hardware: open it,
//! play a file on a numbered channel, and ask whether anything is still
//! playing. [`AudioDriver`] and [`AudioDevice`] capture exactly that, and
//! [`RodioDriver`] implements it on top of rodio.
//!
//! rodio's `OutputStream` is not `Send`, so the device lives on a dedicated
//! thread and is driven through a command channel. Dropping the
//! [`AudioDevice`] shuts the thread down and releases the hardware.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::HostTrait;
use crossbeam::channel::{self, Receiver, Sender};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use crate::error::AudioError;

/// Number of independent playback channels
pub const CHANNEL_COUNT: usize = 2;

/// How long to wait for the audio thread to report that the stream opened
const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

/// An opened sound output
pub trait AudioDevice {
    /// Play `path` on `channel`, replacing whatever that channel was playing.
    fn play(&mut self, channel: usize, path: &Path) -> Result<(), AudioError>;

    /// True while any channel is still playing.
    fn is_busy(&self) -> bool;
}

/// Factory for [`AudioDevice`]s
pub trait AudioDriver {
    fn name(&self) -> &'static str;

    fn open(&mut self) -> Result<Box<dyn AudioDevice>, AudioError>;
}

/// Quick check for an output device, done once at startup.
pub fn output_device_present() -> bool {
    cpal::default_host().default_output_device().is_some()
}

// =============================================================================
// Rodio backend
// =============================================================================

/// Commands sent to the audio thread
enum AudioCommand {
    Play {
        channel: usize,
        path: PathBuf,
        reply: Sender<Result<(), AudioError>>,
    },
    IsBusy(Sender<bool>),
    Shutdown,
}

/// Opens the default output through rodio
#[derive(Debug, Default)]
pub struct RodioDriver;

impl RodioDriver {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDriver for RodioDriver {
    fn name(&self) -> &'static str {
        "rodio"
    }

    fn open(&mut self) -> Result<Box<dyn AudioDevice>, AudioError> {
        Ok(Box::new(RodioDevice::open()?))
    }
}

/// Handle to a running audio thread
pub struct RodioDevice {
    sender: Sender<AudioCommand>,
    thread: Option<JoinHandle<()>>,
}

impl RodioDevice {
    fn open() -> Result<Self, AudioError> {
        let (tx, rx) = channel::unbounded();
        let (ready_tx, ready_rx) = channel::bounded(1);

        let thread = thread::Builder::new()
            .name("sfx-audio".to_string())
            .spawn(move || audio_thread_main(rx, ready_tx))
            .map_err(|e| AudioError::DeviceUnavailable(format!("cannot spawn audio thread: {}", e)))?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => Ok(Self {
                sender: tx,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                // The thread may still be stuck in the driver; detach it.
                let _ = tx.send(AudioCommand::Shutdown);
                Err(AudioError::DeviceUnavailable(
                    "audio output did not open in time".to_string(),
                ))
            }
        }
    }
}

impl AudioDevice for RodioDevice {
    fn play(&mut self, channel: usize, path: &Path) -> Result<(), AudioError> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.sender
            .send(AudioCommand::Play {
                channel,
                path: path.to_path_buf(),
                reply: reply_tx,
            })
            .map_err(|_| AudioError::ThreadGone)?;
        reply_rx.recv().map_err(|_| AudioError::ThreadGone)?
    }

    fn is_busy(&self) -> bool {
        let (reply_tx, reply_rx) = channel::bounded(1);
        if self.sender.send(AudioCommand::IsBusy(reply_tx)).is_err() {
            return false;
        }
        reply_rx.recv().unwrap_or(false)
    }
}

impl Drop for RodioDevice {
    fn drop(&mut self) {
        let _ = self.sender.send(AudioCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Audio thread main function
fn audio_thread_main(rx: Receiver<AudioCommand>, ready: Sender<Result<(), AudioError>>) {
    let (_stream, stream_handle) = match OutputStream::try_default() {
        Ok(s) => s,
        Err(e) => {
            let _ = ready.send(Err(AudioError::DeviceUnavailable(e.to_string())));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut sinks: Vec<Option<Sink>> = (0..CHANNEL_COUNT).map(|_| None).collect();

    while let Ok(cmd) = rx.recv() {
        match cmd {
            AudioCommand::Play { channel, path, reply } => {
                let result = play_file(&stream_handle, &mut sinks, channel, &path);
                let _ = reply.send(result);
            }
            AudioCommand::IsBusy(reply) => {
                let busy = sinks.iter().flatten().any(|sink| !sink.empty());
                let _ = reply.send(busy);
            }
            AudioCommand::Shutdown => break,
        }
    }

    for sink in sinks.iter_mut().filter_map(Option::take) {
        sink.stop();
    }
}

fn play_file(
    stream_handle: &OutputStreamHandle,
    sinks: &mut [Option<Sink>],
    channel: usize,
    path: &Path,
) -> Result<(), AudioError> {
    let slot = sinks
        .get_mut(channel)
        .ok_or_else(|| AudioError::Playback(format!("no such channel {}", channel)))?;

    let file = File::open(path).map_err(|source| AudioError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let source = Decoder::new(BufReader::new(file)).map_err(|e| AudioError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let sink = Sink::try_new(stream_handle).map_err(|e| AudioError::Playback(e.to_string()))?;

    if let Some(previous) = slot.take() {
        previous.stop();
    }
    sink.append(source);
    *slot = Some(sink);
    Ok(())
}
