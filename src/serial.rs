//! Serial link to the button receiver
//!
//! [`SerialLink`] walks a preference-ordered list of character devices,
//! keeps at most one of them open, and reads newline-terminated records with
//! a short timeout so the caller never blocks indefinitely.
//!
//! Link states:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected (I/O error)
//!                     |                          |
//!                     +--> Failed (exhausted)    +--> Connecting (retry)
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::Duration;

use crate::error::LinkError;
use crate::shutdown::ShutdownFlag;

/// Records longer than this without a newline are flushed as a line
pub const MAX_LINE_BYTES: usize = 1024;

const READ_CHUNK: usize = 256;

/// Line parameters applied when a port is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    pub baud: u32,
    pub read_timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud: 115_200,
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// An open serial device
pub trait SerialPort {
    /// Read whatever is available. `Ok(0)` means the read timed out.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Liveness probe that does not touch the line.
    fn is_open(&self) -> bool;
}

/// Opens serial devices by path
pub trait PortOpener {
    fn open(&mut self, path: &str, settings: &PortSettings) -> io::Result<Box<dyn SerialPort>>;
}

// =============================================================================
// TTY backend
// =============================================================================

/// Opens real terminal devices through termios
#[derive(Debug, Default)]
pub struct TtyOpener;

impl PortOpener for TtyOpener {
    fn open(&mut self, path: &str, settings: &PortSettings) -> io::Result<Box<dyn SerialPort>> {
        Ok(Box::new(TtyPort::open(path, settings)?))
    }
}

/// Raw-mode terminal device with a VTIME read timeout
#[derive(Debug)]
pub struct TtyPort {
    file: File,
    path: String,
}

impl TtyPort {
    pub fn open(path: &str, settings: &PortSettings) -> io::Result<Self> {
        let speed = baud_constant(settings.baud).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {}", settings.baud),
            )
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)?;
        let fd = file.as_raw_fd();

        // SAFETY: fd is owned by `file` for the duration of these calls and
        // `tio` is fully initialized by tcgetattr before use.
        unsafe {
            let mut tio: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &mut tio) != 0 {
                return Err(io::Error::last_os_error());
            }
            libc::cfmakeraw(&mut tio);
            tio.c_cflag |= libc::CLOCAL | libc::CREAD;
            tio.c_cc[libc::VMIN] = 0;
            tio.c_cc[libc::VTIME] = deciseconds(settings.read_timeout);
            if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
                return Err(io::Error::last_os_error());
            }
            libc::tcflush(fd, libc::TCIFLUSH);
        }

        Ok(Self {
            file,
            path: path.to_string(),
        })
    }
}

impl SerialPort for TtyPort {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            other => other,
        }
    }

    fn is_open(&self) -> bool {
        // SAFETY: F_GETFL only queries descriptor flags.
        let flags = unsafe { libc::fcntl(self.file.as_raw_fd(), libc::F_GETFL) };
        flags != -1 && Path::new(&self.path).exists()
    }
}

fn deciseconds(timeout: Duration) -> libc::cc_t {
    let ds = (timeout.as_millis() + 99) / 100;
    ds.clamp(1, u8::MAX as u128) as libc::cc_t
}

fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460_800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921_600 => libc::B921600,
        _ => return None,
    };
    Some(speed)
}

// =============================================================================
// Link
// =============================================================================

/// Connection state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// All reconnect attempts exhausted
    Failed,
}

/// Where and how to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    /// Tried first on every pass
    pub preferred_port: String,
    pub fallback_ports: Vec<String>,
    /// Full passes over the port list before giving up
    pub max_attempts: u32,
    /// Pause between passes
    pub retry_delay: Duration,
    pub port: PortSettings,
}

pub struct SerialLink {
    opener: Box<dyn PortOpener>,
    settings: LinkSettings,
    port: Option<Box<dyn SerialPort>>,
    port_path: Option<String>,
    state: LinkState,
    pending: Vec<u8>,
    shutdown: ShutdownFlag,
}

impl SerialLink {
    pub fn new(opener: Box<dyn PortOpener>, settings: LinkSettings, shutdown: ShutdownFlag) -> Self {
        Self {
            opener,
            settings,
            port: None,
            port_path: None,
            state: LinkState::Disconnected,
            pending: Vec::new(),
            shutdown,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Path of the open port
    pub fn port_path(&self) -> Option<&str> {
        self.port_path.as_deref()
    }

    /// Preferred port first, then the fallbacks, without duplicates
    pub fn candidates(&self) -> Vec<String> {
        let mut ports: Vec<String> = Vec::with_capacity(self.settings.fallback_ports.len() + 1);
        for port in std::iter::once(&self.settings.preferred_port).chain(&self.settings.fallback_ports) {
            if !port.is_empty() && !ports.contains(port) {
                ports.push(port.clone());
            }
        }
        ports
    }

    /// Open the first candidate that works, retrying whole passes.
    ///
    /// Any previously open port is closed first. Returns the connected path.
    pub fn connect(&mut self) -> Result<String, LinkError> {
        self.close();
        self.state = LinkState::Connecting;

        let candidates = self.candidates();
        let attempts = self.settings.max_attempts.max(1);
        crate::log_debug!("waiting for receiver serial connection...");

        for attempt in 1..=attempts {
            for path in &candidates {
                if self.shutdown.is_requested() {
                    self.state = LinkState::Disconnected;
                    return Err(LinkError::Interrupted);
                }
                match self.opener.open(path, &self.settings.port) {
                    Ok(port) => {
                        self.port = Some(port);
                        self.port_path = Some(path.clone());
                        self.state = LinkState::Connected;
                        crate::log_info!("Connected to receiver on {}", path);
                        return Ok(path.clone());
                    }
                    Err(e) => crate::log_debug!("Failed to connect to {}: {}", path, e),
                }
            }

            if attempt < attempts {
                crate::log_warning!(
                    "Connection attempt {}/{} failed, retrying in {:.1}s",
                    attempt,
                    attempts,
                    self.settings.retry_delay.as_secs_f32()
                );
                if !self.shutdown.sleep(self.settings.retry_delay) {
                    self.state = LinkState::Disconnected;
                    return Err(LinkError::Interrupted);
                }
            }
        }

        self.state = LinkState::Failed;
        crate::log_error!("Failed to establish serial connection after {} attempts", attempts);
        Err(LinkError::Exhausted { attempts })
    }

    /// Read one record. Returns an empty string when nothing complete
    /// arrived before the timeout; partial data is kept for the next call.
    pub fn read_line(&mut self) -> Result<String, LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::NotConnected)?;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
                let record: Vec<u8> = self.pending.drain(..=end).collect();
                return Ok(decode_record(&record));
            }
            if self.pending.len() >= MAX_LINE_BYTES {
                let record = std::mem::take(&mut self.pending);
                return Ok(decode_record(&record));
            }

            let n = port.read_chunk(&mut chunk)?;
            if n == 0 {
                return Ok(String::new());
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }

    /// True while a port is open and its probe reports it alive.
    pub fn is_healthy(&self) -> bool {
        self.port.as_ref().is_some_and(|port| port.is_open())
    }

    /// Close the port, if any. Idempotent.
    pub fn close(&mut self) {
        self.port = None;
        self.port_path = None;
        self.pending.clear();
        if self.state != LinkState::Failed {
            self.state = LinkState::Disconnected;
        }
    }
}

/// Strip the terminator and decode permissively, dropping invalid bytes.
pub fn decode_record(bytes: &[u8]) -> String {
    let mut end = bytes.len();
    while end > 0 && matches!(bytes[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&bytes[..end])
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect()
}
