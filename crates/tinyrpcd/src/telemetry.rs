//! Structured telemetry initialisation for the server.
//!
//! Events are written to stderr and copied into a bounded in-memory
//! [`LogBuffer`] that the `server.get_log` control method serves. The filter
//! sits behind a reload layer so `server.set_logging_level` can change it
//! while serving.

use std::collections::VecDeque;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::OnceCell;
use strum::{Display, EnumString};
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer, Registry, reload};

use tinyrpc_config::{Config, LogFormat};

static TELEMETRY: OnceCell<TelemetryHandle> = OnceCell::new();

type Filtered = Layered<reload::Layer<EnvFilter, Registry>, Registry>;

/// Bytes of formatted output retained for `server.get_log`.
pub const LOG_BUFFER_CAPACITY: usize = 256 * 1024;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
    /// Failed to swap the active filter.
    #[error("failed to change the log filter: {0}")]
    Reload(String),
}

/// Level names accepted by `server.set_logging_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    /// Everything, including trace output.
    NotSet,
    /// Debug and above.
    Debug,
    /// Informational and above.
    Info,
    /// Warnings and errors.
    Warning,
    /// Errors only.
    Error,
    /// Errors only; tracing has no level above error.
    Fatal,
}

impl LogLevel {
    /// Filter directive enabling this level.
    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::NotSet => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Fatal => "error",
        }
    }
}

/// Log management exposed through the control surface.
pub trait LogControl: Send + Sync {
    /// Replaces the active filter with `level`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when the filter cannot be swapped.
    fn set_level(&self, level: LogLevel) -> Result<(), TelemetryError>;

    /// Returns the retained log text.
    fn collect(&self) -> String;

    /// Discards the retained log text.
    fn reset(&self);
}

/// Log control used when telemetry is not initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogControl;

impl LogControl for NoopLogControl {
    fn set_level(&self, _level: LogLevel) -> Result<(), TelemetryError> {
        Ok(())
    }

    fn collect(&self) -> String {
        String::new()
    }

    fn reset(&self) {}
}

/// Bounded store of recently formatted log lines.
///
/// The oldest lines are evicted once the retained text exceeds the capacity.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<BufferState>>,
}

#[derive(Debug)]
struct BufferState {
    lines: VecDeque<String>,
    bytes: usize,
    capacity: usize,
}

impl LogBuffer {
    /// Creates a buffer retaining at most `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BufferState {
                lines: VecDeque::new(),
                bytes: 0,
                capacity,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends one formatted event.
    pub fn push(&self, line: String) {
        let mut state = self.lock();
        state.bytes += line.len();
        state.lines.push_back(line);
        while state.bytes > state.capacity {
            let Some(evicted) = state.lines.pop_front() else {
                break;
            };
            state.bytes -= evicted.len();
        }
    }

    /// Retained text, oldest first.
    #[must_use]
    pub fn contents(&self) -> String {
        self.lock().lines.iter().map(String::as_str).collect()
    }

    /// Discards everything retained.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.lines.clear();
        state.bytes = 0;
    }
}

/// Writer that hands one event to the buffer when dropped.
#[derive(Debug)]
pub struct BufferWriter {
    buffer: LogBuffer,
    pending: Vec<u8>,
}

impl Write for BufferWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BufferWriter {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            let text = String::from_utf8_lossy(&self.pending).into_owned();
            self.buffer.push(text);
        }
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = BufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BufferWriter {
            buffer: self.clone(),
            pending: Vec::new(),
        }
    }
}

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    buffer: LogBuffer,
}

impl LogControl for TelemetryHandle {
    fn set_level(&self, level: LogLevel) -> Result<(), TelemetryError> {
        let filter = EnvFilter::try_new(level.directive())
            .map_err(|error| TelemetryError::Filter(error.to_string()))?;
        self.filter
            .reload(filter)
            .map_err(|error| TelemetryError::Reload(error.to_string()))
    }

    fn collect(&self) -> String {
        self.buffer.contents()
    }

    fn reset(&self) {
        self.buffer.clear();
    }
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent: later invocations return the handle created
/// by the first one without touching the global state again.
///
/// # Errors
///
/// Returns [`TelemetryError`] if the filter is invalid or another subscriber
/// is already installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY
        .get_or_try_init(|| install_subscriber(config))
        .cloned()
}

fn install_subscriber(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let (filter_layer, filter_handle) = reload::Layer::new(filter);
    let buffer = LogBuffer::with_capacity(LOG_BUFFER_CAPACITY);

    let writer = io::stderr.and(buffer.clone());
    let layer = || {
        fmt::layer::<Filtered>()
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(true)
            .with_writer(writer.clone())
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };
    let output: Box<dyn Layer<Filtered> + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(layer().json().flatten_event(true)),
        LogFormat::Compact => Box::new(layer().compact()),
    };

    let subscriber = Registry::default().with(filter_layer).with(output);
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    Ok(TelemetryHandle {
        filter: filter_handle,
        buffer,
    })
}
