use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use once_cell::sync::OnceCell;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Where log records land unless overridden.
pub const DEFAULT_LOG_PATH: &str = "logs/webserv.log";

static LOG_FILE: OnceCell<Mutex<File>> = OnceCell::new();

/// Writer handle that serializes all writes through the shared log file.
struct LogWriter;

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match LOG_FILE.get() {
            Some(file) => {
                let mut guard = file.lock().unwrap_or_else(|e| e.into_inner());
                guard.write(buf)
            }
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match LOG_FILE.get() {
            Some(file) => {
                let mut guard = file.lock().unwrap_or_else(|e| e.into_inner());
                guard.flush()
            }
            None => Ok(()),
        }
    }
}

/// Renders `[LEVEL] YYYY-MM-DD HH:MM:SS: message key=value ...`.
struct RecordFormatter;

fn level_name(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        _ => "INFO",
    }
}

impl<S, N> FormatEvent<S, N> for RecordFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        write!(
            writer,
            "[{}] {}: ",
            level_name(*event.metadata().level()),
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        let mut visitor = RecordVisitor {
            writer: &mut writer,
            result: Ok(()),
        };
        event.record(&mut visitor);
        visitor.result?;
        writeln!(writer)
    }
}

/// Writes the `message` field bare and every other field as `key=value`.
struct RecordVisitor<'a, 'w> {
    writer: &'a mut Writer<'w>,
    result: std::fmt::Result,
}

impl Visit for RecordVisitor<'_, '_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if self.result.is_err() {
            return;
        }
        self.result = if field.name() == "message" {
            write!(self.writer, "{value:?}")
        } else {
            write!(self.writer, " {}={:?}", field.name(), value)
        };
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if self.result.is_err() {
            return;
        }
        self.result = if field.name() == "message" {
            write!(self.writer, "{value}")
        } else {
            write!(self.writer, " {}={}", field.name(), value)
        };
    }
}

fn stamp(message: &str) -> String {
    format!(
        "[INFO] {}: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        message
    )
}

/// Open the log file (creating parent directories), install the tracing
/// subscriber (INFO and up to the file, ERROR mirrored to stderr) and
/// write the init marker.
pub fn init(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    LOG_FILE
        .set(Mutex::new(file))
        .map_err(|_| anyhow::anyhow!("logger already initialized"))?;

    let file_layer = fmt::layer()
        .event_format(RecordFormatter)
        .with_writer(|| LogWriter)
        .with_filter(LevelFilter::INFO);
    let stderr_layer = fmt::layer()
        .event_format(RecordFormatter)
        .with_writer(io::stderr)
        .with_filter(LevelFilter::ERROR);
    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    write_marker("--- Logger Initialized ---");
    Ok(())
}

/// Append the shutdown marker and flush. Safe to call on any exit path.
pub fn shutdown() {
    write_marker("--- Logger Shutdown ---");
    if let Some(file) = LOG_FILE.get() {
        let mut guard = file.lock().unwrap_or_else(|e| e.into_inner());
        let _ = guard.flush();
    }
}

fn write_marker(text: &str) {
    if let Some(file) = LOG_FILE.get() {
        let mut guard = file.lock().unwrap_or_else(|e| e.into_inner());
        let _ = guard.write_all(stamp(text).as_bytes());
    }
}
