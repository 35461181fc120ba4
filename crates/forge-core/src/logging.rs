//! Logging plumbing shared by the engine and its embedders.
//!
//! [`LoggingArgs`] wires a `log`/`fern` dispatch the way a CLI embedder would; [`LogSink`] is
//! the narrow capability the execution manager actually depends on (see `§6` of the design:
//! the engine never assumes a particular terminal, only that writes from one worker appear
//! contiguous and that the sink is safe to share across threads).

use colored::Colorize;
use fern::{Dispatch, FormatCallback};
use log::{Level, LevelFilter, Record};
use parking_lot::Mutex;
use std::fmt;
use std::io::stdout;
use std::sync::Arc;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

/// Clap args for wiring up the root logger the way a hosting CLI would.
#[derive(Debug, Clone, clap::Args)]
#[clap(next_help_heading = "LOGGING")]
pub struct LoggingArgs {
    /// Show the module and line a log record was emitted from.
    #[clap(long)]
    #[clap(conflicts_with_all(&["trace"]))]
    pub show_source: bool,

    /// Only display error level log messages.
    #[clap(short, long)]
    #[clap(conflicts_with_all(&["warn", "info", "debug", "trace"]))]
    #[clap(display_order = 1)]
    error: bool,

    /// Display warning and above level log messages.
    #[clap(short, long)]
    #[clap(conflicts_with_all(&["error", "info", "debug", "trace"]))]
    #[clap(display_order = 2)]
    warn: bool,

    /// Display info and above level log messages.
    #[clap(short, long)]
    #[clap(conflicts_with_all(&["error", "warn", "debug", "trace"]))]
    #[clap(display_order = 3)]
    info: bool,

    /// Display debug and above level log messages.
    #[clap(long)]
    #[clap(conflicts_with_all(&["error", "warn", "info", "trace"]))]
    #[clap(display_order = 4)]
    debug: bool,

    /// Display trace and above level log messages.
    #[clap(long)]
    #[clap(conflicts_with_all(&["error", "warn", "info", "debug"]))]
    #[clap(display_order = 5)]
    trace: bool,
}

impl LoggingArgs {
    pub fn log_level_filter(&self) -> LevelFilter {
        if self.error {
            LevelFilter::Error
        } else if self.warn {
            LevelFilter::Warn
        } else if self.info {
            LevelFilter::Info
        } else if self.debug {
            LevelFilter::Debug
        } else if self.trace {
            LevelFilter::Trace
        } else {
            LevelFilter::Info
        }
    }

    /// Installs this configuration as the global `log` logger. Returns `false` if a logger
    /// was already installed (e.g. in tests that run more than one engine in a process).
    pub fn init_root_logger(&self) -> bool {
        self.create_dispatch().apply().is_ok()
    }

    pub fn create_dispatch(&self) -> Dispatch {
        Dispatch::new()
            .level(self.log_level_filter())
            .format(message_format(self.show_source))
            .chain(stdout())
    }
}

fn message_format(
    show_source: bool,
) -> impl Fn(FormatCallback, &fmt::Arguments, &Record) + Sync + Send + 'static {
    move |out, message, record| {
        let prefix = format_prefix(record, show_source);
        let body = match record.level() {
            Level::Error => message.to_string().red().to_string(),
            Level::Warn => message.to_string().yellow().to_string(),
            _ => message.to_string(),
        };
        if prefix.is_empty() {
            out.finish(format_args!("{body}"))
        } else {
            out.finish(format_args!("{prefix} {body}"))
        }
    }
}

fn format_prefix(record: &Record, show_source: bool) -> String {
    static TIME_FORMAT: &[FormatItem] =
        format_description!("[hour]:[minute]:[second].[subsecond digits:3]");
    let level_string = match record.level() {
        Level::Error => "error".red().to_string(),
        Level::Warn => "warn".yellow().to_string(),
        Level::Info => "info".green().to_string(),
        Level::Debug => "debug".blue().to_string(),
        Level::Trace => "trace".bright_black().to_string(),
    };
    let time = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let stamp = time.format(TIME_FORMAT).unwrap_or_default();
    let base = format!("[{stamp}] {level_string:>5}:");
    if show_source {
        if let Some(module) = record.module_path() {
            let line = record.line().map(|l| format!(":{l}")).unwrap_or_default();
            return format!("{base} ({module}{line})");
        }
    }
    base
}

/// The logging capability the engine consumes (§6). Implementations must be thread-safe and
/// must keep writes from a single call contiguous in the underlying output — the engine
/// relies on that to render per-operation banners without interleaving.
pub trait LogSink: Send + Sync {
    fn write_info(&self, message: &str);
    fn write_warning(&self, message: &str);
    fn write_error(&self, message: &str);
    fn write_verbose(&self, message: &str);
}

/// A [`LogSink`] that forwards to the global `log` facade. This is what an embedder gets by
/// default; swapping in a different sink (e.g. to redirect into a TUI) requires no engine
/// changes since the manager only ever sees the trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdLogSink;

impl LogSink for StdLogSink {
    fn write_info(&self, message: &str) {
        log::info!("{message}");
    }

    fn write_warning(&self, message: &str) {
        log::warn!("{message}");
    }

    fn write_error(&self, message: &str) {
        log::error!("{message}");
    }

    fn write_verbose(&self, message: &str) {
        log::trace!("{message}");
    }
}

/// A [`LogSink`] that records every write instead of emitting it, for tests that assert on
/// log ordering without depending on global logger state.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    fn push(&self, level: &str, message: &str) {
        self.lines.lock().push(format!("{level}: {message}"));
    }
}

impl LogSink for RecordingLogSink {
    fn write_info(&self, message: &str) {
        self.push("info", message);
    }

    fn write_warning(&self, message: &str) {
        self.push("warn", message);
    }

    fn write_error(&self, message: &str) {
        self.push("error", message);
    }

    fn write_verbose(&self, message: &str) {
        self.push("verbose", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_preserves_order() {
        let sink = RecordingLogSink::new();
        sink.write_info("a");
        sink.write_warning("b");
        sink.write_error("c");
        assert_eq!(sink.lines(), vec!["info: a", "warn: b", "error: c"]);
    }
}
