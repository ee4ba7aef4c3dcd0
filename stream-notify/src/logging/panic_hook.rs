//! Panic reporting.
//!
//! Panics go through `tracing` with the thread, location and payload as
//! fields. Release builds abort on panic and the non-blocking file writer
//! may never flush, so in that case the record is also appended straight to
//! the file the appender is currently writing.

use std::backtrace::Backtrace;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic::{AssertUnwindSafe, PanicHookInfo, catch_unwind, set_hook, take_hook};
use std::path::Path;
use std::thread;

use chrono::Local;

use super::LoggingConfig;

/// What is known about one panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicRecord {
    pub thread: String,
    pub location: String,
    pub payload: String,
}

impl PanicRecord {
    fn capture(info: &PanicHookInfo<'_>) -> Self {
        let location = info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "<unknown>".to_string());

        let thread = thread::current()
            .name()
            .unwrap_or("<unnamed>")
            .to_string();

        let payload = info
            .payload()
            .downcast_ref::<&'static str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| info.to_string());

        Self {
            thread,
            location,
            payload,
        }
    }
}

impl fmt::Display for PanicRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} PANIC thread={} location={} payload={}",
            Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
            self.thread,
            self.location,
            self.payload
        )
    }
}

/// Install the global panic hook. The previous hook still runs afterwards.
pub fn install(logging: &LoggingConfig) {
    let log_dir = logging.log_dir().map(Path::to_path_buf);
    let previous_hook = take_hook();

    set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let record = PanicRecord::capture(info);
            tracing::error!(
                target: "stream_notify::panic",
                thread = %record.thread,
                location = %record.location,
                payload = %record.payload,
                "Panic"
            );

            if cfg!(panic = "abort")
                && let Some(dir) = &log_dir
            {
                let path = super::daily_log_path(dir, Local::now().date_naive());
                let _ = append_record(&path, &record, &Backtrace::force_capture());
            }
        }));

        previous_hook(info);
    }));
}

fn append_record(path: &Path, record: &PanicRecord, backtrace: &Backtrace) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{record}\nBacktrace:\n{backtrace}")?;
    file.flush()
}
