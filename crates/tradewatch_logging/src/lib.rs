//! Shared logging bootstrap for Tradewatch binaries.
//!
//! File output is partitioned by day, matching the daily cadence of the
//! scheduled ingestion jobs: one `{app}-{YYYYMMDD}.log` per date, pruned
//! after a retention window, so a long-lived scheduler process never
//! fills the disk and an operator can grab exactly the day a job ran.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "tradewatch=info,tradewatch_pipeline=info,tradewatch_scheduler=info,tradewatch_sources=info";

/// Daily log files older than this are deleted when a new day opens.
const LOG_RETENTION_DAYS: i64 = 14;

/// Logging configuration for a Tradewatch process.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Default filter when neither RUST_LOG nor LOG_LEVEL is set.
    pub log_level: Option<&'a str>,
    pub quiet_console: bool,
}

/// Initialize tracing with a daily file writer and stderr output.
///
/// `extra` is appended to the registry, letting the scheduler contribute
/// its per-job log-capture layer.
pub fn init_logging<L>(config: LogConfig<'_>, extra: Option<L>) -> Result<()>
where
    L: Layer<tracing_subscriber::Registry> + Send + Sync + 'static,
{
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_writer = DailyLogWriter::shared(log_dir, config.app_name)
        .context("Failed to open daily log writer")?;

    let file_filter = resolve_filter(config.log_level);
    let console_filter = if config.quiet_console {
        EnvFilter::new("warn")
    } else {
        resolve_filter(config.log_level)
    };

    tracing_subscriber::registry()
        .with(extra)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

/// Filter resolution order: RUST_LOG, then LOG_LEVEL, then the default.
fn resolve_filter(log_level: Option<&str>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    if let Some(level) = log_level {
        let level = match level.to_ascii_uppercase().as_str() {
            "DEBUG" => "debug",
            "INFO" => "info",
            "WARN" | "WARNING" => "warn",
            "ERROR" => "error",
            "CRITICAL" => "error",
            _ => return EnvFilter::new(DEFAULT_LOG_FILTER),
        };
        return EnvFilter::new(level);
    }
    EnvFilter::new(DEFAULT_LOG_FILTER)
}

/// Get the Tradewatch home directory: ~/.tradewatch
pub fn tradewatch_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("TRADEWATCH_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tradewatch")
}

/// Get the logs directory: ~/.tradewatch/logs
pub fn logs_dir() -> PathBuf {
    tradewatch_home().join("logs")
}

/// Get the blob storage root: ~/.tradewatch/blobs
pub fn blobs_dir() -> PathBuf {
    tradewatch_home().join("blobs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Appends to one log file per calendar day and prunes expired days.
///
/// Rolling is just "is today still the open file": no renumbering of old
/// files, and concurrent processes appending to the same day's file are
/// safe because every write is an append.
struct DailyLogWriter {
    dir: PathBuf,
    base_name: String,
    open_day: NaiveDate,
    file: File,
}

impl DailyLogWriter {
    fn open(dir: PathBuf, app_name: &str) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let base_name = sanitize_name(app_name);
        let today = Utc::now().date_naive();
        let file = open_day_file(&dir, &base_name, today)?;
        prune_expired(&dir, &base_name, today);
        Ok(Self {
            dir,
            base_name,
            open_day: today,
            file,
        })
    }

    /// A clonable, lock-on-write handle usable as a tracing writer.
    fn shared(dir: PathBuf, app_name: &str) -> io::Result<SharedDailyWriter> {
        Ok(SharedDailyWriter(Arc::new(Mutex::new(Self::open(
            dir, app_name,
        )?))))
    }

    /// Swap to today's file when the date has rolled since the last write.
    fn roll_to_today(&mut self) -> io::Result<()> {
        let today = Utc::now().date_naive();
        if today == self.open_day {
            return Ok(());
        }
        let _ = self.file.flush();
        self.file = open_day_file(&self.dir, &self.base_name, today)?;
        self.open_day = today;
        prune_expired(&self.dir, &self.base_name, today);
        Ok(())
    }
}

impl Write for DailyLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.roll_to_today()?;
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Shared handle over the daily writer. Cloning shares the open file;
/// each write takes the lock for the duration of one line.
#[derive(Clone)]
struct SharedDailyWriter(Arc<Mutex<DailyLogWriter>>);

impl Write for SharedDailyWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.lock() {
            Ok(mut writer) => writer.write(buf),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "log writer lock poisoned")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.lock() {
            Ok(mut writer) => writer.flush(),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "log writer lock poisoned")),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedDailyWriter {
    type Writer = SharedDailyWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn day_file_name(base_name: &str, day: NaiveDate) -> String {
    format!("{}-{}.log", base_name, day.format("%Y%m%d"))
}

fn open_day_file(dir: &Path, base_name: &str, day: NaiveDate) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(day_file_name(base_name, day)))
}

/// Delete this app's day files older than the retention window. Failure
/// to prune never blocks logging.
fn prune_expired(dir: &Path, base_name: &str, today: NaiveDate) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let cutoff = today - chrono::Duration::days(LOG_RETENTION_DAYS);
    let prefix = format!("{base_name}-");

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(day) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".log"))
            .and_then(|stamp| NaiveDate::parse_from_str(stamp, "%Y%m%d").ok())
        else {
            continue;
        };
        if day < cutoff {
            let _ = fs::remove_file(entry.path());
        }
    }
}

/// File-name-safe app names: anything outside `[A-Za-z0-9]` becomes a
/// dash, so the date suffix stays unambiguous.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("tradewatch"), "tradewatch");
        assert_eq!(sanitize_name("job runner/1"), "job-runner-1");
    }

    #[test]
    fn test_writes_land_in_dated_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DailyLogWriter::open(dir.path().to_path_buf(), "tradewatch").unwrap();

        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();

        let today = Utc::now().date_naive();
        let expected = dir.path().join(day_file_name("tradewatch", today));
        assert_eq!(fs::read_to_string(expected).unwrap(), "hello\n");
    }

    #[test]
    fn test_expired_day_files_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("tradewatch-20200101.log");
        let foreign = dir.path().join("other-20200101.log");
        let junk = dir.path().join("tradewatch-notadate.log");
        fs::write(&old, "stale").unwrap();
        fs::write(&foreign, "not ours").unwrap();
        fs::write(&junk, "kept").unwrap();

        let _writer = DailyLogWriter::open(dir.path().to_path_buf(), "tradewatch").unwrap();

        assert!(!old.exists(), "expired day file should be removed");
        assert!(foreign.exists(), "other apps' files are left alone");
        assert!(junk.exists(), "non-dated files are left alone");
    }

    #[test]
    fn test_recent_day_files_survive_pruning() {
        let dir = tempfile::tempdir().unwrap();
        let yesterday = Utc::now().date_naive() - chrono::Duration::days(1);
        let recent = dir.path().join(day_file_name("tradewatch", yesterday));
        fs::write(&recent, "yesterday").unwrap();

        let _writer = DailyLogWriter::open(dir.path().to_path_buf(), "tradewatch").unwrap();

        assert!(recent.exists());
    }

    #[test]
    fn test_shared_writer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mut shared = DailyLogWriter::shared(dir.path().to_path_buf(), "tradewatch").unwrap();
        let mut clone = shared.clone();

        shared.write_all(b"one\n").unwrap();
        clone.write_all(b"two\n").unwrap();
        shared.flush().unwrap();

        let today = Utc::now().date_naive();
        let content =
            fs::read_to_string(dir.path().join(day_file_name("tradewatch", today))).unwrap();
        assert_eq!(content, "one\ntwo\n");
    }
}
