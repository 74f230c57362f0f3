//! Sink interface and the console/file/JSON/null sink implementations:
//! the write/flush contract sinks expose to the backend, and the
//! rotation/append model for file-backed sinks.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::{DateStyle, OpenMode, RotationPolicy};
use crate::error::{Error, Result};
use crate::levels::Level;

/// Whether a sink wants the logger's human-readable pattern line or the
/// JSON-encoded line for each record; the backend renders exactly one of
/// the two per sink and never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Text,
    Json,
}

/// The capability set every sink implements: `write`, `flush`, and
/// `rotate_if_needed`. The backend thread is the sink's only caller, so
/// implementations need no internal synchronization.
pub trait Sink: Send {
    fn name(&self) -> &str;
    fn kind(&self) -> SinkKind;
    /// Writes one already-rendered line (no trailing newline) for a record
    /// at `level`.
    fn write(&mut self, level: Level, line: &str) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    /// Rotates the sink's backing file if its policy says `now` calls for
    /// it. A no-op for sinks without a notion of rotation.
    fn rotate_if_needed(&mut self, now: DateTime<Utc>) -> Result<()> {
        let _ = now;
        Ok(())
    }
}

/// Where a [`ConsoleSink`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleTarget {
    Stdout,
    Stderr,
}

/// ANSI color codes per level, indexed by [`Level`] discriminant.
pub type LevelColors = [&'static str; 9];

/// Default color-per-level palette, covering this crate's nine levels.
pub const DEFAULT_LEVEL_COLORS: LevelColors =
    ["90", "90", "90", "36", "32", "33", "31", "91", "95"];

/// Writes to standard output or standard error, optionally wrapping each
/// line in a per-level ANSI color. Flushes on every write by default.
pub struct ConsoleSink {
    name: String,
    target: ConsoleTarget,
    color_enabled: bool,
    colors: LevelColors,
    flush_every_write: bool,
}

impl ConsoleSink {
    pub fn new(name: impl Into<String>, target: ConsoleTarget, color_enabled: bool) -> Self {
        Self {
            name: name.into(),
            target,
            color_enabled,
            colors: DEFAULT_LEVEL_COLORS,
            flush_every_write: true,
        }
    }

    pub fn with_colors(mut self, colors: LevelColors) -> Self {
        self.colors = colors;
        self
    }

    fn colorize(&self, level: Level, line: &str) -> String {
        if !self.color_enabled {
            return line.to_string();
        }
        let code = self.colors[level as usize];
        format!("\x1b[{code}m{line}\x1b[0m")
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Text
    }

    fn write(&mut self, level: Level, line: &str) -> Result<()> {
        let rendered = self.colorize(level, line);
        let result = match self.target {
            ConsoleTarget::Stdout => writeln!(io::stdout(), "{rendered}"),
            ConsoleTarget::Stderr => writeln!(io::stderr(), "{rendered}"),
        };
        result.map_err(|source| Error::SinkIo { sink: self.name.clone(), source })?;
        if self.flush_every_write {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let result = match self.target {
            ConsoleTarget::Stdout => io::stdout().flush(),
            ConsoleTarget::Stderr => io::stderr().flush(),
        };
        result.map_err(|source| Error::SinkIo { sink: self.name.clone(), source })
    }
}

/// User-supplied hooks fired around a file sink's open/close transitions.
#[derive(Default)]
pub struct FileEventCallbacks {
    pub before_open: Option<Box<dyn Fn(&Path) + Send>>,
    pub after_open: Option<Box<dyn Fn(&Path) + Send>>,
    pub before_close: Option<Box<dyn Fn(&Path) + Send>>,
    pub after_close: Option<Box<dyn Fn(&Path) + Send>>,
}

/// Configuration for a [`FileSink`], separated from its runtime state so
/// it can be validated at creation time.
pub struct FileSinkConfig {
    pub path: PathBuf,
    pub open_mode: OpenMode,
    pub date_style: DateStyle,
    pub rotation: RotationPolicy,
    pub size_limit: Option<u64>,
    pub retention: Option<usize>,
}

/// Writes plain-text lines to a rotating file. Filename carries a
/// timestamp/index suffix per [`DateStyle`]; rotation fires on time, size,
/// or both, and retention prunes old rotated siblings.
pub struct FileSink {
    name: String,
    base_path: PathBuf,
    open_mode: OpenMode,
    date_style: DateStyle,
    rotation: RotationPolicy,
    size_limit: Option<u64>,
    retention: Option<usize>,
    current_period: String,
    current_path: PathBuf,
    writer: BufWriter<File>,
    current_size: u64,
    callbacks: FileEventCallbacks,
    kind: SinkKind,
}

impl FileSink {
    pub fn open(name: impl Into<String>, config: FileSinkConfig) -> Result<Self> {
        Self::open_with_kind(name, config, FileEventCallbacks::default(), SinkKind::Text)
    }

    pub fn open_with_callbacks(
        name: impl Into<String>,
        config: FileSinkConfig,
        callbacks: FileEventCallbacks,
    ) -> Result<Self> {
        Self::open_with_kind(name, config, callbacks, SinkKind::Text)
    }

    fn open_with_kind(
        name: impl Into<String>,
        config: FileSinkConfig,
        callbacks: FileEventCallbacks,
        kind: SinkKind,
    ) -> Result<Self> {
        let name = name.into();
        let current_period = period_string(config.rotation, Utc::now());
        let current_path = path_for_period(&config.path, &current_period, config.date_style);

        if let Some(cb) = &callbacks.before_open {
            cb(&current_path);
        }
        let file = open_file(&current_path, config.open_mode)
            .map_err(|source| Error::SinkIo { sink: name.clone(), source })?;
        let current_size = file
            .metadata()
            .map_err(|source| Error::SinkIo { sink: name.clone(), source })?
            .len();
        if let Some(cb) = &callbacks.after_open {
            cb(&current_path);
        }

        Ok(Self {
            name,
            base_path: config.path,
            open_mode: config.open_mode,
            date_style: config.date_style,
            rotation: config.rotation,
            size_limit: config.size_limit,
            retention: config.retention,
            current_period,
            current_path,
            writer: BufWriter::new(file),
            current_size,
            callbacks,
            kind,
        })
    }

    /// Promotes this file sink to emit newline-delimited JSON instead of
    /// plain text lines, reusing the same rotation/retention machinery.
    pub fn into_json_sink(mut self) -> Self {
        self.kind = SinkKind::Json;
        self
    }

    fn needs_rotation(&self, now: DateTime<Utc>, upcoming_write_size: usize) -> bool {
        let time_rotation = self.rotation != RotationPolicy::Never
            && period_string(self.rotation, now) != self.current_period;
        let size_rotation = matches!(self.rotation, RotationPolicy::Size | RotationPolicy::SizeOrTime)
            && self
                .size_limit
                .is_some_and(|limit| self.current_size + upcoming_write_size as u64 > limit);
        time_rotation || size_rotation
    }

    fn rotate(&mut self, now: DateTime<Utc>) -> Result<()> {
        if let Some(cb) = &self.callbacks.before_close {
            cb(&self.current_path);
        }
        self.writer.flush().map_err(|source| Error::SinkIo { sink: self.name.clone(), source })?;
        if let Some(cb) = &self.callbacks.after_close {
            cb(&self.current_path);
        }

        self.current_period = period_string(self.rotation, now);
        self.current_path = path_for_period(&self.base_path, &self.current_period, self.date_style);

        if let Some(cb) = &self.callbacks.before_open {
            cb(&self.current_path);
        }
        let file = open_file(&self.current_path, self.open_mode)
            .map_err(|source| Error::SinkIo { sink: self.name.clone(), source })?;
        self.current_size = 0;
        self.writer = BufWriter::new(file);
        if let Some(cb) = &self.callbacks.after_open {
            cb(&self.current_path);
        }

        if let Some(keep) = self.retention {
            if let Some(dir) = self.current_path.parent() {
                prune_old_files(dir, &self.base_path, self.date_style, keep, &self.current_path);
            }
        }
        Ok(())
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        self.kind
    }

    fn write(&mut self, _level: Level, line: &str) -> Result<()> {
        let bytes_needed = line.len() + 1;
        if self.needs_rotation(Utc::now(), bytes_needed) {
            self.rotate(Utc::now())?;
        }
        writeln!(self.writer, "{line}")
            .map_err(|source| Error::SinkIo { sink: self.name.clone(), source })?;
        self.current_size += bytes_needed as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|source| Error::SinkIo { sink: self.name.clone(), source })
    }

    fn rotate_if_needed(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.needs_rotation(now, 0) {
            self.rotate(now)?;
        }
        Ok(())
    }
}

/// Discards every record; used for tests and disabled loggers.
pub struct NullSink {
    name: String,
}

impl NullSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Sink for NullSink {
    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> SinkKind {
        SinkKind::Text
    }
    fn write(&mut self, _level: Level, _line: &str) -> Result<()> {
        Ok(())
    }
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn open_file(path: &Path, mode: OpenMode) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(matches!(mode, OpenMode::Append))
        .truncate(matches!(mode, OpenMode::Truncate))
        .write(true)
        .open(path)
}

fn period_string(rotation: RotationPolicy, now: DateTime<Utc>) -> String {
    match rotation {
        RotationPolicy::Daily => now.format("%Y-%m-%d").to_string(),
        RotationPolicy::Hourly => now.format("%Y-%m-%d_%H").to_string(),
        RotationPolicy::Minutely => now.format("%Y-%m-%d_%H-%M").to_string(),
        RotationPolicy::Never | RotationPolicy::Size => String::new(),
        RotationPolicy::SizeOrTime => now.format("%Y-%m-%d").to_string(),
    }
}

fn path_for_period(base: &Path, period: &str, date_style: DateStyle) -> PathBuf {
    if period.is_empty() || date_style == DateStyle::None {
        return base.to_path_buf();
    }
    let file_name = base.file_name().and_then(|s| s.to_str()).unwrap_or_default();
    match date_style {
        DateStyle::StartDateTime => {
            let new_name = format!("{period}_{file_name}");
            base.with_file_name(new_name)
        }
        _ => match file_name.rfind('.') {
            Some(pos) => {
                let (stem, ext) = file_name.split_at(pos);
                base.with_file_name(format!("{stem}.{period}{ext}"))
            }
            None => base.with_file_name(format!("{file_name}.{period}")),
        },
    }
}

/// Deletes rotated siblings of `base` beyond the most recent `keep`,
/// ranked by modification time. Best-effort: I/O errors are swallowed
/// since retention is a housekeeping nicety, not a correctness property.
fn prune_old_files(dir: &Path, base: &Path, date_style: DateStyle, keep: usize, current: &Path) {
    let base_name = base.file_name().and_then(|s| s.to_str()).unwrap_or("");
    let (stem, ext_opt) = match base_name.rfind('.') {
        Some(pos) => (&base_name[..pos], Some(&base_name[pos + 1..])),
        None => (base_name, None),
    };

    let Ok(entries) = std::fs::read_dir(dir) else { return };
    let mut candidates: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path == current || !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else { continue };
        let matches = match date_style {
            DateStyle::StartDateTime => name.ends_with(&format!("_{base_name}")),
            _ => match ext_opt {
                Some(ext) => name.starts_with(&format!("{stem}.")) && name.ends_with(&format!(".{ext}")),
                None => name.starts_with(&format!("{stem}.")),
            },
        };
        if !matches {
            continue;
        }
        let modified = entry.metadata().and_then(|m| m.modified()).unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        candidates.push((modified, path));
    }

    if candidates.len() > keep {
        candidates.sort_by_key(|(t, _)| *t);
        let drop_count = candidates.len() - keep;
        for (_, path) in candidates.into_iter().take(drop_count) {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn console_sink_reports_name_and_kind() {
        let sink = ConsoleSink::new("console", ConsoleTarget::Stdout, false);
        assert_eq!(sink.name(), "console");
        assert_eq!(sink.kind(), SinkKind::Text);
    }

    #[test]
    fn null_sink_discards_everything() {
        let mut sink = NullSink::new("null");
        sink.write(Level::Error, "anything").unwrap();
        sink.flush().unwrap();
    }

    #[test]
    fn file_sink_appends_lines_with_trailing_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let config = FileSinkConfig {
            path: path.clone(),
            open_mode: OpenMode::Append,
            date_style: DateStyle::None,
            rotation: RotationPolicy::Never,
            size_limit: None,
            retention: None,
        };
        let mut sink = FileSink::open("app", config).unwrap();
        sink.write(Level::Info, "INFO x=42").unwrap();
        sink.flush().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "INFO x=42\n");
    }

    #[test]
    fn s5_size_rotation_splits_files_and_preserves_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let config = FileSinkConfig {
            path: path.clone(),
            open_mode: OpenMode::Append,
            date_style: DateStyle::StartDateTime,
            rotation: RotationPolicy::Size,
            size_limit: Some(4096),
            retention: None,
        };
        let mut sink = FileSink::open("app", config).unwrap();
        let line = "x".repeat(90);
        for i in 0..1000 {
            sink.write(Level::Info, &format!("{i:04} {line}")).unwrap();
        }
        sink.flush().unwrap();

        let mut files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        assert!(files.len() > 1, "expected rotation to produce multiple files");
        files.sort();

        let mut all_indices = Vec::new();
        for f in &files {
            for line in std::fs::read_to_string(f).unwrap().lines() {
                let idx: u32 = line.split_whitespace().next().unwrap().parse().unwrap();
                all_indices.push(idx);
            }
        }
        let sorted = {
            let mut s = all_indices.clone();
            s.sort();
            s
        };
        assert_eq!(all_indices, sorted, "per-thread order must survive rotation");
    }

    #[test]
    fn retention_prunes_files_beyond_keep_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let config = FileSinkConfig {
            path: path.clone(),
            open_mode: OpenMode::Append,
            date_style: DateStyle::StartDateTime,
            rotation: RotationPolicy::Size,
            size_limit: Some(64),
            retention: Some(2),
        };
        let mut sink = FileSink::open("app", config).unwrap();
        for i in 0..40 {
            sink.write(Level::Info, &format!("line {i} padding padding")).unwrap();
        }
        sink.flush().unwrap();

        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert!(count <= 3, "expected at most retention+1 (current) files, found {count}");
    }
}
