use crate::error::{IoContext, MigrationError, MigrationResult};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

fn render<T: Serialize>(path: &Path, value: &T) -> MigrationResult<String> {
    let data = serde_json::to_string_pretty(value)
        .map_err(|err| MigrationError::malformed(path, format!("failed to serialize: {err}")))?;
    Ok(format!("{data}\n"))
}

fn parse(path: &Path, raw: &str) -> MigrationResult<Value> {
    serde_json::from_str(raw).map_err(|err| MigrationError::malformed(path, err.to_string()))
}

/// Read and parse a JSON document without keeping a handle.
pub fn load(path: &Path) -> MigrationResult<Value> {
    let raw =
        fs::read_to_string(path).io_context(|| format!("failed to read {}", path.display()))?;
    parse(path, &raw)
}

/// Write `value` to `path` only if the file does not exist yet.
/// Returns `false` when an existing file was left alone.
pub fn create_new<T: Serialize>(path: &Path, value: &T) -> MigrationResult<bool> {
    let data = render(path, value)?;
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => {
            return Err(err).io_context(|| format!("failed to create {}", path.display()));
        }
    };
    file.write_all(data.as_bytes())
        .io_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

/// Copy `path` to `<file name>.<version_tag>.bak` beside it. An existing
/// backup is kept so the first pre-migration copy survives re-runs.
pub fn backup(path: &Path, version_tag: &str) -> MigrationResult<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| MigrationError::malformed(path, "path has no file name"))?;
    let backup_path = path.with_file_name(format!("{file_name}.{version_tag}.bak"));
    if backup_path.exists() {
        tracing::info!(backup = %backup_path.display(), "backup already exists, keeping it");
        return Ok(backup_path);
    }

    fs::copy(path, &backup_path).io_context(|| {
        format!(
            "failed to back up {} to {}",
            path.display(),
            backup_path.display()
        )
    })?;
    Ok(backup_path)
}

/// A JSON document held open for read-modify-write through a single handle.
#[derive(Debug)]
pub struct JsonDocument {
    path: PathBuf,
    /// `None` until a missing document is first written.
    file: Option<File>,
    /// The value came from `default` rather than from the file.
    defaulted: bool,
    pub value: Value,
}

impl JsonDocument {
    pub fn open(path: &Path) -> MigrationResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .io_context(|| format!("failed to open {}", path.display()))?;
        Self::read_from(path, file, None)
    }

    /// Open `path` if it exists. A missing or empty file reads as `default`;
    /// a missing file is only created by `overwrite`.
    pub fn open_or_default(path: &Path, default: Value) -> MigrationResult<Self> {
        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => Self::read_from(path, file, Some(default)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self {
                path: path.to_path_buf(),
                file: None,
                defaulted: true,
                value: default,
            }),
            Err(err) => Err(err).io_context(|| format!("failed to open {}", path.display())),
        }
    }

    fn read_from(path: &Path, mut file: File, default: Option<Value>) -> MigrationResult<Self> {
        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .io_context(|| format!("failed to read {}", path.display()))?;
        let (value, defaulted) = match default {
            Some(default) if raw.trim().is_empty() => (default, true),
            _ => (parse(path, &raw)?, false),
        };
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            defaulted,
            value,
        })
    }

    /// True when the file was missing or empty, so its on-disk content is not
    /// yet the value held here.
    pub fn was_defaulted(&self) -> bool {
        self.defaulted
    }

    /// Replace the file content with the in-memory value. The new content is
    /// rendered in full before the file is touched.
    pub fn overwrite(&mut self) -> MigrationResult<()> {
        let data = render(&self.path, &self.value)?;
        let path = &self.path;
        let mut file = match self.file.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(path)
                .io_context(|| format!("failed to create {}", path.display()))?,
        };
        file.seek(SeekFrom::Start(0))
            .io_context(|| format!("failed to seek {}", path.display()))?;
        file.write_all(data.as_bytes())
            .io_context(|| format!("failed to write {}", path.display()))?;
        file.set_len(data.len() as u64)
            .io_context(|| format!("failed to truncate {}", path.display()))?;
        file.flush()
            .io_context(|| format!("failed to flush {}", path.display()))?;
        self.file = Some(file);
        self.defaulted = false;
        Ok(())
    }
}
