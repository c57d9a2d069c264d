use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::domain::Session;
use crate::report::ExportFormat;

pub const CACHE_FILE_NAME: &str = "session_cache.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse session cache: {0}")]
    JsonDecode(#[source] serde_json::Error),
    #[error("failed to encode session cache: {0}")]
    JsonEncode(#[source] serde_json::Error),
}

/// Where the live session is snapshotted for crash recovery.
pub trait SessionStore {
    fn save(&mut self, session: &Session) -> Result<(), StorageError>;
    fn load(&self) -> Result<Option<Session>, StorageError>;
    fn clear(&mut self) -> Result<(), StorageError>;
}

/// Single JSON file, overwritten wholesale on every save.
#[derive(Debug, Clone)]
pub struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("cache").join(CACHE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for CacheFile {
    fn save(&mut self, session: &Session) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(session).map_err(StorageError::JsonEncode)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<Session>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::Io(err)),
        };

        if raw.trim().is_empty() {
            return Ok(None);
        }

        let session = serde_json::from_str(&raw).map_err(StorageError::JsonDecode)?;
        Ok(Some(session))
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}

/// `Session_<title>_<yyyyMMdd_HHmmss><ext>` with path-hostile characters
/// in the title replaced by `_`.
pub fn report_file_name(title: &str, format: ExportFormat, now: DateTime<Local>) -> String {
    format!(
        "Session_{}_{}{}",
        sanitize_file_component(title),
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

pub fn sanitize_file_component(raw: &str) -> String {
    raw.chars()
        .map(|ch| match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect()
}

/// Writes a rendered report into `dir`, creating it if needed.
pub fn write_report(
    dir: &Path,
    title: &str,
    format: ExportFormat,
    content: &str,
    now: DateTime<Local>,
) -> Result<PathBuf, std::io::Error> {
    fs::create_dir_all(dir)?;
    let path = dir.join(report_file_name(title, format, now));
    fs::write(&path, content)?;
    Ok(path)
}
