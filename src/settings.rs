use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::report::ExportFormat;

const APP_DIR_NAME: &str = "session_companion";
const SETTINGS_FILE: &str = "settings.toml";
const TAXONOMY_FILE: &str = "coverage.ini";
const DEFAULT_REPORTS_DIR: &str = "TestingSessionReports";

#[derive(Debug, Error)]
pub enum SettingsError {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	#[error("failed to parse settings: {0}")]
	TomlDecode(#[from] toml::de::Error),
	#[error("failed to encode settings: {0}")]
	TomlEncode(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
	pub export_path: Option<PathBuf>,
	pub export_format: ExportFormat,
	pub taxonomy_path: Option<PathBuf>,
}

impl Settings {
	pub fn load(state_dir: &Path) -> Result<Self, SettingsError> {
		let raw = match fs::read_to_string(settings_path(state_dir)) {
			Ok(raw) => raw,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
			Err(err) => return Err(SettingsError::Io(err)),
		};

		Ok(toml::from_str(&raw)?)
	}

	/// Unreadable settings fall back to defaults.
	pub fn load_or_default(state_dir: &Path) -> Self {
		match Self::load(state_dir) {
			Ok(settings) => settings,
			Err(err) => {
				warn!(error = %err, "failed to load settings, using defaults");
				Self::default()
			}
		}
	}

	pub fn save(&self, state_dir: &Path) -> Result<(), SettingsError> {
		fs::create_dir_all(state_dir)?;
		let raw = toml::to_string_pretty(self)?;
		fs::write(settings_path(state_dir), raw)?;
		Ok(())
	}

	/// The configured directory when it exists, otherwise
	/// `~/Documents/TestingSessionReports`, otherwise `<state>/reports`.
	pub fn export_dir(&self, state_dir: &Path) -> PathBuf {
		if let Some(path) = &self.export_path {
			if path.is_dir() {
				return path.clone();
			}
			warn!(path = %path.display(), "configured export path is not a directory, using default");
		}

		if let Some(home) = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
			return PathBuf::from(home).join("Documents").join(DEFAULT_REPORTS_DIR);
		}

		state_dir.join("reports")
	}

	/// Candidate taxonomy files in lookup order.
	pub fn taxonomy_candidates(&self, state_dir: &Path, cli_override: Option<&Path>) -> Vec<PathBuf> {
		let mut candidates = Vec::new();
		if let Some(path) = cli_override {
			candidates.push(path.to_path_buf());
		}
		if let Some(path) = &self.taxonomy_path {
			candidates.push(path.clone());
		}
		candidates.push(state_dir.join(TAXONOMY_FILE));
		candidates.push(PathBuf::from(TAXONOMY_FILE));
		candidates
	}
}

fn settings_path(state_dir: &Path) -> PathBuf {
	state_dir.join(SETTINGS_FILE)
}

pub fn resolve_state_dir(cli_path: Option<PathBuf>) -> PathBuf {
	if let Some(path) = cli_path {
		return absolutize(path);
	}

	if let Some(path) = env::var_os("SESSION_COMPANION_STATE_DIR") {
		let path = PathBuf::from(path);
		if !path.as_os_str().is_empty() {
			return absolutize(path);
		}
	}

	#[cfg(target_os = "windows")]
	{
		if let Some(path) = env::var_os("LOCALAPPDATA") {
			return PathBuf::from(path).join(APP_DIR_NAME);
		}
	}

	if let Some(path) = env::var_os("XDG_STATE_HOME") {
		return PathBuf::from(path).join(APP_DIR_NAME);
	}

	if let Some(path) = env::var_os("HOME") {
		return PathBuf::from(path)
			.join(".local")
			.join("state")
			.join(APP_DIR_NAME);
	}

	PathBuf::from(format!(".{APP_DIR_NAME}"))
}

fn absolutize(path: PathBuf) -> PathBuf {
	if path.is_absolute() {
		path
	} else if let Ok(cwd) = env::current_dir() {
		cwd.join(path)
	} else {
		path
	}
}
