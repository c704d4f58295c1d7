use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DATA_FILE_ENV: &str = "DHF_DATA_FILE";
pub const REPORTS_DIR_ENV: &str = "DHF_REPORTS_DIR";
pub const CONFIG_PATH_ENV: &str = "DHF_CONFIG_PATH";

pub const DEFAULT_DATA_FILE: &str = "sample-data/dhf_data.yaml";
pub const DEFAULT_REPORTS_DIR: &str = "sample-data/report-templates";

/// Optional overrides read from the user's settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports_dir: Option<PathBuf>,
}

impl SettingsFile {
    /// Loads the settings file from the provided path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file: {:?}", path.as_ref()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path.as_ref()))
    }
}

/// Explicit values, typically from command-line flags
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub data_file: Option<PathBuf>,
    pub reports_dir: Option<PathBuf>,
}

/// Where the document and report templates live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_file: PathBuf,
    pub reports_dir: PathBuf,
}

impl Settings {
    /// Resolves settings from flags, the process environment, the settings
    /// file and the built-in defaults, in that order
    pub fn resolve(overrides: Overrides) -> Result<Self> {
        let file = match get_settings_path() {
            Some(path) if path.exists() => SettingsFile::load(&path)?,
            _ => SettingsFile::default(),
        };
        let settings = Self::resolve_with(overrides, |key| std::env::var(key).ok(), file);
        tracing::debug!(
            data_file = %settings.data_file.display(),
            reports_dir = %settings.reports_dir.display(),
            "resolved settings"
        );
        Ok(settings)
    }

    /// Same precedence as [`Settings::resolve`] with the environment and the
    /// settings file supplied by the caller
    pub fn resolve_with<E>(overrides: Overrides, env: E, file: SettingsFile) -> Self
    where
        E: Fn(&str) -> Option<String>,
    {
        let pick = |flag: Option<PathBuf>, env_key: &str, stored: Option<PathBuf>, default: &str| {
            flag.or_else(|| env(env_key).filter(|v| !v.is_empty()).map(PathBuf::from))
                .or(stored)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        Self {
            data_file: pick(overrides.data_file, DATA_FILE_ENV, file.data_file, DEFAULT_DATA_FILE),
            reports_dir: pick(
                overrides.reports_dir,
                REPORTS_DIR_ENV,
                file.reports_dir,
                DEFAULT_REPORTS_DIR,
            ),
        }
    }
}

/// Gets the path to the settings file
///
/// `DHF_CONFIG_PATH` wins; otherwise `~/.pocket-dhf.yaml`. `None` when no
/// home directory can be determined.
pub fn get_settings_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".pocket-dhf.yaml"))
}
