//! Runtime configuration.
//!
//! Read from `config.json` in the platform config directory, or from the
//! file named by `SITELOCK_CONFIG`. Every field has a default, so a missing
//! file is not an error.

use crate::compiler::RuleCompiler;
use crate::constants::{DEFAULT_NOTICE_PAGE, DEFAULT_RECHECK_INTERVAL_SECS, MAX_DYNAMIC_RULES};
use crate::error::AppError;
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "SITELOCK_CONFIG";
const CONFIG_FILE_NAME: &str = "config.json";
const DB_FILE_NAME: &str = "sitelock.db";

fn project_dirs() -> Result<ProjectDirs, AppError> {
    ProjectDirs::from("com", "sitelock", "Sitelock").ok_or(AppError::NoProjectDirs)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the settings database lives. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
    /// Extension page blocked navigations redirect to.
    pub notice_page: String,
    /// Normalize and dedupe website entries before compiling rules.
    pub normalize_websites: bool,
    /// Seconds between schedule re-checks; 0 disables the ticker.
    pub recheck_interval_secs: u64,
    /// Rule quota of the in-process engine.
    pub max_rules: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            notice_page: DEFAULT_NOTICE_PAGE.to_string(),
            normalize_websites: false,
            recheck_interval_secs: DEFAULT_RECHECK_INTERVAL_SECS,
            max_rules: MAX_DYNAMIC_RULES,
        }
    }
}

impl Config {
    /// Parse a config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(AppError::ConfigRead {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| AppError::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load from `SITELOCK_CONFIG` if set, else the platform config dir.
    pub fn load() -> Result<Self, AppError> {
        let path = match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => PathBuf::from(path),
            None => project_dirs()?.config_dir().join(CONFIG_FILE_NAME),
        };
        Self::from_file(&path)
    }

    /// Database path, creating the data directory if needed.
    pub fn db_path(&self) -> Result<PathBuf, AppError> {
        let data_dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => project_dirs()?.data_dir().to_path_buf(),
        };
        std::fs::create_dir_all(&data_dir).map_err(AppError::DataDirCreation)?;
        Ok(data_dir.join(DB_FILE_NAME))
    }

    pub fn recheck_interval(&self) -> Option<Duration> {
        (self.recheck_interval_secs > 0).then(|| Duration::from_secs(self.recheck_interval_secs))
    }

    pub fn compiler(&self) -> RuleCompiler {
        RuleCompiler::new(&self.notice_page, self.normalize_websites)
    }
}
