use crate::constants::{DEFAULT_DAYS, DEFAULT_END_TIME, DEFAULT_START_TIME, DEFAULT_WEBSITES};
use serde::{Deserialize, Serialize};

/// Keys of the persisted settings record, named as they are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsKey {
    IsBlocking,
    Websites,
    Schedule,
}

impl SettingsKey {
    pub const ALL: &'static [SettingsKey] =
        &[SettingsKey::IsBlocking, SettingsKey::Websites, SettingsKey::Schedule];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingsKey::IsBlocking => "isBlocking",
            SettingsKey::Websites => "websites",
            SettingsKey::Schedule => "schedule",
        }
    }
}

/// A weekly blocking window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// English weekday names, e.g. "Monday".
    pub days: Vec<String>,
    /// Start time in HH:MM format (24-hour).
    pub start_time: String,
    /// End time in HH:MM format (24-hour), inclusive.
    pub end_time: String,
}

impl Schedule {
    pub fn new(days: &[&str], start_time: &str, end_time: &str) -> Self {
        Self {
            days: days.iter().map(|d| (*d).to_string()).collect(),
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
        }
    }
}

/// The full settings record as the synchronizer sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub blocking_enabled: bool,
    pub websites: Vec<String>,
    pub schedule: Option<Schedule>,
}

impl Settings {
    /// Settings written on first install.
    pub fn install_defaults() -> Self {
        Self {
            blocking_enabled: true,
            websites: DEFAULT_WEBSITES.iter().map(|w| (*w).to_string()).collect(),
            schedule: Some(Schedule::new(DEFAULT_DAYS, DEFAULT_START_TIME, DEFAULT_END_TIME)),
        }
    }
}

/// A subset of the settings record. Absent fields were either not requested
/// or not stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSettings {
    #[serde(
        rename = "isBlocking",
        alias = "blockingEnabled",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_blocking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub websites: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

impl PartialSettings {
    /// Keys carrying a value, in stable key order.
    pub fn keys(&self) -> Vec<SettingsKey> {
        let mut keys = Vec::new();
        if self.is_blocking.is_some() {
            keys.push(SettingsKey::IsBlocking);
        }
        if self.websites.is_some() {
            keys.push(SettingsKey::Websites);
        }
        if self.schedule.is_some() {
            keys.push(SettingsKey::Schedule);
        }
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Overwrite fields present in `other`.
    pub fn merge(&mut self, other: PartialSettings) {
        if other.is_blocking.is_some() {
            self.is_blocking = other.is_blocking;
        }
        if other.websites.is_some() {
            self.websites = other.websites;
        }
        if other.schedule.is_some() {
            self.schedule = other.schedule;
        }
    }

    /// Drop every field whose key is not in `keys`.
    pub fn retain_keys(mut self, keys: &[SettingsKey]) -> Self {
        if !keys.contains(&SettingsKey::IsBlocking) {
            self.is_blocking = None;
        }
        if !keys.contains(&SettingsKey::Websites) {
            self.websites = None;
        }
        if !keys.contains(&SettingsKey::Schedule) {
            self.schedule = None;
        }
        self
    }

    /// Resolve missing keys: blocking off, no websites, no schedule.
    pub fn into_settings(self) -> Settings {
        Settings {
            blocking_enabled: self.is_blocking.unwrap_or(false),
            websites: self.websites.unwrap_or_default(),
            schedule: self.schedule,
        }
    }
}

impl From<Settings> for PartialSettings {
    fn from(settings: Settings) -> Self {
        Self {
            is_blocking: Some(settings.blocking_enabled),
            websites: Some(settings.websites),
            schedule: settings.schedule,
        }
    }
}
