pub mod blocking_rule;
pub mod settings;

pub use blocking_rule::{BlockingRule, Redirect, ResourceType, RuleAction, RuleCondition, UrlPattern};
pub use settings::{PartialSettings, Schedule, Settings, SettingsKey};
