// src/constants.rs

/// Minutes in one day (24 * 60)
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Priority shared by every compiled blocking rule
pub const RULE_PRIORITY: u32 = 1;

/// Number of URL patterns emitted per blocked website
pub const RULES_PER_WEBSITE: usize = 4;

/// Extension page that blocked navigations are redirected to
pub const DEFAULT_NOTICE_PAGE: &str = "/blocked.html";

/// Query parameter on the notice page carrying the blocked website
pub const NOTICE_QUERY_PARAM: &str = "url";

/// Chrome's cap on dynamic declarativeNetRequest rules
pub const MAX_DYNAMIC_RULES: usize = 5000;

/// Maximum number of websites accepted in one settings record
pub const MAX_WEBSITES: usize = MAX_DYNAMIC_RULES / RULES_PER_WEBSITE;

/// Maximum website entry length (DNS name limit)
pub const MAX_WEBSITE_LEN: usize = 253;

/// Chrome limits native messaging to 1MB (1024 * 1024 bytes)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default interval between schedule re-checks, in seconds
pub const DEFAULT_RECHECK_INTERVAL_SECS: u64 = 60;

/// Websites seeded on first install
pub const DEFAULT_WEBSITES: &[&str] = &["instagram.com", "twitter.com", "facebook.com", "youtube.com"];

/// Days seeded on first install
pub const DEFAULT_DAYS: &[&str] = &["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"];

pub const DEFAULT_START_TIME: &str = "09:00";
pub const DEFAULT_END_TIME: &str = "17:00";
