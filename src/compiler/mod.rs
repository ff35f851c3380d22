use crate::constants::{DEFAULT_NOTICE_PAGE, RULES_PER_WEBSITE, RULE_PRIORITY};
use crate::models::{BlockingRule, UrlPattern};
use log::debug;
use url::Url;

/// Turns a website list into an ordered, deterministic rule batch.
#[derive(Debug, Clone)]
pub struct RuleCompiler {
    notice_page: String,
    normalize: bool,
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_PAGE, false)
    }
}

impl RuleCompiler {
    pub fn new(notice_page: &str, normalize: bool) -> Self {
        Self {
            notice_page: notice_page.to_string(),
            normalize,
        }
    }

    /// Compile four rules per website in input order. Ids run from 1 across
    /// the whole batch, so the same input always yields the same rules.
    pub fn compile(&self, websites: &[String]) -> Vec<BlockingRule> {
        let normalized;
        let websites = if self.normalize {
            normalized = normalize_websites(websites);
            normalized.as_slice()
        } else {
            websites
        };

        let mut rules = Vec::with_capacity(websites.len() * RULES_PER_WEBSITE);
        let mut next_id: u32 = 1;
        for website in websites {
            for pattern in UrlPattern::ALL {
                rules.push(BlockingRule::new(next_id, RULE_PRIORITY, pattern, website, &self.notice_page));
                next_id += 1;
            }
        }

        debug!("Compiled {} rules for {} websites", rules.len(), websites.len());
        rules
    }
}

/// Reduce a website entry to a bare lowercase host.
///
/// Accepts `example.com`, `https://www.Example.com/path`, `example.com:8080/`
/// and similar. Returns `None` when nothing host-like remains.
pub fn normalize_website(entry: &str) -> Option<String> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    let with_scheme = if entry.contains("://") {
        entry.to_string()
    } else {
        format!("http://{entry}")
    };

    let host = match Url::parse(&with_scheme) {
        Ok(url) => url.host_str()?.to_string(),
        Err(_) => return None,
    };

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Normalize every entry, dropping empties and later duplicates.
pub fn normalize_websites(websites: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(websites.len());
    for website in websites {
        if let Some(host) = normalize_website(website) {
            if !seen.contains(&host) {
                seen.push(host);
            }
        }
    }
    seen
}
