use crate::constants::NOTICE_QUERY_PARAM;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Characters `encodeURIComponent` leaves unescaped.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// One of the four URL shapes emitted per website, in compile order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlPattern {
    /// `*://*.example.com/*`
    SubdomainWildcard,
    /// `*://example.com/*`
    BareDomain,
    /// `*://example.com`
    BareDomainNoPath,
    /// `*://www.example.com/*`
    WwwPrefixed,
}

impl UrlPattern {
    pub const ALL: [UrlPattern; 4] = [
        UrlPattern::SubdomainWildcard,
        UrlPattern::BareDomain,
        UrlPattern::BareDomainNoPath,
        UrlPattern::WwwPrefixed,
    ];

    pub fn url_filter(self, website: &str) -> String {
        match self {
            UrlPattern::SubdomainWildcard => format!("*://*.{website}/*"),
            UrlPattern::BareDomain => format!("*://{website}/*"),
            UrlPattern::BareDomainNoPath => format!("*://{website}"),
            UrlPattern::WwwPrefixed => format!("*://www.{website}/*"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Top-level page loads only.
    MainFrame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub extension_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    Redirect { redirect: Redirect },
}

impl RuleAction {
    /// Redirect to the local notice page, carrying the blocked website.
    pub fn notice_page(notice_page: &str, website: &str) -> Self {
        let encoded = utf8_percent_encode(website, URI_COMPONENT);
        RuleAction::Redirect {
            redirect: Redirect {
                extension_path: format!("{notice_page}?{NOTICE_QUERY_PARAM}={encoded}"),
            },
        }
    }

    /// Website carried by a notice-page redirect, decoded.
    pub fn blocked_website(&self) -> Option<String> {
        match self {
            RuleAction::Redirect { redirect } => {
                let (_, query) = redirect.extension_path.split_once('?')?;
                let encoded = query
                    .split('&')
                    .find_map(|pair| pair.strip_prefix(NOTICE_QUERY_PARAM)?.strip_prefix('='))?;
                percent_decode_str(encoded)
                    .decode_utf8()
                    .ok()
                    .map(Cow::into_owned)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<ResourceType>,
}

/// A declarative blocking rule, serialized in `declarativeNetRequest` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl BlockingRule {
    pub fn new(id: u32, priority: u32, pattern: UrlPattern, website: &str, notice_page: &str) -> Self {
        Self {
            id,
            priority,
            action: RuleAction::notice_page(notice_page, website),
            condition: RuleCondition {
                url_filter: pattern.url_filter(website),
                resource_types: vec![ResourceType::MainFrame],
            },
        }
    }
}
