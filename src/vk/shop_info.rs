//! Contact details scraped from free-form shop descriptions.

// lazy_regex! keeps the patterns in statics validated at compile time
#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;

static RE_ADDRESS: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"(?i)адрес[:\s-]+([^\n]+)");
static RE_ADDRESS_ALT: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?i)находимся[:\s-]+([^\n]+)");

static RE_PHONE: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?i)(?:тел(?:ефон)?|звоните)[:\s-]+([^\n]+)");
/// Bare Russian phone number: +7 / 8 followed by ten digits with separators.
static RE_PHONE_NUMBER: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?:\+7|8)[\s\-(]?\d{3}[\s\-)]?\d{3}[\s\-]?\d{2}[\s\-]?\d{2}");

static RE_WEBSITE: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?i)(?:сайт|страница|группа|vk)[:\s-]+(\S+)");
static RE_URL: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"https?://\S+");

static RE_WORK_HOURS: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?i)(?:график|работаем|часы работы|время работы)[:\s-]+([^\n]+)");

/// Structured contacts found in a shop description. Missing fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShopInfo {
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub work_hours: Option<String>,
}

impl ShopInfo {
    /// Scans a description for contact lines.
    #[must_use]
    pub fn parse(description: &str) -> Self {
        Self {
            address: first_group(&RE_ADDRESS, description)
                .or_else(|| first_group(&RE_ADDRESS_ALT, description)),
            phone: first_group(&RE_PHONE, description)
                .or_else(|| whole_match(&RE_PHONE_NUMBER, description)),
            website: first_group(&RE_WEBSITE, description)
                .or_else(|| whole_match(&RE_URL, description)),
            work_hours: first_group(&RE_WORK_HOURS, description),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.address.is_none()
            && self.phone.is_none()
            && self.website.is_none()
            && self.work_hours.is_none()
    }

    /// Renders the found fields as caption lines, one per field.
    #[must_use]
    pub fn to_lines(&self) -> Vec<String> {
        let fields = [
            ("📍 Адрес", &self.address),
            ("📞 Телефон", &self.phone),
            ("🌐 Сайт", &self.website),
            ("🕒 Время работы", &self.work_hours),
        ];
        fields
            .into_iter()
            .filter_map(|(label, value)| value.as_ref().map(|v| format!("{label}: {v}")))
            .collect()
    }
}

fn first_group(re: &regex::Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn whole_match(re: &regex::Regex, text: &str) -> Option<String> {
    re.find(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}
