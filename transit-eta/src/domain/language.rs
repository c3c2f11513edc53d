//! Display language selection.

use std::fmt;

/// Which name field to show when an operator publishes both.
///
/// Any tag starting with `zh` (`zh`, `zh-tw`, `zh-HK`) selects the
/// Chinese fields; everything else falls back to English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    #[default]
    English,
    Chinese,
}

impl Language {
    /// Interpret a language tag such as `en` or `zh-tw`.
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().to_ascii_lowercase().starts_with("zh") {
            Language::Chinese
        } else {
            Language::English
        }
    }

    /// Pick between a Chinese and an English name.
    pub fn pick<'a>(self, zh: &'a str, en: &'a str) -> &'a str {
        match self {
            Language::Chinese => zh,
            Language::English => en,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::English => f.write_str("en"),
            Language::Chinese => f.write_str("zh"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zh_prefix_selects_chinese() {
        assert_eq!(Language::from_tag("zh"), Language::Chinese);
        assert_eq!(Language::from_tag("zh-tw"), Language::Chinese);
        assert_eq!(Language::from_tag("zh-HK"), Language::Chinese);
        assert_eq!(Language::from_tag("ZH-TW"), Language::Chinese);
    }

    #[test]
    fn everything_else_is_english() {
        assert_eq!(Language::from_tag("en"), Language::English);
        assert_eq!(Language::from_tag("en-GB"), Language::English);
        assert_eq!(Language::from_tag(""), Language::English);
        assert_eq!(Language::from_tag("ja"), Language::English);
    }

    #[test]
    fn pick() {
        assert_eq!(Language::Chinese.pick("中環", "Central"), "中環");
        assert_eq!(Language::English.pick("中環", "Central"), "Central");
    }
}
