//! Keyword deny-list applied to stream titles and tags.

use regex::Regex;
use tracing::warn;

use crate::storage::FilterRule;

#[derive(Debug)]
enum Matcher {
    Pattern(Regex),
    Literal { needle: String, case_insensitive: bool },
}

impl Matcher {
    fn matches(&self, text: &str) -> bool {
        match self {
            Self::Pattern(re) => re.is_match(text),
            Self::Literal {
                needle,
                case_insensitive: true,
            } => text.to_lowercase().contains(needle.as_str()),
            Self::Literal { needle, .. } => text.contains(needle.as_str()),
        }
    }
}

/// Compiled set of filter rules.
#[derive(Debug, Default)]
pub struct KeywordFilter {
    matchers: Vec<Matcher>,
}

impl KeywordFilter {
    /// Compile `rules`. Invalid regex rules are skipped.
    pub fn compile(rules: &[FilterRule]) -> Self {
        let mut matchers = Vec::with_capacity(rules.len());
        for rule in rules {
            if rule.is_regex {
                match Regex::new(&rule.keyword) {
                    Ok(re) => matchers.push(Matcher::Pattern(re)),
                    Err(e) => {
                        warn!(rule_id = rule.id, pattern = %rule.keyword, error = %e, "Skipping invalid filter pattern");
                    }
                }
            } else if !rule.keyword.is_empty() {
                let needle = if rule.case_insensitive {
                    rule.keyword.to_lowercase()
                } else {
                    rule.keyword.clone()
                };
                matchers.push(Matcher::Literal {
                    needle,
                    case_insensitive: rule.case_insensitive,
                });
            }
        }
        Self { matchers }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn matches(&self, text: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(text))
    }

    /// First of `title` and `tags` caught by a rule.
    pub fn first_match<'a>(&self, title: &'a str, tags: &'a [String]) -> Option<&'a str> {
        std::iter::once(title)
            .chain(tags.iter().map(String::as_str))
            .find(|text| self.matches(text))
    }
}
