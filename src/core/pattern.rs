//! # Pattern
//!
//! Wildcard search patterns used to filter probe listings.

use anyhow::{anyhow, Result};
use regex::{Regex, RegexBuilder};

/// A compiled probe search pattern. Searches use `*` to match any sequence of
/// characters and `?` to match exactly one; matching is case insensitive and
/// covers the whole probe identifier.
///
/// Characters other than `*` and `?` are handed to the regex engine unescaped.
/// This is long-standing behavior of the search syntax: the engine's remaining
/// metacharacters keep their meaning, e.g. `.` matches any single character.
pub(crate) struct SearchPattern {
    re: Regex,
}

impl SearchPattern {
    pub(crate) fn new(search: &str) -> Result<SearchPattern> {
        let mut expr = String::with_capacity(search.len() + 2);

        expr.push('^');
        for c in search.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                c => expr.push(c),
            }
        }
        expr.push('$');

        Ok(SearchPattern {
            re: RegexBuilder::new(&expr)
                .case_insensitive(true)
                .build()
                .map_err(|_| anyhow!("invalid character in search expression."))?,
        })
    }

    /// Does a probe identifier match the search?
    pub(crate) fn matches(&self, probe: &str) -> bool {
        self.re.is_match(probe)
    }
}
