//! Literal substring substitution.
//!
//! # Design Decisions
//! - No markup awareness: a match inside a tag or attribute is replaced too
//! - Matches are non-overlapping and found left to right
//! - An empty search literal is rejected when the config is validated

use std::borrow::Cow;

/// Replace every non-overlapping occurrence of `search` in `text`.
pub fn rewrite(text: &str, search: &str, replacement: &str) -> String {
    text.replace(search, replacement)
}

/// The configured search/replace pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    search: String,
    replacement: String,
}

/// Result of applying a [`RewriteRule`] to one body.
#[derive(Debug)]
pub struct Rewritten<'a> {
    pub text: Cow<'a, str>,
    pub replacements: usize,
}

impl RewriteRule {
    /// Returns `None` when `search` is empty.
    pub fn new(search: impl Into<String>, replacement: impl Into<String>) -> Option<Self> {
        let search = search.into();
        if search.is_empty() {
            return None;
        }
        Some(Self {
            search,
            replacement: replacement.into(),
        })
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Apply the rule, borrowing the input untouched when nothing matches.
    pub fn apply<'a>(&self, text: &'a str) -> Rewritten<'a> {
        let replacements = text.matches(self.search.as_str()).count();
        if replacements == 0 {
            return Rewritten {
                text: Cow::Borrowed(text),
                replacements,
            };
        }

        Rewritten {
            text: Cow::Owned(rewrite(text, &self.search, &self.replacement)),
            replacements,
        }
    }
}
