//! Value sanitization for page names.

use once_cell::sync::Lazy;
use regex::Regex;

static NAME_DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\-_.]+").unwrap());
static NAME_SEPARATOR_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_.]{2,}").unwrap());

/// Sanitizer for values destined for page settings.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sanitizer;

impl Sanitizer {
    pub fn new() -> Self {
        Sanitizer
    }

    /// Reduce a value to a URL-safe page name slug.
    ///
    /// Allowed characters are lowercase ASCII letters, digits, hyphen,
    /// underscore and period; everything else becomes a hyphen. With
    /// `beautify` (used only when the page had no name yet), runs of
    /// separators collapse to a single hyphen and separators are trimmed
    /// from both ends.
    pub fn page_name(&self, value: &str, beautify: bool) -> String {
        let lowered = value.trim().to_lowercase();
        let mut name = NAME_DISALLOWED.replace_all(&lowered, "-").into_owned();
        if beautify {
            name = NAME_SEPARATOR_RUNS.replace_all(&name, "-").into_owned();
            name = name.trim_matches(|c| c == '-' || c == '_' || c == '.').to_string();
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_name_slugifies() {
        let s = Sanitizer::new();
        assert_eq!(s.page_name("Hello World", false), "hello-world");
        assert_eq!(s.page_name("About Us!", true), "about-us");
        assert_eq!(s.page_name("already-clean", false), "already-clean");
    }

    #[test]
    fn beautify_collapses_and_trims_separators() {
        let s = Sanitizer::new();
        assert_eq!(s.page_name("--What's  New?--", true), "what-s-new");
        // without beautify the separator runs survive
        assert_eq!(s.page_name("a  b", false), "a-b");
        assert_eq!(s.page_name("a__b", false), "a__b");
        assert_eq!(s.page_name("a__b", true), "a-b");
    }
}
