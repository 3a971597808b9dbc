//! Route pattern compilation.
//!
//! A pattern is a literal, slash-delimited path. A segment written `:name`
//! captures exactly one non-empty path segment under `name`. Everything else
//! matches literally. There are no optional params, catch-alls, or inline
//! regexes.

use regex::Regex;

/// A compiled route pattern.
#[derive(Debug)]
pub(crate) struct PathPattern {
    raw: String,
    regex: Regex,
    keys: Vec<String>,
}

impl PathPattern {
    /// Compiles `pattern`.
    ///
    /// # Panics
    ///
    /// Panics if the generated expression fails to compile, which only an
    /// absurdly large pattern can cause.
    pub(crate) fn compile(pattern: &str) -> Self {
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push('^');
        let mut keys = Vec::new();

        for (i, segment) in pattern.split('/').enumerate() {
            if i > 0 {
                source.push('/');
            }
            match segment.strip_prefix(':') {
                Some(name) if !name.is_empty() && i > 0 => {
                    source.push_str("([^/]+)");
                    keys.push(name.to_owned());
                }
                _ => source.push_str(&regex::escape(segment)),
            }
        }
        source.push('$');

        let regex = Regex::new(&source)
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
        Self { raw: pattern.to_owned(), regex, keys }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches `path`, returning `(name, value)` pairs in pattern order.
    pub(crate) fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let caps = self.regex.captures(path)?;
        let params = self.keys.iter()
            .enumerate()
            .filter_map(|(i, key)| caps.get(i + 1).map(|m| (key.clone(), m.as_str().to_owned())))
            .collect();
        Some(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pattern: &str, path: &str) -> Option<Vec<(String, String)>> {
        PathPattern::compile(pattern).matches(path)
    }

    #[test]
    fn literal_patterns_match_exactly() {
        assert_eq!(params("/health", "/health"), Some(vec![]));
        assert_eq!(params("/health", "/health/"), None);
        assert_eq!(params("/health", "/healthz"), None);
        assert_eq!(params("/", "/"), Some(vec![]));
    }

    #[test]
    fn named_segments_capture_in_order() {
        let got = params("/users/:id/posts/:post", "/users/42/posts/7").unwrap();
        assert_eq!(got, vec![
            ("id".to_owned(), "42".to_owned()),
            ("post".to_owned(), "7".to_owned()),
        ]);
    }

    #[test]
    fn named_segments_do_not_cross_slashes_or_match_empty() {
        assert_eq!(params("/users/:id", "/users/42/extra"), None);
        assert_eq!(params("/users/:id", "/users/"), None);
    }

    #[test]
    fn literal_metacharacters_are_escaped() {
        assert!(params("/file.json", "/file.json").is_some());
        assert!(params("/file.json", "/filexjson").is_none());
    }

    #[test]
    fn bare_colon_is_literal() {
        assert!(params("/a/:", "/a/:").is_some());
        assert!(params("/a/:", "/a/b").is_none());
    }
}
