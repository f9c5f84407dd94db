//! Skip-file and blackbox engine
//!
//! A pattern set (compiled from `skipFiles` globs plus raw
//! `skipFileRegExps`) and a per-path override map. Explicit overrides win
//! over patterns. Per-script blackboxed ranges are computed from the
//! ordered authored-source details of the script's source map.

use crate::transformers::SourcePathDetails;
use parking_lot::RwLock;
use regex::Regex;
use tracing::warn;

/// Skip classification state
#[derive(Debug, Default)]
pub struct SkipFileEngine {
    patterns: RwLock<Vec<Regex>>,
    statuses: RwLock<std::collections::HashMap<String, bool>>,
}

/// Convert a `skipFiles` glob to an anchored regex.
///
/// `**` crosses path separators, `*` and `?` do not. Matching is
/// case-insensitive, as path matching on the wire is.
pub fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(glob.len() * 2 + 8);
    pattern.push_str("(?i)^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    pattern.push_str(".*");
                } else {
                    pattern.push_str(r"[^/\\]*");
                }
            }
            '?' => pattern.push_str(r"[^/\\]"),
            '/' | '\\' => pattern.push_str(r"[/\\]"),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}

impl SkipFileEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the attach-time pattern set. Glob entries starting with `!`
    /// are ignored with a warning; `skip_file_reg_exps` entries are
    /// appended verbatim.
    pub fn configure(&self, skip_files: &[String], skip_file_reg_exps: &[String]) {
        let mut compiled = Vec::new();
        for glob in skip_files {
            if glob.starts_with('!') {
                warn!("Ignoring skipFiles entry {}: negation is not supported", glob);
                continue;
            }
            match glob_to_regex(glob) {
                Ok(regex) => compiled.push(regex),
                Err(e) => warn!("Ignoring invalid skipFiles glob {}: {}", glob, e),
            }
        }
        for raw in skip_file_reg_exps {
            match Regex::new(raw) {
                Ok(regex) => compiled.push(regex),
                Err(e) => warn!("Ignoring invalid skipFileRegExps entry {}: {}", raw, e),
            }
        }
        *self.patterns.write() = compiled;
    }

    /// Classify a path: explicit status first, then the pattern set, else
    /// undecided.
    pub fn should_skip(&self, path: &str) -> Option<bool> {
        if let Some(&status) = self.statuses.read().get(path) {
            return Some(status);
        }
        if self.patterns.read().iter().any(|p| p.is_match(path)) {
            return Some(true);
        }
        None
    }

    /// Classification collapsed to a boolean.
    pub fn is_skipped(&self, path: &str) -> bool {
        self.should_skip(path).unwrap_or(false)
    }

    /// Flip a path's classification. The explicit status map takes the new
    /// value, and the pattern list is edited so scripts parsed later
    /// inherit the decision.
    pub fn toggle(&self, path: &str) -> bool {
        let new_status = !self.is_skipped(path);
        self.statuses.write().insert(path.to_string(), new_status);

        let mut patterns = self.patterns.write();
        if new_status {
            if let Ok(regex) = Regex::new(&format!("(?i)^{}$", regex::escape(path))) {
                patterns.push(regex);
            }
        } else {
            patterns.retain(|p| !p.is_match(path));
        }
        new_status
    }

    /// Current pattern sources, for `Debugger.setBlackboxPatterns`.
    pub fn pattern_list(&self) -> Vec<String> {
        self.patterns.read().iter().map(|p| p.as_str().to_string()).collect()
    }

    /// Whether any pattern or override is installed.
    pub fn is_active(&self) -> bool {
        !self.patterns.read().is_empty() || !self.statuses.read().is_empty()
    }

    /// Compute blackboxed range boundaries for one script.
    ///
    /// Walks the authored-source details in source order, emitting a
    /// boundary wherever the classification flips. The walk starts in the
    /// parent script's own classification; a skipped parent contributes a
    /// leading `(0, 0)` boundary so the script head is blackboxed too.
    pub fn blackboxed_ranges(
        &self,
        parent_is_skipped: bool,
        details: &[SourcePathDetails],
    ) -> Vec<(u64, u64)> {
        let mut positions = Vec::new();
        if parent_is_skipped {
            positions.push((0, 0));
        }
        let mut in_lib = parent_is_skipped;
        for detail in details {
            let skipped = self.is_skipped(&detail.inferred_path);
            if skipped != in_lib {
                let (line, column) = detail.start_position.unwrap_or((0, 0));
                positions.push((line, column));
                in_lib = skipped;
            }
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(path: &str, line: u64, column: u64) -> SourcePathDetails {
        SourcePathDetails {
            inferred_path: path.to_string(),
            start_position: Some((line, column)),
        }
    }

    #[test]
    fn test_glob_conversion() {
        let regex = glob_to_regex("node_modules/**").unwrap();
        assert!(regex.is_match("node_modules/lodash/index.js"));
        assert!(regex.is_match("NODE_MODULES/a.js"));
        assert!(!regex.is_match("src/node_modules.js"));

        let regex = glob_to_regex("*.min.js").unwrap();
        assert!(regex.is_match("app.min.js"));
        assert!(!regex.is_match("dist/app.min.js"));
    }

    #[test]
    fn test_classification_precedence() {
        let engine = SkipFileEngine::new();
        engine.configure(&["lib/**".to_string()], &[]);

        assert_eq!(engine.should_skip("lib/vendor.js"), Some(true));
        assert_eq!(engine.should_skip("src/app.js"), None);

        // Explicit status overrides the pattern set.
        engine.toggle("lib/vendor.js");
        assert_eq!(engine.should_skip("lib/vendor.js"), Some(false));
    }

    #[test]
    fn test_toggle_is_involutive() {
        let engine = SkipFileEngine::new();
        engine.configure(&["vendor/**".to_string()], &[]);

        let original = engine.is_skipped("src/app.js");
        engine.toggle("src/app.js");
        assert_eq!(engine.is_skipped("src/app.js"), !original);
        engine.toggle("src/app.js");
        assert_eq!(engine.is_skipped("src/app.js"), original);
    }

    #[test]
    fn test_toggle_edits_pattern_list() {
        let engine = SkipFileEngine::new();
        engine.configure(&[], &[]);

        engine.toggle("lib/skipme.js");
        assert!(engine.pattern_list().iter().any(|p| p.contains("skipme")));

        engine.toggle("lib/skipme.js");
        assert!(engine.pattern_list().is_empty());
    }

    #[test]
    fn test_negated_globs_are_ignored() {
        let engine = SkipFileEngine::new();
        engine.configure(&["!src/**".to_string()], &[]);
        assert!(engine.pattern_list().is_empty());
        assert_eq!(engine.should_skip("src/a.js"), None);
    }

    #[test]
    fn test_raw_regexps_appended_verbatim() {
        let engine = SkipFileEngine::new();
        engine.configure(&[], &["^internal/".to_string()]);
        assert_eq!(engine.should_skip("internal/timers.js"), Some(true));
        assert_eq!(engine.pattern_list(), vec!["^internal/"]);
    }

    #[test]
    fn test_blackboxed_ranges_boundaries() {
        let engine = SkipFileEngine::new();
        engine.configure(&["**/lib/**".to_string()], &[]);

        let details = vec![
            detail("/app/src/a.ts", 0, 0),
            detail("/app/lib/b.ts", 100, 0),
            detail("/app/lib/c.ts", 200, 0),
            detail("/app/src/d.ts", 300, 12),
        ];

        // Unskipped parent: boundaries at the first skipped source and at
        // the transition back.
        let positions = engine.blackboxed_ranges(false, &details);
        assert_eq!(positions, vec![(100, 0), (300, 12)]);

        // Skipped parent: leading {0,0}, then the flip to the first
        // unskipped source.
        let positions = engine.blackboxed_ranges(true, &details);
        assert_eq!(positions, vec![(0, 0), (0, 0), (100, 0), (300, 12)]);
    }
}
