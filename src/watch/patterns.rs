// src/watch/patterns.rs

use std::fmt;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::{ProcwatchError, Result};

/// Compiled `ignore_watch` globs for one unit.
///
/// Patterns are matched against paths relative to the watch root that
/// produced the event, using forward slashes. A path is ignored when the
/// path itself or any of its ancestor directories matches, so
/// `ignore_watch = ["target"]` silences everything under `target/`.
#[derive(Clone)]
pub struct IgnoreSet {
    patterns: Vec<String>,
    set: Option<GlobSet>,
}

impl fmt::Debug for IgnoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnoreSet")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl IgnoreSet {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns: Vec<String> = patterns
            .iter()
            .map(|p| normalize_pattern(p))
            .filter(|p| !p.is_empty())
            .collect();

        let set = if patterns.is_empty() {
            None
        } else {
            Some(build_globset(&patterns)?)
        };

        Ok(Self { patterns, set })
    }

    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: None,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns true if `rel_path` (relative to a watch root, e.g.
    /// `"target/debug/app"`) or one of its ancestors matches a pattern.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        let Some(set) = &self.set else {
            return false;
        };

        let rel_path = rel_path.trim_start_matches("./").trim_end_matches('/');
        if rel_path.is_empty() {
            return false;
        }

        for (idx, ch) in rel_path.char_indices() {
            if ch == '/' && idx > 0 && set.is_match(&rel_path[..idx]) {
                return true;
            }
        }
        set.is_match(rel_path)
    }
}

/// `build/`, `./build` and `build` all mean the same directory.
fn normalize_pattern(pattern: &str) -> String {
    pattern
        .trim()
        .trim_start_matches("./")
        .trim_end_matches('/')
        .to_string()
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).map_err(|e| {
            ProcwatchError::ConfigError(format!("invalid ignore pattern '{pat}': {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ProcwatchError::ConfigError(format!("building ignore globset: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(patterns: &[&str]) -> IgnoreSet {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        IgnoreSet::new(&patterns).unwrap()
    }

    #[test]
    fn directory_name_ignores_its_whole_subtree() {
        let ignore = set(&["target"]);
        assert!(ignore.is_ignored("target"));
        assert!(ignore.is_ignored("target/debug/hbp"));
        assert!(!ignore.is_ignored("src/main.rs"));
        assert!(!ignore.is_ignored("targets.txt"));
    }

    #[test]
    fn trailing_slash_is_accepted() {
        let ignore = set(&["build/"]);
        assert!(ignore.is_ignored("build/out.o"));
        assert!(!ignore.is_ignored("src/build.rs"));
    }

    #[test]
    fn globs_match_nested_directories() {
        let ignore = set(&["**/node_modules", "*.log"]);
        assert!(ignore.is_ignored("web/node_modules/react/index.js"));
        assert!(ignore.is_ignored("server.log"));
        assert!(!ignore.is_ignored("web/src/app.js"));
    }

    #[test]
    fn empty_set_ignores_nothing() {
        assert!(!IgnoreSet::empty().is_ignored("target/debug"));
        assert!(!set(&[]).is_ignored("anything"));
    }

    #[test]
    fn invalid_glob_is_a_config_error() {
        let err = IgnoreSet::new(&["a[".to_string()]).unwrap_err();
        assert!(matches!(err, ProcwatchError::ConfigError(_)));
    }
}
