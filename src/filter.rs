//! Include/exclude path filter.
//!
//! Patterns are shell globs (`*`, `?`, `[...]`) matched against the full path string;
//! `*` crosses `/`. A path is accepted iff it matches no exclude pattern and either the
//! include list is empty or it matches one include pattern.

use globset::{GlobBuilder, GlobMatcher};
use log::debug;

use crate::error::{FsError, FsResult};

#[derive(Debug)]
struct Pattern {
    source: String,
    matcher: GlobMatcher,
}

#[derive(Debug)]
pub struct PathFilter {
    case_sensitive: bool,
    excludes: Vec<Pattern>,
    includes: Vec<Pattern>,
}

impl PathFilter {
    /// SMB shares are case-insensitive: build their filter with `case_sensitive = false`.
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            excludes: Vec::new(),
            includes: Vec::new(),
        }
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn set_excluded_patterns<S: AsRef<str>>(&mut self, patterns: &[S]) -> FsResult<()> {
        self.excludes = self.compile(patterns)?;
        debug!("Excluded patterns: {:?}", self.sources(&self.excludes));
        Ok(())
    }

    pub fn set_included_patterns<S: AsRef<str>>(&mut self, patterns: &[S]) -> FsResult<()> {
        self.includes = self.compile(patterns)?;
        debug!("Included patterns: {:?}", self.sources(&self.includes));
        Ok(())
    }

    pub fn accept(&self, path: &str) -> bool {
        let candidate = if self.case_sensitive {
            path.to_string()
        } else {
            path.to_lowercase()
        };
        if let Some(p) = first_match(&self.excludes, &candidate) {
            debug!("Path {} excluded by pattern {}", path, p);
            return false;
        }
        self.includes.is_empty() || first_match(&self.includes, &candidate).is_some()
    }

    /// Lower-cases patterns up front when case-insensitive so `accept` only lowers the path.
    fn compile<S: AsRef<str>>(&self, patterns: &[S]) -> FsResult<Vec<Pattern>> {
        patterns
            .iter()
            .map(|p| {
                let source = if self.case_sensitive {
                    p.as_ref().to_string()
                } else {
                    p.as_ref().to_lowercase()
                };
                let glob = GlobBuilder::new(&source)
                    .literal_separator(false)
                    .backslash_escape(true)
                    .build()
                    .map_err(|e| FsError::Config(format!("invalid pattern '{source}': {e}")))?;
                Ok(Pattern {
                    source,
                    matcher: glob.compile_matcher(),
                })
            })
            .collect()
    }

    fn sources<'a>(&self, patterns: &'a [Pattern]) -> Vec<&'a str> {
        patterns.iter().map(|p| p.source.as_str()).collect()
    }
}

fn first_match<'a>(patterns: &'a [Pattern], path: &str) -> Option<&'a str> {
    patterns
        .iter()
        .find(|p| p.matcher.is_match(path))
        .map(|p| p.source.as_str())
}
