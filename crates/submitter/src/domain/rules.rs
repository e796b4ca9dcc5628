//! Inclusion, exclusion and required-file rules.

use std::fmt;
use std::str::FromStr;

use globset::{Glob, GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};

/// How a path is treated when it satisfies both an include and an exclude
/// rule at the same level of the rule hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityResolutionPolicy {
    /// The include rule wins.
    Include,
    /// The exclude rule wins.
    #[default]
    Exclude,
}

impl AmbiguityResolutionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmbiguityResolutionPolicy::Include => "include",
            AmbiguityResolutionPolicy::Exclude => "exclude",
        }
    }
}

impl fmt::Display for AmbiguityResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AmbiguityResolutionPolicy {
    type Err = PatternError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "include" => Ok(AmbiguityResolutionPolicy::Include),
            "exclude" => Ok(AmbiguityResolutionPolicy::Exclude),
            other => Err(PatternError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Errors produced while compiling rules.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("invalid file pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },
    #[error("unknown ambiguity resolution policy '{0}'")]
    UnknownPolicy(String),
}

/// A glob evaluated against forest-relative paths.
///
/// Patterns without a `/` are tested against every segment of the path, so
/// `*.class` matches `bin/Foo.class` and `build` matches `build/out.txt`.
/// Patterns containing a `/` are tested against the whole path and each of
/// its ancestor folders. Matching is case-sensitive and `*` never crosses a
/// separator; use `**` for that.
#[derive(Debug, Clone)]
pub struct FilePattern {
    source: String,
    matcher: GlobMatcher,
    anchored: bool,
}

impl FilePattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let trimmed = pattern.trim().trim_start_matches("./").trim_end_matches('/');
        let anchored = trimmed.contains('/');
        let glob: Glob = GlobBuilder::new(trimmed.trim_start_matches('/'))
            .literal_separator(true)
            .build()
            .map_err(|err| PatternError::InvalidGlob {
                pattern: pattern.to_owned(),
                reason: err.kind().to_string(),
            })?;

        Ok(Self {
            source: pattern.to_owned(),
            matcher: glob.compile_matcher(),
            anchored,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the path, or any folder containing it, matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return false;
        }

        if !self.anchored {
            return path.split('/').any(|segment| self.matcher.is_match(segment));
        }

        let mut end = 0;
        for segment in path.split('/') {
            end += segment.len();
            if self.matcher.is_match(&path[..end]) {
                return true;
            }
            end += 1;
        }
        false
    }
}

impl PartialEq for FilePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for FilePattern {}

/// Rules declared at one level of the target hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleLevel {
    pub includes: Vec<FilePattern>,
    pub excludes: Vec<FilePattern>,
    pub required: Vec<FilePattern>,
}

impl RuleLevel {
    /// Compile a level from raw pattern strings.
    pub fn from_patterns(
        includes: &[String],
        excludes: &[String],
        required: &[String],
    ) -> Result<Self, PatternError> {
        Ok(Self {
            includes: compile_all(includes)?,
            excludes: compile_all(excludes)?,
            required: compile_all(required)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty() && self.required.is_empty()
    }

    fn included(&self, path: &str) -> bool {
        self.includes.iter().any(|pattern| pattern.matches(path))
    }

    fn excluded(&self, path: &str) -> bool {
        self.excludes.iter().any(|pattern| pattern.matches(path))
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<FilePattern>, PatternError> {
    patterns.iter().map(|p| FilePattern::new(p)).collect()
}

/// Decide whether `path` is excluded by the rule hierarchy.
///
/// `levels` runs from the root of the hierarchy down to the assignment. The
/// first level where only an exclude rule matches settles the answer. When an
/// include and an exclude both match at one level, `policy` breaks the tie.
/// Levels where nothing matches inherit the decision made above them, and a
/// path no rule mentions is not excluded.
pub fn evaluate_exclusion(
    levels: &[RuleLevel],
    path: &str,
    policy: AmbiguityResolutionPolicy,
) -> bool {
    for level in levels {
        match (level.included(path), level.excluded(path)) {
            (true, true) if policy == AmbiguityResolutionPolicy::Exclude => return true,
            (false, true) => return true,
            _ => {}
        }
    }
    false
}

/// Whether any level marks `path` as required.
pub fn is_required(levels: &[RuleLevel], path: &str) -> bool {
    levels
        .iter()
        .flat_map(|level| level.required.iter())
        .any(|pattern| pattern.matches(path))
}
