use crate::errors::{Error, Result};

/// One segment of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `**`, matching zero or more whole path segments.
    Deep,
    /// A name that may contain `?` (exactly one non-separator character)
    /// and `*` (zero or more non-separator characters).
    Name(Vec<char>),
}

/// A compiled glob pattern over forward-slash relative paths.
///
/// Wildcards: `?` matches exactly one character within a segment, `*`
/// matches any run of characters within a segment, and a segment consisting
/// solely of `**` matches any number of whole segments (including none, so
/// `alpha/**` matches `alpha` itself). A pattern ending in `/` is shorthand
/// for the same pattern with `**` appended.
///
/// A pattern naming an exact path matches only that literal path, never its
/// descendants; a pattern containing no separator can therefore only match a
/// root-level name.
#[derive(Debug, Clone)]
pub struct TreePattern {
    source: String,
    segments: Vec<Segment>,
}

impl TreePattern {
    /// Compiles a pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`] if the pattern is empty, absolute
    /// (starts with `/`), or contains a backslash. Backslashes are rejected
    /// rather than treated as separators so that patterns mean the same
    /// thing on every platform.
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::pattern(pattern, "pattern must not be empty"));
        }
        if pattern.starts_with('/') {
            return Err(Error::pattern(pattern, "pattern must be relative"));
        }
        if pattern.contains('\\') {
            return Err(Error::pattern(
                pattern,
                "use `/` as the separator; `\\` is not allowed",
            ));
        }

        // Trailing separator is sugar for a whole-subtree match.
        let normalized = if pattern.ends_with('/') {
            format!("{pattern}**")
        } else {
            pattern.to_string()
        };

        let segments = normalized
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "**" {
                    Segment::Deep
                } else {
                    Segment::Name(s.chars().collect())
                }
            })
            .collect();

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    /// The pattern text this matcher was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Tests a relative forward-slash path against this pattern.
    ///
    /// The empty string denotes the base directory itself; it is matched by
    /// any pattern reducible to pure `**` segments.
    #[must_use]
    pub fn matches(&self, path: &str, case_sensitive: bool) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match_segments(&self.segments, &parts, case_sensitive)
    }
}

/// Matches pattern segments against path segments, backtracking over `**`.
fn match_segments(pattern: &[Segment], path: &[&str], case_sensitive: bool) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::Deep, rest)) => {
            // `**` may swallow zero or more leading path segments.
            (0..=path.len()).any(|n| match_segments(rest, &path[n..], case_sensitive))
        }
        Some((Segment::Name(name), rest)) => match path.split_first() {
            Some((head, tail)) => {
                match_name(name, &head.chars().collect::<Vec<_>>(), case_sensitive)
                    && match_segments(rest, tail, case_sensitive)
            }
            None => false,
        },
    }
}

/// Matches a single segment with `?`/`*` wildcards.
fn match_name(pattern: &[char], text: &[char], case_sensitive: bool) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => (0..=text.len()).any(|n| match_name(rest, &text[n..], case_sensitive)),
        Some(('?', rest)) => match text.split_first() {
            Some((_, tail)) => match_name(rest, tail, case_sensitive),
            None => false,
        },
        Some((ch, rest)) => match text.split_first() {
            Some((t, tail)) => {
                char_eq(*ch, *t, case_sensitive) && match_name(rest, tail, case_sensitive)
            }
            None => false,
        },
    }
}

fn char_eq(a: char, b: char, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a == b || a.to_lowercase().eq(b.to_lowercase())
    }
}

/// How a path relates to a [`PatternSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Matched by an include pattern and no exclude pattern.
    Included,
    /// Matched by an include pattern but vetoed by an exclude pattern.
    Excluded,
    /// Not matched by any include pattern.
    NotIncluded,
}

/// An unordered include/exclude pattern pair.
///
/// Declaration order of the patterns never affects the outcome. An empty
/// include list selects everything (an implicit `**`), and an exclude match
/// always dominates an include match.
#[derive(Debug, Clone)]
pub struct PatternSet {
    includes: Vec<TreePattern>,
    excludes: Vec<TreePattern>,
}

impl PatternSet {
    /// Compiles both pattern lists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`] for the first pattern that fails to
    /// compile.
    pub fn new<S: AsRef<str>>(includes: &[S], excludes: &[S]) -> Result<Self> {
        let includes = if includes.is_empty() {
            vec![TreePattern::compile("**")?]
        } else {
            includes
                .iter()
                .map(|p| TreePattern::compile(p.as_ref()))
                .collect::<Result<_>>()?
        };
        let excludes = excludes
            .iter()
            .map(|p| TreePattern::compile(p.as_ref()))
            .collect::<Result<_>>()?;
        Ok(Self { includes, excludes })
    }

    /// Classifies a relative path against the set.
    #[must_use]
    pub fn selects(&self, path: &str, case_sensitive: bool) -> Selection {
        if !self.matches_any(&self.includes, path, case_sensitive) {
            return Selection::NotIncluded;
        }
        if self.matches_any(&self.excludes, path, case_sensitive) {
            Selection::Excluded
        } else {
            Selection::Included
        }
    }

    /// True when the path survives both lists.
    #[must_use]
    pub fn is_included(&self, path: &str, case_sensitive: bool) -> bool {
        self.selects(path, case_sensitive) == Selection::Included
    }

    /// True when an exclude pattern matches the path.
    #[must_use]
    pub fn is_excluded(&self, path: &str, case_sensitive: bool) -> bool {
        self.matches_any(&self.excludes, path, case_sensitive)
    }

    fn matches_any(&self, patterns: &[TreePattern], path: &str, case_sensitive: bool) -> bool {
        patterns.iter().any(|p| p.matches(path, case_sensitive))
    }
}
