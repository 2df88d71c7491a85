//! Glob-style matching for version and build patterns
//!
//! `*` matches any run of characters (including none), `?` exactly one.
//! Matching is a single greedy pass: the fixed prefix and suffix are pinned
//! first, then each segment between stars is located left to right inside
//! the remaining window. No backtracking is needed because every segment
//! is anchored by the previous one.

/// A compiled wildcard pattern.
#[derive(Debug, Clone)]
pub struct WildcardMatcher {
    pattern: String,
    case_sensitive: bool,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    /// No `*` at all: lengths must agree.
    Exact(Vec<char>),
    Starred {
        prefix: Vec<char>,
        middle: Vec<Vec<char>>,
        suffix: Vec<char>,
    },
}

impl WildcardMatcher {
    pub fn new(pattern: &str, case_sensitive: bool) -> Self {
        let normalized = if case_sensitive {
            pattern.to_owned()
        } else {
            pattern.to_lowercase()
        };

        let kind = if normalized.contains('*') {
            let parts: Vec<&str> = normalized.split('*').collect();
            let prefix = parts[0].chars().collect();
            let suffix = parts[parts.len() - 1].chars().collect();
            // Empty pieces come from adjacent stars; they carry no constraint.
            let middle = parts[1..parts.len() - 1]
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| p.chars().collect())
                .collect();
            PatternKind::Starred {
                prefix,
                middle,
                suffix,
            }
        } else {
            PatternKind::Exact(normalized.chars().collect())
        };

        Self {
            pattern: pattern.to_owned(),
            case_sensitive,
            kind,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let text: Vec<char> = if self.case_sensitive {
            candidate.chars().collect()
        } else {
            candidate.to_lowercase().chars().collect()
        };

        match &self.kind {
            PatternKind::Exact(chars) => {
                chars.len() == text.len() && segment_matches_at(chars, &text, 0)
            }
            PatternKind::Starred {
                prefix,
                middle,
                suffix,
            } => {
                if text.len() < prefix.len() + suffix.len() {
                    return false;
                }
                let window_end = text.len() - suffix.len();
                if !segment_matches_at(prefix, &text, 0)
                    || !segment_matches_at(suffix, &text, window_end)
                {
                    return false;
                }

                let mut pos = prefix.len();
                for segment in middle {
                    match find_segment(segment, &text[..window_end], pos) {
                        Some(found) => pos = found + segment.len(),
                        None => return false,
                    }
                }
                true
            }
        }
    }
}

/// Does `segment` match `text` starting at `at`? `?` matches any one char.
fn segment_matches_at(segment: &[char], text: &[char], at: usize) -> bool {
    if at + segment.len() > text.len() {
        return false;
    }
    segment
        .iter()
        .zip(&text[at..])
        .all(|(p, c)| *p == '?' || p == c)
}

/// Leftmost position at or after `from` where `segment` matches.
fn find_segment(segment: &[char], text: &[char], from: usize) -> Option<usize> {
    if segment.len() > text.len() {
        return None;
    }
    (from..=text.len() - segment.len()).find(|&i| segment_matches_at(segment, text, i))
}
