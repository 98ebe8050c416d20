//! Topic-exchange binding patterns.
//!
//! A routing key is a dot-separated list of words (`post.created`). A binding
//! pattern uses the same shape with two wildcards:
//!
//! - `*` matches exactly one word
//! - `#` matches zero or more words
//!
//! ```text
//! pattern        post.created   post.deleted   dead_letter.post.deleted
//! post.created        ✓              ✗                  ✗
//! post.*              ✓              ✓                  ✗
//! #                   ✓              ✓                  ✓
//! dead_letter.#       ✗              ✗                  ✓
//! ```

use std::fmt;
use thiserror::Error;

/// An invalid binding pattern.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid routing pattern '{pattern}': {reason}")]
pub struct PatternError {
    /// The rejected pattern
    pub pattern: String,
    /// Why it was rejected
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Word(String),
    One,
    Many,
}

/// A parsed binding pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutingPattern {
    /// Parse a binding pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] for an empty pattern, an empty word
    /// (`post..created`), or a wildcard embedded in a word (`post.cre*`).
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let invalid = |reason| PatternError {
            pattern: pattern.to_string(),
            reason,
        };

        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let segments = pattern
            .split('.')
            .map(|word| match word {
                "" => Err(invalid("empty word")),
                "*" => Ok(Segment::One),
                "#" => Ok(Segment::Many),
                w if w.contains(['*', '#']) => Err(invalid("wildcard inside a word")),
                w => Ok(Segment::Word(w.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// Pattern that matches exactly one routing key.
    ///
    /// # Errors
    ///
    /// Same as [`RoutingPattern::parse`].
    pub fn exact(routing_key: &str) -> Result<Self, PatternError> {
        let pattern = Self::parse(routing_key)?;
        if pattern.is_exact() {
            Ok(pattern)
        } else {
            Err(PatternError {
                pattern: routing_key.to_string(),
                reason: "routing keys may not contain wildcards",
            })
        }
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern contains no wildcards.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Word(_)))
    }

    /// Whether `routing_key` is delivered to a queue bound with this pattern.
    #[must_use]
    pub fn matches(&self, routing_key: &str) -> bool {
        let words: Vec<&str> = routing_key.split('.').collect();
        match_segments(&self.segments, &words)
    }
}

fn match_segments(pattern: &[Segment], words: &[&str]) -> bool {
    match pattern.split_first() {
        None => words.is_empty(),
        Some((Segment::Many, rest)) => {
            // `#` absorbs 0..=len words
            (0..=words.len()).any(|skip| match_segments(rest, &words[skip..]))
        }
        Some((Segment::One, rest)) => {
            !words.is_empty() && match_segments(rest, &words[1..])
        }
        Some((Segment::Word(expected), rest)) => match words.split_first() {
            Some((word, remaining)) => word == expected && match_segments(rest, remaining),
            None => false,
        },
    }
}

impl fmt::Display for RoutingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for RoutingPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
