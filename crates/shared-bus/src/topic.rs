//! # Topics and Patterns
//!
//! Topics are dot-separated strings whose segments are never empty
//! (`^[^.]+(\.[^.]+)*$`). Patterns use the same grammar, with `*` standing
//! for exactly one segment.

use std::fmt;
use thiserror::Error;

/// Segment separator.
pub const SEPARATOR: char = '.';

/// Single-segment wildcard token.
pub const WILDCARD: &str = "*";

/// Errors from topic validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopicError {
    /// The topic string was empty.
    #[error("topic is empty")]
    Empty,

    /// The topic contained an empty segment (leading, trailing or doubled dot).
    #[error("topic `{0}` contains an empty segment")]
    EmptySegment(String),
}

/// Validate a topic string without allocating.
pub fn validate(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    if topic.split(SEPARATOR).any(str::is_empty) {
        return Err(TopicError::EmptySegment(topic.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
}

/// A subscription pattern. Each `*` segment matches exactly one topic segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    /// Parse a pattern. The grammar is the topic grammar.
    pub fn parse(pattern: impl Into<String>) -> Result<Self, TopicError> {
        let raw = pattern.into();
        validate(&raw)?;
        let segments = raw
            .split(SEPARATOR)
            .map(|segment| {
                if segment == WILDCARD {
                    Segment::Any
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();
        Ok(Self { raw, segments })
    }

    /// Whether `subject` is matched by this pattern.
    ///
    /// Segment counts must be equal; wildcards never span separators.
    #[must_use]
    pub fn matches(&self, subject: &str) -> bool {
        let mut subject_segments = subject.split(SEPARATOR);
        for segment in &self.segments {
            let Some(candidate) = subject_segments.next() else {
                return false;
            };
            match segment {
                Segment::Any if !candidate.is_empty() => {}
                Segment::Literal(literal) if literal == candidate => {}
                _ => return false,
            }
        }
        subject_segments.next().is_none()
    }

    /// The pattern as given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
