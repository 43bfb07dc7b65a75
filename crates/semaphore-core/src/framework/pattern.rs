//! Patterns and filters deciding which registrations see an event.
//!
//! A [`Pattern`] is a regular expression searched anywhere in a message body
//! (not anchored). An [`EventFilter`] narrows a registration to some event
//! kinds.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::foundation::event::EventKind;

// =============================================================================
// Pattern
// =============================================================================

/// A compiled text pattern.
#[derive(Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    /// Compiles a pattern.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    /// The source of the pattern.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Returns `true` if the pattern occurs anywhere in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Searches `text` and returns the owned captures of the first match.
    pub fn captures(&self, text: &str) -> Option<Captures> {
        let caps = self.regex.captures(text)?;
        let groups = caps
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();
        let names = self
            .regex
            .capture_names()
            .enumerate()
            .filter_map(|(i, name)| name.map(|n| (n.to_string(), i)))
            .collect();
        Some(Captures { groups, names })
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.regex.as_str()).finish()
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Self { regex }
    }
}

impl FromStr for Pattern {
    type Err = regex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Anything a registration can take as its pattern.
///
/// `None` means the registration matches every event it is filtered to.
pub trait IntoPattern {
    fn into_pattern(self) -> Result<Option<Pattern>, regex::Error>;
}

impl IntoPattern for Pattern {
    fn into_pattern(self) -> Result<Option<Pattern>, regex::Error> {
        Ok(Some(self))
    }
}

impl IntoPattern for Regex {
    fn into_pattern(self) -> Result<Option<Pattern>, regex::Error> {
        Ok(Some(Pattern::from(self)))
    }
}

impl IntoPattern for &str {
    fn into_pattern(self) -> Result<Option<Pattern>, regex::Error> {
        Pattern::new(self).map(Some)
    }
}

impl IntoPattern for String {
    fn into_pattern(self) -> Result<Option<Pattern>, regex::Error> {
        Pattern::new(&self).map(Some)
    }
}

impl<P: IntoPattern> IntoPattern for Option<P> {
    fn into_pattern(self) -> Result<Option<Pattern>, regex::Error> {
        match self {
            Some(p) => p.into_pattern(),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Captures
// =============================================================================

/// Owned capture groups of a pattern match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    groups: Vec<Option<String>>,
    names: HashMap<String, usize>,
}

impl Captures {
    /// The whole matched text.
    pub fn matched(&self) -> &str {
        self.get(0).unwrap_or_default()
    }

    /// Group by index; 0 is the whole match.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups.get(index)?.as_deref()
    }

    /// Group by name.
    pub fn name(&self, name: &str) -> Option<&str> {
        self.get(*self.names.get(name)?)
    }

    /// Number of groups including the whole match.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

// =============================================================================
// Event Filter
// =============================================================================

/// Restricts a registration to some event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventFilter {
    #[default]
    All,
    Messages,
    Receipts,
    Typing,
    Replies,
}

impl EventFilter {
    /// Returns `true` if events of `kind` pass the filter.
    pub fn accepts(&self, kind: EventKind) -> bool {
        matches!(
            (self, kind),
            (Self::All, _)
                | (Self::Messages, EventKind::Message)
                | (Self::Receipts, EventKind::Receipt)
                | (Self::Typing, EventKind::Typing)
                | (Self::Replies, EventKind::Reply)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_searches_anywhere() {
        let pattern = Pattern::new("hello").unwrap();
        assert!(pattern.is_match("well hello there"));
        assert!(!pattern.is_match("goodbye"));
    }

    #[test]
    fn test_captures_are_owned() {
        let pattern = Pattern::new(r"!timer (?P<secs>\d+)(?: (\w+))?").unwrap();
        let caps = pattern.captures("please !timer 30").unwrap();
        assert_eq!(caps.matched(), "!timer 30");
        assert_eq!(caps.get(1), Some("30"));
        assert_eq!(caps.name("secs"), Some("30"));
        assert_eq!(caps.get(2), None);
        assert_eq!(caps.name("missing"), None);
        assert_eq!(caps.len(), 3);
    }

    #[test]
    fn test_into_pattern() {
        assert!("a+".into_pattern().unwrap().is_some());
        assert!(None::<&str>.into_pattern().unwrap().is_none());
        assert!("(".into_pattern().is_err());
    }

    #[test]
    fn test_event_filter() {
        assert!(EventFilter::All.accepts(EventKind::Reply));
        assert!(EventFilter::Messages.accepts(EventKind::Message));
        assert!(!EventFilter::Messages.accepts(EventKind::Typing));
        assert!(EventFilter::Replies.accepts(EventKind::Reply));
    }
}
