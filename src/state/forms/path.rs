//! Field paths into the nested form value tree

use super::error::TrackerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One step of a field path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Dot/bracket addressable key, e.g. `address.line1` or `phone[0].number`
///
/// Numeric segments always address array elements, so `phone.0.number` and
/// `phone[0].number` parse to the same path. The canonical text form is dotted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parse a path from its text form
    pub fn parse(raw: &str) -> Result<Self, TrackerError> {
        let invalid = || TrackerError::InvalidPath(raw.to_string());
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = raw.chars().peekable();
        // Set after `]` so that `a[0].b` does not produce an empty key before `.b`
        let mut after_bracket = false;

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if current.is_empty() {
                        if !after_bracket {
                            return Err(invalid());
                        }
                    } else {
                        segments.push(Self::segment_from(&current));
                        current.clear();
                    }
                    after_bracket = false;
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(Self::segment_from(&current));
                        current.clear();
                    } else if segments.is_empty() {
                        return Err(invalid());
                    }
                    let mut index = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() => index.push(d),
                            _ => return Err(invalid()),
                        }
                    }
                    let index = index.parse::<usize>().map_err(|_| invalid())?;
                    segments.push(Segment::Index(index));
                    after_bracket = true;
                    if let Some(&next) = chars.peek() {
                        if next != '.' && next != '[' {
                            return Err(invalid());
                        }
                    }
                }
                ']' => return Err(invalid()),
                c if c.is_whitespace() => return Err(invalid()),
                c => {
                    after_bracket = false;
                    current.push(c);
                }
            }
        }

        if !current.is_empty() {
            segments.push(Self::segment_from(&current));
        } else if !after_bracket {
            // Trailing dot or empty input
            return Err(invalid());
        }

        Ok(Self { segments })
    }

    fn segment_from(raw: &str) -> Segment {
        match raw.parse::<usize>() {
            Ok(index) if raw.chars().all(|c| c.is_ascii_digit()) => Segment::Index(index),
            _ => Segment::Key(raw.to_string()),
        }
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a key segment
    pub fn key(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.to_string()));
        Self { segments }
    }

    /// Append an index segment
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }

    /// Concatenate a relative path onto this one
    pub fn join(&self, relative: &FieldPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(relative.segments.iter().cloned());
        Self { segments }
    }

    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// If this path points inside element `n` of the array at `array`, return `n`
    pub fn array_index_under(&self, array: &FieldPath) -> Option<usize> {
        if !self.starts_with(array) {
            return None;
        }
        match self.segments.get(array.len()) {
            Some(Segment::Index(i)) => Some(*i),
            _ => None,
        }
    }

    /// Same path with the array index directly below `array` replaced
    pub fn with_array_index(&self, array: &FieldPath, index: usize) -> Self {
        let mut segments = self.segments.clone();
        if let Some(slot) = segments.get_mut(array.len()) {
            *slot = Segment::Index(index);
        }
        Self { segments }
    }

    /// Path relative to `prefix`, if this path lives under it
    pub fn strip_prefix(&self, prefix: &FieldPath) -> Option<FieldPath> {
        if self.starts_with(prefix) {
            Some(Self {
                segments: self.segments[prefix.len()..].to_vec(),
            })
        } else {
            None
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match segment {
                Segment::Key(key) => f.write_str(key)?,
                Segment::Index(index) => write!(f, "{index}")?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = TrackerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for FieldPath {
    type Error = TrackerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    mod parse {
        use super::*;

        #[test]
        fn test_single_key() {
            let p = path("username");
            assert_eq!(p.segments(), &[Segment::Key("username".to_string())]);
        }

        #[test]
        fn test_nested_keys() {
            let p = path("address.line1");
            assert_eq!(p.len(), 2);
            assert_eq!(p.to_string(), "address.line1");
        }

        #[test]
        fn test_dot_and_bracket_forms_are_equal() {
            assert_eq!(path("phone.0.number"), path("phone[0].number"));
        }

        #[test]
        fn test_numeric_segment_is_index() {
            let p = path("phone.12");
            assert_eq!(p.segments()[1], Segment::Index(12));
        }

        #[test]
        fn test_mixed_key_with_digits_is_key() {
            let p = path("line1");
            assert_eq!(p.segments()[0], Segment::Key("line1".to_string()));
        }

        #[test]
        fn test_consecutive_brackets() {
            let p = path("grid[1][2]");
            assert_eq!(p.to_string(), "grid.1.2");
        }

        #[test]
        fn test_rejects_empty() {
            assert!(FieldPath::parse("").is_err());
        }

        #[test]
        fn test_rejects_double_dot() {
            assert!(FieldPath::parse("a..b").is_err());
        }

        #[test]
        fn test_rejects_trailing_dot() {
            assert!(FieldPath::parse("a.").is_err());
        }

        #[test]
        fn test_rejects_unclosed_bracket() {
            assert!(FieldPath::parse("a[0").is_err());
        }

        #[test]
        fn test_rejects_non_numeric_bracket() {
            assert!(FieldPath::parse("a[x]").is_err());
        }

        #[test]
        fn test_rejects_whitespace() {
            assert!(FieldPath::parse("a b").is_err());
        }
    }

    mod navigation {
        use super::*;

        #[test]
        fn test_array_index_under() {
            let array = path("phone");
            assert_eq!(path("phone.3.number").array_index_under(&array), Some(3));
            assert_eq!(path("email").array_index_under(&array), None);
        }

        #[test]
        fn test_with_array_index() {
            let array = path("phone");
            let moved = path("phone.3.number").with_array_index(&array, 1);
            assert_eq!(moved, path("phone.1.number"));
        }

        #[test]
        fn test_strip_prefix() {
            let rel = path("phone.0.number").strip_prefix(&path("phone.0")).unwrap();
            assert_eq!(rel, path("number"));
        }

        #[test]
        fn test_join() {
            assert_eq!(path("phone").index(2).join(&path("number")), path("phone.2.number"));
        }

        #[test]
        fn test_serde_uses_text_form() {
            let json = serde_json::to_string(&path("phone[1].number")).unwrap();
            assert_eq!(json, "\"phone.1.number\"");
            let parsed: FieldPath = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, path("phone.1.number"));
        }
    }
}
