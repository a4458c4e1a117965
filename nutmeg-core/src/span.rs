//! Source positions and spans.
//!
//! Every tree node and token carries a [`Span`]: start line/column and end
//! line/column, 1-based, as reported by the tokenizer. Spans serialize as a
//! four-integer array so they stay compact on the stage boundary.

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeSeq, Serializer};

/// A single line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

impl LineCol {
    pub fn new(line: u32, col: u32) -> LineCol {
        LineCol { line, col }
    }

    /// The span stretching from this position to `end`.
    pub fn span_to(self, end: LineCol) -> Span {
        Span {
            start_line: self.line,
            start_col: self.col,
            end_line: end.line,
            end_col: end.col,
        }
    }
}

/// A region of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Span {
        Span {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// The span that starts where `self` starts and ends where `other` ends.
    pub fn to_span(&self, other: &Span) -> Span {
        Span {
            start_line: self.start_line,
            start_col: self.start_col,
            end_line: other.end_line,
            end_col: other.end_col,
        }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn merge(&self, other: &Span) -> Span {
        let mut merged = *self;
        if other.start_line < merged.start_line
            || (other.start_line == merged.start_line && other.start_col < merged.start_col)
        {
            merged.start_line = other.start_line;
            merged.start_col = other.start_col;
        }
        if other.end_line > merged.end_line
            || (other.end_line == merged.end_line && other.end_col > merged.end_col)
        {
            merged.end_line = other.end_line;
            merged.end_col = other.end_col;
        }
        merged
    }

    /// Space-separated rendering used by the text printers.
    pub fn render(&self) -> String {
        format!(
            "{} {} {} {}",
            self.start_line, self.start_col, self.end_line, self.end_col
        )
    }
}

impl Serialize for Span {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(4))?;
        seq.serialize_element(&self.start_line)?;
        seq.serialize_element(&self.start_col)?;
        seq.serialize_element(&self.end_line)?;
        seq.serialize_element(&self.end_col)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Span {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Span, D::Error> {
        let arr = <[u32; 4]>::deserialize(deserializer)
            .map_err(|_| de::Error::custom("span must be a four-integer array"))?;
        Ok(Span::new(arr[0], arr[1], arr[2], arr[3]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_overlapping_spans() {
        let a = Span::new(2, 5, 2, 9);
        let b = Span::new(1, 7, 3, 1);
        assert_eq!(a.merge(&b), Span::new(1, 7, 3, 1));
    }

    #[test]
    fn merge_keeps_widest_extent_on_same_line() {
        let a = Span::new(1, 4, 1, 6);
        let b = Span::new(1, 2, 1, 5);
        assert_eq!(a.merge(&b), Span::new(1, 2, 1, 6));
    }

    #[test]
    fn serializes_as_four_integer_array() {
        let span = Span::new(1, 2, 3, 4);
        let json = serde_json::to_string(&span).expect("serialize");
        assert_eq!(json, "[1,2,3,4]");
        let back: Span = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, span);
    }
}
