// TBForge - Testbench Data Generator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::Serialize;
use std::fmt;

/// Nesting level of a section in the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Level {
    TestVector,
    ParallelSection,
    Packet,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::TestVector, Level::ParallelSection, Level::Packet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::TestVector => "TestVector",
            Level::ParallelSection => "ParallelSection",
            Level::Packet => "Packet",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == token)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MarkerKind {
    Count,
    Seek,
}

impl MarkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerKind::Count => "count",
            MarkerKind::Seek => "seek",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "count" => Some(MarkerKind::Count),
            "seek" => Some(MarkerKind::Seek),
            _ => None,
        }
    }
}

/// One line of the data file.
///
/// Markers carry the structure (`TestVector count 2`, `ParallelSection seek 118`); data lines carry
/// one primitive event each. Lines are compared by kind, never by text prefix, so a data line whose
/// text happens to start with `TestVector` is still data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Marker {
        level: Level,
        kind: MarkerKind,
        value: u64,
    },
    Data {
        text: String,
    },
}

impl Line {
    pub fn count(level: Level, value: u64) -> Self {
        Line::Marker {
            level,
            kind: MarkerKind::Count,
            value,
        }
    }

    /// A seek placeholder, resolved later by [`crate::seek::resolve_seeks`].
    pub fn seek(level: Level) -> Self {
        Line::Marker {
            level,
            kind: MarkerKind::Seek,
            value: 0,
        }
    }

    pub fn data(text: impl Into<String>) -> Self {
        Line::Data { text: text.into() }
    }

    /// Parses one serialized line. Anything that is not exactly `<Level> <kind> <u64>` is data.
    pub fn parse(text: &str) -> Self {
        let mut tokens = text.split(' ');
        if let (Some(level), Some(kind), Some(value), None) =
            (tokens.next(), tokens.next(), tokens.next(), tokens.next())
        {
            if let (Some(level), Some(kind), Ok(value)) = (
                Level::from_token(level),
                MarkerKind::from_token(kind),
                value.parse::<u64>(),
            ) {
                return Line::Marker { level, kind, value };
            }
        }
        Line::data(text)
    }

    pub fn is_marker(&self, level: Level, kind: MarkerKind) -> bool {
        matches!(self, Line::Marker { level: l, kind: k, .. } if *l == level && *k == kind)
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Line::Data { .. })
    }

    pub fn marker_value(&self) -> Option<u64> {
        match self {
            Line::Marker { value, .. } => Some(*value),
            Line::Data { .. } => None,
        }
    }

    /// Rewrites the value of a seek marker. Returns the previous value, or `None` (and leaves the
    /// line untouched) if this is not a seek marker.
    pub fn set_seek(&mut self, new_value: u64) -> Option<u64> {
        match self {
            Line::Marker {
                kind: MarkerKind::Seek,
                value,
                ..
            } => Some(std::mem::replace(value, new_value)),
            _ => None,
        }
    }

    /// Serialized length in bytes, excluding the newline separator.
    pub fn byte_len(&self) -> usize {
        match self {
            Line::Marker { level, kind, value } => {
                level.as_str().len() + kind.as_str().len() + decimal_len(*value) + 2
            }
            Line::Data { text } => text.len(),
        }
    }

    /// The `<argc>` field of a data line at token position `position`.
    pub fn arg_count_at(&self, position: usize) -> Option<usize> {
        match self {
            Line::Data { text } => split_tokens(text).get(position)?.parse().ok(),
            Line::Marker { .. } => None,
        }
    }

    /// The `<argc>` field of an SV data line (`<type> <name> <argc> ...`).
    pub fn arg_count(&self) -> Option<usize> {
        self.arg_count_at(2)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Marker { level, kind, value } => write!(f, "{} {} {}", level, kind.as_str(), value),
            Line::Data { text } => f.write_str(text),
        }
    }
}

fn decimal_len(mut value: u64) -> usize {
    let mut digits = 1;
    while value >= 10 {
        value /= 10;
        digits += 1;
    }
    digits
}

/// Splits a data line on spaces, keeping double-quoted tokens (display strings) whole.
pub fn split_tokens(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    let mut in_quotes = false;
    for (i, ch) in line.char_indices() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                if start.is_none() {
                    start = Some(i);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if let Some(s) = start.take() {
                    tokens.push(&line[s..i]);
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                }
            }
        }
    }
    if let Some(s) = start {
        tokens.push(&line[s..]);
    }
    tokens
}

/// Joins lines with `\n`, without a trailing newline after the final line.
pub fn render(lines: &[Line]) -> String {
    let capacity = lines.iter().map(|l| l.byte_len() + 1).sum();
    let mut out = String::with_capacity(capacity);
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&line.to_string());
    }
    out
}

pub fn parse_lines(text: &str) -> Vec<Line> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n')
        .map(|l| Line::parse(l.strip_suffix('\r').unwrap_or(l)))
        .collect()
}

/// Byte offset of every line when serialized with [`render`].
pub fn offsets(lines: &[Line]) -> Vec<u64> {
    let mut acc = 0u64;
    lines
        .iter()
        .map(|line| {
            let start = acc;
            acc += line.byte_len() as u64 + 1;
            start
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_roundtrip() {
        let line = Line::parse("ParallelSection seek 118");
        assert_eq!(
            line,
            Line::Marker {
                level: Level::ParallelSection,
                kind: MarkerKind::Seek,
                value: 118
            }
        );
        assert_eq!(line.to_string(), "ParallelSection seek 118");
        assert_eq!(line.byte_len(), "ParallelSection seek 118".len());
    }

    #[test]
    fn test_data_line_with_marker_prefix_is_data() {
        let line = Line::parse("TestVector seek 12 extra");
        assert!(line.is_data());
        let line = Line::parse("TestVector seek abc");
        assert!(line.is_data());
    }

    #[test]
    fn test_set_seek_only_on_seek_markers() {
        let mut seek = Line::seek(Level::TestVector);
        assert_eq!(seek.set_seek(1234), Some(0));
        assert_eq!(seek.to_string(), "TestVector seek 1234");
        assert_eq!(seek.byte_len(), 20);

        let mut count = Line::count(Level::Packet, 3);
        assert_eq!(count.set_seek(5), None);
        assert_eq!(count.marker_value(), Some(3));

        let mut data = Line::data("signal a 1 1");
        assert_eq!(data.set_seek(5), None);
    }

    #[test]
    fn test_arg_count_with_quoted_display() {
        let line = Line::data("display \"hello world\" 1 0");
        assert_eq!(
            split_tokens("display \"hello world\" 1 0"),
            vec!["display", "\"hello world\"", "1", "0"]
        );
        assert_eq!(line.arg_count(), Some(1));
        assert_eq!(Line::data("axi4_stream s_axis 4 1 0 255 0").arg_count(), Some(4));
        assert_eq!(Line::count(Level::Packet, 4).arg_count(), None);
    }

    #[test]
    fn test_render_and_offsets() {
        let lines = vec![
            Line::count(Level::TestVector, 1),
            Line::data("signal a 1 1"),
        ];
        assert_eq!(render(&lines), "TestVector count 1\nsignal a 1 1");
        assert_eq!(offsets(&lines), vec![0, 19]);
        assert_eq!(parse_lines(&render(&lines)), lines);
        assert!(parse_lines("").is_empty());
    }
}
