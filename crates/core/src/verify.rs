// TBForge - Testbench Data Generator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Independent structural check of a resolved data file.
//!
//! Walks the section hierarchy the way the testbench reads it and compares every seek marker with
//! the offset it should hold. Used by `tbforge verify` and by the resolver tests.

use crate::error::{GenResult, GenerateError};
use crate::line::{offsets, Level, Line, MarkerKind};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionEntry {
    pub offset: u64,
    pub packets: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VectorEntry {
    pub offset: u64,
    pub sections: Vec<SectionEntry>,
}

/// Seek table recovered from a verified data file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SectionIndex {
    pub vectors: Vec<VectorEntry>,
}

impl SectionIndex {
    pub fn parallel_section_count(&self) -> usize {
        self.vectors.iter().map(|v| v.sections.len()).sum()
    }
}

struct Cursor<'a> {
    lines: &'a [Line],
    offsets: Vec<u64>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn invalid(&self, reason: impl Into<String>) -> GenerateError {
        GenerateError::InvalidLine {
            line: self.pos + 1,
            reason: reason.into(),
        }
    }

    /// Consumes a `<level> <kind> <n>` marker and returns its line index and value.
    fn expect(&mut self, level: Level, kind: MarkerKind) -> GenResult<(usize, u64)> {
        let line = self
            .lines
            .get(self.pos)
            .ok_or_else(|| self.invalid(format!("expected {} {}, found end of file", level, kind.as_str())))?;
        if !line.is_marker(level, kind) {
            return Err(self.invalid(format!(
                "expected {} {}, found '{}'",
                level,
                kind.as_str(),
                line
            )));
        }
        let value = line.marker_value().unwrap_or(0);
        self.pos += 1;
        Ok((self.pos - 1, value))
    }

    fn check_seek(&self, seek_line: usize, level: Level, target: usize) -> GenResult<()> {
        let found = self.lines[seek_line].marker_value().unwrap_or(0);
        let expected = self.offsets[target];
        if found != expected {
            return Err(GenerateError::SeekMismatch {
                level,
                line: seek_line + 1,
                expected,
                found,
            });
        }
        Ok(())
    }
}

/// Checks the layout and every seek of `lines`, returning the recovered seek table.
pub fn verify_seeks(lines: &[Line]) -> GenResult<SectionIndex> {
    let mut cursor = Cursor {
        lines,
        offsets: offsets(lines),
        pos: 0,
    };

    let (_, vector_count) = cursor.expect(Level::TestVector, MarkerKind::Count)?;
    let mut vector_seeks = Vec::new();
    for _ in 0..vector_count {
        vector_seeks.push(cursor.expect(Level::TestVector, MarkerKind::Seek)?.0);
    }

    let mut index = SectionIndex::default();
    for vector_seek in vector_seeks {
        let (opening, section_count) = cursor.expect(Level::ParallelSection, MarkerKind::Count)?;
        cursor.check_seek(vector_seek, Level::TestVector, opening)?;

        let mut section_seeks = Vec::new();
        for _ in 0..section_count {
            section_seeks.push(cursor.expect(Level::ParallelSection, MarkerKind::Seek)?.0);
        }

        let mut sections = Vec::new();
        for section_seek in section_seeks {
            let (packet_line, packets) = cursor.expect(Level::Packet, MarkerKind::Count)?;
            cursor.check_seek(section_seek, Level::ParallelSection, packet_line)?;
            for _ in 0..packets {
                match lines.get(cursor.pos) {
                    Some(line) if line.is_data() => cursor.pos += 1,
                    Some(line) => {
                        return Err(cursor.invalid(format!("expected a data line, found '{}'", line)))
                    }
                    None => return Err(cursor.invalid("expected a data line, found end of file")),
                }
            }
            sections.push(SectionEntry {
                offset: cursor.offsets[packet_line],
                packets: packets as usize,
            });
        }
        index.vectors.push(VectorEntry {
            offset: cursor.offsets[opening],
            sections,
        });
    }

    if cursor.pos != lines.len() {
        return Err(cursor.invalid("trailing lines after the last section"));
    }
    Ok(index)
}
