// TBForge - Testbench Data Generator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Seek table resolution.
//!
//! Every `TestVector seek` and `ParallelSection seek` marker must hold the byte offset of the
//! count line that opens its section, so the testbench can `$fseek` straight to it. Writing an
//! offset can add digits to the marker, which shifts every later offset, so the passes repeat
//! until a full round leaves every value unchanged.

use crate::error::{GenResult, GenerateError};
use crate::line::{Level, Line, MarkerKind};

/// Upper bound on outer iterations. Offsets only grow and each round can add at most one digit to
/// a marker, so well-formed input settles in a handful of rounds.
pub const MAX_RESOLVE_ITERATIONS: usize = 32;

/// Resolves one level of seek markers.
///
/// For each of the `repeat_count` markers at `seek_level`, the whole list is rescanned from the
/// start. Count markers at `update_level` (the parent level) are accumulated so that, once the
/// target seek marker is found, the `count_level` markers that belong to earlier siblings of the
/// same parent can be skipped. Returns `true` if no marker changed.
pub fn calculate_seeks(
    lines: &mut [Line],
    repeat_count: usize,
    update_level: Option<Level>,
    seek_level: Level,
    count_level: Level,
) -> GenResult<bool> {
    let mut converged = true;

    for i in 0..repeat_count {
        let malformed = || GenerateError::MalformedSection {
            level: seek_level,
            index: i,
        };

        let mut offset = 0u64;
        let mut seeks_skipped = 0;
        let mut target = None;
        let mut counts_skipped = 0;
        let mut current_section_count = 0u64;
        let mut cumulative_section_count = 0u64;
        let mut resolved = None;

        for (index, line) in lines.iter().enumerate() {
            let start = offset;
            offset += line.byte_len() as u64 + 1;

            if let Some(update) = update_level {
                if line.is_marker(update, MarkerKind::Count) {
                    current_section_count = line.marker_value().unwrap_or(0);
                    cumulative_section_count += current_section_count;
                    continue;
                }
            }

            if target.is_none() {
                if line.is_marker(seek_level, MarkerKind::Seek) {
                    if seeks_skipped < i {
                        seeks_skipped += 1;
                    } else {
                        target = Some(index);
                    }
                }
                continue;
            }

            if line.is_marker(count_level, MarkerKind::Count) {
                // sections of earlier parents have already been consumed by earlier seeks
                let preceding = cumulative_section_count - current_section_count;
                let modulo = (i as u64).checked_sub(preceding).ok_or_else(malformed)?;
                if counts_skipped < modulo {
                    counts_skipped += 1;
                } else {
                    resolved = Some(start);
                    break;
                }
            }
        }

        let (Some(target), Some(value)) = (target, resolved) else {
            return Err(malformed());
        };
        if let Some(old) = lines[target].set_seek(value) {
            if old != value {
                converged = false;
            }
        }
    }

    Ok(converged)
}

/// Rewrites every seek marker in place until all offsets are stable. Returns the number of outer
/// iterations taken; an already-resolved list takes one.
pub fn resolve_seeks(lines: &mut [Line]) -> GenResult<usize> {
    let test_vector_count = count_markers(lines, Level::TestVector);
    let parallel_section_count = count_markers(lines, Level::ParallelSection);

    for iteration in 1..=MAX_RESOLVE_ITERATIONS {
        let vectors_converged = calculate_seeks(
            lines,
            test_vector_count,
            None,
            Level::TestVector,
            Level::ParallelSection,
        )?;
        let sections_converged = calculate_seeks(
            lines,
            parallel_section_count,
            Some(Level::ParallelSection),
            Level::ParallelSection,
            Level::Packet,
        )?;
        tracing::debug!(
            "Seek pass {}: vectors converged={}, sections converged={}",
            iteration,
            vectors_converged,
            sections_converged
        );
        if vectors_converged && sections_converged {
            return Ok(iteration);
        }
    }

    Err(GenerateError::NonConvergence(MAX_RESOLVE_ITERATIONS))
}

fn count_markers(lines: &[Line], level: Level) -> usize {
    lines
        .iter()
        .filter(|l| l.is_marker(level, MarkerKind::Seek))
        .count()
}
