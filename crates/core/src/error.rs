// TBForge - Testbench Data Generator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::line::Level;
use tbforge_ir::IrError;

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// A seek marker whose section (or closing count marker) cannot be found in the line list.
    #[error("Malformed {level} section: seek marker #{index} has no matching section")]
    MalformedSection { level: Level, index: usize },
    #[error("Seek resolution did not converge after {0} iterations")]
    NonConvergence(usize),
    #[error("Unknown interface type '{0}'")]
    UnknownInterfaceType(String),
    #[error("Interface '{interface}' counted {counted} lines but rendered {rendered}")]
    PluginCountMismatch {
        interface: String,
        counted: usize,
        rendered: usize,
    },
    /// A beat leaves out an argument the protocol has no default for.
    #[error("Interface '{interface}' beat {beat} is missing payload field '{field}'")]
    MissingPayloadField {
        interface: String,
        beat: usize,
        field: String,
    },
    #[error("Interface '{interface}' has no payload field '{field}'")]
    UnknownPayloadField { interface: String, field: String },
    #[error("Invalid data file at line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },
    #[error("{level} seek at line {line} holds {found}, expected {expected}")]
    SeekMismatch {
        level: Level,
        line: usize,
        expected: u64,
        found: u64,
    },
    #[error(transparent)]
    Ir(#[from] IrError),
}

pub type GenResult<T> = Result<T, GenerateError>;
