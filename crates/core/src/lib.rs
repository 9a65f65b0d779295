// TBForge - Testbench Data Generator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod datafile;
pub mod error;
pub mod flatten;
pub mod interfaces;
pub mod line;
pub mod seek;
pub mod verify;


pub use datafile::{max_arg_num, CppDataFile, DataFileStats, SvDataFile};
pub use error::{GenResult, GenerateError};
pub use flatten::{flatten, FlattenOptions, Flattened, Flattener, SectionCounters, SectionSummary};
pub use interfaces::{InterfacePlugin, InterfaceRegistry};
pub use line::{Level, Line, MarkerKind};
pub use seek::{calculate_seeks, resolve_seeks};
pub use verify::{verify_seeks, SectionIndex};
