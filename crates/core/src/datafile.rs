// TBForge - Testbench Data Generator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::error::GenResult;
use crate::flatten::{FlattenOptions, Flattener, SectionSummary};
use crate::interfaces::InterfaceRegistry;
use crate::line::{render, split_tokens, Line};
use crate::seek::resolve_seeks;
use serde::Serialize;
use tbforge_ir::{check_token, Command, Testbench};

/// Token position of `<argc>` on C data lines (`<name> NULL <ident> <argc> ...`).
const CPP_ARGC_POSITION: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataFileStats {
    pub test_vector_count: usize,
    pub parallel_section_count: usize,
    pub max_parallel: usize,
    pub max_arg_num: usize,
    pub resolve_iterations: usize,
    pub line_count: usize,
    pub byte_len: usize,
}

/// Maximum `<argc>` over every data line. Markers are ignored.
pub fn max_arg_num(lines: &[Line]) -> usize {
    lines.iter().filter_map(Line::arg_count).max().unwrap_or(0)
}

/// The resolved, randomly seekable data file read by the SystemVerilog testbench.
#[derive(Debug, Clone)]
pub struct SvDataFile {
    pub lines: Vec<Line>,
    pub stats: DataFileStats,
    pub sections: Vec<SectionSummary>,
}

impl SvDataFile {
    pub fn build(testbench: &Testbench, registry: &InterfaceRegistry) -> GenResult<Self> {
        let options = FlattenOptions::from_dut(&testbench.dut);
        Self::build_with(testbench, registry, &options)
    }

    pub fn build_with(
        testbench: &Testbench,
        registry: &InterfaceRegistry,
        options: &FlattenOptions,
    ) -> GenResult<Self> {
        let flat = Flattener::new(registry, options).flatten(testbench)?;
        let mut lines = flat.lines;
        let resolve_iterations = resolve_seeks(&mut lines)?;

        let stats = DataFileStats {
            test_vector_count: flat.test_vector_count,
            parallel_section_count: flat.parallel_section_count,
            max_parallel: flat.max_parallel,
            max_arg_num: max_arg_num(&lines),
            resolve_iterations,
            line_count: lines.len(),
            byte_len: render(&lines).len(),
        };
        tracing::info!(
            "SV data file: {} vectors, {} sections, {} lines, resolved in {} passes",
            stats.test_vector_count,
            stats.parallel_section_count,
            stats.line_count,
            stats.resolve_iterations
        );

        Ok(Self {
            lines,
            stats,
            sections: flat.sections,
        })
    }

    pub fn render(&self) -> String {
        render(&self.lines)
    }
}

/// The sequential data file read by the C++ testbench. It has no seek table.
#[derive(Debug, Clone)]
pub struct CppDataFile {
    pub lines: Vec<String>,
    pub max_arg_num: usize,
}

impl CppDataFile {
    pub fn build(testbench: &Testbench, registry: &InterfaceRegistry) -> GenResult<Self> {
        let mut lines = Vec::new();
        for (v, vector) in testbench.vectors.iter().enumerate() {
            for thread in &vector.threads {
                for command in thread.commands() {
                    match command {
                        Command::Interface(txn) => {
                            let plugin = registry.lookup(txn.interface_type)?;
                            check_token("interface name", &txn.interface_name)?;
                            lines.extend(plugin.cpp_lines(txn)?);
                        }
                        Command::Display(text) => {
                            check_token("display text", text)?;
                            lines.push(format!("display \"{}\" NULL 1 0", text));
                        }
                        Command::CallDut(times) => {
                            lines.push(format!("call_dut NULL NULL 1 {}", times));
                        }
                        Command::Timestamp(label) => {
                            check_token("timestamp label", label)?;
                            lines.push(format!("timestamp {} NULL 1 0", label));
                        }
                        Command::EndVector => {
                            lines.push(format!("end Vector_{} NULL 1 0", v));
                        }
                        // no C++ counterpart
                        Command::Delay(_)
                        | Command::SetSignal { .. }
                        | Command::InitSignals
                        | Command::Wait { .. }
                        | Command::Flag { .. } => {}
                    }
                }
            }
        }
        lines.push("finish NULL NULL 0 0".to_string());

        let max_arg_num = lines
            .iter()
            .filter_map(|l| split_tokens(l).get(CPP_ARGC_POSITION)?.parse::<usize>().ok())
            .max()
            .unwrap_or(0);
        tracing::info!("C data file: {} lines", lines.len());

        Ok(Self { lines, max_arg_num })
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}
