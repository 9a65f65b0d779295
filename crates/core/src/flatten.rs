// TBForge - Testbench Data Generator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::error::{GenResult, GenerateError};
use crate::interfaces::InterfaceRegistry;
use crate::line::{Level, Line};
use serde::Serialize;
use tbforge_ir::{check_token, Command, Dut, Testbench};

#[derive(Debug, Clone, Default)]
pub struct FlattenOptions {
    /// Signals driven to zero by `InitSignals`, in order.
    pub init_signals: Vec<String>,
}

impl FlattenOptions {
    pub fn from_dut(dut: &Dut) -> Self {
        Self {
            init_signals: dut.init_signals(),
        }
    }
}

/// Rendered-line tallies for exactly one ParallelSection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SectionCounters {
    pub delays: usize,
    pub signals: usize,
    pub waits: usize,
    pub flags: usize,
    pub displays: usize,
    pub timestamps: usize,
    pub ends: usize,
    pub interface_lines: usize,
    /// Interface beats that exist only in the C data file.
    pub hidden_beats: usize,
}

impl SectionCounters {
    /// Number of data lines the section renders.
    pub fn total(&self) -> usize {
        self.delays
            + self.signals
            + self.waits
            + self.flags
            + self.displays
            + self.timestamps
            + self.ends
            + self.interface_lines
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionSummary {
    pub vector: usize,
    pub thread: usize,
    pub counted: bool,
    pub counters: SectionCounters,
}

#[derive(Debug, Clone)]
pub struct Flattened {
    pub lines: Vec<Line>,
    /// Number of counted TestVectors, i.e. `TestVector seek` markers.
    pub test_vector_count: usize,
    /// Number of counted ParallelSections across all vectors.
    pub parallel_section_count: usize,
    /// Largest number of counted ParallelSections in one vector.
    pub max_parallel: usize,
    pub sections: Vec<SectionSummary>,
}

pub struct Flattener<'a> {
    registry: &'a InterfaceRegistry,
    options: &'a FlattenOptions,
}

impl<'a> Flattener<'a> {
    pub fn new(registry: &'a InterfaceRegistry, options: &'a FlattenOptions) -> Self {
        Self { registry, options }
    }

    /// Number of lines `command` renders, without rendering it.
    pub fn line_count(&self, command: &Command) -> GenResult<usize> {
        Ok(match command {
            Command::InitSignals => self.options.init_signals.len(),
            Command::CallDut(_) => 0,
            Command::Interface(txn) => self.registry.lookup(txn.interface_type)?.count(txn),
            _ => 1,
        })
    }

    /// Appends the data lines of `command` to `out`.
    ///
    /// Names, labels and display text are checked to be single tokens, since a space or newline
    /// would split the line when the testbench reads it back.
    pub fn render(
        &self,
        command: &Command,
        vector: usize,
        counters: &mut SectionCounters,
        out: &mut Vec<Line>,
    ) -> GenResult<()> {
        match command {
            Command::Delay(d) => {
                counters.delays += 1;
                out.push(Line::data(format!("delay {} 1 {}", d.unit.as_str(), d.value)));
            }
            Command::SetSignal { name, value } => {
                check_token("signal", name)?;
                counters.signals += 1;
                out.push(Line::data(format!("signal {} 1 {}", name, value)));
            }
            Command::InitSignals => {
                for name in &self.options.init_signals {
                    check_token("signal", name)?;
                    counters.signals += 1;
                    out.push(Line::data(format!("signal {} 1 0", name)));
                }
            }
            Command::Wait { key, value } => {
                check_token("wait key", key)?;
                counters.waits += 1;
                out.push(Line::data(format!("wait {} 1 {}", key, value.unwrap_or(0))));
            }
            Command::Flag { action, id } => {
                counters.flags += 1;
                out.push(Line::data(format!("flag {} 1 {}", action.as_str(), id)));
            }
            Command::Display(text) => {
                check_token("display text", text)?;
                counters.displays += 1;
                out.push(Line::data(format!("display \"{}\" 1 0", text)));
            }
            Command::Timestamp(label) => {
                check_token("timestamp label", label)?;
                counters.timestamps += 1;
                out.push(Line::data(format!("timestamp {} 1 0", label)));
            }
            Command::EndVector => {
                counters.ends += 1;
                out.push(Line::data(format!("end Vector_{} 1 0", vector)));
            }
            Command::CallDut(_) => {}
            Command::Interface(txn) => {
                check_token("interface name", &txn.interface_name)?;
                let plugin = self.registry.lookup(txn.interface_type)?;
                let counted = plugin.count(txn);
                let rendered = plugin.sv_lines(txn)?;
                if rendered.len() != counted {
                    return Err(GenerateError::PluginCountMismatch {
                        interface: txn.interface_name.clone(),
                        counted,
                        rendered: rendered.len(),
                    });
                }
                counters.interface_lines += counted;
                counters.hidden_beats += txn.payload.len().saturating_sub(counted);
                out.extend(rendered.into_iter().map(Line::data));
            }
        }
        Ok(())
    }

    pub fn flatten(&self, testbench: &Testbench) -> GenResult<Flattened> {
        let mut sections = Vec::new();
        // rendered threads of every counted vector
        let mut blocks: Vec<Vec<Vec<Line>>> = Vec::new();

        for (v, vector) in testbench.vectors.iter().enumerate() {
            let mut threads = Vec::new();
            for (t, thread) in vector.threads.iter().enumerate() {
                let mut expected = 0;
                for command in thread.commands() {
                    expected += self.line_count(command)?;
                }

                let mut counters = SectionCounters::default();
                let mut data = Vec::with_capacity(expected);
                for command in thread.commands() {
                    self.render(command, v, &mut counters, &mut data)?;
                }
                debug_assert_eq!(data.len(), expected);
                debug_assert_eq!(data.len(), counters.total());

                let counted = !data.is_empty();
                sections.push(SectionSummary {
                    vector: v,
                    thread: t,
                    counted,
                    counters,
                });
                if counted {
                    threads.push(data);
                } else {
                    tracing::debug!("Vector {} thread {} renders no lines; not counted", v, t);
                }
            }
            if !threads.is_empty() {
                blocks.push(threads);
            }
        }

        let test_vector_count = blocks.len();
        let parallel_section_count: usize = blocks.iter().map(Vec::len).sum();
        let max_parallel = blocks.iter().map(Vec::len).max().unwrap_or(0);

        let mut lines = Vec::new();
        lines.push(Line::count(Level::TestVector, test_vector_count as u64));
        lines.extend((0..test_vector_count).map(|_| Line::seek(Level::TestVector)));
        for threads in blocks {
            lines.push(Line::count(Level::ParallelSection, threads.len() as u64));
            lines.extend(threads.iter().map(|_| Line::seek(Level::ParallelSection)));
            for data in threads {
                lines.push(Line::count(Level::Packet, data.len() as u64));
                lines.extend(data);
            }
        }

        tracing::debug!(
            "Flattened {} vectors, {} parallel sections into {} lines",
            test_vector_count,
            parallel_section_count,
            lines.len()
        );

        Ok(Flattened {
            lines,
            test_vector_count,
            parallel_section_count,
            max_parallel,
            sections,
        })
    }
}

/// Flattens `testbench` with `InitSignals` expanded from its own DUT description.
pub fn flatten(testbench: &Testbench, registry: &InterfaceRegistry) -> GenResult<Flattened> {
    let options = FlattenOptions::from_dut(&testbench.dut);
    Flattener::new(registry, &options).flatten(testbench)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::MarkerKind;
    use tbforge_ir::{Duration, InterfaceTransaction, InterfaceType, IrError, TestVector, Thread};

    fn seek_count(lines: &[Line], level: Level) -> usize {
        lines
            .iter()
            .filter(|l| l.is_marker(level, MarkerKind::Seek))
            .count()
    }

    #[test]
    fn test_single_thread_renders_three_lines() {
        let mut tb = Testbench::new("dut");
        let mut vector = TestVector::new();
        vector
            .add_thread()
            .add_delay("10ns".parse().unwrap())
            .set_signal("rst", 1)
            .end_vector();
        tb.add_test_vector(vector);

        let flat = flatten(&tb, &InterfaceRegistry::builtin()).unwrap();
        let text: Vec<String> = flat.lines.iter().map(|l| l.to_string()).collect();
        assert_eq!(
            text,
            vec![
                "TestVector count 1",
                "TestVector seek 0",
                "ParallelSection count 1",
                "ParallelSection seek 0",
                "Packet count 3",
                "delay ns 1 10",
                "signal rst 1 1",
                "end Vector_0 1 0",
            ]
        );
        assert_eq!(flat.sections[0].counters.total(), 3);
        assert_eq!(flat.sections[0].counters.ends, 1);
    }

    #[test]
    fn test_uncounted_thread_and_vector_are_skipped() {
        let registry = InterfaceRegistry::builtin();
        let mut tb = Testbench::new("dut");

        // vector 0: only a call_dut and an all-hidden AXIS write
        let mut empty = TestVector::new();
        empty.add_thread().call_dut(2).transaction(
            InterfaceTransaction::new("s_axis", InterfaceType::Axi4Stream)
                .with_beat([("tdata", 5), ("tkeep", 0)]),
        );
        tb.add_test_vector(empty);

        let mut vector = TestVector::new();
        vector.add_thread().set_signal("a", 1);
        vector.add_thread();
        vector.add_thread().display("hi").set_flag(0);
        tb.add_test_vector(vector);

        let flat = flatten(&tb, &registry).unwrap();
        assert_eq!(flat.test_vector_count, 1);
        assert_eq!(flat.parallel_section_count, 2);
        assert_eq!(flat.max_parallel, 2);
        assert_eq!(seek_count(&flat.lines, Level::TestVector), 1);
        assert_eq!(seek_count(&flat.lines, Level::ParallelSection), 2);
        assert_eq!(seek_count(&flat.lines, Level::Packet), 0);
        assert_eq!(flat.sections.len(), 4);
        assert!(!flat.sections[0].counted);
        assert_eq!(flat.sections[0].counters.hidden_beats, 1);
        assert!(!flat.sections[2].counted);
        assert_eq!(flat.lines[0].to_string(), "TestVector count 1");
    }

    #[test]
    fn test_init_signals_expansion() {
        let options = FlattenOptions {
            init_signals: vec!["a".into(), "rst".into()],
        };
        let registry = InterfaceRegistry::builtin();
        let flattener = Flattener::new(&registry, &options);
        let mut out = Vec::new();
        let mut counters = SectionCounters::default();
        flattener
            .render(&Command::InitSignals, 0, &mut counters, &mut out)
            .unwrap();
        assert_eq!(flattener.line_count(&Command::InitSignals).unwrap(), 2);
        assert_eq!(out, vec![Line::data("signal a 1 0"), Line::data("signal rst 1 0")]);
        assert_eq!(counters.signals, 2);
    }

    #[test]
    fn test_templates() {
        let registry = InterfaceRegistry::builtin();
        let options = FlattenOptions::default();
        let flattener = Flattener::new(&registry, &options);
        let mut thread = Thread::new();
        thread
            .add_delay(Duration::new(3, tbforge_ir::TimeUnit::Us))
            .wait_flag(2)
            .wait("0", Some(7))
            .display("phase_two")
            .print_time()
            .end_vector();

        let mut out = Vec::new();
        let mut counters = SectionCounters::default();
        for command in thread.commands() {
            flattener.render(command, 4, &mut counters, &mut out).unwrap();
        }
        let text: Vec<String> = out.iter().map(|l| l.to_string()).collect();
        assert_eq!(
            text,
            vec![
                "delay us 1 3",
                "wait flag 1 2",
                "flag clear 1 2",
                "wait 0 1 7",
                "display \"phase_two\" 1 0",
                "timestamp PRINT 1 0",
                "end Vector_4 1 0",
            ]
        );
    }

    #[test]
    fn test_unregistered_interface() {
        let registry = InterfaceRegistry::new();
        let mut tb = Testbench::new("dut");
        let mut vector = TestVector::new();
        vector.add_thread().transaction(
            InterfaceTransaction::new("ctrl", InterfaceType::Axi4LiteSlave)
                .with_beat([("addr", 0), ("data", 1)]),
        );
        tb.add_test_vector(vector);
        assert!(matches!(
            flatten(&tb, &registry),
            Err(GenerateError::UnknownInterfaceType(_))
        ));
    }

    #[test]
    fn test_multiline_display_rejected() {
        let mut tb = Testbench::new("dut");
        let mut vector = TestVector::new();
        vector.add_thread().display("two\nlines").set_signal("a", 1);
        tb.add_test_vector(vector);
        assert!(matches!(
            flatten(&tb, &InterfaceRegistry::builtin()),
            Err(GenerateError::Ir(IrError::InvalidToken { field: "display text", .. }))
        ));
    }

    #[test]
    fn test_whitespace_in_tokens_rejected() {
        let registry = InterfaceRegistry::builtin();
        let options = FlattenOptions::default();
        let flattener = Flattener::new(&registry, &options);
        let commands = [
            Command::Timestamp("phase 1".to_string()),
            Command::SetSignal {
                name: "rst n".to_string(),
                value: 1,
            },
            Command::Wait {
                key: "@(posedge clk);".to_string(),
                value: None,
            },
            Command::Display("\"quoted\"".to_string()),
        ];
        for command in &commands {
            let mut out = Vec::new();
            let mut counters = SectionCounters::default();
            let result = flattener.render(command, 0, &mut counters, &mut out);
            assert!(
                matches!(result, Err(GenerateError::Ir(IrError::InvalidToken { .. }))),
                "{:?}",
                command
            );
            assert!(out.is_empty());
        }
    }

    #[test]
    fn test_payload_errors_propagate() {
        let mut tb = Testbench::new("dut");
        let mut vector = TestVector::new();
        vector.add_thread().transaction(
            InterfaceTransaction::new("ctrl", InterfaceType::Axi4LiteSlave)
                .with_beat([("addr", 16), ("data", 7), ("mode", 1)])
                .with_beat([("addr", 20), ("mode", 1)]),
        );
        tb.add_test_vector(vector);
        assert!(matches!(
            flatten(&tb, &InterfaceRegistry::builtin()),
            Err(GenerateError::MissingPayloadField { beat: 1, .. })
        ));
    }
}
