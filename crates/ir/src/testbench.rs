use crate::{
    check_token, Command, Duration, FlagAction, InterfaceTransaction, InterfaceType, IrError, Result,
};
use serde::{Deserialize, Serialize};

/// Key used by waits on synchronisation flags.
const FLAG_WAIT_KEY: &str = "flag";

/// Time format printed by the testbench (`$timeformat`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFormat {
    /// Unit string, e.g. `1us`.
    pub unit: String,
    /// Number of fractional digits.
    pub precision: u32,
}

/// How a header file should be included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderMode {
    /// Pick by file extension.
    #[default]
    Auto,
    /// Always `#include`.
    Cpp,
    /// Always `` `include``.
    Sv,
}

/// A header file pulled into generated testbenches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Path of the header.
    pub file: String,
    /// Inclusion mode.
    #[serde(default)]
    pub mode: HeaderMode,
}

/// Global testbench attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Name of the DUT module; also the stem of every generated file.
    pub module_name: String,
    /// SystemVerilog timescale.
    pub timescale: String,
    /// Time format used when printing timestamps.
    pub time_format: TimeFormat,
    /// Number of synchronisation flags available to threads.
    pub flag_count: u32,
    /// Simulation timeout.
    pub timeout: String,
    /// Headers to include.
    pub headers: Vec<Header>,
}

impl Metadata {
    /// Default metadata for a module.
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            timescale: "1ns / 1ps".to_string(),
            time_format: TimeFormat {
                unit: "1us".to_string(),
                precision: 3,
            },
            flag_count: 1,
            timeout: "10s".to_string(),
            headers: Vec::new(),
        }
    }
}

/// Direction of a port, seen from the DUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Driven by the testbench.
    Input,
    /// Driven by the DUT.
    Output,
}

/// A plain DUT port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Port name.
    pub name: String,
    /// Direction.
    pub direction: Direction,
    /// Width in bits.
    pub size: u32,
}

/// A clock generated by the testbench.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    /// Clock port name.
    pub name: String,
    /// Clock period.
    pub period: Duration,
}

/// A bus interface on the DUT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfacePort {
    /// Instance name.
    pub name: String,
    /// Protocol.
    pub interface_type: InterfaceType,
    /// Data width in bits.
    pub width: u32,
    /// Native C++ stream class, if any.
    pub stream_class: Option<String>,
}

impl InterfacePort {
    /// `tkeep` with every byte lane of the data bus enabled.
    pub fn full_keep(&self) -> u64 {
        let lanes = self.width.div_ceil(8).min(64);
        if lanes == 64 {
            u64::MAX
        } else {
            (1u64 << lanes) - 1
        }
    }
}

/// The device under test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dut {
    /// Testbench-generated clocks.
    pub clocks: Vec<Clock>,
    /// Reset inputs.
    pub resets: Vec<String>,
    /// Plain signals.
    pub signals: Vec<Port>,
    /// Bus interfaces.
    pub interfaces: Vec<InterfacePort>,
}

impl Dut {
    /// Signals driven to zero by [`Command::InitSignals`]: input signals, then resets.
    pub fn init_signals(&self) -> Vec<String> {
        self.signals
            .iter()
            .filter(|s| s.direction == Direction::Input)
            .map(|s| s.name.clone())
            .chain(self.resets.iter().cloned())
            .collect()
    }

    /// Looks up an interface by instance name.
    pub fn interface(&self, name: &str) -> Option<&InterfacePort> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// Widest plain signal or interface data bus.
    pub fn max_signal_size(&self) -> u32 {
        self.signals
            .iter()
            .map(|s| s.size)
            .chain(self.interfaces.iter().map(|i| i.width))
            .max()
            .unwrap_or(1)
    }
}

/// A free-form wait condition mapped to the numeric key stored in the data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitCondition {
    /// SystemVerilog statement, e.g. `@(posedge ap_clk);`.
    pub condition: String,
    /// Key written in `wait` lines.
    pub key: String,
}

/// One serial thread of execution in a parallel test vector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    commands: Vec<Command>,
    #[serde(skip)]
    timestamps: Option<(String, u64)>,
}

impl Thread {
    /// Creates an empty thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a thread from a ready-made command list.
    pub fn from_commands(commands: Vec<Command>) -> Self {
        Self {
            commands,
            timestamps: None,
        }
    }

    /// Commands in program order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Appends an arbitrary command.
    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Adds a timed delay.
    pub fn add_delay(&mut self, delay: Duration) -> &mut Self {
        self.commands.push(Command::Delay(delay));
        self.auto_timestamp()
    }

    /// Drives a signal to a value.
    pub fn set_signal(&mut self, name: impl Into<String>, value: u64) -> &mut Self {
        self.commands.push(Command::SetSignal {
            name: name.into(),
            value,
        });
        self.auto_timestamp()
    }

    /// Drives every exerciser-owned signal to zero.
    pub fn init_signals(&mut self) -> &mut Self {
        self.commands.push(Command::InitSignals);
        self
    }

    /// Calls the DUT function `times` times (C++ only).
    pub fn call_dut(&mut self, times: u64) -> &mut Self {
        self.commands.push(Command::CallDut(times));
        self
    }

    /// Every following command (until disabled) prints a timestamp labelled `prefix` + index.
    pub fn enable_timestamps(&mut self, prefix: impl Into<String>, index: u64) -> &mut Self {
        let prefix = prefix.into();
        self.commands
            .push(Command::Timestamp(format!("{}{}", prefix, index)));
        self.timestamps = Some((prefix, index + 1));
        self
    }

    /// Stops automatic timestamps.
    pub fn disable_timestamps(&mut self) -> &mut Self {
        self.timestamps = None;
        self
    }

    /// Resets the timer used by elapsed-time timestamps.
    pub fn init_timer(&mut self) -> &mut Self {
        self.commands.push(Command::Timestamp("INIT".to_string()));
        self
    }

    /// Prints the time elapsed since [`Thread::init_timer`].
    pub fn print_elapsed_time(&mut self, id: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Timestamp(id.into()));
        self
    }

    /// Prints the absolute simulation time.
    pub fn print_time(&mut self) -> &mut Self {
        self.commands.push(Command::Timestamp("PRINT".to_string()));
        self
    }

    /// Prints a single word. Text with whitespace or quotes is rejected by [`Testbench::validate`].
    pub fn display(&mut self, text: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Display(text.into()));
        self
    }

    /// Ends the TestVector. Must be the last chronological event of the vector.
    pub fn end_vector(&mut self) -> &mut Self {
        self.commands.push(Command::EndVector);
        self.auto_timestamp()
    }

    /// Sets a synchronisation flag.
    pub fn set_flag(&mut self, id: u64) -> &mut Self {
        self.commands.push(Command::Flag {
            action: FlagAction::Set,
            id,
        });
        self.auto_timestamp()
    }

    /// Waits for a flag to be set, then clears it.
    pub fn wait_flag(&mut self, id: u64) -> &mut Self {
        self.commands.push(Command::Wait {
            key: FLAG_WAIT_KEY.to_string(),
            value: Some(id),
        });
        self.auto_timestamp();
        self.commands.push(Command::Flag {
            action: FlagAction::Clear,
            id,
        });
        self
    }

    /// Waits on a free-form SystemVerilog condition.
    pub fn wait(&mut self, condition: impl Into<String>, value: Option<u64>) -> &mut Self {
        self.commands.push(Command::Wait {
            key: condition.into(),
            value,
        });
        self.auto_timestamp()
    }

    /// Adds an interface transaction.
    pub fn transaction(&mut self, transaction: InterfaceTransaction) -> &mut Self {
        self.commands.push(Command::Interface(transaction));
        self.auto_timestamp()
    }

    fn auto_timestamp(&mut self) -> &mut Self {
        if let Some((prefix, index)) = self.timestamps.as_mut() {
            self.commands
                .push(Command::Timestamp(format!("{}{}", prefix, index)));
            *index += 1;
        }
        self
    }
}

/// Concurrent threads run to completion before the next vector starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVector {
    /// Threads of this vector.
    pub threads: Vec<Thread>,
}

impl TestVector {
    /// Creates an empty vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an existing thread.
    pub fn push_thread(&mut self, thread: Thread) -> &mut Self {
        self.threads.push(thread);
        self
    }

    /// Adds an empty thread and returns it for building.
    pub fn add_thread(&mut self) -> &mut Thread {
        self.threads.push(Thread::new());
        let last = self.threads.len() - 1;
        &mut self.threads[last]
    }
}

/// The complete testbench: metadata, DUT, wait conditions and vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Testbench {
    /// Global attributes.
    pub metadata: Metadata,
    /// Device under test.
    pub dut: Dut,
    /// Condition table built by [`Testbench::finalize_waits`].
    pub wait_conditions: Vec<WaitCondition>,
    /// Test vectors in execution order.
    pub vectors: Vec<TestVector>,
}

impl Testbench {
    /// Creates an empty testbench with default metadata.
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            metadata: Metadata::new(module_name),
            dut: Dut::default(),
            wait_conditions: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Appends a test vector.
    pub fn add_test_vector(&mut self, vector: TestVector) -> &mut Self {
        self.vectors.push(vector);
        self
    }

    /// Rewrites free-form wait conditions into numeric keys.
    ///
    /// Conditions are numbered in first-seen order across all vectors and threads. A key that is
    /// already numeric must reference a condition assigned earlier. Waits on flags keep the
    /// `flag` key and add the flag condition to the table once. Calling this twice is a no-op.
    pub fn finalize_waits(&mut self) -> Result<()> {
        let mut table: Vec<WaitCondition> = self
            .wait_conditions
            .iter()
            .filter(|w| w.key != FLAG_WAIT_KEY)
            .cloned()
            .collect();
        let mut flag_present = false;

        for vector in &mut self.vectors {
            for thread in &mut vector.threads {
                for command in &mut thread.commands {
                    let Command::Wait { key, .. } = command else {
                        continue;
                    };
                    if key.as_str() == FLAG_WAIT_KEY {
                        flag_present = true;
                        continue;
                    }
                    if key.chars().all(|c| c.is_ascii_digit()) && !key.is_empty() {
                        let known = key
                            .parse::<usize>()
                            .map(|k| k < table.len())
                            .unwrap_or(false);
                        if !known {
                            return Err(IrError::InvalidWaitKey { key: key.clone() });
                        }
                        continue;
                    }
                    let new_key = match table.iter().find(|w| w.condition == *key) {
                        Some(existing) => existing.key.clone(),
                        None => {
                            let assigned = table.len().to_string();
                            table.push(WaitCondition {
                                condition: key.clone(),
                                key: assigned.clone(),
                            });
                            assigned
                        }
                    };
                    *key = new_key;
                }
            }
        }

        if flag_present {
            table.push(WaitCondition {
                condition: "wait(flags[args[0]]);".to_string(),
                key: FLAG_WAIT_KEY.to_string(),
            });
        }
        self.wait_conditions = table;
        Ok(())
    }

    /// Checks the `EndVector` placement rules and every value written as a data-file token.
    ///
    /// Only timestamps may follow `EndVector` in its thread, a vector holds at most one, and when
    /// `sequential` is set its thread must be the last of the vector. Signal names, display text,
    /// timestamp labels and interface names must be single tokens (see [`check_token`]).
    pub fn validate(&self, sequential: bool) -> Result<()> {
        for (v, vector) in self.vectors.iter().enumerate() {
            let mut end_thread = None;
            for (t, thread) in vector.threads.iter().enumerate() {
                for command in &thread.commands {
                    check_command_tokens(command)?;
                }
                let Some(pos) = thread
                    .commands
                    .iter()
                    .position(|c| matches!(c, Command::EndVector))
                else {
                    continue;
                };
                if end_thread.is_some() {
                    return Err(IrError::MultipleEndVector { vector: v });
                }
                let trailing_ok = thread.commands[pos + 1..]
                    .iter()
                    .all(|c| matches!(c, Command::Timestamp(_)));
                if !trailing_ok {
                    return Err(IrError::EndVectorNotLast {
                        vector: v,
                        thread: t,
                    });
                }
                end_thread = Some(t);
            }
            if sequential {
                if let Some(t) = end_thread {
                    if t + 1 != vector.threads.len() {
                        return Err(IrError::EndVectorThreadNotLast { vector: v });
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_command_tokens(command: &Command) -> Result<()> {
    match command {
        Command::SetSignal { name, .. } => check_token("signal", name),
        Command::Display(text) => check_token("display text", text),
        Command::Timestamp(label) => check_token("timestamp label", label),
        Command::Interface(txn) => check_token("interface name", &txn.interface_name),
        _ => Ok(()),
    }
}
