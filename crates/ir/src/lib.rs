//! TBForge Command Model
//!
//! This crate defines the portable, serializable description of a testbench used throughout
//! TBForge. It is the common language between:
//!
//! 1. **Front-ends**: the YAML/JSON loader in `tbforge-config` and the fluent builder API below.
//! 2. **The Flattener**: which walks vectors, threads and commands in a fixed order and turns
//!    them into data-file lines.
//! 3. **The Codegen backends**: which read metadata, DUT ports and wait conditions.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

mod testbench;

pub use testbench::{
    Clock, Direction, Dut, Header, HeaderMode, InterfacePort, Metadata, Port, TestVector,
    Testbench, Thread, TimeFormat, WaitCondition,
};

/// Errors raised while building or validating a Command Model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IrError {
    /// The interface type name does not match any known protocol.
    #[error("Unknown interface type '{0}'")]
    UnknownInterfaceType(String),
    /// A duration string could not be parsed (expected e.g. `40ns`).
    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),
    /// A numeric wait key referenced a condition that has not been assigned yet.
    #[error("Wait key '{key}' does not reference a previously declared condition")]
    InvalidWaitKey {
        /// The offending key.
        key: String,
    },
    /// `EndVector` was followed by a command other than a timestamp.
    #[error("EndVector is not the last command of vector {vector}, thread {thread}")]
    EndVectorNotLast {
        /// Index of the vector.
        vector: usize,
        /// Index of the thread inside the vector.
        thread: usize,
    },
    /// For sequential simulation the thread holding `EndVector` must be the vector's last thread.
    #[error("EndVector of vector {vector} must be in the last thread for sequential simulation")]
    EndVectorThreadNotLast {
        /// Index of the vector.
        vector: usize,
    },
    /// More than one `EndVector` in a single vector.
    #[error("Vector {vector} contains more than one EndVector")]
    MultipleEndVector {
        /// Index of the vector.
        vector: usize,
    },
    /// A value written as one data-file token is empty or contains whitespace or a quote.
    #[error("Invalid {field} {value:?}: data-file tokens must be non-empty without whitespace or quotes")]
    InvalidToken {
        /// What the value names (`signal`, `display text`, ...).
        field: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Checks that `value` can be written as a single whitespace-delimited data-file token.
///
/// The SystemVerilog testbench reads every line with `%s` conversions, so a space or newline
/// inside a name or message would shift every following column.
pub fn check_token(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '"') {
        return Err(IrError::InvalidToken {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Result type for Command Model operations.
pub type Result<T> = std::result::Result<T, IrError>;

/// Unit of a simulation delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Femtoseconds.
    Fs,
    /// Picoseconds.
    Ps,
    /// Nanoseconds.
    Ns,
    /// Microseconds.
    Us,
    /// Milliseconds.
    Ms,
    /// Seconds.
    S,
}

impl TimeUnit {
    /// The suffix used in duration strings and in the data file.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Fs => "fs",
            TimeUnit::Ps => "ps",
            TimeUnit::Ns => "ns",
            TimeUnit::Us => "us",
            TimeUnit::Ms => "ms",
            TimeUnit::S => "s",
        }
    }

    /// Power of ten of this unit relative to one second (e.g. `-9` for `ns`).
    pub fn exponent(&self) -> i32 {
        match self {
            TimeUnit::Fs => -15,
            TimeUnit::Ps => -12,
            TimeUnit::Ns => -9,
            TimeUnit::Us => -6,
            TimeUnit::Ms => -3,
            TimeUnit::S => 0,
        }
    }
}

/// A delay such as `40ns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    /// Magnitude in `unit`s.
    pub value: u64,
    /// Unit of the magnitude.
    pub unit: TimeUnit,
}

impl Duration {
    /// Creates a new duration.
    pub fn new(value: u64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }
}

impl FromStr for Duration {
    type Err = IrError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| IrError::InvalidDuration(s.to_string()))?;
        let (digits, suffix) = trimmed.split_at(split);
        let value = digits
            .parse::<u64>()
            .map_err(|_| IrError::InvalidDuration(s.to_string()))?;
        let unit = match suffix.trim() {
            "fs" => TimeUnit::Fs,
            "ps" => TimeUnit::Ps,
            "ns" => TimeUnit::Ns,
            "us" => TimeUnit::Us,
            "ms" => TimeUnit::Ms,
            "s" => TimeUnit::S,
            _ => return Err(IrError::InvalidDuration(s.to_string())),
        };
        Ok(Self { value, unit })
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.as_str())
    }
}

/// Whether a flag command sets or clears its flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagAction {
    /// Set the flag to 1.
    Set,
    /// Clear the flag to 0.
    Clear,
}

impl FlagAction {
    /// Token used in the data file.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagAction::Set => "set",
            FlagAction::Clear => "clear",
        }
    }
}

/// The bus protocols TBForge knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    /// AXI4-Stream.
    #[serde(alias = "axis")]
    Axi4Stream,
    /// AXI4-Lite, DUT side is the slave.
    #[serde(alias = "s_axilite")]
    Axi4LiteSlave,
}

impl InterfaceType {
    /// Canonical name, as written in data-file lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceType::Axi4Stream => "axi4_stream",
            InterfaceType::Axi4LiteSlave => "axi4_lite_slave",
        }
    }

    /// Every payload field a beat of this protocol may carry.
    pub fn payload_fields(&self) -> &'static [&'static str] {
        match self {
            InterfaceType::Axi4Stream => &["tdata", "tlast", "tkeep", "tdest"],
            InterfaceType::Axi4LiteSlave => &["addr", "data", "mode"],
        }
    }
}

impl FromStr for InterfaceType {
    type Err = IrError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "axi4_stream" | "axis" => Ok(InterfaceType::Axi4Stream),
            "axi4_lite_slave" | "s_axilite" => Ok(InterfaceType::Axi4LiteSlave),
            other => Err(IrError::UnknownInterfaceType(other.to_string())),
        }
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One beat of an interface transaction: field name to value (e.g. `tdata`, `tlast`).
pub type PayloadEntry = BTreeMap<String, u64>;

/// A protocol-level transaction on one DUT interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceTransaction {
    /// Instance name of the interface on the DUT (e.g. `s_axis`).
    pub interface_name: String,

    /// Protocol of the interface.
    pub interface_type: InterfaceType,

    /// Native stream class used by C++ testbenches, if any.
    #[serde(default)]
    pub stream_class: Option<String>,

    /// Ordered beats of the transaction.
    pub payload: Vec<PayloadEntry>,
}

impl InterfaceTransaction {
    /// Creates an empty transaction on the named interface.
    pub fn new(interface_name: impl Into<String>, interface_type: InterfaceType) -> Self {
        Self {
            interface_name: interface_name.into(),
            interface_type,
            stream_class: None,
            payload: Vec::new(),
        }
    }

    /// Appends one beat.
    pub fn with_beat<I, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        self.payload
            .push(fields.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }
}

/// One user-level action in a [`Thread`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Wait for a fixed amount of simulation time.
    Delay(Duration),
    /// Drive a DUT signal.
    SetSignal {
        /// Signal name.
        name: String,
        /// Value to drive.
        value: u64,
    },
    /// Drive every exerciser-owned signal to zero.
    InitSignals,
    /// Block until a condition holds. `key` is either `flag` or a wait-condition key.
    Wait {
        /// Condition key.
        key: String,
        /// Argument of the condition, if any.
        value: Option<u64>,
    },
    /// Set or clear a synchronisation flag.
    Flag {
        /// Set or clear.
        action: FlagAction,
        /// Flag index.
        id: u64,
    },
    /// Print a string to the simulator console.
    Display(String),
    /// Print or record the simulation time with a label.
    Timestamp(String),
    /// Call the DUT function a number of times (C++ testbenches only).
    CallDut(u64),
    /// Ends the current TestVector.
    EndVector,
    /// A transaction on a DUT interface.
    Interface(InterfaceTransaction),
}
