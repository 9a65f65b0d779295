// TBForge - Testbench Data Generator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tbforge_ir::{
    Clock, Command, Direction, Duration, Dut, FlagAction, Header, InterfacePort,
    InterfaceTransaction, InterfaceType, Metadata, PayloadEntry, Port, TestVector, Testbench,
    Thread, TimeFormat, WaitCondition,
};

/// Default schema version for testbench descriptions
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_direction() -> Direction {
    Direction::Input
}

fn default_signal_size() -> u32 {
    1
}

fn default_interface_width() -> u32 {
    32
}

/// An integer written either as a number or as a `0x` / `0b` / decimal string.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum NumberLiteral {
    Int(u64),
    Str(String),
}

impl NumberLiteral {
    pub fn value(&self) -> Result<u64> {
        match self {
            NumberLiteral::Int(v) => Ok(*v),
            NumberLiteral::Str(s) => parse_number(s),
        }
    }
}

pub fn parse_number(text: &str) -> Result<u64> {
    let s = text.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        u64::from_str_radix(bin, 2)
    } else {
        s.parse::<u64>()
    };
    parsed.with_context(|| format!("Invalid number literal '{}'", text))
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MetadataDescription {
    pub module_name: String,
    #[serde(default)]
    pub timescale: Option<String>,
    #[serde(default)]
    pub time_format: Option<TimeFormat>,
    #[serde(default)]
    pub flag_count: Option<u32>,
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ClockDescription {
    pub name: String,
    pub period: String, // e.g. "20ns"
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SignalDescription {
    pub name: String,
    #[serde(default = "default_direction")]
    pub direction: Direction,
    #[serde(default = "default_signal_size")]
    pub size: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct InterfaceDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub interface_type: InterfaceType,
    #[serde(default = "default_interface_width")]
    pub width: u32,
    #[serde(default)]
    pub stream_class: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct DutDescription {
    #[serde(default)]
    pub clocks: Vec<ClockDescription>,
    #[serde(default)]
    pub resets: Vec<String>,
    #[serde(default)]
    pub signals: Vec<SignalDescription>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceDescription>,
}

impl DutDescription {
    fn to_dut(&self) -> Result<Dut> {
        let clocks = self
            .clocks
            .iter()
            .map(|c| {
                let period: Duration = c
                    .period
                    .parse()
                    .with_context(|| format!("Invalid period for clock '{}'", c.name))?;
                Ok::<_, anyhow::Error>(Clock {
                    name: c.name.clone(),
                    period,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Dut {
            clocks,
            resets: self.resets.clone(),
            signals: self
                .signals
                .iter()
                .map(|s| Port {
                    name: s.name.clone(),
                    direction: s.direction,
                    size: s.size,
                })
                .collect(),
            interfaces: self
                .interfaces
                .iter()
                .map(|i| InterfacePort {
                    name: i.name.clone(),
                    interface_type: i.interface_type,
                    width: i.width,
                    stream_class: i.stream_class.clone(),
                })
                .collect(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Macro {
    InitSignals,
    End,
    InitTimer,
    PrintTime,
}

/// `{start, end, body}`: `body` is repeated `end - start` times.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LoopSpec<T> {
    pub start: u64,
    pub end: u64,
    pub body: Vec<T>,
}

impl<T> LoopSpec<T> {
    fn iterations(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PayloadLoop {
    #[serde(rename = "loop")]
    pub spec: LoopSpec<PayloadItem>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum PayloadItem {
    Loop(PayloadLoop),
    Beat(BTreeMap<String, NumberLiteral>),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MacroCommand {
    #[serde(rename = "macro")]
    pub name: Macro,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DelayCommand {
    pub delay: String, // e.g. "40ns"
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SignalValue {
    pub name: String,
    pub value: NumberLiteral,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SignalCommand {
    pub signal: SignalValue,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct WaitSpec {
    pub key: String,
    #[serde(default)]
    pub value: Option<NumberLiteral>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct WaitCommand {
    pub wait: WaitSpec,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct WaitFlagCommand {
    pub wait_flag: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SetFlagCommand {
    pub set_flag: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ClearFlagCommand {
    pub clear_flag: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DisplayCommand {
    pub display: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TimestampCommand {
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CallDutCommand {
    pub call_dut: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TimestampPrefix {
    pub prefix: String,
    #[serde(default)]
    pub index: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EnableTimestampsCommand {
    pub enable_timestamps: TimestampPrefix,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DisableTimestampsCommand {
    pub disable_timestamps: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct InterfaceSpec {
    pub name: String,
    /// Only needed when the interface is not declared on the DUT.
    #[serde(default, rename = "type")]
    pub interface_type: Option<InterfaceType>,
    #[serde(default)]
    pub payload: Vec<PayloadItem>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct InterfaceCommand {
    pub interface: InterfaceSpec,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LoopCommand {
    #[serde(rename = "loop")]
    pub spec: LoopSpec<CommandDescription>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum CommandDescription {
    Macro(MacroCommand),
    Delay(DelayCommand),
    Signal(SignalCommand),
    Wait(WaitCommand),
    WaitFlag(WaitFlagCommand),
    SetFlag(SetFlagCommand),
    ClearFlag(ClearFlagCommand),
    Display(DisplayCommand),
    Timestamp(TimestampCommand),
    CallDut(CallDutCommand),
    EnableTimestamps(EnableTimestampsCommand),
    DisableTimestamps(DisableTimestampsCommand),
    Interface(InterfaceCommand),
    Loop(LoopCommand),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ThreadDescription {
    pub commands: Vec<CommandDescription>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct VectorDescription {
    pub threads: Vec<ThreadDescription>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestbenchDescription {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub metadata: MetadataDescription,
    #[serde(default)]
    pub dut: DutDescription,
    #[serde(default)]
    pub wait_conditions: Vec<WaitCondition>,
    pub vectors: Vec<VectorDescription>,
}

impl TestbenchDescription {
    /// Loads a description from YAML, or from JSON (comments allowed) for `.json` files.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read testbench description at {:?}", path))?;

        let desc = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&content)
                .with_context(|| format!("Failed to parse testbench JSON from {:?}", path))?
        } else {
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse testbench YAML from {:?}", path))?
        };
        desc.validate()?;
        Ok(desc)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse Testbench Description")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(&strip_comments(json)).context("Failed to parse Testbench Description")
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        let module = self.metadata.module_name.trim();
        if module.is_empty() {
            anyhow::bail!("Metadata 'module_name' cannot be empty");
        }
        if module.contains(char::is_whitespace) {
            anyhow::bail!("Metadata 'module_name' cannot contain whitespace: '{}'", module);
        }

        if self.vectors.is_empty() {
            anyhow::bail!("Testbench must contain at least one vector");
        }

        if self.metadata.flag_count == Some(0) {
            anyhow::bail!("Metadata 'flag_count' must be greater than zero");
        }

        let mut names: Vec<&str> = self.dut.interfaces.iter().map(|i| i.name.as_str()).collect();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            anyhow::bail!("Interface '{}' is declared more than once", dup[0]);
        }

        Ok(())
    }

    /// Expands loops, fills protocol defaults and finalises wait conditions.
    pub fn into_testbench(self) -> Result<Testbench> {
        let dut = self.dut.to_dut()?;

        let mut metadata = Metadata::new(self.metadata.module_name.trim());
        if let Some(timescale) = self.metadata.timescale {
            metadata.timescale = timescale;
        }
        if let Some(time_format) = self.metadata.time_format {
            metadata.time_format = time_format;
        }
        if let Some(flag_count) = self.metadata.flag_count {
            metadata.flag_count = flag_count;
        }
        if let Some(timeout) = self.metadata.timeout {
            metadata.timeout = timeout;
        }
        metadata.headers = self.metadata.headers;

        let mut tb = Testbench {
            metadata,
            dut,
            wait_conditions: self.wait_conditions,
            vectors: Vec::new(),
        };

        for (v, vector_desc) in self.vectors.iter().enumerate() {
            let mut vector = TestVector::new();
            for (t, thread_desc) in vector_desc.threads.iter().enumerate() {
                let thread = vector.add_thread();
                for command in &thread_desc.commands {
                    apply_command(thread, command, &tb.dut, &tb.metadata)
                        .with_context(|| format!("In vector {}, thread {}", v, t))?;
                }
            }
            tb.vectors.push(vector);
        }

        tb.finalize_waits()
            .context("Failed to assign wait condition keys")?;
        tracing::info!(
            "Loaded testbench '{}' with {} vectors",
            tb.metadata.module_name,
            tb.vectors.len()
        );
        Ok(tb)
    }
}

fn apply_command(
    thread: &mut Thread,
    command: &CommandDescription,
    dut: &Dut,
    metadata: &Metadata,
) -> Result<()> {
    match command {
        CommandDescription::Macro(m) => {
            match m.name {
                Macro::InitSignals => thread.init_signals(),
                Macro::End => thread.end_vector(),
                Macro::InitTimer => thread.init_timer(),
                Macro::PrintTime => thread.print_time(),
            };
        }
        CommandDescription::Delay(d) => {
            let delay: Duration = d.delay.parse()?;
            thread.add_delay(delay);
        }
        CommandDescription::Signal(s) => {
            let known = dut.signals.iter().any(|p| p.name == s.signal.name)
                || dut.resets.contains(&s.signal.name);
            if !known && !(dut.signals.is_empty() && dut.resets.is_empty()) {
                tracing::warn!("Signal '{}' is not declared on the DUT", s.signal.name);
            }
            thread.set_signal(s.signal.name.clone(), s.signal.value.value()?);
        }
        CommandDescription::Wait(w) => {
            let value = w.wait.value.as_ref().map(NumberLiteral::value).transpose()?;
            thread.wait(w.wait.key.clone(), value);
        }
        CommandDescription::WaitFlag(f) => {
            check_flag(f.wait_flag, metadata)?;
            thread.wait_flag(f.wait_flag);
        }
        CommandDescription::SetFlag(f) => {
            check_flag(f.set_flag, metadata)?;
            thread.set_flag(f.set_flag);
        }
        CommandDescription::ClearFlag(f) => {
            check_flag(f.clear_flag, metadata)?;
            thread.push(Command::Flag {
                action: FlagAction::Clear,
                id: f.clear_flag,
            });
        }
        CommandDescription::Display(d) => {
            thread.display(d.display.clone());
        }
        CommandDescription::Timestamp(t) => {
            thread.print_elapsed_time(t.timestamp.clone());
        }
        CommandDescription::CallDut(c) => {
            thread.call_dut(c.call_dut);
        }
        CommandDescription::EnableTimestamps(e) => {
            let prefix = &e.enable_timestamps;
            thread.enable_timestamps(prefix.prefix.clone(), prefix.index);
        }
        CommandDescription::DisableTimestamps(d) => {
            if d.disable_timestamps {
                thread.disable_timestamps();
            }
        }
        CommandDescription::Interface(i) => {
            thread.transaction(build_transaction(&i.interface, dut)?);
        }
        CommandDescription::Loop(l) => {
            for _ in 0..l.spec.iterations() {
                for inner in &l.spec.body {
                    apply_command(thread, inner, dut, metadata)?;
                }
            }
        }
    }
    Ok(())
}

fn check_flag(id: u64, metadata: &Metadata) -> Result<()> {
    if id >= u64::from(metadata.flag_count) {
        anyhow::bail!(
            "Flag {} is out of range; 'flag_count' is {}",
            id,
            metadata.flag_count
        );
    }
    Ok(())
}

fn build_transaction(spec: &InterfaceSpec, dut: &Dut) -> Result<InterfaceTransaction> {
    let port = match (dut.interface(&spec.name), spec.interface_type) {
        (Some(port), Some(kind)) if port.interface_type != kind => anyhow::bail!(
            "Interface '{}' is declared as {} but used as {}",
            spec.name,
            port.interface_type,
            kind
        ),
        (Some(port), _) => port.clone(),
        (None, Some(kind)) => InterfacePort {
            name: spec.name.clone(),
            interface_type: kind,
            width: default_interface_width(),
            stream_class: None,
        },
        (None, None) => anyhow::bail!(
            "Interface '{}' is not declared on the DUT and has no 'type'",
            spec.name
        ),
    };

    let mut payload = Vec::new();
    expand_payload(&spec.payload, &mut payload)?;

    if port.interface_type == InterfaceType::Axi4Stream {
        let keep = port.full_keep();
        for beat in &mut payload {
            beat.entry("tkeep".to_string()).or_insert(keep);
            beat.entry("tlast".to_string()).or_insert(0);
            beat.entry("tdest".to_string()).or_insert(0);
        }
    }

    let fields = port.interface_type.payload_fields();
    for (index, beat) in payload.iter().enumerate() {
        if let Some(unknown) = beat.keys().find(|k| !fields.iter().any(|f| *f == k.as_str())) {
            anyhow::bail!(
                "Interface '{}' ({}) has no payload field '{}'",
                port.name,
                port.interface_type,
                unknown
            );
        }
        if let Some(missing) = fields.iter().find(|f| !beat.contains_key(**f)) {
            anyhow::bail!(
                "Interface '{}' beat {} is missing payload field '{}'",
                port.name,
                index,
                missing
            );
        }
    }

    Ok(InterfaceTransaction {
        interface_name: port.name,
        interface_type: port.interface_type,
        stream_class: port.stream_class,
        payload,
    })
}

fn expand_payload(items: &[PayloadItem], out: &mut Vec<PayloadEntry>) -> Result<()> {
    for item in items {
        match item {
            PayloadItem::Beat(fields) => {
                let beat = fields
                    .iter()
                    .map(|(k, v)| {
                        let value = v
                            .value()
                            .with_context(|| format!("Invalid value for payload field '{}'", k))?;
                        Ok::<_, anyhow::Error>((k.clone(), value))
                    })
                    .collect::<Result<PayloadEntry>>()?;
                out.push(beat);
            }
            PayloadItem::Loop(l) => {
                for _ in 0..l.spec.iterations() {
                    expand_payload(&l.spec.body, out)?;
                }
            }
        }
    }
    Ok(())
}

/// Replaces `//` and `/* */` comments outside string literals with a single space.
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                out.push(c);
                while let Some(n) = chars.next() {
                    out.push(n);
                    if n == '\\' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    } else if n == c {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                while chars.peek().is_some_and(|n| *n != '\n') {
                    chars.next();
                }
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// How the input path given on the command line is resolved.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PathMode {
    /// Relative to the directory held in the environment variable named by the mode argument.
    Env,
    /// Relative to the directory given as the mode argument.
    Path,
    /// Used as-is; the mode argument is ignored.
    Absolute,
}

impl PathMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathMode::Env => "env",
            PathMode::Path => "path",
            PathMode::Absolute => "absolute",
        }
    }
}

impl fmt::Display for PathMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PathMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "env" => Ok(PathMode::Env),
            "path" => Ok(PathMode::Path),
            "absolute" => Ok(PathMode::Absolute),
            other => Err(format!(
                "unknown mode '{}' (expected env, path or absolute)",
                other
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InputPathError {
    #[error("Mode '{0}' requires a mode argument")]
    MissingModeArg(PathMode),
    #[error("Environment variable not found: {0}")]
    MissingEnv(String),
    #[error("Input file not found: {0:?}")]
    NotFound(PathBuf),
}

pub fn resolve_input_path(
    mode: PathMode,
    mode_arg: Option<&str>,
    filepath: &Path,
) -> std::result::Result<PathBuf, InputPathError> {
    let base = match mode {
        PathMode::Env => {
            let var = mode_arg.ok_or(InputPathError::MissingModeArg(mode))?;
            let dir = std::env::var(var).map_err(|_| InputPathError::MissingEnv(var.to_string()))?;
            Some(PathBuf::from(dir))
        }
        PathMode::Path => Some(PathBuf::from(
            mode_arg.ok_or(InputPathError::MissingModeArg(mode))?,
        )),
        PathMode::Absolute => None,
    };

    let path = match base {
        Some(base) => base.join(filepath.strip_prefix("/").unwrap_or(filepath)),
        None => filepath.to_path_buf(),
    };
    if !path.is_file() {
        return Err(InputPathError::NotFound(path));
    }
    tracing::debug!("Resolved input path ({}): {:?}", mode, path);
    Ok(path)
}

/// Resolves, loads and converts a testbench description.
pub fn load_testbench<P: AsRef<Path>>(path: P) -> Result<Testbench> {
    TestbenchDescription::from_file(path)?.into_testbench()
}
