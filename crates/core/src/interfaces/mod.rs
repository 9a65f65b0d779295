// TBForge - Testbench Data Generator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod axi4_lite;
pub mod axi4_stream;

use crate::error::{GenResult, GenerateError};
use std::collections::HashMap;
use tbforge_ir::{InterfaceTransaction, InterfaceType, PayloadEntry};

/// Protocol driver for one interface type.
///
/// `count` and `sv_lines` must agree for every transaction: the flattener writes `count` into the
/// `Packet count` marker and the testbench reads exactly that many lines back. Both default
/// implementations go through `is_visible`, so plugins only override the predicate.
///
/// Data lines are positional: the testbench assigns `args[n]` to the n-th entry of `sv_args`, so
/// every line carries all arguments. A beat may only leave out fields with a `default_value`.
pub trait InterfacePlugin: std::fmt::Debug + Send + Sync {
    fn interface_type(&self) -> InterfaceType;

    /// Payload fields written on SV data lines, in order.
    fn sv_args(&self) -> &'static [&'static str];

    /// Payload fields written on C data lines, in order.
    fn cpp_args(&self) -> &'static [&'static str];

    /// Value written when a beat omits `field`.
    fn default_value(&self, _field: &str) -> Option<u64> {
        None
    }

    /// Whether a beat produces an SV data line.
    fn is_visible(&self, _beat: &PayloadEntry) -> bool {
        true
    }

    /// Native identifier written in the third column of C data lines.
    fn cpp_identifier(&self, _txn: &InterfaceTransaction) -> String {
        "NULL".to_string()
    }

    /// Rejects beats carrying a field that neither data file writes.
    fn check_fields(&self, txn: &InterfaceTransaction) -> GenResult<()> {
        let known = |field: &str| {
            self.sv_args()
                .iter()
                .chain(self.cpp_args())
                .any(|arg| *arg == field)
        };
        for beat in &txn.payload {
            if let Some(field) = beat.keys().find(|field| !known(field.as_str())) {
                return Err(GenerateError::UnknownPayloadField {
                    interface: txn.interface_name.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    /// Number of SV data lines produced by `txn`.
    fn count(&self, txn: &InterfaceTransaction) -> usize {
        txn.payload.iter().filter(|beat| self.is_visible(beat)).count()
    }

    fn sv_lines(&self, txn: &InterfaceTransaction) -> GenResult<Vec<String>> {
        self.check_fields(txn)?;
        let mut lines = Vec::new();
        for (index, beat) in txn.payload.iter().enumerate() {
            if !self.is_visible(beat) {
                continue;
            }
            let args = beat_args(self, txn, index, self.sv_args())?;
            lines.push(format!(
                "{} {} {}",
                self.interface_type(),
                txn.interface_name,
                args
            ));
        }
        Ok(lines)
    }

    /// The SV data lines of `txn`, newline-joined.
    fn write_line(&self, txn: &InterfaceTransaction) -> GenResult<String> {
        Ok(self.sv_lines(txn)?.join("\n"))
    }

    /// C data lines. Every beat is written, including those hidden from the SV file.
    fn cpp_lines(&self, txn: &InterfaceTransaction) -> GenResult<Vec<String>> {
        self.check_fields(txn)?;
        let ident = self.cpp_identifier(txn);
        (0..txn.payload.len())
            .map(|index| {
                let args = beat_args(self, txn, index, self.cpp_args())?;
                Ok(format!("{} NULL {} {}", txn.interface_name, ident, args))
            })
            .collect()
    }
}

/// Renders `<argc> <arg>...` for beat `index` of `txn`. `argc` is always `fields.len()`.
fn beat_args<P: InterfacePlugin + ?Sized>(
    plugin: &P,
    txn: &InterfaceTransaction,
    index: usize,
    fields: &[&str],
) -> GenResult<String> {
    let beat = &txn.payload[index];
    let mut out = fields.len().to_string();
    for field in fields {
        let value = beat
            .get(*field)
            .copied()
            .or_else(|| plugin.default_value(field))
            .ok_or_else(|| GenerateError::MissingPayloadField {
                interface: txn.interface_name.clone(),
                beat: index,
                field: field.to_string(),
            })?;
        out.push(' ');
        out.push_str(&value.to_string());
    }
    Ok(out)
}

/// Plugins keyed by interface type. Built once before generation and read-only afterwards.
#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    plugins: HashMap<InterfaceType, Box<dyn InterfacePlugin>>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every protocol shipped with TBForge.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(axi4_stream::Axi4Stream));
        registry.register(Box::new(axi4_lite::Axi4LiteSlave));
        registry
    }

    /// Adds a plugin under its own interface type, returning any plugin it replaced.
    pub fn register(
        &mut self,
        plugin: Box<dyn InterfacePlugin>,
    ) -> Option<Box<dyn InterfacePlugin>> {
        let kind = plugin.interface_type();
        tracing::debug!("Registering interface plugin '{}'", kind);
        self.plugins.insert(kind, plugin)
    }

    pub fn lookup(&self, kind: InterfaceType) -> GenResult<&dyn InterfacePlugin> {
        self.plugins
            .get(&kind)
            .map(|p| p.as_ref())
            .ok_or_else(|| GenerateError::UnknownInterfaceType(kind.to_string()))
    }

    /// Looks a plugin up by its configuration name, aliases included.
    pub fn lookup_name(&self, name: &str) -> GenResult<&dyn InterfacePlugin> {
        let kind: InterfaceType = name
            .parse()
            .map_err(|_| GenerateError::UnknownInterfaceType(name.to_string()))?;
        self.lookup(kind)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup_by_name_and_alias() {
        let registry = InterfaceRegistry::builtin();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.lookup_name("axis").unwrap().interface_type(),
            InterfaceType::Axi4Stream
        );
        assert_eq!(
            registry.lookup_name("s_axilite").unwrap().interface_type(),
            InterfaceType::Axi4LiteSlave
        );
    }

    #[test]
    fn test_unknown_interface() {
        let registry = InterfaceRegistry::builtin();
        let err = registry.lookup_name("wishbone").unwrap_err();
        assert!(matches!(err, GenerateError::UnknownInterfaceType(ref n) if n == "wishbone"));

        let empty = InterfaceRegistry::new();
        assert!(empty.is_empty());
        assert!(matches!(
            empty.lookup(InterfaceType::Axi4Stream),
            Err(GenerateError::UnknownInterfaceType(_))
        ));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = InterfaceRegistry::builtin();
        let old = registry.register(Box::new(axi4_stream::Axi4Stream));
        assert!(old.is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_builtin_args_match_payload_vocabulary() {
        let registry = InterfaceRegistry::builtin();
        for kind in [InterfaceType::Axi4Stream, InterfaceType::Axi4LiteSlave] {
            let plugin = registry.lookup(kind).unwrap();
            let mut args: Vec<&str> = plugin
                .sv_args()
                .iter()
                .chain(plugin.cpp_args())
                .copied()
                .collect();
            args.sort_unstable();
            args.dedup();
            let mut fields = kind.payload_fields().to_vec();
            fields.sort_unstable();
            assert_eq!(args, fields, "{}", kind);
        }
    }
}
