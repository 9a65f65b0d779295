// TBForge - Testbench Data Generator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! AXI4-Stream master driven by the testbench.

use super::InterfacePlugin;
use tbforge_ir::{InterfaceTransaction, InterfaceType, PayloadEntry};

const ARGS: &[&str] = &["tdata", "tlast", "tkeep", "tdest"];

#[derive(Debug, Clone, Copy, Default)]
pub struct Axi4Stream;

impl InterfacePlugin for Axi4Stream {
    fn interface_type(&self) -> InterfaceType {
        InterfaceType::Axi4Stream
    }

    fn sv_args(&self) -> &'static [&'static str] {
        ARGS
    }

    fn cpp_args(&self) -> &'static [&'static str] {
        ARGS
    }

    // tkeep depends on the port width, so only the description loader can fill it in.
    fn default_value(&self, field: &str) -> Option<u64> {
        match field {
            "tlast" | "tdest" => Some(0),
            _ => None,
        }
    }

    // A beat with no byte lanes enabled only exists for the C model.
    fn is_visible(&self, beat: &PayloadEntry) -> bool {
        beat.get("tkeep").map_or(true, |keep| *keep != 0)
    }

    fn cpp_identifier(&self, txn: &InterfaceTransaction) -> String {
        txn.stream_class.clone().unwrap_or_else(|| "NULL".to_string())
    }
}
