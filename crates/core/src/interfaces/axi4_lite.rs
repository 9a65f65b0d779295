// TBForge - Testbench Data Generator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! AXI4-Lite slave port on the DUT; the testbench acts as master.

use super::InterfacePlugin;
use tbforge_ir::InterfaceType;

#[derive(Debug, Clone, Copy, Default)]
pub struct Axi4LiteSlave;

impl InterfacePlugin for Axi4LiteSlave {
    fn interface_type(&self) -> InterfaceType {
        InterfaceType::Axi4LiteSlave
    }

    fn sv_args(&self) -> &'static [&'static str] {
        &["addr", "data", "mode"]
    }

    fn cpp_args(&self) -> &'static [&'static str] {
        &["addr", "data"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerateError;
    use tbforge_ir::InterfaceTransaction;

    #[test]
    fn test_lines() {
        let txn = InterfaceTransaction::new("ctrl", InterfaceType::Axi4LiteSlave)
            .with_beat([("addr", 16), ("data", 7), ("mode", 1)])
            .with_beat([("addr", 20), ("data", 0), ("mode", 0)]);
        let plugin = Axi4LiteSlave;
        assert_eq!(plugin.count(&txn), 2);
        assert_eq!(
            plugin.sv_lines(&txn).unwrap(),
            vec!["axi4_lite_slave ctrl 3 16 7 1", "axi4_lite_slave ctrl 3 20 0 0"]
        );
        assert_eq!(
            plugin.cpp_lines(&txn).unwrap(),
            vec!["ctrl NULL NULL 2 16 7", "ctrl NULL NULL 2 20 0"]
        );
    }

    #[test]
    fn test_missing_field_does_not_shift_columns() {
        let txn = InterfaceTransaction::new("ctrl", InterfaceType::Axi4LiteSlave)
            .with_beat([("addr", 16), ("data", 7), ("mode", 1)])
            .with_beat([("addr", 20), ("mode", 1)]);
        let err = Axi4LiteSlave.sv_lines(&txn).unwrap_err();
        assert!(matches!(
            err,
            GenerateError::MissingPayloadField { ref interface, beat: 1, ref field }
                if interface == "ctrl" && field == "data"
        ));
        assert!(Axi4LiteSlave.cpp_lines(&txn).is_err());
    }

    #[test]
    fn test_misspelled_field_rejected() {
        let txn = InterfaceTransaction::new("ctrl", InterfaceType::Axi4LiteSlave)
            .with_beat([("addr", 24), ("dat", 9), ("mode", 1)]);
        let err = Axi4LiteSlave.write_line(&txn).unwrap_err();
        assert!(matches!(
            err,
            GenerateError::UnknownPayloadField { ref field, .. } if field == "dat"
        ));
    }
}
