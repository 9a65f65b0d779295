// TBForge - Testbench Data Generator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io::{BufRead, BufReader, Seek, SeekFrom};
use tbforge_core::{verify_seeks, InterfaceRegistry, SvDataFile};
use tbforge_ir::{InterfaceTransaction, InterfaceType, TestVector, Testbench};

fn read_line_at(file: &mut std::fs::File, offset: u64) -> anyhow::Result<String> {
    file.seek(SeekFrom::Start(offset))?;
    let mut line = String::new();
    BufReader::new(&mut *file).read_line(&mut line)?;
    Ok(line.trim_end_matches('\n').to_string())
}

#[test]
fn test_seek_into_written_file() -> anyhow::Result<()> {
    let mut tb = Testbench::new("roundtrip");
    for v in 0..3u64 {
        let mut vector = TestVector::new();
        for t in 0..=v {
            let mut txn = InterfaceTransaction::new("ctrl", InterfaceType::Axi4LiteSlave);
            for beat in 0..(t + 1) * 20 {
                txn = txn.with_beat([("addr", beat * 4), ("data", beat), ("mode", 1)]);
            }
            vector.add_thread().transaction(txn).display("done");
        }
        vector.add_thread().set_signal("start", v).end_vector();
        tb.add_test_vector(vector);
    }

    let data = SvDataFile::build(&tb, &InterfaceRegistry::builtin())?;
    let index = verify_seeks(&data.lines)?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("roundtrip_sv.dat");
    std::fs::write(&path, data.render())?;
    let mut file = std::fs::File::open(&path)?;

    assert_eq!(read_line_at(&mut file, 0)?, "TestVector count 3");
    for (v, vector) in index.vectors.iter().enumerate() {
        let line = read_line_at(&mut file, vector.offset)?;
        assert_eq!(line, format!("ParallelSection count {}", v + 2));
        for section in &vector.sections {
            let line = read_line_at(&mut file, section.offset)?;
            assert_eq!(line, format!("Packet count {}", section.packets));
        }
    }
    Ok(())
}
