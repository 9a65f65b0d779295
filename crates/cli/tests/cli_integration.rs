use assert_cmd::Command;
use predicates::prelude::*;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const SINGLE: &str = r#"
schema_version: "1.0"
metadata:
  module_name: single
dut:
  clocks:
    - {name: ap_clk, period: 10ns}
  resets: [rst]
vectors:
  - threads:
      - commands:
          - delay: 10ns
          - signal: {name: rst, value: 1}
          - macro: END
"#;

const SINGLE_SV_DAT: &str = "TestVector count 1\nTestVector seek 38\nParallelSection count 1\n\
ParallelSection seek 86\nPacket count 3\ndelay ns 1 10\nsignal rst 1 1\nend Vector_0 1 0";

// END sits in the first of two threads: fine for SV, rejected when a C++ testbench is requested.
const END_NOT_LAST: &str = r#"
metadata:
  module_name: split
dut:
  resets: [rst]
vectors:
  - threads:
      - commands:
          - signal: {name: rst, value: 0}
          - macro: END
      - commands:
          - signal: {name: rst, value: 1}
"#;

#[allow(deprecated)]
fn tbforge() -> Command {
    Command::cargo_bin("tbforge").unwrap()
}

fn write_input(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_generate_sv_only() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let input = write_input(temp.path(), "single.yaml", SINGLE);
    let out = temp.path().join("build");

    tbforge()
        .arg("generate")
        .arg(&input)
        .args(["--languages", "sv"])
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .success();

    assert_eq!(fs::read_to_string(out.join("single_sv.dat"))?, SINGLE_SV_DAT);
    let tb = fs::read_to_string(out.join("single_tb.sv"))?;
    assert!(tb.contains("module single_tb();"));
    assert!(tb.contains("single_sv.dat"));
    assert!(!out.join("single_c.dat").exists());
    assert!(!out.join("single_tb.cpp").exists());
    Ok(())
}

#[test]
fn test_generate_all_with_report() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let input = write_input(temp.path(), "single.yaml", SINGLE);
    let report_path = temp.path().join("report.json");

    tbforge()
        .arg("generate")
        .arg(&input)
        .arg("--output-dir")
        .arg(temp.path())
        .arg("--report")
        .arg(&report_path)
        .assert()
        .success();

    let c_dat = fs::read_to_string(temp.path().join("single_c.dat"))?;
    assert_eq!(c_dat, "end Vector_0 NULL 1 0\nfinish NULL NULL 0 0");
    let cpp = fs::read_to_string(temp.path().join("single_tb.cpp"))?;
    assert!(cpp.contains("#define MAX_ARG_NUM 1"));

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report_path)?)?;
    assert_eq!(report["status"], "generated");
    assert_eq!(report["languages"], serde_json::json!(["sv", "cpp"]));
    assert_eq!(report["stats"]["test_vector_count"], 1);
    assert_eq!(report["stats"]["max_arg_num"], 1);
    assert_eq!(report["sections"][0]["counters"]["ends"], 1);

    let outputs = report["outputs"].as_array().unwrap();
    assert_eq!(outputs.len(), 4);
    let sv_entry = &outputs[0];
    assert!(sv_entry["path"].as_str().unwrap().ends_with("single_sv.dat"));
    let digest = format!("{:x}", Sha256::digest(SINGLE_SV_DAT.as_bytes()));
    assert_eq!(sv_entry["sha256"], digest);
    Ok(())
}

#[test]
fn test_path_mode_resolves_relative_input() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    write_input(temp.path(), "single.yaml", SINGLE);

    tbforge()
        .current_dir(temp.path())
        .args(["generate", "single.yaml", "--languages", "sv", "--mode", "path"])
        .arg("--mode-arg")
        .arg(temp.path())
        .assert()
        .success();

    assert!(temp.path().join("single_sv.dat").exists());
    Ok(())
}

#[test]
fn test_env_mode_requires_variable() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    write_input(temp.path(), "single.yaml", SINGLE);

    tbforge()
        .current_dir(temp.path())
        .env_remove("TBFORGE_TEST_MISSING_DIR")
        .args([
            "generate",
            "single.yaml",
            "--mode",
            "env",
            "--mode-arg",
            "TBFORGE_TEST_MISSING_DIR",
        ])
        .assert()
        .code(2);

    tbforge()
        .current_dir(temp.path())
        .env("TBFORGE_TEST_DIR", temp.path())
        .args([
            "generate",
            "single.yaml",
            "--languages",
            "sv",
            "--mode",
            "env",
            "--mode-arg",
            "TBFORGE_TEST_DIR",
        ])
        .assert()
        .success();
    Ok(())
}

#[test]
fn test_missing_input_is_config_error() {
    tbforge()
        .args(["generate", "/nonexistent/tb.yaml"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Input file not found"));
}

#[test]
fn test_invalid_description_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let input = write_input(
        temp.path(),
        "bad.yaml",
        "schema_version: \"9.9\"\nmetadata:\n  module_name: bad\nvectors: []\n",
    );

    tbforge()
        .arg("generate")
        .arg(&input)
        .arg("--output-dir")
        .arg(temp.path())
        .assert()
        .code(2);

    assert!(!temp.path().join("bad_sv.dat").exists());
    Ok(())
}

#[test]
fn test_end_vector_placement_depends_on_languages() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let input = write_input(temp.path(), "split.yaml", END_NOT_LAST);

    tbforge()
        .arg("generate")
        .arg(&input)
        .arg("--output-dir")
        .arg(temp.path())
        .assert()
        .code(2);
    assert!(!temp.path().join("split_sv.dat").exists());

    tbforge()
        .arg("generate")
        .arg(&input)
        .args(["--languages", "sv"])
        .arg("--output-dir")
        .arg(temp.path())
        .assert()
        .success();
    assert!(temp.path().join("split_sv.dat").exists());
    Ok(())
}

#[test]
fn test_verify_generated_and_tampered() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let input = write_input(temp.path(), "single.yaml", SINGLE);
    tbforge()
        .arg("generate")
        .arg(&input)
        .args(["--languages", "sv"])
        .arg("--output-dir")
        .arg(temp.path())
        .assert()
        .success();

    let dat = temp.path().join("single_sv.dat");
    tbforge()
        .arg("verify")
        .arg(&dat)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"parallel_section_count\":1"));

    let tampered = fs::read_to_string(&dat)?.replace("ParallelSection seek 86", "ParallelSection seek 80");
    fs::write(&dat, tampered)?;
    tbforge()
        .arg("verify")
        .arg(&dat)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Verification failed"));
    Ok(())
}

#[test]
fn test_custom_template() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let input = write_input(temp.path(), "single.yaml", SINGLE);
    let template = write_input(
        temp.path(),
        "tb.sv.in",
        "// TBF_MODULE_NAME: TBF_MAX_VECTORS vectors, TBF_MAX_PARALLEL threads\n",
    );

    tbforge()
        .arg("generate")
        .arg(&input)
        .args(["--languages", "sv"])
        .arg("--sv-template")
        .arg(&template)
        .arg("--output-dir")
        .arg(temp.path())
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(temp.path().join("single_tb.sv"))?,
        "// single: 1 vectors, 1 threads\n"
    );

    tbforge()
        .arg("generate")
        .arg(&input)
        .arg("--sv-template")
        .arg(temp.path().join("missing.sv.in"))
        .assert()
        .code(2);
    Ok(())
}

#[test]
fn test_incomplete_beat_is_config_error() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let input = write_input(
        temp.path(),
        "lite.yaml",
        r#"
metadata:
  module_name: lite
dut:
  interfaces:
    - {name: ctrl, type: s_axilite}
vectors:
  - threads:
      - commands:
          - interface:
              name: ctrl
              payload:
                - {addr: 16, data: 7, mode: 1}
                - {addr: 20, mode: 1}
"#,
    );

    tbforge()
        .arg("generate")
        .arg(&input)
        .arg("--output-dir")
        .arg(temp.path())
        .assert()
        .code(2)
        .stdout(predicate::str::contains("missing payload field 'data'"));
    assert!(!temp.path().join("lite_sv.dat").exists());
    Ok(())
}

#[test]
fn test_display_with_whitespace_is_config_error() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let input = write_input(
        temp.path(),
        "spaced.yaml",
        r#"
metadata:
  module_name: spaced
vectors:
  - threads:
      - commands:
          - display: "two words"
          - signal: {name: a, value: 1}
"#,
    );

    tbforge()
        .arg("generate")
        .arg(&input)
        .args(["--languages", "sv"])
        .arg("--output-dir")
        .arg(temp.path())
        .assert()
        .code(2)
        .stdout(predicate::str::contains("display text"));
    assert!(!temp.path().join("spaced_sv.dat").exists());
    Ok(())
}
