// TBForge - Testbench Data Generator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tracing::{error, info};

use tbforge_codegen::{Language, TemplateContext, TestbenchGenerator};
use tbforge_config::{load_testbench, resolve_input_path, PathMode};
use tbforge_core::line::parse_lines;
use tbforge_core::{
    verify_seeks, CppDataFile, DataFileStats, InterfaceRegistry, SectionIndex, SectionSummary,
    SvDataFile,
};
use tbforge_ir::Testbench;

const EXIT_PASS: u8 = 0;
const EXIT_VERIFY_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const REPORT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(author, version, about = "TBForge testbench data generator", long_about = None)]
struct Cli {
    /// Enable debug logging (seek passes, plugin registration, path resolution)
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate data files and testbenches from a testbench description (YAML or JSON).
    Generate(GenerateArgs),

    /// Re-check every seek of an SV data file.
    Verify(VerifyArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Languages {
    /// SystemVerilog only
    Sv,
    /// SystemVerilog and C++
    All,
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Path to the testbench description
    file: PathBuf,

    /// How FILE is resolved: env, path or absolute
    #[arg(long, default_value = "absolute", value_parser = PathMode::from_str)]
    mode: PathMode,

    /// Environment variable name (env mode) or base directory (path mode)
    #[arg(long)]
    mode_arg: Option<String>,

    /// Testbenches to generate
    #[arg(long, value_enum, default_value_t = Languages::All)]
    languages: Languages,

    /// Directory for generated files (default: current directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Replace the built-in SystemVerilog template
    #[arg(long)]
    sv_template: Option<PathBuf>,

    /// Replace the built-in C++ template
    #[arg(long)]
    cpp_template: Option<PathBuf>,

    /// Write a JSON generation report
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct VerifyArgs {
    /// Path to an SV data file
    file: PathBuf,

    /// Print the recovered seek table as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct OutputEntry {
    path: PathBuf,
    bytes: usize,
    sha256: String,
}

#[derive(Debug, Serialize)]
struct GenerateReport {
    report_schema_version: String,
    status: String,
    input: PathBuf,
    module_name: String,
    languages: Vec<String>,
    stats: DataFileStats,
    sections: Vec<SectionSummary>,
    outputs: Vec<OutputEntry>,
}

#[derive(Debug, Serialize)]
struct VerifyReport {
    status: String,
    test_vector_count: usize,
    parallel_section_count: usize,
    index: SectionIndex,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with appropriate level based on --trace flag
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Generate(args) => run_generate(args),
        Commands::Verify(args) => run_verify(args),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn run_generate(args: GenerateArgs) -> ExitCode {
    let input = match resolve_input_path(args.mode, args.mode_arg.as_deref(), &args.file) {
        Ok(path) => path,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let testbench = match load_testbench(&input) {
        Ok(tb) => tb,
        Err(e) => {
            error!("Failed to load testbench description: {:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let with_cpp = args.languages == Languages::All;
    if let Err(e) = testbench.validate(with_cpp) {
        error!("Invalid testbench: {}", e);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    let templates = match read_templates(&args) {
        Ok(t) => t,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let output_dir = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let generated = match generate_outputs(&testbench, &output_dir, with_cpp, &templates) {
        Ok(g) => g,
        Err(e) => {
            error!("Generation failed: {:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    // nothing touches the disk until every output has been produced
    if let Err(e) = write_all(&generated.files) {
        error!("{:#}", e);
        return ExitCode::from(EXIT_RUNTIME_ERROR);
    }
    let mut outputs = Vec::new();
    for (path, content) in &generated.files {
        info!("Wrote {:?} ({} bytes)", path, content.len());
        outputs.push(OutputEntry {
            path: path.clone(),
            bytes: content.len(),
            sha256: sha256_hex(content.as_bytes()),
        });
    }

    if let Some(report_path) = &args.report {
        let report = GenerateReport {
            report_schema_version: REPORT_SCHEMA_VERSION.to_string(),
            status: "generated".to_string(),
            input,
            module_name: testbench.metadata.module_name.clone(),
            languages: generated
                .languages
                .iter()
                .map(|l| l.as_str().to_string())
                .collect(),
            stats: generated.stats,
            sections: generated.sections,
            outputs,
        };
        let written = serde_json::to_string_pretty(&report)
            .context("Failed to serialize report")
            .and_then(|json| write_file(report_path, &json));
        if let Err(e) = written {
            error!("{:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
        info!("Report written to {:?}", report_path);
    }

    ExitCode::from(EXIT_PASS)
}

struct Templates {
    sv: Option<String>,
    cpp: Option<String>,
}

fn read_templates(args: &GenerateArgs) -> anyhow::Result<Templates> {
    let read = |path: &Option<PathBuf>| -> anyhow::Result<Option<String>> {
        path.as_ref()
            .map(|p| {
                std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read template {:?}", p))
            })
            .transpose()
    };
    Ok(Templates {
        sv: read(&args.sv_template)?,
        cpp: read(&args.cpp_template)?,
    })
}

struct Generated {
    files: Vec<(PathBuf, String)>,
    languages: Vec<Language>,
    stats: DataFileStats,
    sections: Vec<SectionSummary>,
}

fn generate_outputs(
    testbench: &Testbench,
    output_dir: &Path,
    with_cpp: bool,
    templates: &Templates,
) -> anyhow::Result<Generated> {
    let registry = InterfaceRegistry::builtin();
    let module = &testbench.metadata.module_name;
    let mut files = Vec::new();
    let mut languages = vec![Language::Sv];

    let sv_data = SvDataFile::build(testbench, &registry)?;
    let sv_path = output_dir.join(format!("{}_sv.dat", module));
    let context = TemplateContext::from_stats(sv_path.display().to_string(), &sv_data.stats);
    let sv_tb = TestbenchGenerator::generate(
        Language::Sv,
        testbench,
        &registry,
        &context,
        templates.sv.as_deref(),
    )?;
    files.push((sv_path, sv_data.render()));
    files.push((output_dir.join(format!("{}_tb.sv", module)), sv_tb));

    if with_cpp {
        languages.push(Language::Cpp);
        let cpp_data = CppDataFile::build(testbench, &registry)?;
        let cpp_path = output_dir.join(format!("{}_c.dat", module));
        let context = TemplateContext {
            data_file: cpp_path.display().to_string(),
            max_arg_num: cpp_data.max_arg_num,
            ..context
        };
        let cpp_tb = TestbenchGenerator::generate(
            Language::Cpp,
            testbench,
            &registry,
            &context,
            templates.cpp.as_deref(),
        )?;
        files.push((cpp_path, cpp_data.render()));
        files.push((output_dir.join(format!("{}_tb.cpp", module)), cpp_tb));
    }

    Ok(Generated {
        files,
        languages,
        stats: sv_data.stats,
        sections: sv_data.sections,
    })
}

fn part_path(path: &Path) -> PathBuf {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    PathBuf::from(partial)
}

/// Writes `content` to the `.part` sibling of `path`, creating parent directories.
fn stage_file(path: &Path, content: &str) -> anyhow::Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {:?}", parent))?;
    }
    let partial = part_path(path);
    std::fs::write(&partial, content)
        .with_context(|| format!("Failed to write {:?}", partial))?;
    Ok(partial)
}

/// Writes through a sibling temporary file so a failed write never leaves a truncated output.
fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    let partial = stage_file(path, content)?;
    std::fs::rename(&partial, path).with_context(|| format!("Failed to write {:?}", path))
}

/// Stages every file before renaming any of them, so a failed write leaves no output behind.
///
/// A rename that fails after earlier renames succeeded cannot be rolled back; the remaining
/// `.part` files are removed and the error names the file that was not replaced.
fn write_all(files: &[(PathBuf, String)]) -> anyhow::Result<()> {
    let mut staged = Vec::with_capacity(files.len());
    for (path, content) in files {
        match stage_file(path, content) {
            Ok(partial) => staged.push((partial, path)),
            Err(e) => {
                for (partial, _) in &staged {
                    let _ = std::fs::remove_file(partial);
                }
                return Err(e);
            }
        }
    }

    for (i, (partial, path)) in staged.iter().enumerate() {
        if let Err(e) = std::fs::rename(partial, path) {
            for (rest, _) in &staged[i..] {
                let _ = std::fs::remove_file(rest);
            }
            return Err(e).with_context(|| format!("Failed to write {:?}", path));
        }
    }
    Ok(())
}

fn run_verify(args: VerifyArgs) -> ExitCode {
    let text = match std::fs::read_to_string(&args.file) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to read data file {:?}: {}", args.file, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let lines = parse_lines(&text);
    let index = match verify_seeks(&lines) {
        Ok(index) => index,
        Err(e) => {
            error!("Verification failed: {}", e);
            return ExitCode::from(EXIT_VERIFY_FAIL);
        }
    };

    info!(
        "{:?}: {} vectors, {} parallel sections, all seeks valid",
        args.file,
        index.vectors.len(),
        index.parallel_section_count()
    );
    if args.json {
        let report = VerifyReport {
            status: "valid".to_string(),
            test_vector_count: index.vectors.len(),
            parallel_section_count: index.parallel_section_count(),
            index,
        };
        match serde_json::to_string(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize verification result: {}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    }

    ExitCode::from(EXIT_PASS)
}
