//! End-to-end tests for the `intcode` binary and its library half.

use intcode_cli::commands::{self, RunOptions};
use intcode_cli::config::{IntcodeConfig, OutputFormat};
use intcode_vm::Program;
use std::path::PathBuf;
use std::process::{Command, Stdio};

// =============================================================================
// Helpers
// =============================================================================

/// Scratch directory unique to this test, removed on drop.
struct Scratch(PathBuf);

impl Scratch {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("intcode-cli-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        Scratch(dir)
    }

    fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.0.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn intcode(dir: &Scratch, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_intcode"))
        .args(args)
        .current_dir(&dir.0)
        .env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .output()
        .unwrap()
}

const AMP: &str = "3,15,3,16,1002,16,10,16,1,16,15,15,4,15,99,0,0\n";

// =============================================================================
// Library
// =============================================================================

#[test]
fn noun_verb_search_through_pokes() {
    let program: Program = "1,0,0,0,99".parse().unwrap();
    let mut found = None;
    'search: for noun in 0..5 {
        for verb in 0..5 {
            let opts = RunOptions {
                pokes: vec![(1, noun), (2, verb)],
                ..Default::default()
            };
            let report = commands::run(
                &program,
                &opts,
                &mut "".as_bytes(),
                &mut Vec::<u8>::new(),
                &mut Vec::<u8>::new(),
            )
            .unwrap();
            if report.first == 100 {
                found = Some((noun, verb));
                break 'search;
            }
        }
    }
    // mem[0] + mem[4] = 1 + 99
    assert_eq!(found, Some((0, 4)));
}

#[test]
fn config_format_feeds_commands() {
    let cfg = IntcodeConfig::parse("[output]\nformat = \"csv\"\n").unwrap();
    let opts = RunOptions {
        format: cfg.output.format,
        ..Default::default()
    };
    let mut out = Vec::new();
    commands::run(
        &"104,1,104,2,99".parse().unwrap(),
        &opts,
        &mut "".as_bytes(),
        &mut out,
        &mut Vec::<u8>::new(),
    )
    .unwrap();
    assert_eq!(opts.format, OutputFormat::Csv);
    assert_eq!(String::from_utf8(out).unwrap(), "1,2\n[0] = 104\n");
}

// =============================================================================
// Binary
// =============================================================================

#[test]
fn bin_run_with_input() {
    let dir = Scratch::new("run");
    dir.file("echo.txt", "3,0,4,0,99\n");
    let out = intcode(&dir, &["run", "echo.txt", "--input", "-12"]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "-12\n[0] = -12\n");
}

#[test]
fn bin_pipe_serial() {
    let dir = Scratch::new("pipe");
    dir.file("amp.txt", AMP);
    let out = intcode(
        &dir,
        &["pipe", "amp.txt", "-s", "4", "-s", "3", "-s", "2", "-s", "1", "-s", "0"],
    );
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "43210\n");
}

#[test]
fn bin_reads_config_from_working_directory() {
    let dir = Scratch::new("config");
    dir.file("quine.txt", "104,7,99\n");
    dir.file("intcode.toml", "[output]\nformat = \"json\"\n");
    let out = intcode(&dir, &["run", "quine.txt"]);
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["output"], serde_json::json!([7]));
}

#[test]
fn bin_format_flag_overrides_config() {
    let dir = Scratch::new("override");
    dir.file("p.txt", "104,7,104,8,99\n");
    dir.file("intcode.toml", "[output]\nformat = \"json\"\n");
    let out = intcode(&dir, &["run", "p.txt", "--format", "csv"]);
    assert_eq!(String::from_utf8_lossy(&out.stdout), "7,8\n[0] = 104\n");
}

#[test]
fn bin_decode() {
    let dir = Scratch::new("decode");
    dir.file("p.txt", "1101,100,-1,4,0\n");
    let out = intcode(&dir, &["decode", "p.txt"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.lines().next().unwrap().contains("add 100, -1, [4]"));
}

#[test]
fn bin_fault_exits_nonzero_with_cause() {
    let dir = Scratch::new("fault");
    dir.file("bad.txt", "1,0,0,0,42\n");
    let out = intcode(&dir, &["run", "bad.txt"]);
    assert_eq!(out.status.code(), Some(1));
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("machine faulted"));
    assert!(err.contains("invalid opcode 42"));
}

#[test]
fn bin_malformed_config_is_reported() {
    let dir = Scratch::new("badconfig");
    dir.file("p.txt", "104,7,99\n");
    dir.file("intcode.toml", "[limits]\nmax_instructions = \"ten\"\n");
    let out = intcode(&dir, &["run", "p.txt"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("cannot load configuration"));
    assert!(err.contains("caused by: invalid toml in"));
    assert!(err.contains("intcode.toml"));
}

#[test]
fn bin_missing_image() {
    let dir = Scratch::new("missing");
    let out = intcode(&dir, &["run", "nope.txt"]);
    assert_eq!(out.status.code(), Some(1));
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("cannot load program image"));
    assert!(err.contains("nope.txt"));
}
