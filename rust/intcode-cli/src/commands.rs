//! Command implementations behind the `intcode` binary.
//!
//! Every command writes to caller-supplied streams so it can be driven from
//! tests as easily as from `main`.

use crate::config::OutputFormat;
use crate::error::CliError;
use intcode_vm::decode::listing;
use intcode_vm::{Event, Pipeline, Program, Vm};
use serde::Serialize;
use std::io::{BufRead, Write};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Argument parsing helpers
// ---------------------------------------------------------------------------

/// Parse `ADDR=VALUE`.
pub fn parse_poke(arg: &str) -> Result<(usize, i64), CliError> {
    let bad = || CliError::BadPoke(arg.to_string());
    let (addr, value) = arg.split_once('=').ok_or_else(bad)?;
    let addr = addr.trim().parse::<usize>().map_err(|_| bad())?;
    let value = value.trim().parse::<i64>().map_err(|_| bad())?;
    Ok((addr, value))
}

/// Parse a comma-separated group of integers, e.g. `9,0`.
pub fn parse_group(arg: &str) -> Result<Vec<i64>, CliError> {
    arg.split(',')
        .map(str::trim)
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            tok.parse::<i64>()
                .map_err(|_| CliError::BadInput(tok.to_string()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub inputs: Vec<i64>,
    pub pokes: Vec<(usize, i64)>,
    pub interactive: bool,
    pub show_memory: bool,
    pub format: OutputFormat,
    pub max_instructions: Option<u64>,
}

/// What a finished `run` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub output: Vec<i64>,
    pub first: i64,
    pub steps: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<Vec<i64>>,
}

/// Load pokes and inputs into a fresh machine and run it to halt.
///
/// Without `interactive`, a machine that asks for more input than was queued
/// is an error. With it, each request is answered by a line from `stdin`
/// after writing a prompt to `prompt`.
pub fn run(
    program: &Program,
    opts: &RunOptions,
    stdin: &mut dyn BufRead,
    out: &mut dyn Write,
    prompt: &mut dyn Write,
) -> Result<RunReport, CliError> {
    let mut vm = Vm::from_program(program);
    if let Some(limit) = opts.max_instructions {
        vm.set_instruction_limit(limit);
    }
    for &(addr, value) in &opts.pokes {
        debug!(addr, value, "poke");
        vm.poke(addr, value);
    }
    for &value in &opts.inputs {
        vm.push_input(value);
    }

    let stream = opts.interactive && opts.format == OutputFormat::Lines;
    let mut output = Vec::new();
    loop {
        match vm.resume()? {
            Event::Output(value) => {
                if stream {
                    writeln!(out, "{}", value)?;
                    out.flush()?;
                }
                output.push(value);
            }
            Event::AwaitingInput if opts.interactive => {
                let value = read_value(stdin, prompt)?;
                vm.push_input(value);
            }
            Event::AwaitingInput => {
                return Err(CliError::InputExhausted {
                    cursor: vm.cursor(),
                })
            }
            Event::Halted => break,
        }
    }
    info!(steps = vm.steps(), outputs = output.len(), "program halted");

    let report = RunReport {
        output,
        first: vm.first(),
        steps: vm.steps(),
        memory: opts.show_memory.then(|| vm.memory().to_vec()),
    };
    write_run_report(&report, opts.format, !stream, out)?;
    Ok(report)
}

fn write_run_report(
    report: &RunReport,
    format: OutputFormat,
    include_output: bool,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, report)?;
            writeln!(out)?;
        }
        OutputFormat::Lines | OutputFormat::Csv => {
            if include_output {
                if format == OutputFormat::Csv {
                    if !report.output.is_empty() {
                        writeln!(out, "{}", join(&report.output))?;
                    }
                } else {
                    for value in &report.output {
                        writeln!(out, "{}", value)?;
                    }
                }
            }
            writeln!(out, "[0] = {}", report.first)?;
            if let Some(memory) = &report.memory {
                writeln!(out, "memory = {}", join(memory))?;
            }
        }
    }
    Ok(())
}

/// Prompt until a line parses as an integer.
fn read_value(stdin: &mut dyn BufRead, prompt: &mut dyn Write) -> Result<i64, CliError> {
    let mut line = String::new();
    loop {
        write!(prompt, "input> ")?;
        prompt.flush()?;
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            return Err(CliError::InputClosed);
        }
        match line.trim().parse::<i64>() {
            Ok(value) => return Ok(value),
            Err(_) => writeln!(prompt, "not an integer: {:?}", line.trim())?,
        }
    }
}

// ---------------------------------------------------------------------------
// pipe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PipeOptions {
    /// Initial input of each stage, in stage order.
    pub stages: Vec<Vec<i64>>,
    /// Values pushed into stage 0 after its initial input.
    pub seed: Vec<i64>,
    pub feedback: bool,
    pub format: OutputFormat,
    pub max_instructions: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipeReport {
    /// Last value the final stage produced.
    pub signal: Option<i64>,
    /// Everything the final stage produced that nothing consumed.
    pub output: Vec<i64>,
    pub steps: Vec<u64>,
}

pub fn pipe(
    program: &Program,
    opts: &PipeOptions,
    out: &mut dyn Write,
) -> Result<PipeReport, CliError> {
    let mut pipeline = Pipeline::new(program.clone()).feedback(opts.feedback);
    for initial in &opts.stages {
        pipeline = pipeline.stage(initial.iter().copied());
    }
    if let Some(limit) = opts.max_instructions {
        pipeline = pipeline.instruction_limit(limit);
    }

    let run = pipeline.run(&opts.seed)?;
    let report = PipeReport {
        signal: run.last_output(),
        steps: run.machines.iter().map(Vm::steps).collect(),
        output: run.output,
    };
    info!(signal = ?report.signal, stages = report.steps.len(), "pipeline finished");

    match opts.format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
        OutputFormat::Lines => {
            if let Some(signal) = report.signal {
                writeln!(out, "{}", signal)?;
            }
        }
        OutputFormat::Csv => {
            if !report.output.is_empty() {
                writeln!(out, "{}", join(&report.output))?;
            }
        }
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

pub fn decode(program: &Program, out: &mut dyn Write) -> Result<(), CliError> {
    for entry in listing(program.words()) {
        writeln!(out, "{}", entry)?;
    }
    Ok(())
}

fn join(values: &[i64]) -> String {
    values
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
