//! Intcode CLI: run, chain, and disassemble Intcode programs.

use clap::{Parser as ClapParser, Subcommand};
use intcode_cli::commands::{self, PipeOptions, RunOptions};
use intcode_cli::config::{IntcodeConfig, OutputFormat};
use intcode_cli::error::{CliError, ErrorChain};
use intcode_vm::Program;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}

#[derive(ClapParser)]
#[command(name = "intcode", version, about = "Intcode virtual machine")]
struct Cli {
    /// Use this config file instead of searching for intcode.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (overrides [output] format)
    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program to halt
    Run {
        /// Program image: one line of comma-separated integers
        #[arg()]
        image: PathBuf,

        /// Queue a value on the input channel (repeatable)
        #[arg(long = "input", short = 'i', allow_negative_numbers = true)]
        inputs: Vec<i64>,

        /// Overwrite a memory cell before running, as ADDR=VALUE (repeatable)
        #[arg(long = "poke", short = 'p')]
        pokes: Vec<String>,

        /// Prompt on stdin whenever the program waits for input
        #[arg(long)]
        interactive: bool,

        /// Print final memory after the program halts
        #[arg(long)]
        show_memory: bool,
    },
    /// Run copies of a program chained output-to-input
    Pipe {
        /// Program image shared by every stage
        #[arg()]
        image: PathBuf,

        /// Initial input of one stage as V[,V...]; one flag per stage
        #[arg(long = "stage-input", short = 's', required = true, allow_hyphen_values = true)]
        stages: Vec<String>,

        /// Value pushed into the first stage after its initial input
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        seed: i64,

        /// Feed the last stage's output back into the first stage
        #[arg(long)]
        feedback: bool,
    },
    /// Print a static listing of a program image
    Decode {
        #[arg()]
        image: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(&e),
    };
    init_tracing(&config.log.level);

    if let Err(e) = dispatch(cli, &config) {
        fail(&e);
    }
}

fn load_config(explicit: Option<&Path>) -> Result<IntcodeConfig, CliError> {
    match explicit {
        Some(path) => Ok(IntcodeConfig::load_from(path)?),
        None => Ok(IntcodeConfig::load()?),
    }
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so stdout
/// carries only program output.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn dispatch(cli: Cli, config: &IntcodeConfig) -> Result<(), CliError> {
    let format = cli.format.unwrap_or(config.output.format);
    let max_instructions = config.limits.max_instructions;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Run {
            image,
            inputs,
            pokes,
            interactive,
            show_memory,
        } => {
            let program = Program::load(&image)?;
            let pokes = pokes
                .iter()
                .map(|p| commands::parse_poke(p))
                .collect::<Result<Vec<_>, _>>()?;
            let opts = RunOptions {
                inputs,
                pokes,
                interactive,
                show_memory,
                format,
                max_instructions,
            };
            let stdin = io::stdin();
            let mut stdin = stdin.lock();
            let mut prompt = io::stderr();
            commands::run(&program, &opts, &mut stdin, &mut out, &mut prompt)?;
        }
        Commands::Pipe {
            image,
            stages,
            seed,
            feedback,
        } => {
            let program = Program::load(&image)?;
            let stages = stages
                .iter()
                .map(|s| commands::parse_group(s))
                .collect::<Result<Vec<_>, _>>()?;
            let opts = PipeOptions {
                stages,
                seed: vec![seed],
                feedback,
                format,
                max_instructions,
            };
            commands::pipe(&program, &opts, &mut out)?;
        }
        Commands::Decode { image } => {
            let program = Program::load(&image)?;
            commands::decode(&program, &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn fail(err: &CliError) -> ! {
    let chain = ErrorChain::from_error(err);
    eprintln!("{} {}", red("error:"), chain.format_body());
    std::process::exit(1);
}
