use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use itertools::Itertools;
use thiserror::Error;

use intcode::bytecode::disasm::print_listing;
use intcode::compose::chain::{Wiring, best_phase_setting, run_chain_with_config};
use intcode::runtime::io::{ConsoleOutput, ScriptedInput};
use intcode::{ComposeError, LoadError, Program, RuntimeError, Vm, VmConfig, logging};

/// Extension of postcard-encoded program images.
const IMAGE_EXTENSION: &str = "icb";

#[derive(Parser, Debug)]
#[command(name = "intcode")]
#[command(about = "Run, inspect and compose Intcode programs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log filter, same syntax as RUST_LOG
    #[arg(long, global = true)]
    log: Option<String>,

    /// Trace every executed instruction
    #[arg(long, global = true)]
    trace: bool,

    /// Abort a VM after this many instructions
    #[arg(long, global = true)]
    max_steps: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a program on the console
    Run {
        file: PathBuf,

        /// Feed these values instead of prompting
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        input: Option<Vec<i64>>,
    },

    /// Print a disassembly listing
    Disasm { file: PathBuf },

    /// Run one VM per phase, each feeding the next
    Chain {
        file: PathBuf,

        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        phases: Vec<i64>,

        /// Feed the last VM's output back into the first
        #[arg(long)]
        feedback: bool,

        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        initial: i64,
    },

    /// Find the phase ordering that yields the highest signal
    Tune {
        file: PathBuf,

        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        phases: Vec<i64>,

        #[arg(long)]
        feedback: bool,
    },

    /// Write a program as a binary image
    Pack { file: PathBuf, out: PathBuf },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read '{}': {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write '{}': {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("{}: {source}", path.display())]
    Load { path: PathBuf, source: LoadError },

    #[error("{}: bad program image: {source}", path.display())]
    Image {
        path: PathBuf,
        source: postcard::Error,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Compose(#[from] ComposeError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log.as_deref(), cli.trace) {
        eprintln!("error: invalid log filter: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = execute(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<(), CliError> {
    let config = VmConfig {
        max_steps: cli.max_steps,
        ..VmConfig::default()
    };

    match cli.command {
        Command::Run { file, input } => {
            let program = load(&file)?;
            match input {
                Some(values) => {
                    Vm::with_io(program, ScriptedInput::new(values), ConsoleOutput::new())
                        .with_config(config)
                        .run()
                        .await?;
                }
                None => {
                    Vm::new(program).with_config(config).run().await?;
                }
            }
        }

        Command::Disasm { file } => {
            print_listing(&load(&file)?);
        }

        Command::Chain {
            file,
            phases,
            feedback,
            initial,
        } => {
            let program = load(&file)?;
            let signal =
                run_chain_with_config(&program, &phases, initial, wiring(feedback), config).await?;
            println!("{}", signal);
        }

        Command::Tune {
            file,
            phases,
            feedback,
        } => {
            let program = load(&file)?;
            let (signal, ordering) =
                best_phase_setting(&program, &phases, 0, wiring(feedback)).await?;
            println!("{} ({})", signal, ordering.iter().join(","));
        }

        Command::Pack { file, out } => {
            let program = load(&file)?;
            let bytes = program.to_bytes().map_err(|source| CliError::Image {
                path: out.clone(),
                source,
            })?;
            fs::write(&out, bytes).map_err(|source| CliError::Write { path: out, source })?;
        }
    }

    Ok(())
}

fn wiring(feedback: bool) -> Wiring {
    if feedback {
        Wiring::Feedback
    } else {
        Wiring::Open
    }
}

/// Reads a program from source text, or from a binary image when the file
/// has the image extension.
fn load(path: &Path) -> Result<Program, CliError> {
    let read_error = |source| CliError::Read {
        path: path.to_path_buf(),
        source,
    };

    if path.extension().and_then(|e| e.to_str()) == Some(IMAGE_EXTENSION) {
        let bytes = fs::read(path).map_err(read_error)?;
        Program::from_bytes(&bytes).map_err(|source| CliError::Image {
            path: path.to_path_buf(),
            source,
        })
    } else {
        let source = fs::read_to_string(path).map_err(read_error)?;
        source.parse().map_err(|source| CliError::Load {
            path: path.to_path_buf(),
            source,
        })
    }
}
