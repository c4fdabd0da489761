//! riffix CLI
//!
//! `extract` splits resource files into one file per embedded RIFF signature,
//! `reformat` turns Wwise IMA ADPCM wave files into standard IMA ADPCM in place.

pub use anyhow::{Context, Result as R};
use clap::{Parser, Subcommand};
use riffix_lib::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "riffix")]
#[command(about = "Extract embedded RIFF files and repair Wwise IMA ADPCM waves", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Size of the read/transform buffer in bytes
    #[arg(short, long, global = true, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract anything resembling a wave (RIFF) file, and everything stored
    /// after it, into files next to the inputs
    Extract {
        /// Resource files to scan
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Change the CONTENTS of Wwise IMA ADPCM wave files so that normal
    /// IMA ADPCM decoders (for example SoX) can read them
    Reformat {
        /// Wave files to rewrite in place
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config {
        buffer_size: cli.buffer_size,
        verbose: cli.verbose,
        debug: cli.debug,
    };

    if let Err(e) = init(&config) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match &cli.command {
        Commands::Extract { files } => run_extract(files, &config),
        Commands::Reformat { files } => run_reformat(files, &config),
    };

    match result {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            warn!("{} file(s) could not be processed", failed);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Every input is its own failure domain: a fault abandons that input only.
/// Returns the number of inputs that failed.
fn run_extract(files: &[PathBuf], config: &Config) -> R<usize> {
    let mut window = ScanWindow::new(config.buffer_size)?;
    let mut failed = 0;

    for file in files {
        let mut sink = FileSink::new(file);
        let result =
            extract_file(&mut sink, &mut window).with_context(|| file.display().to_string());

        for path in sink.completed() {
            println!("{}", path.display());
        }

        match result {
            Ok(report) => info!(
                "{}: {} artifact(s) from {} bytes",
                file.display(),
                report.artifacts.len(),
                report.bytes_scanned
            ),
            Err(e) => {
                eprintln!("{:#}", e);
                failed += 1;
            }
        }
    }

    Ok(failed)
}

/// Validation failures skip the file. Once a file has been partly rewritten
/// any fault stops the whole run.
fn run_reformat(files: &[PathBuf], config: &Config) -> R<usize> {
    let mut buffers = TransformBuffers::new(config.buffer_size);
    let mut failed = 0;

    for file in files {
        match reformat_file(file, &mut buffers) {
            Ok(report) => {
                if let Some(interleave) = report.interleave {
                    info!(
                        "{}: interleaved {} blocks of {} channels",
                        file.display(),
                        interleave.blocks,
                        report.descriptor.channels
                    );
                }
                println!("Finished processing {}", file.display());
            }
            Err(e) if e.is_fatal() => {
                return Err(e).with_context(|| file.display().to_string());
            }
            Err(e) => {
                eprintln!("{}: {}", file.display(), e);
                failed += 1;
            }
        }
    }

    Ok(failed)
}
