//! riffix: pull RIFF files out of binary blobs and repair Wwise IMA ADPCM waves.

pub mod adpcm;
pub mod error;
pub mod extract;
mod prelude;
pub mod riff;

pub use adpcm::{ReformatReport, TransformBuffers, reformat, reformat_file};
pub use error::{Error, Result};
pub use extract::{
    ArtifactInfo, ArtifactSink, FileSink, MemorySink, ScanReport, ScanWindow, artifact_path,
    extract_file, scan,
};

/// Size of the read and transform buffers, the classic `BUFSIZ`.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Runtime settings shared by both tools
#[derive(Debug, Clone)]
pub struct Config {
    /// Bytes read per scan window, and the batch size of the data transform
    pub buffer_size: usize,
    /// Enable verbose logging
    pub verbose: bool,
    /// Enable debug output
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size < 4 {
            return Err(Error::config(format!(
                "buffer size must be at least 4 bytes, got {}",
                self.buffer_size
            )));
        }
        Ok(())
    }
}

/// Checks the configuration and installs the log subscriber.
///
/// Logs go to stderr so that the artifact paths printed on stdout stay
/// machine readable.
pub fn init(config: &Config) -> Result<()> {
    config.validate()?;

    if config.verbose || config.debug {
        let level = if config.debug { "debug" } else { "info" };
        tracing_subscriber::fmt()
            .with_env_filter(level)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| Error::config(format!("cannot install logger: {}", e)))?;
    }

    Ok(())
}
