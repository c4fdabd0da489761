//! Splits arbitrary binary blobs into one file per embedded `RIFF` signature.
//!
//! The input is read through a fixed size [`ScanWindow`]. The last three bytes
//! of every window are carried in front of the next one, so a signature that
//! straddles two reads is still found, exactly once, at its true offset.

use crate::prelude::*;
use crate::riff::RIFF_CHUNK_ID;
use std::fs::File;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

const MARKER_LEN: usize = RIFF_CHUNK_ID.len();
// bytes of a window that cannot start a full marker yet
const CARRY_LEN: usize = MARKER_LEN - 1;

/// Receives the regions found by [`scan`].
///
/// `begin` is called at every marker with its absolute offset, followed by
/// any number of `append` calls and a `finish` once the next marker or the
/// end of the stream is reached.
pub trait ArtifactSink {
    fn begin(&mut self, offset: u64) -> Result<()>;
    fn append(&mut self, data: &[u8]) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub bytes_scanned: u64,
    pub artifacts: Vec<ArtifactInfo>,
}

/// Read buffer with room for `capacity` fresh bytes behind the carry.
pub struct ScanWindow {
    buf: Vec<u8>,
    capacity: usize,
}

impl ScanWindow {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < MARKER_LEN {
            return Err(Error::config(format!(
                "scan window must hold at least {} bytes, got {}",
                MARKER_LEN, capacity
            )));
        }
        let total = capacity + CARRY_LEN;
        let mut buf = Vec::new();
        buf.try_reserve_exact(total)
            .map_err(|_| Error::Allocation(total))?;
        buf.resize(total, 0);
        Ok(Self { buf, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Scans `reader` to the end, handing every marker-delimited region to `sink`.
///
/// Bytes in front of the first marker are dropped. The window can be reused
/// for the next input; its contents never leak between calls.
pub fn scan<R: Read, S: ArtifactSink>(
    reader: &mut R,
    sink: &mut S,
    window: &mut ScanWindow,
) -> Result<ScanReport> {
    let capacity = window.capacity;
    let buf = &mut window.buf;

    let mut report = ScanReport::default();
    // absolute stream offset of buf[0]
    let mut base: u64 = 0;
    // carry bytes at the front of buf
    let mut carry = 0usize;
    // carry positions still covered by the previous window's match
    let mut skip = 0usize;
    let mut open: Option<ArtifactInfo> = None;

    loop {
        let read = match reader.read(&mut buf[carry..carry + capacity]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::IoRead(e)),
        };
        report.bytes_scanned += read as u64;

        let filled = carry + read;
        // last position with four bytes available; the rest is carried
        let scan_end = filled.saturating_sub(CARRY_LEN);
        let mut flushed = 0usize;
        let mut pos = skip;

        while pos < scan_end {
            if &buf[pos..pos + MARKER_LEN] != RIFF_CHUNK_ID {
                pos += 1;
                continue;
            }

            let offset = base + pos as u64;
            if let Some(mut artifact) = open.take() {
                sink.append(&buf[flushed..pos])?;
                sink.finish()?;
                artifact.len += (pos - flushed) as u64;
                debug!(
                    "closed artifact at {:#x}, {} bytes",
                    artifact.offset, artifact.len
                );
                report.artifacts.push(artifact);
            }

            debug!("found RIFF marker at {:#x}", offset);
            sink.begin(offset)?;
            open = Some(ArtifactInfo { offset, len: 0 });
            flushed = pos;
            pos += MARKER_LEN;
        }

        if let Some(artifact) = open.as_mut() {
            if flushed < scan_end {
                sink.append(&buf[flushed..scan_end])?;
                artifact.len += (scan_end - flushed) as u64;
            }
        }

        buf.copy_within(scan_end..filled, 0);
        carry = filled - scan_end;
        skip = pos - scan_end;
        base += scan_end as u64;
    }

    if let Some(mut artifact) = open.take() {
        sink.append(&buf[..carry])?;
        sink.finish()?;
        artifact.len += carry as u64;
        debug!(
            "closed artifact at {:#x}, {} bytes",
            artifact.offset, artifact.len
        );
        report.artifacts.push(artifact);
    }

    Ok(report)
}

/// `<input>_<offset as 16 hex digits>.wav`, next to the input file.
pub fn artifact_path(input: &Path, offset: u64) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(format!("_{:016x}.wav", offset));
    PathBuf::from(name)
}

/// Writes every artifact to its own file next to the input.
pub struct FileSink {
    input: PathBuf,
    current: Option<(PathBuf, BufWriter<File>)>,
    completed: Vec<PathBuf>,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(input: P) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            current: None,
            completed: Vec::new(),
        }
    }

    /// Paths of the artifacts that were written and closed successfully.
    pub fn completed(&self) -> &[PathBuf] {
        &self.completed
    }

    pub fn input(&self) -> &Path {
        &self.input
    }
}

impl ArtifactSink for FileSink {
    fn begin(&mut self, offset: u64) -> Result<()> {
        let path = artifact_path(&self.input, offset);
        let file = File::create(&path).map_err(|source| Error::IoOpen {
            path: path.clone(),
            source,
        })?;
        self.current = Some((path, BufWriter::new(file)));
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> Result<()> {
        if let Some((_, writer)) = self.current.as_mut() {
            writer.write_all(data).map_err(Error::IoWrite)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some((path, mut writer)) = self.current.take() {
            writer.flush().map_err(Error::IoWrite)?;
            self.completed.push(path);
        }
        Ok(())
    }
}

/// Keeps every artifact in memory as `(offset, bytes)`.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub artifacts: Vec<(u64, Vec<u8>)>,
}

impl ArtifactSink for MemorySink {
    fn begin(&mut self, offset: u64) -> Result<()> {
        self.artifacts.push((offset, Vec::new()));
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> Result<()> {
        if let Some((_, bytes)) = self.artifacts.last_mut() {
            bytes.extend_from_slice(data);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Splits the file the sink was created for into sibling artifacts.
///
/// Artifacts finished before a fault stay on disk and remain listed in
/// [`FileSink::completed`].
pub fn extract_file(sink: &mut FileSink, window: &mut ScanWindow) -> Result<ScanReport> {
    let input = sink.input.clone();
    let mut file = File::open(&input).map_err(|source| Error::IoOpen {
        path: input.clone(),
        source,
    })?;
    info!(
        "scanning {} with a {} byte window",
        input.display(),
        window.capacity()
    );

    let report = scan(&mut file, sink, window)?;
    if report.artifacts.is_empty() {
        info!("{}: no RIFF marker found", input.display());
    }
    Ok(report)
}

// ================================== TESTS ==================================
