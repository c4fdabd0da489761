use super::read_full;
use super::format::FormatDescriptor;
use crate::prelude::*;

// data is moved one 4 byte word at a time
const WORD_SIZE: usize = 4;

/// Read and write halves of the block transform, reused from file to file.
///
/// Each half holds as many whole blocks as fit in `capacity` bytes, and never
/// less than one block.
#[derive(Debug, Default)]
pub struct TransformBuffers {
    capacity: usize,
    input: Vec<u8>,
    output: Vec<u8>,
}

impl TransformBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            input: Vec::new(),
            output: Vec::new(),
        }
    }

    /// Sizes both halves for blocks of `block_align` bytes and returns the
    /// batch length in bytes.
    fn prepare(&mut self, block_align: usize) -> Result<usize> {
        let blocks = (self.capacity / block_align).max(1);
        let batch = blocks * block_align;
        for half in [&mut self.input, &mut self.output] {
            if half.len() < batch {
                half.try_reserve_exact(batch - half.len())
                    .map_err(|_| Error::Allocation(batch))?;
                half.resize(batch, 0);
            }
        }
        Ok(batch)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InterleaveReport {
    pub blocks: u64,
    pub bytes_rewritten: u64,
    /// Bytes at the end of the data chunk too short for a whole block.
    pub trailing_bytes: u64,
}

/// Blocks can only be transposed when every channel owns a whole number of words.
pub fn check_block_layout(descriptor: &FormatDescriptor) -> Result<()> {
    let channels = descriptor.channels as usize;
    let align = descriptor.block_align as usize;
    if channels == 0 || align == 0 || align % (WORD_SIZE * channels) != 0 {
        return Err(Error::unsupported(format!(
            "block align {} is not a multiple of {} for {} channels",
            align,
            WORD_SIZE * channels,
            channels
        )));
    }
    Ok(())
}

/// Reorders one block from channel clustered words to sample interleaved words:
/// `out[n * channels + s] = in[s * words_per_channel + n]`.
pub fn transpose_block(input: &[u8], output: &mut [u8], channels: usize) {
    debug_assert_eq!(input.len(), output.len());
    let words_per_channel = input.len() / (WORD_SIZE * channels);

    for n in 0..words_per_channel {
        for s in 0..channels {
            let src = (s * words_per_channel + n) * WORD_SIZE;
            let dst = (n * channels + s) * WORD_SIZE;
            output[dst..dst + WORD_SIZE].copy_from_slice(&input[src..src + WORD_SIZE]);
        }
    }
}

/// Transposes the `data_len` bytes of block data starting at the current
/// stream position, in place.
///
/// Works batch by batch: remember the position, read whole blocks, transpose
/// them, seek back and overwrite. A trailing partial block is left alone. If
/// the stream ends early, the whole blocks that were read are still rewritten
/// before `UnexpectedEndOfData` is returned; nothing is rolled back.
pub fn interleave<S: Read + Write + Seek>(
    stream: &mut S,
    data_len: u32,
    descriptor: &FormatDescriptor,
    buffers: &mut TransformBuffers,
) -> Result<InterleaveReport> {
    check_block_layout(descriptor)?;
    let channels = descriptor.channels as usize;
    let align = descriptor.block_align as usize;
    let batch = buffers.prepare(align)?;
    let batch_blocks = (batch / align) as u64;
    let data_len = data_len as u64;

    debug!(
        "interleaving {} bytes of {} channel data, {} blocks of {} bytes per batch",
        data_len, channels, batch_blocks, align
    );

    let mut report = InterleaveReport::default();
    let mut consumed = 0u64;

    loop {
        let blocks_left = (data_len - consumed) / align as u64;
        if blocks_left == 0 {
            break;
        }
        let want = (blocks_left.min(batch_blocks) as usize) * align;

        let start = stream.stream_position().map_err(Error::IoSeek)?;
        let got = read_full(stream, &mut buffers.input[..want])?;
        let blocks = got / align;
        let len = blocks * align;

        for (src, dst) in buffers.input[..len]
            .chunks_exact(align)
            .zip(buffers.output[..len].chunks_exact_mut(align))
        {
            transpose_block(src, dst, channels);
        }

        if len > 0 {
            stream.seek(SeekFrom::Start(start)).map_err(Error::IoSeek)?;
            stream
                .write_all(&buffers.output[..len])
                .map_err(Error::IoWrite)?;
        }
        consumed += len as u64;
        report.blocks += blocks as u64;
        report.bytes_rewritten += len as u64;

        if got < want {
            warn!(
                "data chunk declares {} bytes but the stream ends after {}",
                data_len,
                consumed + (got - len) as u64
            );
            stream.flush().map_err(Error::IoWrite)?;
            return Err(Error::UnexpectedEndOfData {
                expected: data_len,
                actual: consumed + (got - len) as u64,
            });
        }
        trace!("rewrote {} blocks at {:#x}", blocks, start);
    }

    stream.flush().map_err(Error::IoWrite)?;
    report.trailing_bytes = data_len - consumed;
    if report.trailing_bytes > 0 {
        debug!("left {} trailing bytes untouched", report.trailing_bytes);
    }
    Ok(report)
}

// ================================== TESTS ==================================
