use super::read_full;
use crate::prelude::*;
use crate::riff::{FMT_CHUNK_ID, find_chunk, read_riff_header};

// Format tags
pub const FORMAT_WWISE_IMA_ADPCM: u16 = 0x0002;
pub const FORMAT_IMA_ADPCM: u16 = 0x0011;

// Chunk Structures
pub const FMT_CHUNK_SIZE: usize = 24;
const SAMPLES_PER_BLOCK_OFFSET: usize = 18;
const ADPCM_BITS_PER_SAMPLE: u16 = 4;
const EXTRA_INFO_SIZE: u16 = 6;
// Every channel opens a block with a 4 byte header word
const CHANNEL_HEADER_SIZE: u32 = 4;

// Extra info of files whose data is already interleaved: the first as the
// encoder writes it, the second as left by an earlier conversion.
// Any other value means the blocks are clustered per channel.
const INTERLEAVED_EXTRA_INFO: [[u8; 6]; 2] = [
    [0x00, 0x00, 0x04, 0x00, 0x00, 0x00],
    [0x41, 0x00, 0x04, 0x00, 0x00, 0x00],
];

/// The 24 byte body of a Wwise IMA ADPCM `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub extra_size: u16,
    pub extra_info: [u8; 6],
}

impl FormatDescriptor {
    pub fn parse(raw: &[u8; FMT_CHUNK_SIZE]) -> Result<Self> {
        Self::read_from(&mut &raw[..]).map_err(Error::IoRead)
    }

    /// Reads the descriptor fields in file order.
    pub fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let format_tag = reader.read_u16::<LittleEndian>()?;
        let channels = reader.read_u16::<LittleEndian>()?;
        let sample_rate = reader.read_u32::<LittleEndian>()?;
        let avg_bytes_per_sec = reader.read_u32::<LittleEndian>()?;
        let block_align = reader.read_u16::<LittleEndian>()?;
        let bits_per_sample = reader.read_u16::<LittleEndian>()?;
        let extra_size = reader.read_u16::<LittleEndian>()?;
        let mut extra_info = [0u8; 6];
        reader.read_exact(&mut extra_info)?;

        Ok(Self {
            format_tag,
            channels,
            sample_rate,
            avg_bytes_per_sec,
            block_align,
            bits_per_sample,
            extra_size,
            extra_info,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u16::<LittleEndian>(self.format_tag)?;
        writer.write_u16::<LittleEndian>(self.channels)?;
        writer.write_u32::<LittleEndian>(self.sample_rate)?;
        writer.write_u32::<LittleEndian>(self.avg_bytes_per_sec)?;
        writer.write_u16::<LittleEndian>(self.block_align)?;
        writer.write_u16::<LittleEndian>(self.bits_per_sample)?;
        writer.write_u16::<LittleEndian>(self.extra_size)?;
        writer.write_all(&self.extra_info)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<[u8; FMT_CHUNK_SIZE]> {
        let mut raw = [0u8; FMT_CHUNK_SIZE];
        self.write_to(&mut &mut raw[..]).map_err(Error::IoWrite)?;
        Ok(raw)
    }

    /// Checks that this is the vendor variant this crate knows how to fix.
    pub fn validate(&self) -> Result<()> {
        if self.format_tag != FORMAT_WWISE_IMA_ADPCM || self.bits_per_sample != ADPCM_BITS_PER_SAMPLE
        {
            return Err(Error::unsupported(format!(
                "doesn't seem to be Wwise IMA ADPCM, format tag 0x{:04x} and bit depth {}",
                self.format_tag, self.bits_per_sample
            )));
        }
        if self.extra_size != EXTRA_INFO_SIZE {
            return Err(Error::unsupported(format!(
                "extra info is {} bytes, expected {}",
                self.extra_size, EXTRA_INFO_SIZE
            )));
        }
        if self.channels == 0 {
            return Err(Error::unsupported("zero channels"));
        }
        self.samples_per_block()?;
        Ok(())
    }

    /// `(block_align - 4 * channels) * 8 / (bits_per_sample * channels) + 1`
    pub fn samples_per_block(&self) -> Result<u16> {
        let channels = self.channels as u32;
        let align = self.block_align as u32;
        let header = CHANNEL_HEADER_SIZE * channels;
        let bits = self.bits_per_sample as u32 * channels;

        if bits == 0 || align < header {
            return Err(Error::unsupported(format!(
                "block align {} cannot hold {} channel headers",
                self.block_align, self.channels
            )));
        }
        let samples = (align - header) * 8 / bits + 1;
        u16::try_from(samples).map_err(|_| {
            Error::unsupported(format!("{} samples per block do not fit the header", samples))
        })
    }

    /// Clustered multichannel data has to be transposed after the header fix.
    pub fn needs_interleave(&self) -> bool {
        self.channels > 1 && !INTERLEAVED_EXTRA_INFO.contains(&self.extra_info)
    }

    /// The descriptor as standard IMA ADPCM: new tag and samples per block,
    /// everything else as it was.
    pub fn rewritten(&self, samples_per_block: u16) -> Self {
        let mut out = *self;
        out.format_tag = FORMAT_IMA_ADPCM;
        out.extra_info[0..2].copy_from_slice(&samples_per_block.to_le_bytes());
        out
    }
}

/// A validated `fmt ` chunk and where its body lives in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FmtChunk {
    pub offset: u64,
    pub descriptor: FormatDescriptor,
}

impl FmtChunk {
    /// Overwrites the descriptor in place with its standard IMA ADPCM form.
    ///
    /// Only the tag and samples per block change; the rest is written back
    /// byte for byte. A failed write may leave the chunk half updated.
    pub fn rewrite<S: Write + Seek>(&self, stream: &mut S) -> Result<FormatDescriptor> {
        let samples_per_block = self.descriptor.samples_per_block()?;
        let fixed = self.descriptor.rewritten(samples_per_block);

        stream
            .seek(SeekFrom::Start(self.offset))
            .map_err(Error::IoSeek)?;
        let raw = fixed.to_bytes()?;
        stream.write_all(&raw).map_err(Error::IoWrite)?;
        stream.flush().map_err(Error::IoWrite)?;
        debug!(
            "fmt chunk at {:#x}: tag 0x{:04x} -> 0x{:04x}, {} samples per block at +{}",
            self.offset,
            self.descriptor.format_tag,
            fixed.format_tag,
            samples_per_block,
            SAMPLES_PER_BLOCK_OFFSET
        );
        Ok(fixed)
    }
}

/// Reads and validates the `fmt ` chunk of a WAVE stream without touching it.
pub fn read_format<S: Read + Seek>(stream: &mut S) -> Result<FmtChunk> {
    stream.seek(SeekFrom::Start(0)).map_err(Error::IoSeek)?;
    read_riff_header(stream)?;

    let len = find_chunk(stream, FMT_CHUNK_ID)?;
    if len as usize != FMT_CHUNK_SIZE {
        return Err(Error::unsupported(format!(
            "fmt chunk is {} bytes, expected {}",
            len, FMT_CHUNK_SIZE
        )));
    }
    let offset = stream.stream_position().map_err(Error::IoSeek)?;

    let mut raw = [0u8; FMT_CHUNK_SIZE];
    let got = read_full(stream, &mut raw)?;
    if got < FMT_CHUNK_SIZE {
        return Err(Error::UnexpectedEndOfData {
            expected: FMT_CHUNK_SIZE as u64,
            actual: got as u64,
        });
    }

    let descriptor = FormatDescriptor::parse(&raw)?;
    debug!(
        "fmt: tag 0x{:04x}, {} channels, {} Hz, align {}, {} bits, extra {:02x?}",
        descriptor.format_tag,
        descriptor.channels,
        descriptor.sample_rate,
        descriptor.block_align,
        descriptor.bits_per_sample,
        descriptor.extra_info
    );
    descriptor.validate()?;
    Ok(FmtChunk { offset, descriptor })
}

/// Validates the `fmt ` chunk and rewrites it in place.
pub fn rewrite_format<S: Read + Write + Seek>(stream: &mut S) -> Result<FormatDescriptor> {
    let fmt = read_format(stream)?;
    fmt.rewrite(stream)
}

// ================================== TESTS ==================================
