use crate::prelude::*;

// Chunk Identifiers
pub const RIFF_CHUNK_ID: &[u8; 4] = b"RIFF";
pub const WAVE_FORMAT_ID: &[u8; 4] = b"WAVE";
pub const FMT_CHUNK_ID: &[u8; 4] = b"fmt ";
pub const DATA_CHUNK_ID: &[u8; 4] = b"data";

// Chunk Structures
pub const HEADER_SIZE: u64 = 12; // RIFF + size + WAVE
pub const CHUNK_HEADER_SIZE: usize = 8; // id + length

/// Tag and declared body length of one subchunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: [u8; 4],
    pub len: u32,
}

impl ChunkHeader {
    /// Reads an 8 byte header. `Ok(None)` means the stream ran out first.
    pub fn read_from<S: Read>(stream: &mut S) -> Result<Option<Self>> {
        let mut id = [0u8; 4];
        if let Err(e) = stream.read_exact(&mut id) {
            return eof_as_none(e);
        }
        let len = match stream.read_u32::<LittleEndian>() {
            Ok(len) => len,
            Err(e) => return eof_as_none(e),
        };
        Ok(Some(Self { id, len }))
    }
}

fn eof_as_none<T>(e: std::io::Error) -> Result<Option<T>> {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Ok(None)
    } else {
        Err(Error::IoRead(e))
    }
}

/// Checks the 12 byte `RIFF....WAVE` container header at the current position
/// and leaves the stream at the first subchunk header.
pub fn read_riff_header<S: Read>(stream: &mut S) -> Result<()> {
    let mut header = [0u8; HEADER_SIZE as usize];
    if let Err(e) = stream.read_exact(&mut header) {
        return match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Err(Error::malformed("truncated RIFF header")),
            _ => Err(Error::IoRead(e)),
        };
    }

    if &header[0..4] != RIFF_CHUNK_ID {
        return Err(Error::malformed("missing RIFF signature"));
    }
    if &header[8..12] != WAVE_FORMAT_ID {
        return Err(Error::malformed(format!(
            "form type is '{}', not WAVE",
            String::from_utf8_lossy(&header[8..12])
        )));
    }
    Ok(())
}

/// Walks subchunk headers from the current position until `tag` is found.
///
/// On success the declared body length is returned and the stream sits at
/// the first byte of the body. Bodies of other chunks are skipped by their
/// declared length without being read. Fails with `ChunkNotFound` when the
/// headers run out or a skip would land past the end of the stream; the
/// cursor never moves beyond end-of-stream.
pub fn find_chunk<S: Read + Seek>(stream: &mut S, tag: &[u8; 4]) -> Result<u32> {
    let start = stream.stream_position().map_err(Error::IoSeek)?;
    let end = stream.seek(SeekFrom::End(0)).map_err(Error::IoSeek)?;
    let mut pos = stream.seek(SeekFrom::Start(start)).map_err(Error::IoSeek)?;

    loop {
        let Some(header) = ChunkHeader::read_from(stream)? else {
            // a partial header may have been consumed
            stream.seek(SeekFrom::Start(pos)).map_err(Error::IoSeek)?;
            return Err(Error::ChunkNotFound(*tag));
        };
        pos += CHUNK_HEADER_SIZE as u64;

        if &header.id == tag {
            debug!(
                "found '{}' chunk at {:#x}, {} bytes",
                String::from_utf8_lossy(tag),
                pos,
                header.len
            );
            return Ok(header.len);
        }

        let next = pos + header.len as u64;
        if next > end {
            debug!(
                "'{}' chunk at {:#x} claims {} bytes past end of stream",
                String::from_utf8_lossy(&header.id),
                pos,
                next - end
            );
            return Err(Error::ChunkNotFound(*tag));
        }
        trace!(
            "skipping '{}' chunk, {} bytes",
            String::from_utf8_lossy(&header.id),
            header.len
        );
        pos = stream.seek(SeekFrom::Start(next)).map_err(Error::IoSeek)?;
    }
}

// ================================== TESTS ==================================
