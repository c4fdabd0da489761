//! Turns Wwise IMA ADPCM wave files into standard IMA ADPCM ones, in place.
//!
//! The `fmt ` chunk gets the standard format tag and a samples-per-block
//! value, and multichannel data stored one channel after another inside each
//! block is transposed into the interleaved order decoders expect.

use crate::prelude::*;
use crate::riff::{DATA_CHUNK_ID, HEADER_SIZE, find_chunk};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

mod format;
mod interleave;
pub use format::{
    FORMAT_IMA_ADPCM, FORMAT_WWISE_IMA_ADPCM, FmtChunk, FormatDescriptor, read_format,
    rewrite_format,
};
pub use interleave::{
    InterleaveReport, TransformBuffers, check_block_layout, interleave, transpose_block,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReformatReport {
    /// The descriptor as found, before the rewrite.
    pub descriptor: FormatDescriptor,
    pub samples_per_block: u16,
    /// `None` when the data needed no reordering.
    pub interleave: Option<InterleaveReport>,
}

/// Rewrites the header and, for clustered multichannel data, the data chunk.
///
/// Everything that can be checked is checked before the first write: the
/// container, the `fmt ` chunk, the block layout and the presence of `data`.
/// Any fault after that is returned as [`Error::PartiallyRewritten`], since the
/// stream may be left half converted.
pub fn reformat<S: Read + Write + Seek>(
    stream: &mut S,
    buffers: &mut TransformBuffers,
) -> Result<ReformatReport> {
    let fmt = read_format(stream)?;
    let descriptor = fmt.descriptor;

    let data = if descriptor.needs_interleave() {
        check_block_layout(&descriptor)?;
        stream
            .seek(SeekFrom::Start(HEADER_SIZE))
            .map_err(Error::IoSeek)?;
        let len = find_chunk(stream, DATA_CHUNK_ID)?;
        let offset = stream.stream_position().map_err(Error::IoSeek)?;
        Some((offset, len))
    } else {
        None
    };

    let samples_per_block = descriptor.samples_per_block()?;
    fmt.rewrite(stream).map_err(Error::partially_rewritten)?;

    // the header is converted from here on
    let interleaved = match data {
        Some((offset, len)) => Some(
            transpose_data(stream, offset, len, &descriptor, buffers)
                .map_err(Error::partially_rewritten)?,
        ),
        None => None,
    };

    Ok(ReformatReport {
        descriptor,
        samples_per_block,
        interleave: interleaved,
    })
}

fn transpose_data<S: Read + Write + Seek>(
    stream: &mut S,
    offset: u64,
    len: u32,
    descriptor: &FormatDescriptor,
    buffers: &mut TransformBuffers,
) -> Result<InterleaveReport> {
    stream
        .seek(SeekFrom::Start(offset))
        .map_err(Error::IoSeek)?;
    interleave(stream, len, descriptor, buffers)
}

/// Opens `path` for reading and writing and runs [`reformat`] on it.
pub fn reformat_file<P: AsRef<Path>>(
    path: P,
    buffers: &mut TransformBuffers,
) -> Result<ReformatReport> {
    let path = path.as_ref();
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| Error::IoOpen {
            path: path.to_path_buf(),
            source,
        })?;

    info!("reformatting {}", path.display());
    let report = reformat(&mut file, buffers)?;
    file.sync_all()
        .map_err(|e| Error::IoWrite(e).partially_rewritten())?;
    Ok(report)
}

/// Reads until `buf` is full or the stream ends, returning the byte count.
pub(crate) fn read_full<S: Read>(stream: &mut S, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::IoRead(e)),
        }
    }
    Ok(filled)
}

// ================================== TESTS ==================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wave(channels: u16, block_align: u16, extra_info: [u8; 6], data: &[u8]) -> Vec<u8> {
        let fmt = FormatDescriptor {
            format_tag: FORMAT_WWISE_IMA_ADPCM,
            channels,
            sample_rate: 48000,
            avg_bytes_per_sec: 0,
            block_align,
            bits_per_sample: 4,
            extra_size: 6,
            extra_info,
        };
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.write_u32::<LittleEndian>(0).unwrap();
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.write_u32::<LittleEndian>(24).unwrap();
        out.extend_from_slice(&fmt.to_bytes().unwrap());
        out.extend_from_slice(b"LIST");
        out.write_u32::<LittleEndian>(2).unwrap();
        out.extend_from_slice(b"ab");
        out.extend_from_slice(b"data");
        out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
        out.extend_from_slice(data);
        out
    }

    // RIFF header, fmt chunk, LIST chunk, data header
    const DATA_BODY: usize = 12 + 32 + 10 + 8;

    fn clustered(channels: usize, words: usize) -> Vec<u8> {
        (0..channels * words)
            .flat_map(|i| [i as u8, 0, 0, 0])
            .collect()
    }

    #[test]
    fn test_reformat_stereo() {
        let data = clustered(2, 9);
        let mut cursor = Cursor::new(wave(2, 72, [0x18, 0, 0x0b, 0, 0, 0], &data));
        let mut buffers = TransformBuffers::new(8192);

        let report = reformat(&mut cursor, &mut buffers).unwrap();
        assert_eq!(report.samples_per_block, 65);
        assert_eq!(report.descriptor.format_tag, FORMAT_WWISE_IMA_ADPCM);
        assert_eq!(report.interleave.unwrap().blocks, 1);

        let out = cursor.into_inner();
        assert_eq!(&out[20..22], &[0x11, 0x00]);
        assert_eq!(&out[38..40], &[65, 0]);
        let words: Vec<u8> = out[DATA_BODY..].chunks(4).map(|w| w[0]).collect();
        assert_eq!(
            words,
            vec![0, 9, 1, 10, 2, 11, 3, 12, 4, 13, 5, 14, 6, 15, 7, 16, 8, 17]
        );
    }

    #[test]
    fn test_reformat_mono_leaves_data() {
        let data = clustered(1, 9);
        let original = wave(1, 36, [0; 6], &data);
        let mut cursor = Cursor::new(original.clone());
        let report = reformat(&mut cursor, &mut TransformBuffers::new(8192)).unwrap();
        assert_eq!(report.samples_per_block, 65);
        assert_eq!(report.interleave, None);
        assert_eq!(&cursor.get_ref()[DATA_BODY..], &original[DATA_BODY..]);
    }

    #[test]
    fn test_reformat_already_interleaved() {
        let data = clustered(2, 9);
        let original = wave(2, 72, [0x00, 0x00, 0x04, 0x00, 0x00, 0x00], &data);
        let mut cursor = Cursor::new(original.clone());
        let report = reformat(&mut cursor, &mut TransformBuffers::new(8192)).unwrap();
        assert_eq!(report.interleave, None);
        assert_eq!(&cursor.get_ref()[DATA_BODY..], &original[DATA_BODY..]);
    }

    #[test]
    fn test_reformat_missing_data_is_untouched() {
        let mut original = wave(2, 72, [0x18, 0, 0x0b, 0, 0, 0], &[]);
        original.truncate(DATA_BODY - 8);
        let mut cursor = Cursor::new(original.clone());
        let err = reformat(&mut cursor, &mut TransformBuffers::new(8192)).unwrap_err();
        assert!(matches!(err, Error::ChunkNotFound(tag) if &tag == DATA_CHUNK_ID));
        assert_eq!(cursor.into_inner(), original);
    }

    #[test]
    fn test_reformat_bad_layout_is_untouched() {
        // 36 bytes cannot be split into whole words for two channels
        let original = wave(2, 36, [0x18, 0, 0x0b, 0, 0, 0], &clustered(2, 9));
        let mut cursor = Cursor::new(original.clone());
        let err = reformat(&mut cursor, &mut TransformBuffers::new(8192)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert_eq!(cursor.into_inner(), original);
    }

    #[test]
    fn test_reformat_malformed_container() {
        for header in [&b"RIFX\0\0\0\0WAVE"[..], b"RIFF\0\0\0\0WAVX", b"RIFF\0\0"] {
            let mut original = header.to_vec();
            original.extend_from_slice(&[0u8; 40]);
            let mut cursor = Cursor::new(original.clone());
            let err = reformat(&mut cursor, &mut TransformBuffers::new(8192)).unwrap_err();
            assert!(matches!(err, Error::MalformedContainer(_)));
            assert_eq!(cursor.into_inner(), original);
        }
    }

    /// Accepts `write_budget` bytes, then fails writes; fails reads at or
    /// beyond `read_limit`.
    struct Faulty {
        inner: Cursor<Vec<u8>>,
        write_budget: usize,
        read_limit: u64,
    }

    impl Faulty {
        fn new(data: Vec<u8>) -> Self {
            Self {
                inner: Cursor::new(data),
                write_budget: usize::MAX,
                read_limit: u64::MAX,
            }
        }
    }

    impl Read for Faulty {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.inner.position() >= self.read_limit {
                return Err(std::io::Error::other("bad sector"));
            }
            self.inner.read(buf)
        }
    }

    impl Write for Faulty {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.write_budget == 0 {
                return Err(std::io::Error::other("no space left"));
            }
            let n = buf.len().min(self.write_budget);
            self.write_budget -= n;
            self.inner.write(&buf[..n])
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for Faulty {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    // fmt body starts after the RIFF header and fmt chunk header
    const FMT_BODY: usize = 12 + 8;

    #[test]
    fn test_header_write_failure_is_fatal() {
        let original = wave(2, 72, [0x18, 0, 0x0b, 0, 0, 0], &clustered(2, 9));
        let mut stream = Faulty::new(original.clone());
        stream.write_budget = 2;

        let err = reformat(&mut stream, &mut TransformBuffers::new(8192)).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(&err, Error::PartiallyRewritten(inner) if matches!(**inner, Error::IoWrite(_))));

        // only the format tag made it to the stream
        let out = stream.inner.into_inner();
        assert_eq!(&out[FMT_BODY..FMT_BODY + 2], &[0x11, 0x00]);
        assert_eq!(&out[FMT_BODY + 2..], &original[FMT_BODY + 2..]);
    }

    #[test]
    fn test_read_fault_in_data_is_fatal() {
        let original = wave(2, 72, [0x18, 0, 0x0b, 0, 0, 0], &clustered(2, 9));
        let mut stream = Faulty::new(original.clone());
        stream.read_limit = DATA_BODY as u64;

        let err = reformat(&mut stream, &mut TransformBuffers::new(8192)).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(&err, Error::PartiallyRewritten(inner) if matches!(**inner, Error::IoRead(_))));

        // header converted, data untouched
        let out = stream.inner.into_inner();
        assert_eq!(&out[FMT_BODY..FMT_BODY + 2], &[0x11, 0x00]);
        assert_eq!(&out[FMT_BODY + 18..FMT_BODY + 20], &[65, 0]);
        assert_eq!(&out[DATA_BODY..], &original[DATA_BODY..]);
    }

    #[test]
    fn test_data_write_failure_is_fatal() {
        let original = wave(2, 72, [0x18, 0, 0x0b, 0, 0, 0], &clustered(2, 9));
        let mut stream = Faulty::new(original.clone());
        // the whole fmt body, then the first two and a half data words
        stream.write_budget = 24 + 10;

        let err = reformat(&mut stream, &mut TransformBuffers::new(8192)).unwrap_err();
        assert!(err.is_fatal());

        let out = stream.inner.into_inner();
        assert_eq!(&out[FMT_BODY..FMT_BODY + 2], &[0x11, 0x00]);
        // second output word is the first word of channel 1
        assert_eq!(&out[DATA_BODY + 4..DATA_BODY + 8], &[9, 0, 0, 0]);
        assert_eq!(&out[DATA_BODY + 8..DATA_BODY + 10], &[1, 0]);
        assert_eq!(&out[DATA_BODY + 10..], &original[DATA_BODY + 10..]);
    }

    #[test]
    fn test_short_data_is_fatal() {
        let mut original = wave(2, 72, [0x18, 0, 0x0b, 0, 0, 0], &clustered(2, 9));
        // declare two blocks, store one
        original[DATA_BODY - 4..DATA_BODY].copy_from_slice(&144u32.to_le_bytes());
        let mut cursor = Cursor::new(original);

        let err = reformat(&mut cursor, &mut TransformBuffers::new(8192)).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            &err,
            Error::PartiallyRewritten(inner)
                if matches!(**inner, Error::UnexpectedEndOfData { expected: 144, actual: 72 })
        ));

        // the whole block that was there is interleaved anyway
        let words: Vec<u8> = cursor.get_ref()[DATA_BODY..].chunks(4).map(|w| w[0]).collect();
        assert_eq!(
            words,
            vec![0, 9, 1, 10, 2, 11, 3, 12, 4, 13, 5, 14, 6, 15, 7, 16, 8, 17]
        );
    }

    #[test]
    fn test_validation_failures_are_not_fatal() {
        let original = wave(2, 36, [0x18, 0, 0x0b, 0, 0, 0], &clustered(2, 9));
        let err = reformat(&mut Cursor::new(original), &mut TransformBuffers::new(8192)).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_read_full_stops_at_end() {
        let mut cursor = Cursor::new(vec![1, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut cursor, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }
}
