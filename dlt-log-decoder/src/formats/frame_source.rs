//! Buffered, resynchronizable frame reader
//!
//! Splits a byte stream into frames. A frame starts either with a storage
//! header marker or directly with a standard header (captures written without
//! storage headers). Frame boundaries come from the LEN field of the standard
//! header.
//!
//! After a corrupt frame the reader can be asked to [`FrameSource::resync`]:
//! it steps one byte past the start of the rejected frame and scans forward
//! for the next storage header marker, giving up after a configured number
//! of bytes.

use super::header::{
    STANDARD_HEADER_SIZE, STORAGE_HEADER_MARKER, STORAGE_HEADER_SIZE,
};
use crate::config::DecoderConfig;
use crate::types::{DltError, HeaderError, Result};
use byteorder::{BigEndian, ByteOrder};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// A contiguous byte range of the stream holding one log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Offset of the first byte within the (decompressed) stream
    pub offset: u64,
    /// True if the frame starts with a storage header marker
    pub has_storage_header: bool,
    /// Storage header (if present) + declared standard-header length
    pub bytes: Vec<u8>,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of a resynchronization scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// A storage header marker was found; the next frame starts there
    Found { skipped: u64 },
    /// The scan bound was reached without finding a marker
    Exhausted { skipped: u64 },
    /// The stream ended without another marker
    EndOfStream { skipped: u64 },
}

/// Forward-only frame reader over any byte stream
pub struct FrameSource<R> {
    reader: R,
    buf: Vec<u8>,
    /// Stream offset of `buf[0]`
    buf_offset: u64,
    /// Read cursor within `buf`
    pos: usize,
    /// Start of the current frame within `buf`; bytes before it may be discarded
    frame_start: usize,
    eof: bool,
    chunk_size: usize,
    max_resync_bytes: usize,
    require_storage_header: bool,
}

impl FrameSource<Box<dyn Read + Send>> {
    /// Open a capture file, wrapping it in a gzip decoder if it starts with the gzip magic
    pub fn open(path: &Path, config: &DecoderConfig) -> Result<Self> {
        let unreadable = |source| DltError::UnreadableFile {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(unreadable)?;
        let mut reader = BufReader::with_capacity(config.read_chunk_size.max(1), file);
        let is_gzip = config.decompress_gzip
            && reader.fill_buf().map_err(unreadable)?.starts_with(&GZIP_MAGIC);

        let stream: Box<dyn Read + Send> = if is_gzip {
            log::debug!("Detected gzip stream: {:?}", path);
            Box::new(MultiGzDecoder::new(reader))
        } else {
            Box::new(reader)
        };
        Ok(Self::new(stream, config))
    }
}

impl<R: Read> FrameSource<R> {
    pub fn new(reader: R, config: &DecoderConfig) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            buf_offset: 0,
            pos: 0,
            frame_start: 0,
            eof: false,
            chunk_size: config.read_chunk_size.max(1),
            max_resync_bytes: config.max_resync_bytes,
            require_storage_header: config.require_storage_header,
        }
    }

    /// Current stream offset of the read cursor
    pub fn offset(&self) -> u64 {
        self.buf_offset + self.pos as u64
    }

    /// Read the next frame
    ///
    /// Returns `Ok(None)` at end of stream, including when fewer bytes remain
    /// than the smallest possible header. A frame whose declared length runs
    /// past the end of the stream is reported as [`HeaderError::Truncated`]
    /// and left unconsumed so the caller can [`resync`](Self::resync).
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.frame_start = self.pos;

        if !self.fill_to(STANDARD_HEADER_SIZE)? {
            return Ok(None);
        }

        let has_storage_header = self.buf[self.pos..].starts_with(&STORAGE_HEADER_MARKER);
        if !has_storage_header && self.require_storage_header {
            return Err(HeaderError::MissingStorageHeader.into());
        }

        let storage_len = if has_storage_header {
            STORAGE_HEADER_SIZE
        } else {
            0
        };
        if !self.fill_to(storage_len + STANDARD_HEADER_SIZE)? {
            return Ok(None);
        }

        let len_at = self.pos + storage_len + 2;
        let declared = BigEndian::read_u16(&self.buf[len_at..len_at + 2]);
        if (declared as usize) < STANDARD_HEADER_SIZE {
            return Err(HeaderError::InvalidLength(declared).into());
        }

        let total = storage_len + declared as usize;
        if !self.fill_to(total)? {
            return Err(HeaderError::Truncated {
                needed: total,
                available: self.buffered(),
            }
            .into());
        }

        let frame = Frame {
            offset: self.offset(),
            has_storage_header,
            bytes: self.buf[self.pos..self.pos + total].to_vec(),
        };
        self.pos += total;
        log::trace!("Frame at offset {} ({} bytes)", frame.offset, frame.len());
        Ok(Some(frame))
    }

    /// Step one byte past the start of the last frame and scan for the next marker
    pub fn resync(&mut self) -> Result<ResyncOutcome> {
        let origin = self.buf_offset + self.frame_start as u64;
        self.pos = (self.frame_start + 1).min(self.buf.len());
        self.frame_start = self.pos;

        loop {
            let window = &self.buf[self.pos..];
            if let Some(found) = window
                .windows(STORAGE_HEADER_MARKER.len())
                .position(|w| w == STORAGE_HEADER_MARKER)
            {
                let candidate = self.pos + found;
                let skipped = self.buf_offset + candidate as u64 - origin;
                if skipped > self.max_resync_bytes as u64 {
                    self.pos = candidate;
                    self.frame_start = candidate;
                    return Ok(ResyncOutcome::Exhausted { skipped });
                }
                self.pos = candidate;
                self.frame_start = candidate;
                log::debug!("Resynchronized after skipping {} bytes", skipped);
                return Ok(ResyncOutcome::Found { skipped });
            }

            // Keep a marker-sized tail in case a marker straddles the refill boundary
            let keep = (STORAGE_HEADER_MARKER.len() - 1).min(window.len());
            self.pos = self.buf.len() - keep;
            self.frame_start = self.pos;
            let scanned = self.offset() - origin;

            if self.eof {
                self.pos = self.buf.len();
                self.frame_start = self.pos;
                return Ok(ResyncOutcome::EndOfStream {
                    skipped: self.offset() - origin,
                });
            }
            if scanned > self.max_resync_bytes as u64 {
                return Ok(ResyncOutcome::Exhausted { skipped: scanned });
            }

            let want = self.buffered() + self.chunk_size;
            self.fill_to(want)?;
        }
    }

    fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Ensure at least `n` bytes are buffered after the cursor; false if the stream ends first
    fn fill_to(&mut self, n: usize) -> Result<bool> {
        while self.buffered() < n {
            if self.eof {
                return Ok(false);
            }
            self.discard_before_frame();

            let old_len = self.buf.len();
            let want = self.chunk_size.max(n - self.buffered());
            self.buf.resize(old_len + want, 0);
            let read = loop {
                match self.reader.read(&mut self.buf[old_len..]) {
                    Ok(read) => break read,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        self.buf.truncate(old_len);
                        return Err(e.into());
                    }
                }
            };
            self.buf.truncate(old_len + read);
            if read == 0 {
                self.eof = true;
            }
        }
        Ok(true)
    }

    fn discard_before_frame(&mut self) {
        if self.frame_start == 0 {
            return;
        }
        self.buf.drain(..self.frame_start);
        self.buf_offset += self.frame_start as u64;
        self.pos -= self.frame_start;
        self.frame_start = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stored_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = STORAGE_HEADER_MARKER.to_vec();
        frame.extend_from_slice(&[0u8; 8]);
        frame.extend_from_slice(b"ECU1");
        let len = (STANDARD_HEADER_SIZE + payload.len()) as u16;
        frame.extend_from_slice(&[0x20, 0]);
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    fn source(bytes: Vec<u8>, config: &DecoderConfig) -> FrameSource<Cursor<Vec<u8>>> {
        FrameSource::new(Cursor::new(bytes), config)
    }

    #[test]
    fn test_reads_consecutive_frames_across_refills() {
        let mut data = stored_frame(&[1, 2, 3]);
        data.extend(stored_frame(&[4, 5]));
        let config = DecoderConfig::new().with_read_chunk_size(5);
        let mut src = source(data, &config);

        let first = src.next_frame().unwrap().unwrap();
        assert_eq!(first.offset, 0);
        assert!(first.has_storage_header);
        assert_eq!(first.len(), 23);
        let second = src.next_frame().unwrap().unwrap();
        assert_eq!(second.offset, 23);
        assert_eq!(&second.bytes[20..], &[4, 5]);
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_short_tail_is_end_of_stream() {
        let mut data = stored_frame(&[]);
        data.extend_from_slice(&STORAGE_HEADER_MARKER);
        data.extend_from_slice(&[0; 6]);
        let mut src = source(data, &DecoderConfig::new());
        assert!(src.next_frame().unwrap().is_some());
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_frame_without_storage_header() {
        let data = vec![0x20, 9, 0x00, 0x06, 0xAB, 0xCD];
        let mut src = source(data.clone(), &DecoderConfig::new());
        let frame = src.next_frame().unwrap().unwrap();
        assert!(!frame.has_storage_header);
        assert_eq!(frame.bytes, data);

        let mut strict = source(data, &DecoderConfig::new().with_storage_header_required(true));
        assert!(matches!(
            strict.next_frame(),
            Err(DltError::Header(HeaderError::MissingStorageHeader))
        ));
    }

    #[test]
    fn test_truncated_frame_then_resync() {
        let mut corrupt = stored_frame(&[0; 4]);
        // declare far more bytes than the stream holds
        corrupt[18] = 0x7F;
        let good = stored_frame(&[9, 9]);
        let mut data = corrupt.clone();
        data.extend_from_slice(&good);

        let mut src = source(data, &DecoderConfig::new().with_read_chunk_size(7));
        assert!(matches!(
            src.next_frame(),
            Err(DltError::Header(HeaderError::Truncated { .. }))
        ));
        let outcome = src.resync().unwrap();
        assert_eq!(
            outcome,
            ResyncOutcome::Found {
                skipped: corrupt.len() as u64
            }
        );
        let frame = src.next_frame().unwrap().unwrap();
        assert_eq!(frame.offset, corrupt.len() as u64);
        assert_eq!(frame.bytes, good);
    }

    #[test]
    fn test_resync_is_bounded() {
        let mut data = vec![0x20, 0, 0xFF, 0xFF];
        data.extend(std::iter::repeat(0x55).take(4096));
        data.extend(stored_frame(&[]));

        let config = DecoderConfig::new()
            .with_read_chunk_size(256)
            .with_max_resync_bytes(1024);
        let mut src = source(data, &config);
        assert!(src.next_frame().is_err());
        assert!(matches!(
            src.resync().unwrap(),
            ResyncOutcome::Exhausted { .. }
        ));
    }

    #[test]
    fn test_resync_hits_end_of_stream() {
        let data = vec![0x20, 0, 0xFF, 0xFF, 1, 2, 3, 4, 5];
        let mut src = source(data, &DecoderConfig::new());
        assert!(src.next_frame().is_err());
        assert_eq!(
            src.resync().unwrap(),
            ResyncOutcome::EndOfStream { skipped: 9 }
        );
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_empty_stream() {
        let mut src = source(Vec::new(), &DecoderConfig::new());
        assert!(src.next_frame().unwrap().is_none());
    }
}
