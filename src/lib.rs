// Sources:
// - https://github.com/libyal/libmsiecf/blob/main/documentation/MSIE%20Cache%20File%20(index.dat)%20format.asciidoc

use std::io::{Read, Seek, SeekFrom};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use error::{IndexDatError, Result};
use header::{FULL_HEADER_LEN, FileHeader, MIN_HEADER_LEN};
use record::{DecodedRecord, NormalizedRecord, decode_record};
use scan::{CandidateSource, Candidates, ScanMode};
use source::ByteSource;
use timestamp::TimestampFormat;

pub mod directory;
pub mod error;
pub mod header;
pub mod output;
pub mod record;
pub mod scan;
pub mod source;
pub mod text;
pub mod timestamp;

/// What to scan and how to render timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct ScanOptions {
    pub mode: ScanMode,
    pub format: TimestampFormat,
}

#[derive(Debug)]
pub struct IndexDat<T: Read + Seek> {
    pub header: FileHeader,
    source: ByteSource<T>,
}

impl<T: Read + Seek> IndexDat<T> {
    /// Open an index.dat body and parse its header.
    pub fn new(mut body: T) -> Result<Self> {
        let physical = body.seek(SeekFrom::End(0))?;
        if physical < MIN_HEADER_LEN as u64 {
            return Err(IndexDatError::TooSmall(physical));
        }
        body.seek(SeekFrom::Start(0))?;
        let mut raw = vec![0u8; physical.min(FULL_HEADER_LEN as u64) as usize];
        body.read_exact(&mut raw)?;
        let header = FileHeader::from_bytes(&raw)?;
        info!(
            "index.dat declares 0x{:X} bytes, hash directory at 0x{:X}",
            header.file_size, header.hash_root_offset
        );
        let source = ByteSource::new(body, header.file_size as u64)?;
        Ok(Self { header, source })
    }

    /// Logical size used for every bounds check.
    pub fn size(&self) -> u64 {
        self.source.size()
    }

    /// Lazily decode one record per candidate offset. Calling this again
    /// starts a fresh scan.
    pub fn records(&mut self, options: ScanOptions) -> Records<'_, T> {
        Records::new(&mut self.source, options)
    }

    /// Decode the single record at `offset`.
    pub fn record_at(&mut self, offset: u64, format: TimestampFormat) -> DecodedRecord {
        decode_record(&mut self.source, offset, format)
    }

    /// Candidate offsets a scan in `mode` would visit.
    pub fn candidate_offsets(&mut self, mode: ScanMode) -> Vec<u64> {
        let mut candidates = Candidates::new(mode);
        std::iter::from_fn(|| candidates.next_candidate(&mut self.source)).collect()
    }
}

/// Record stream over a [`ByteSource`], in candidate discovery order.
pub struct Records<'a, T: Read + Seek> {
    source: &'a mut ByteSource<T>,
    candidates: Candidates,
    format: TimestampFormat,
    decoded: usize,
}

impl<'a, T: Read + Seek> Records<'a, T> {
    pub fn new(source: &'a mut ByteSource<T>, options: ScanOptions) -> Self {
        debug!("Starting {:?} scan.", options.mode);
        Self {
            source,
            candidates: Candidates::new(options.mode),
            format: options.format,
            decoded: 0,
        }
    }
}

impl<T: Read + Seek> Iterator for Records<'_, T> {
    type Item = NormalizedRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(offset) = self.candidates.next_candidate(self.source) else {
            debug!("Scan finished after {} candidates.", self.decoded);
            return None;
        };
        self.decoded += 1;
        Some(decode_record(self.source, offset, self.format).record)
    }
}
