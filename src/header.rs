// Sources:
// - https://github.com/libyal/libmsiecf/blob/main/documentation/MSIE%20Cache%20File%20(index.dat)%20format.asciidoc

//! Parse the fixed header found at offset 0 of an index.dat file.

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{self, Cursor, Read, Seek, SeekFrom};

/// Declared logical size of the file (u32 LE).
pub const FILE_SIZE_OFFSET: u64 = 0x1C;
/// Offset of the first hash-directory block (u32 LE).
pub const HASH_ROOT_OFFSET: u64 = 0x20;
/// Minimum number of bytes the decoder needs from the header.
pub const MIN_HEADER_LEN: usize = 0x24;
/// Full length of the header, cache directory table excluded.
pub const FULL_HEADER_LEN: usize = 0x50;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileHeader {
    pub signature: String,     // 0x00 "Client UrlCache MMF Ver 5.2"
    pub file_size: u32,        // 0x1C
    pub hash_root_offset: u32, // 0x20
    /* -- only present when the header is complete ----------- */
    pub total_blocks: Option<u32>,     // 0x24
    pub allocated_blocks: Option<u32>, // 0x28
    pub cache_size_limit: Option<u64>, // 0x30
    pub cache_size: Option<u64>,       // 0x40
    pub directory_count: Option<u32>,  // 0x4C
}

impl FileHeader {
    pub const SIGNATURE: &'static [u8] = b"Client UrlCache MMF Ver ";
    pub const SUPPORTED_VERSION: &'static str = "5.2";

    /// Parse the header from the first bytes of the file.
    pub fn from_bytes(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < MIN_HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "index.dat header needs at least 0x24 bytes",
            ));
        }
        let mut c = Cursor::new(buf);

        let mut raw_sig = [0u8; 28];
        c.read_exact(&mut raw_sig)?;
        let sig_end = raw_sig.iter().position(|&b| b == 0).unwrap_or(raw_sig.len());
        let signature = crate::text::sanitize(&raw_sig[..sig_end]);

        let file_size = c.read_u32::<LittleEndian>()?;
        let hash_root_offset = c.read_u32::<LittleEndian>()?;

        let complete = buf.len() >= FULL_HEADER_LEN;
        let (total_blocks, allocated_blocks, cache_size_limit, cache_size, directory_count) =
            if complete {
                let total = c.read_u32::<LittleEndian>()?;
                let allocated = c.read_u32::<LittleEndian>()?;
                c.seek(SeekFrom::Start(0x30))?;
                let limit = c.read_u64::<LittleEndian>()?;
                c.seek(SeekFrom::Start(0x40))?;
                let size = c.read_u64::<LittleEndian>()?;
                c.seek(SeekFrom::Start(0x4C))?;
                let dirs = c.read_u32::<LittleEndian>()?;
                (Some(total), Some(allocated), Some(limit), Some(size), Some(dirs))
            } else {
                debug!("Short header ({} bytes), optional fields skipped.", buf.len());
                (None, None, None, None, None)
            };

        let header = Self {
            signature,
            file_size,
            hash_root_offset,
            total_blocks,
            allocated_blocks,
            cache_size_limit,
            cache_size,
            directory_count,
        };
        if !header.signature_is_valid() {
            warn!(
                "Unexpected header signature '{}', decoding anyway.",
                header.signature
            );
        }
        Ok(header)
    }

    /// Check the signature prefix and the format version we know how to read.
    pub fn signature_is_valid(&self) -> bool {
        let prefix = String::from_utf8_lossy(Self::SIGNATURE);
        self.signature
            .strip_prefix(prefix.as_ref())
            .is_some_and(|v| v == Self::SUPPORTED_VERSION)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }

    pub fn to_string(&self) -> String {
        let opt = |v: Option<u64>| v.map_or("-".to_string(), |v| v.to_string());
        let mut t = Table::new();
        t.add_row(row!["index.dat Header"]);
        t.add_row(row![b -> "Signature", self.signature]);
        t.add_row(row![b -> "File Size", format!("0x{:X}", self.file_size)]);
        t.add_row(row![b -> "Hash Directory", format!("0x{:X}", self.hash_root_offset)]);
        t.add_row(row![b -> "Total Blocks", opt(self.total_blocks.map(u64::from))]);
        t.add_row(row![b -> "Allocated Blocks", opt(self.allocated_blocks.map(u64::from))]);
        t.add_row(row![b -> "Cache Size Limit", opt(self.cache_size_limit)]);
        t.add_row(row![b -> "Cache Size", opt(self.cache_size)]);
        t.add_row(row![b -> "Cache Directories", opt(self.directory_count.map(u64::from))]);
        t.to_string()
    }
}
