use crate::source::ByteSource;
use log::debug;
use std::io::{Read, Seek};

/// First cache directory entry.
pub const DIRECTORY_TABLE_OFFSET: u64 = 0x50;
/// Bytes between two consecutive entries.
pub const DIRECTORY_ENTRY_STRIDE: u64 = 12;
/// Fixed width of a directory name.
pub const DIRECTORY_NAME_LEN: usize = 8;

/// Resolve the cache directory name stored at `index`.
///
/// An index whose entry does not fit in the file resolves to an empty name.
pub fn lookup<T: Read + Seek>(source: &mut ByteSource<T>, index: u8) -> String {
    let offset = DIRECTORY_TABLE_OFFSET + DIRECTORY_ENTRY_STRIDE * index as u64;
    if offset + DIRECTORY_NAME_LEN as u64 >= source.size() {
        debug!("Directory index {} (0x{:X}) is outside the file.", index, offset);
        return String::new();
    }
    match source.read(offset, DIRECTORY_NAME_LEN) {
        Ok(raw) => {
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            crate::text::sanitize(&raw[..end])
        }
        Err(e) => {
            debug!("Directory index {} unreadable: {}", index, e);
            String::new()
        }
    }
}
