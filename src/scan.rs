//! Candidate record offsets: hash-directory walk (active records) or a
//! block-by-block sweep (deleted records).

use crate::header::HASH_ROOT_OFFSET;
use crate::record::BLOCK_SIZE;
use crate::source::ByteSource;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Read, Seek};

/// Slot entries start this far into a hash block.
pub const HASH_SLOTS_OFFSET: u64 = 16;
pub const HASH_SLOT_SIZE: u64 = 8;
/// Flag byte of a slot that does not point at a live record.
pub const SLOT_FLAG_UNUSED: u8 = 0x03;
/// Record offset of a never-used slot.
pub const SLOT_BADFOOD: u32 = 0x0BAD_F00D;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum ScanMode {
    /// Records reachable from the hash directory.
    #[default]
    Active,
    /// Every block-aligned offset, to recover unlinked records.
    Deleted,
}

/// Anything that produces record offsets to decode, in file order of discovery.
pub trait CandidateSource {
    fn next_candidate<T: Read + Seek>(&mut self, source: &mut ByteSource<T>) -> Option<u64>;
}

/// Follows the linked list of hash blocks rooted at 0x20.
///
/// Each block is entered at most once, so a corrupted `next` pointer that
/// loops back ends the walk instead of spinning forever.
#[derive(Debug, Default)]
pub struct HashDirectoryWalker {
    started: bool,
    pending_block: u64,
    slot: u64,
    slot_end: u64,
    visited: HashSet<u64>,
}

impl HashDirectoryWalker {
    pub fn new() -> Self {
        Self::default()
    }

    fn stop(&mut self) {
        self.pending_block = 0;
        self.slot = 0;
        self.slot_end = 0;
    }

    /// Load the next block header. Returns false when the walk is over.
    fn enter_block<T: Read + Seek>(&mut self, source: &mut ByteSource<T>) -> bool {
        let block = self.pending_block;
        if block == 0 {
            return false;
        }
        if !self.visited.insert(block) {
            warn!("Hash block 0x{:X} already visited, stopping the walk.", block);
            self.stop();
            return false;
        }

        let header = source
            .read_u32(block + 4)
            .and_then(|units| source.read_u32(block + 8).map(|next| (units, next)));
        let (units, next) = match header {
            Ok(h) => h,
            Err(e) => {
                warn!("Hash block 0x{:X} header unreadable: {}", block, e);
                self.stop();
                return false;
            }
        };
        if let Ok(sig) = source.read(block, 4) {
            if sig != b"HASH" {
                debug!(
                    "Hash block 0x{:X} has signature '{}'.",
                    block,
                    crate::text::sanitize(&sig)
                );
            }
        }

        self.pending_block = next as u64;
        let length = units as u64 * BLOCK_SIZE;
        if length == 0 {
            warn!("Hash block 0x{:X} declares a zero length, skipping it.", block);
        }
        debug!(
            "Hash block 0x{:X}: 0x{:X} bytes, next 0x{:X}",
            block, length, next
        );
        self.slot = block + HASH_SLOTS_OFFSET;
        self.slot_end = (block + length).min(source.size());
        true
    }
}

impl CandidateSource for HashDirectoryWalker {
    fn next_candidate<T: Read + Seek>(&mut self, source: &mut ByteSource<T>) -> Option<u64> {
        if !self.started {
            self.started = true;
            match source.read_u32(HASH_ROOT_OFFSET) {
                Ok(root) => self.pending_block = root as u64,
                Err(e) => {
                    warn!("Hash directory root unreadable: {}", e);
                    return None;
                }
            }
        }
        loop {
            if self.slot + HASH_SLOT_SIZE > self.slot_end {
                if !self.enter_block(source) {
                    return None;
                }
                continue;
            }
            let slot = self.slot;
            self.slot += HASH_SLOT_SIZE;

            let entry = match source.read(slot, HASH_SLOT_SIZE as usize) {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Hash slot 0x{:X} unreadable: {}", slot, e);
                    continue;
                }
            };
            let flag = entry[0];
            let record = u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]);
            if flag == SLOT_FLAG_UNUSED || record == SLOT_BADFOOD || record == 0 {
                continue;
            }
            return Some(record as u64);
        }
    }
}

/// Yields every block-aligned offset from 0 up to the file size.
#[derive(Debug, Default)]
pub struct LinearBlockScanner {
    next: u64,
}

impl LinearBlockScanner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CandidateSource for LinearBlockScanner {
    fn next_candidate<T: Read + Seek>(&mut self, source: &mut ByteSource<T>) -> Option<u64> {
        if self.next >= source.size() {
            return None;
        }
        let offset = self.next;
        self.next += BLOCK_SIZE;
        Some(offset)
    }
}

/// The candidate source selected by a [`ScanMode`].
#[derive(Debug)]
pub enum Candidates {
    Active(HashDirectoryWalker),
    Deleted(LinearBlockScanner),
}

impl Candidates {
    pub fn new(mode: ScanMode) -> Self {
        match mode {
            ScanMode::Active => Candidates::Active(HashDirectoryWalker::new()),
            ScanMode::Deleted => Candidates::Deleted(LinearBlockScanner::new()),
        }
    }
}

impl CandidateSource for Candidates {
    fn next_candidate<T: Read + Seek>(&mut self, source: &mut ByteSource<T>) -> Option<u64> {
        match self {
            Candidates::Active(w) => w.next_candidate(source),
            Candidates::Deleted(s) => s.next_candidate(source),
        }
    }
}
