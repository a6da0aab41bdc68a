use crate::error::{IndexDatError, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::warn;
use std::io::{Read, Seek, SeekFrom};

/// Bounds-checked positioned reader over an index.dat body.
///
/// The logical size comes from the file header, not from the OS. It is
/// only lowered when the body is physically shorter than it claims.
#[derive(Debug)]
pub struct ByteSource<T: Read + Seek> {
    body: T,
    size: u64,
}

impl<T: Read + Seek> ByteSource<T> {
    pub fn new(mut body: T, declared_size: u64) -> Result<Self> {
        let physical = body.seek(SeekFrom::End(0))?;
        let size = if declared_size > physical {
            warn!(
                "Header declares 0x{:X} bytes but only 0x{:X} are present, clamping.",
                declared_size, physical
            );
            physical
        } else {
            declared_size
        };
        Ok(Self { body, size })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read exactly `length` bytes at `offset`, or fail with `OutOfBounds`.
    pub fn read(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let end = offset.checked_add(length as u64);
        if end.is_none_or(|end| end > self.size) {
            return Err(IndexDatError::OutOfBounds {
                offset,
                length,
                size: self.size,
            });
        }
        self.body.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length];
        self.body.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read up to `max` bytes at `offset`, stopping early at end of file.
    /// Returns an empty buffer when `offset` is already past the end.
    pub fn read_clamped(&mut self, offset: u64, max: u64) -> Result<Vec<u8>> {
        if offset >= self.size {
            return Ok(Vec::new());
        }
        let available = self.size - offset;
        self.read(offset, max.min(available) as usize)
    }

    pub fn read_u8(&mut self, offset: u64) -> Result<u8> {
        Ok(self.read(offset, 1)?[0])
    }

    pub fn read_u32(&mut self, offset: u64) -> Result<u32> {
        Ok(LittleEndian::read_u32(&self.read(offset, 4)?))
    }

    pub fn read_u64(&mut self, offset: u64) -> Result<u64> {
        Ok(LittleEndian::read_u64(&self.read(offset, 8)?))
    }
}
