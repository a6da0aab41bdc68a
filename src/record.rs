// Sources:
// - https://github.com/libyal/libmsiecf/blob/main/documentation/MSIE%20Cache%20File%20(index.dat)%20format.asciidoc

//! Activity record decoding.
//!
//! Every decoder reads through a [`ByteSource`] with explicit offsets. A bad
//! field never fails the record: it is blanked and reported as a
//! [`Corruption`] next to the decoded record.

use crate::directory;
use crate::error::Result;
use crate::source::ByteSource;
use crate::text::sanitize;
use crate::timestamp::{FileTime, TimestampFormat};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::io::{Read, Seek};

/// Allocation unit of the format. Record and block lengths count these.
pub const BLOCK_SIZE: u64 = 0x80;

/* Offsets relative to the start of a record */
const LENGTH_UNITS: u64 = 0x04;
const REDR_URL: u64 = 0x10;
const URL_MODIFIED: u64 = 0x08;
const URL_ACCESSED: u64 = 0x10;
const URL_URL_OFFSET: u64 = 0x34;
const URL_DIRECTORY_INDEX: u64 = 0x39;
const URL_FILENAME_OFFSET: u64 = 0x3C;
const URL_HEADERS_OFFSET: u64 = 0x44;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum RecordKind {
    Redirect,
    Url,
    Leak,
    #[default]
    Unknown,
}

impl RecordKind {
    pub fn from_tag(tag: &[u8]) -> Self {
        match tag {
            b"REDR" => RecordKind::Redirect,
            b"LEAK" => RecordKind::Leak,
            [b'U', b'R', b'L', _] => RecordKind::Url,
            _ => RecordKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum CorruptionKind {
    /// A string used its whole length budget without a terminator.
    Truncated,
    /// A fixed field or string start lies outside the file.
    OutOfBounds,
}

/// Diagnostic for one damaged field of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Corruption {
    pub decoder: &'static str,
    pub field: &'static str,
    pub record_offset: u64,
    pub kind: CorruptionKind,
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CorruptionKind::Truncated => write!(
                f,
                "corrupted data or unknown structure in {} record, {} field: offset: 0x{:x}",
                self.decoder, self.field, self.record_offset
            ),
            CorruptionKind::OutOfBounds => write!(
                f,
                "{} field of {} record lies outside the file: offset: 0x{:x}",
                self.field, self.decoder, self.record_offset
            ),
        }
    }
}

/// One emitted row. All strings are already sanitized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct NormalizedRecord {
    pub offset: u64,
    pub kind: RecordKind,
    pub record_type: String,
    pub url: String,
    pub modified: String,
    pub accessed: String,
    pub filename: String,
    pub directory: String,
    pub http_headers: String,
}

impl NormalizedRecord {
    pub fn is_unknown(&self) -> bool {
        self.kind == RecordKind::Unknown
    }

    /// Fields in column order.
    pub fn fields(&self) -> [&str; 7] {
        [
            self.record_type.as_str(),
            self.url.as_str(),
            self.modified.as_str(),
            self.accessed.as_str(),
            self.filename.as_str(),
            self.directory.as_str(),
            self.http_headers.as_str(),
        ]
    }

    pub fn to_json(&self) -> Value {
        json!({
            "offset": self.offset,
            "type": self.record_type,
            "url": self.url,
            "modified": self.modified,
            "accessed": self.accessed,
            "filename": self.filename,
            "directory": self.directory,
            "http_headers": self.http_headers,
        })
    }
}

/// A decoded record together with the problems met while decoding it.
#[derive(Debug, Clone, Default)]
pub struct DecodedRecord {
    pub record: NormalizedRecord,
    pub corruptions: Vec<Corruption>,
}

/// Result of a bounded C-string scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedString {
    pub value: String,
    pub truncated: bool,
}

/// Read a NUL-terminated string at `start`, looking at no more than
/// `max_length` bytes and never past the end of the file.
///
/// The string is `truncated` when all `max_length` bytes were consumed
/// without meeting a terminator; the bytes read so far are still returned.
/// Hitting end of file first is not a truncation.
pub fn read_bounded_cstring<T: Read + Seek>(
    source: &mut ByteSource<T>,
    start: u64,
    max_length: u64,
) -> Result<BoundedString> {
    let raw = source.read_clamped(start, max_length)?;
    Ok(match raw.iter().position(|&b| b == 0) {
        Some(end) => BoundedString {
            value: sanitize(&raw[..end]),
            truncated: false,
        },
        None => BoundedString {
            value: sanitize(&raw),
            truncated: raw.len() as u64 == max_length,
        },
    })
}

/// Field reader bound to one record, collecting corruptions as it goes.
struct RecordReader<'a, T: Read + Seek> {
    source: &'a mut ByteSource<T>,
    start: u64,
    decoder: &'static str,
    corruptions: Vec<Corruption>,
}

impl<'a, T: Read + Seek> RecordReader<'a, T> {
    fn new(source: &'a mut ByteSource<T>, start: u64, decoder: &'static str) -> Self {
        Self {
            source,
            start,
            decoder,
            corruptions: Vec::new(),
        }
    }

    fn report(&mut self, field: &'static str, kind: CorruptionKind) {
        self.corruptions.push(Corruption {
            decoder: self.decoder,
            field,
            record_offset: self.start,
            kind,
        });
    }

    fn at(&self, rel: u64) -> u64 {
        self.start.saturating_add(rel)
    }

    fn u8(&mut self, rel: u64, field: &'static str) -> u8 {
        let off = self.at(rel);
        self.source.read_u8(off).unwrap_or_else(|_| {
            self.report(field, CorruptionKind::OutOfBounds);
            0
        })
    }

    fn u32(&mut self, rel: u64, field: &'static str) -> u32 {
        let off = self.at(rel);
        self.source.read_u32(off).unwrap_or_else(|_| {
            self.report(field, CorruptionKind::OutOfBounds);
            0
        })
    }

    fn u64(&mut self, rel: u64, field: &'static str) -> u64 {
        let off = self.at(rel);
        self.source.read_u64(off).unwrap_or_else(|_| {
            self.report(field, CorruptionKind::OutOfBounds);
            0
        })
    }

    /// Declared record length in bytes.
    fn record_length(&mut self) -> u64 {
        let units = self.u32(LENGTH_UNITS, "length");
        let length = units as u64 * BLOCK_SIZE;
        if length > self.source.size() {
            debug!(
                "Record at 0x{:X} claims 0x{:X} bytes, more than the whole file.",
                self.start, length
            );
        }
        length
    }

    fn cstring(&mut self, rel: u64, max_length: u64, field: &'static str) -> String {
        let off = self.at(rel);
        match read_bounded_cstring(self.source, off, max_length) {
            Ok(s) => {
                if s.truncated {
                    self.report(field, CorruptionKind::Truncated);
                }
                s.value
            }
            Err(e) => {
                debug!("{} field at 0x{:X} unreadable: {}", field, off, e);
                self.report(field, CorruptionKind::OutOfBounds);
                String::new()
            }
        }
    }

    fn finish(self, record: NormalizedRecord) -> DecodedRecord {
        for c in &self.corruptions {
            warn!("{}", c);
        }
        DecodedRecord {
            record,
            corruptions: self.corruptions,
        }
    }
}

/// Decode the record starting at `offset`, dispatching on its type tag.
///
/// Always returns a record: unreadable or unrecognised tags give an empty
/// record of kind [`RecordKind::Unknown`].
pub fn decode_record<T: Read + Seek>(
    source: &mut ByteSource<T>,
    offset: u64,
    format: TimestampFormat,
) -> DecodedRecord {
    let tag = match source.read(offset, 4) {
        Ok(tag) => tag,
        Err(e) => {
            debug!("No type tag at 0x{:X}: {}", offset, e);
            return decode_unknown(offset);
        }
    };
    match RecordKind::from_tag(&tag) {
        RecordKind::Redirect => decode_redirect(source, offset),
        kind @ (RecordKind::Url | RecordKind::Leak) => {
            decode_url(source, offset, &tag, kind, format)
        }
        RecordKind::Unknown => decode_unknown(offset),
    }
}

/// REDR: a bare URL at +0x10, nothing else.
pub fn decode_redirect<T: Read + Seek>(source: &mut ByteSource<T>, offset: u64) -> DecodedRecord {
    let mut r = RecordReader::new(source, offset, "redirect");
    let length = r.record_length();
    let url = r.cstring(REDR_URL, length, "url");
    r.finish(NormalizedRecord {
        offset,
        kind: RecordKind::Redirect,
        record_type: "REDR".to_string(),
        url,
        ..Default::default()
    })
}

/// URL / LEAK: timestamps, URL, cache file name, cache directory and headers.
pub fn decode_url<T: Read + Seek>(
    source: &mut ByteSource<T>,
    offset: u64,
    tag: &[u8],
    kind: RecordKind,
    format: TimestampFormat,
) -> DecodedRecord {
    let mut r = RecordReader::new(source, offset, "url");
    let length = r.record_length();

    let modified = FileTime::from_raw(r.u64(URL_MODIFIED, "modified time")).render(format);
    let accessed = FileTime::from_raw(r.u64(URL_ACCESSED, "access time")).render(format);

    let url_offset = r.u8(URL_URL_OFFSET, "url offset");
    let url = r.cstring(url_offset as u64, length, "url");

    let filename_offset = r.u32(URL_FILENAME_OFFSET, "filename offset");
    let filename = r.cstring(filename_offset as u64, length, "filename");

    let dir_index = r.u8(URL_DIRECTORY_INDEX, "directory index");
    let directory = directory::lookup(r.source, dir_index);

    let headers_offset = r.u32(URL_HEADERS_OFFSET, "httpheaders offset");
    let http_headers = r.cstring(headers_offset as u64, length, "httpheaders");

    let mut record_type = sanitize(tag);
    if record_type.as_bytes().get(3) == Some(&b' ') {
        record_type.truncate(3);
    }

    r.finish(NormalizedRecord {
        offset,
        kind,
        record_type,
        url,
        modified,
        accessed,
        filename,
        directory,
        http_headers,
    })
}

/// Anything else: an empty record, no further reads.
pub fn decode_unknown(offset: u64) -> DecodedRecord {
    DecodedRecord {
        record: NormalizedRecord {
            offset,
            ..Default::default()
        },
        corruptions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::{EPOCH_DELTA_SECONDS, OVERFLOW_MARKER, TICKS_PER_SECOND};
    use std::io::Cursor;

    const REC: usize = 0x200;

    fn put_u32(buf: &mut [u8], off: usize, v: u32) {
        buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn put_u64(buf: &mut [u8], off: usize, v: u64) {
        buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
    }

    fn put_str(buf: &mut [u8], off: usize, s: &[u8]) {
        buf[off..off + s.len()].copy_from_slice(s);
    }

    fn source(buf: Vec<u8>) -> ByteSource<Cursor<Vec<u8>>> {
        let size = buf.len() as u64;
        ByteSource::new(Cursor::new(buf), size).unwrap()
    }

    /// A URL record at REC with url at +0x68, filename at +0x90, headers at +0xA0.
    fn url_record(tag: &[u8; 4], units: u32) -> Vec<u8> {
        let mut buf = vec![0u8; 0x400];
        put_str(&mut buf, 0x50, b"DIRNAME1");
        put_str(&mut buf, REC, tag);
        put_u32(&mut buf, REC + 4, units);
        buf[REC + 0x34] = 0x68;
        buf[REC + 0x39] = 0;
        put_u32(&mut buf, REC + 0x3C, 0x90);
        put_u32(&mut buf, REC + 0x44, 0xA0);
        put_str(&mut buf, REC + 0x68, b"Visited: bob@http://example.com/\0");
        put_str(&mut buf, REC + 0x90, b"index[1].htm\0");
        put_str(&mut buf, REC + 0xA0, b"HTTP/1.1 200 OK\r\n\0");
        buf
    }

    #[test]
    fn test_bounded_cstring_terminated() {
        let mut src = source(b"abc\0def".to_vec());
        let s = read_bounded_cstring(&mut src, 0, 16).unwrap();
        assert_eq!(s, BoundedString { value: "abc".into(), truncated: false });
    }

    #[test]
    fn test_bounded_cstring_truncated() {
        let mut src = source(b"abcdefgh\0".to_vec());
        let s = read_bounded_cstring(&mut src, 0, 4).unwrap();
        assert_eq!(s.value, "abcd");
        assert!(s.truncated);
    }

    #[test]
    fn test_bounded_cstring_stops_at_eof() {
        let mut src = source(b"abcdef".to_vec());
        let s = read_bounded_cstring(&mut src, 2, 100).unwrap();
        assert_eq!(s.value, "cdef");
        assert!(!s.truncated);
        let s = read_bounded_cstring(&mut src, 50, 100).unwrap();
        assert_eq!(s.value, "");
        assert!(!s.truncated);
    }

    #[test]
    fn test_bounded_cstring_zero_budget() {
        let mut src = source(b"abc\0".to_vec());
        let s = read_bounded_cstring(&mut src, 0, 0).unwrap();
        assert_eq!(s.value, "");
    }

    #[test]
    fn test_redirect() {
        let mut buf = vec![0u8; 0x300];
        put_str(&mut buf, 0x100, b"REDR");
        put_u32(&mut buf, 0x104, 1);
        put_str(&mut buf, 0x110, b"http://redirect.example/\x01x\0junk");
        let mut src = source(buf);
        let d = decode_record(&mut src, 0x100, TimestampFormat::Iso8601);
        assert!(d.corruptions.is_empty());
        assert_eq!(d.record.kind, RecordKind::Redirect);
        assert_eq!(d.record.record_type, "REDR");
        assert_eq!(d.record.url, "http://redirect.example/ x");
        assert_eq!(d.record.fields()[2..], ["", "", "", "", ""]);
    }

    #[test]
    fn test_redirect_truncated_url() {
        let mut buf = vec![0u8; 0x300];
        put_str(&mut buf, 0x100, b"REDR");
        put_u32(&mut buf, 0x104, 1);
        for b in &mut buf[0x110..0x200] {
            *b = b'a';
        }
        let mut src = source(buf);
        let d = decode_record(&mut src, 0x100, TimestampFormat::Calendar);
        assert_eq!(d.record.url.len(), 0x80);
        assert_eq!(d.corruptions.len(), 1);
        assert_eq!(d.corruptions[0].field, "url");
        assert_eq!(d.corruptions[0].kind, CorruptionKind::Truncated);
        assert_eq!(d.corruptions[0].record_offset, 0x100);
        assert!(d.corruptions[0].to_string().contains("offset: 0x100"));
    }

    #[test]
    fn test_url_record_fields() {
        let mut buf = url_record(b"URL ", 2);
        let secs = 1_079_079_300i64 + EPOCH_DELTA_SECONDS;
        put_u64(&mut buf, REC + 8, (secs * TICKS_PER_SECOND) as u64);
        let mut src = source(buf);
        let d = decode_record(&mut src, REC as u64, TimestampFormat::Iso8601);
        assert!(d.corruptions.is_empty(), "{:?}", d.corruptions);
        let r = d.record;
        assert_eq!(r.kind, RecordKind::Url);
        assert_eq!(r.record_type, "URL");
        assert_eq!(r.url, "Visited: bob@http://example.com/");
        assert!(r.modified.starts_with("2004-03-1"));
        assert_eq!(r.accessed, "");
        assert_eq!(r.filename, "index[1].htm");
        assert_eq!(r.directory, "DIRNAME1");
        assert_eq!(r.http_headers, "HTTP/1.1 200 OK  ");
        assert_eq!(r.to_json()["type"], "URL");
    }

    #[test]
    fn test_leak_keeps_full_tag() {
        let mut src = source(url_record(b"LEAK", 2));
        let d = decode_record(&mut src, REC as u64, TimestampFormat::Calendar);
        assert_eq!(d.record.kind, RecordKind::Leak);
        assert_eq!(d.record.record_type, "LEAK");
    }

    #[test]
    fn test_pre_epoch_timestamp_overflows() {
        let mut buf = url_record(b"URL ", 2);
        put_u64(&mut buf, REC + 16, 1);
        let mut src = source(buf);
        let d = decode_record(&mut src, REC as u64, TimestampFormat::Calendar);
        assert_eq!(d.record.accessed, OVERFLOW_MARKER);
        assert_eq!(d.record.modified, "");
    }

    #[test]
    fn test_zero_length_record() {
        let mut src = source(url_record(b"URL ", 0));
        let d = decode_record(&mut src, REC as u64, TimestampFormat::Calendar);
        assert_eq!(d.record.url, "");
        assert_eq!(d.record.filename, "");
        assert_eq!(d.record.http_headers, "");
        assert_eq!(d.record.directory, "DIRNAME1");
        // a zero budget is spent before any terminator is seen
        assert_eq!(d.corruptions.len(), 3);
    }

    #[test]
    fn test_each_truncated_field_reported() {
        let mut buf = url_record(b"URL ", 1);
        // headers at +0xA0 would run 0x80 bytes without a NUL
        for b in &mut buf[REC + 0xA0..REC + 0x120] {
            *b = b'H';
        }
        let mut src = source(buf);
        let d = decode_record(&mut src, REC as u64, TimestampFormat::Calendar);
        assert_eq!(d.record.http_headers.len(), 0x80);
        let fields: Vec<_> = d.corruptions.iter().map(|c| c.field).collect();
        assert_eq!(fields, vec!["httpheaders"]);
    }

    #[test]
    fn test_string_offset_past_eof() {
        let mut buf = url_record(b"URL ", 2);
        put_u32(&mut buf, REC + 0x3C, 0xFFFF_0000);
        let mut src = source(buf);
        let d = decode_record(&mut src, REC as u64, TimestampFormat::Calendar);
        assert_eq!(d.record.filename, "");
        assert!(d.corruptions.is_empty());
    }

    #[test]
    fn test_all_string_offsets_past_eof() {
        let mut buf = url_record(b"LEAK", 2);
        buf[REC + 0x34] = 0xFF;
        put_u32(&mut buf, REC + 0x3C, 0x1000);
        put_u32(&mut buf, REC + 0x44, 0xFFFF_FF00);
        let mut src = source(buf);
        let d = decode_record(&mut src, REC as u64, TimestampFormat::Calendar);
        // +0xFF stays inside the 0x400 byte file, the other two do not
        assert_eq!(d.record.filename, "");
        assert_eq!(d.record.http_headers, "");
        assert_eq!(d.record.directory, "DIRNAME1");
        assert!(d.corruptions.is_empty(), "{:?}", d.corruptions);

        let s = read_bounded_cstring(&mut src, 0x400, 0x80).unwrap();
        assert_eq!(s, BoundedString { value: String::new(), truncated: false });
    }

    #[test]
    fn test_record_cut_by_eof() {
        // tag and length fit, the timestamps do not
        let mut buf = vec![0u8; 0x108];
        put_str(&mut buf, 0x100, b"URL ");
        put_u32(&mut buf, 0x104, 1);
        let mut src = source(buf);
        let d = decode_record(&mut src, 0x100, TimestampFormat::Calendar);
        assert_eq!(d.record.record_type, "URL");
        assert!(
            d.corruptions
                .iter()
                .any(|c| c.field == "modified time" && c.kind == CorruptionKind::OutOfBounds)
        );
    }

    #[test]
    fn test_unknown_and_unreadable_tags() {
        let mut buf = vec![0u8; 0x100];
        put_str(&mut buf, 0x80, b"HASH");
        let mut src = source(buf);
        let d = decode_record(&mut src, 0x80, TimestampFormat::Calendar);
        assert!(d.record.is_unknown());
        assert_eq!(d.record.record_type, "");
        assert_eq!(d.record.offset, 0x80);
        let d = decode_record(&mut src, 0xFFFF_FFFF, TimestampFormat::Calendar);
        assert!(d.record.is_unknown());
    }

    #[test]
    fn test_kind_from_tag() {
        assert_eq!(RecordKind::from_tag(b"URL "), RecordKind::Url);
        assert_eq!(RecordKind::from_tag(b"URLX"), RecordKind::Url);
        assert_eq!(RecordKind::from_tag(b"LEAK"), RecordKind::Leak);
        assert_eq!(RecordKind::from_tag(b"REDR"), RecordKind::Redirect);
        assert_eq!(RecordKind::from_tag(b"LEAX"), RecordKind::Unknown);
        assert_eq!(RecordKind::from_tag(b"URL"), RecordKind::Unknown);
    }
}
