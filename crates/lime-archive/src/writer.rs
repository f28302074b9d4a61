//! Zip archive writer.
//!
//! Produces archives readable by [`ZipIndex`](crate::zip::ZipIndex) and by
//! ordinary zip tools. Offsets are written relative to the position the
//! writer started at, so an archive written after an executable's bytes is
//! a valid fused archive.

use std::collections::HashSet;
use std::io::{Seek, Write};

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use lime_common::error::{ArchiveError, ArchiveResult};
use lime_common::vpath;
use tracing::debug;

use crate::zip::{
    CompressionMethod, CENTRAL_HEADER_SIGNATURE, EOCD_SIGNATURE, LOCAL_HEADER_SIGNATURE,
};

/// Version needed to extract: 2.0 (deflate, directories).
const VERSION: u16 = 20;
/// General purpose flag: names are UTF-8.
const FLAG_UTF8: u16 = 0x0800;
/// DOS date for 1980-01-01 (entries carry no meaningful timestamp).
const DOS_DATE: u16 = (1 << 5) | 1;
/// MS-DOS directory attribute.
const ATTR_DIRECTORY: u32 = 0x10;

struct WrittenEntry {
    name: String,
    method: CompressionMethod,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    offset: u32,
    is_dir: bool,
}

/// Streaming zip writer.
pub struct ArchiveWriter<W: Write + Seek> {
    inner: W,
    start: u64,
    entries: Vec<WrittenEntry>,
    names: HashSet<String>,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    /// Create a writer whose archive begins at the current stream position.
    pub fn new(mut inner: W) -> ArchiveResult<Self> {
        let start = inner.stream_position()?;
        Ok(Self {
            inner,
            start,
            entries: Vec::new(),
            names: HashSet::new(),
        })
    }

    /// Number of entries written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a file entry.
    ///
    /// `Deflated` falls back to `Stored` when compression does not shrink the
    /// data.
    pub fn add_file(
        &mut self,
        name: &str,
        data: &[u8],
        method: CompressionMethod,
    ) -> ArchiveResult<()> {
        if let CompressionMethod::Other(id) = method {
            return Err(ArchiveError::Unsupported(format!(
                "writing compression method {id}"
            )));
        }
        let name = self.claim_name(name, false)?;

        let mut crc = Crc::new();
        crc.update(data);

        let (method, payload) = match method {
            CompressionMethod::Deflated => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                let compressed = encoder.finish()?;
                if compressed.len() < data.len() {
                    (CompressionMethod::Deflated, compressed)
                } else {
                    (CompressionMethod::Stored, data.to_vec())
                }
            },
            _ => (CompressionMethod::Stored, data.to_vec()),
        };

        let compressed_size = to_u32(payload.len() as u64, &name)?;
        let uncompressed_size = to_u32(data.len() as u64, &name)?;

        self.write_entry(
            WrittenEntry {
                name,
                method,
                crc32: crc.sum(),
                compressed_size,
                uncompressed_size,
                offset: 0,
                is_dir: false,
            },
            &payload,
        )
    }

    /// Add an explicit directory entry.
    pub fn add_directory(&mut self, name: &str) -> ArchiveResult<()> {
        let name = self.claim_name(name, true)?;
        self.write_entry(
            WrittenEntry {
                name,
                method: CompressionMethod::Stored,
                crc32: 0,
                compressed_size: 0,
                uncompressed_size: 0,
                offset: 0,
                is_dir: true,
            },
            &[],
        )
    }

    /// Write the central directory and return the underlying writer.
    pub fn finish(mut self) -> ArchiveResult<W> {
        let cd_start = self.relative_position()?;

        for entry in &self.entries {
            let w = &mut self.inner;
            put_u32(w, CENTRAL_HEADER_SIGNATURE)?;
            put_u16(w, VERSION)?;
            put_u16(w, VERSION)?;
            put_u16(w, FLAG_UTF8)?;
            put_u16(w, entry.method.to_u16())?;
            put_u16(w, 0)?;
            put_u16(w, DOS_DATE)?;
            put_u32(w, entry.crc32)?;
            put_u32(w, entry.compressed_size)?;
            put_u32(w, entry.uncompressed_size)?;
            put_u16(w, entry.name.len() as u16)?;
            put_u16(w, 0)?;
            put_u16(w, 0)?;
            put_u16(w, 0)?;
            put_u16(w, 0)?;
            put_u32(w, if entry.is_dir { ATTR_DIRECTORY } else { 0 })?;
            put_u32(w, entry.offset)?;
            w.write_all(entry.name.as_bytes())?;
        }

        let cd_end = self.relative_position()?;
        let count = u16::try_from(self.entries.len())
            .ok()
            .filter(|&n| n != u16::MAX)
            .ok_or_else(|| ArchiveError::Unsupported("more than 65534 entries".to_string()))?;
        let cd_size = to_u32(cd_end - cd_start, "central directory")?;
        let cd_offset = to_u32(cd_start, "central directory")?;

        let w = &mut self.inner;
        put_u32(w, EOCD_SIGNATURE)?;
        put_u16(w, 0)?;
        put_u16(w, 0)?;
        put_u16(w, count)?;
        put_u16(w, count)?;
        put_u32(w, cd_size)?;
        put_u32(w, cd_offset)?;
        put_u16(w, 0)?;
        w.flush()?;

        debug!("Wrote archive with {} entries", self.entries.len());
        Ok(self.inner)
    }

    fn claim_name(&mut self, name: &str, is_dir: bool) -> ArchiveResult<String> {
        let normal = vpath::normalize(name)?;
        if normal.is_empty() {
            return Err(ArchiveError::InvalidPath(name.to_string()));
        }
        let stored = if is_dir { format!("{normal}/") } else { normal };
        if stored.len() > u16::MAX as usize {
            return Err(ArchiveError::InvalidPath(name.to_string()));
        }
        if !self.names.insert(stored.clone()) {
            return Err(ArchiveError::InvalidPath(format!("duplicate entry {stored}")));
        }
        Ok(stored)
    }

    fn write_entry(&mut self, mut entry: WrittenEntry, payload: &[u8]) -> ArchiveResult<()> {
        entry.offset = to_u32(self.relative_position()?, &entry.name)?;

        let w = &mut self.inner;
        put_u32(w, LOCAL_HEADER_SIGNATURE)?;
        put_u16(w, VERSION)?;
        put_u16(w, FLAG_UTF8)?;
        put_u16(w, entry.method.to_u16())?;
        put_u16(w, 0)?;
        put_u16(w, DOS_DATE)?;
        put_u32(w, entry.crc32)?;
        put_u32(w, entry.compressed_size)?;
        put_u32(w, entry.uncompressed_size)?;
        put_u16(w, entry.name.len() as u16)?;
        put_u16(w, 0)?;
        w.write_all(entry.name.as_bytes())?;
        w.write_all(payload)?;

        self.entries.push(entry);
        Ok(())
    }

    fn relative_position(&mut self) -> ArchiveResult<u64> {
        Ok(self.inner.stream_position()? - self.start)
    }
}

fn to_u32(value: u64, what: &str) -> ArchiveResult<u32> {
    u32::try_from(value)
        .map_err(|_| ArchiveError::Unsupported(format!("ZIP64 sizes needed for {what}")))
}

fn put_u16<W: Write>(w: &mut W, value: u16) -> std::io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

fn put_u32<W: Write>(w: &mut W, value: u32) -> std::io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::{read_entry, ZipIndex};
    use std::io::Cursor;

    #[test]
    fn test_deflate_falls_back_to_stored() {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new())).expect("writer");
        writer
            .add_file("tiny.txt", b"ab", CompressionMethod::Deflated)
            .expect("add");
        let mut cursor = writer.finish().expect("finish");

        let index = ZipIndex::parse(&mut cursor).expect("parse").expect("present");
        assert_eq!(index.entries[0].method, CompressionMethod::Stored);
        assert_eq!(read_entry(&mut cursor, &index.entries[0]).expect("read"), b"ab");
    }

    #[test]
    fn test_duplicate_and_invalid_names_rejected() {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new())).expect("writer");
        writer
            .add_file("a.txt", b"1", CompressionMethod::Stored)
            .expect("first add");
        assert!(writer
            .add_file("./a.txt", b"2", CompressionMethod::Stored)
            .is_err());
        assert!(writer
            .add_file("../escape.txt", b"3", CompressionMethod::Stored)
            .is_err());
        assert!(writer.add_file("", b"4", CompressionMethod::Stored).is_err());
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn test_directory_entries() {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new())).expect("writer");
        writer.add_directory("assets").expect("dir");
        writer
            .add_file("assets/a.png", &[1, 2, 3], CompressionMethod::Stored)
            .expect("file");
        let mut cursor = writer.finish().expect("finish");

        let index = ZipIndex::parse(&mut cursor).expect("parse").expect("present");
        assert_eq!(index.entries[0].name, "assets/");
        assert!(index.entries[0].is_dir());
        assert!(!index.entries[1].is_dir());
    }

    #[test]
    fn test_writing_other_method_fails() {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new())).expect("writer");
        let err = writer
            .add_file("x", b"data", CompressionMethod::Other(14))
            .expect_err("must fail");
        assert!(matches!(err, ArchiveError::Unsupported(_)));
        assert!(writer.is_empty());
    }
}
