//! Zip container format.
//!
//! Reads the central directory of a zip archive that may sit at the end of
//! another file (a "fused" archive). All offsets stored in the archive are
//! interpreted relative to the archive start, which is recovered from the
//! End Of Central Directory record:
//!
//! ```text
//! base = eocd_position - central_directory_size - central_directory_offset
//! ```
//!
//! Only the subset used for game content is supported: single disk, no
//! ZIP64, no encryption, stored or deflated entries.

use std::io::{Read, Seek, SeekFrom};

use flate2::read::DeflateDecoder;
use flate2::Crc;
use lime_common::error::{ArchiveError, ArchiveResult};
use tracing::debug;

/// End of central directory record signature.
pub(crate) const EOCD_SIGNATURE: u32 = 0x0605_4b50;
/// Central directory file header signature.
pub(crate) const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
/// Local file header signature.
pub(crate) const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

/// Fixed size of the EOCD record (without comment).
pub(crate) const EOCD_LEN: usize = 22;
/// Fixed size of a central directory header (without variable fields).
pub(crate) const CENTRAL_HEADER_LEN: usize = 46;
/// Fixed size of a local file header (without variable fields).
pub(crate) const LOCAL_HEADER_LEN: usize = 30;

/// Largest possible archive comment.
const MAX_COMMENT_LEN: usize = 0xFFFF;

/// General purpose flag: entry is encrypted.
const FLAG_ENCRYPTED: u16 = 0x0001;

/// Upper bound on up-front allocation when inflating an entry.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Compression method of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression.
    Stored,
    /// Raw deflate stream.
    Deflated,
    /// Any other method id (not readable).
    Other(u16),
}

impl CompressionMethod {
    /// Convert from the on-disk method id.
    #[must_use]
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::Stored,
            8 => Self::Deflated,
            other => Self::Other(other),
        }
    }

    /// On-disk method id.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
            Self::Other(id) => id,
        }
    }
}

/// One central directory record.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    /// Name as stored in the archive (`/`-separated)
    pub name: String,
    /// Compression method
    pub method: CompressionMethod,
    /// General purpose flags
    pub flags: u16,
    /// CRC-32 of the uncompressed data
    pub crc32: u32,
    /// Size of the stored data
    pub compressed_size: u64,
    /// Size after decompression
    pub uncompressed_size: u64,
    /// Absolute offset of the local header in the underlying file
    pub header_offset: u64,
}

impl ZipEntry {
    /// Directory entries are stored with a trailing slash.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Returns true if the entry is encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }
}

/// Parsed central directory.
#[derive(Debug, Clone)]
pub struct ZipIndex {
    /// Offset of the archive start inside the underlying file
    pub base_offset: u64,
    /// Entries in central directory order
    pub entries: Vec<ZipEntry>,
}

impl ZipIndex {
    /// Parse the central directory of the archive at the end of `reader`.
    ///
    /// Returns `Ok(None)` if no End Of Central Directory record is present,
    /// which is the normal case for an executable without fused content.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> ArchiveResult<Option<Self>> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        if file_len < EOCD_LEN as u64 {
            return Ok(None);
        }

        let tail_len = file_len.min((EOCD_LEN + MAX_COMMENT_LEN) as u64);
        let tail_start = file_len - tail_len;
        reader.seek(SeekFrom::Start(tail_start))?;
        let mut tail = vec![0u8; tail_len as usize];
        reader.read_exact(&mut tail)?;

        for eocd_at in eocd_candidates(&tail) {
            let eocd_pos = tail_start + eocd_at as u64;
            let comment_len = le_u16(&tail, eocd_at + 20) as usize;
            let ends_at_eof = eocd_at + EOCD_LEN + comment_len == tail.len();

            match Self::parse_at(reader, &tail[eocd_at..], eocd_pos) {
                Ok(index) if ends_at_eof || !index.entries.is_empty() => {
                    if !ends_at_eof {
                        debug!("Archive trailer at {eocd_pos} is followed by extra data");
                    }
                    return Ok(Some(index));
                },
                Ok(_) => {},
                Err(e) if ends_at_eof => return Err(e),
                Err(e) => debug!("Skipping zip signature at {eocd_pos}: {e}"),
            }
        }

        Ok(None)
    }

    fn parse_at<R: Read + Seek>(reader: &mut R, eocd: &[u8], eocd_pos: u64) -> ArchiveResult<Self> {
        let disk_number = le_u16(eocd, 4);
        let cd_disk = le_u16(eocd, 6);
        let total_entries = le_u16(eocd, 10);
        let cd_size = le_u32(eocd, 12);
        let cd_offset = le_u32(eocd, 16);

        if total_entries == u16::MAX || cd_size == u32::MAX || cd_offset == u32::MAX {
            return Err(ArchiveError::Unsupported("ZIP64 archives".to_string()));
        }
        if disk_number != 0 || cd_disk != 0 {
            return Err(ArchiveError::Unsupported("multi-disk archives".to_string()));
        }

        let cd_span = u64::from(cd_size) + u64::from(cd_offset);
        if cd_span > eocd_pos {
            return Err(ArchiveError::Corrupt(
                "central directory extends past the end of file".to_string(),
            ));
        }
        let base_offset = eocd_pos - cd_span;

        reader.seek(SeekFrom::Start(base_offset + u64::from(cd_offset)))?;
        let mut directory = vec![0u8; cd_size as usize];
        reader.read_exact(&mut directory)?;

        let entries = parse_central_directory(&directory, total_entries, base_offset)?;

        Ok(Self {
            base_offset,
            entries,
        })
    }
}

/// Positions of EOCD signatures in the trailing bytes of a file, last first.
///
/// A record whose comment ends exactly at end of file is authoritative. One
/// followed by extra bytes (a code signature appended after fusing) is only
/// accepted if its central directory parses and is not empty.
fn eocd_candidates(tail: &[u8]) -> impl Iterator<Item = usize> + '_ {
    let last = tail.len().saturating_sub(EOCD_LEN);
    (0..=last)
        .rev()
        .filter(move |&at| tail.len() >= EOCD_LEN && le_u32(tail, at) == EOCD_SIGNATURE)
}

fn parse_central_directory(
    directory: &[u8],
    count: u16,
    base_offset: u64,
) -> ArchiveResult<Vec<ZipEntry>> {
    let mut entries = Vec::with_capacity(count as usize);
    let mut at = 0usize;

    for index in 0..count {
        if at + CENTRAL_HEADER_LEN > directory.len() {
            return Err(ArchiveError::Corrupt(format!(
                "central directory truncated at entry {index}"
            )));
        }
        if le_u32(directory, at) != CENTRAL_HEADER_SIGNATURE {
            return Err(ArchiveError::Corrupt(format!(
                "bad central header signature at entry {index}"
            )));
        }

        let flags = le_u16(directory, at + 8);
        let method = CompressionMethod::from_u16(le_u16(directory, at + 10));
        let crc32 = le_u32(directory, at + 16);
        let compressed_size = le_u32(directory, at + 20);
        let uncompressed_size = le_u32(directory, at + 24);
        let name_len = le_u16(directory, at + 28) as usize;
        let extra_len = le_u16(directory, at + 30) as usize;
        let comment_len = le_u16(directory, at + 32) as usize;
        let local_offset = le_u32(directory, at + 42);

        if compressed_size == u32::MAX || uncompressed_size == u32::MAX || local_offset == u32::MAX
        {
            return Err(ArchiveError::Unsupported("ZIP64 entries".to_string()));
        }

        let name_start = at + CENTRAL_HEADER_LEN;
        let next = name_start + name_len + extra_len + comment_len;
        if next > directory.len() {
            return Err(ArchiveError::Corrupt(format!(
                "central directory truncated at entry {index}"
            )));
        }
        let name = String::from_utf8_lossy(&directory[name_start..name_start + name_len])
            .into_owned();

        entries.push(ZipEntry {
            name,
            method,
            flags,
            crc32,
            compressed_size: u64::from(compressed_size),
            uncompressed_size: u64::from(uncompressed_size),
            header_offset: base_offset + u64::from(local_offset),
        });

        at = next;
    }

    Ok(entries)
}

/// Read and decompress one entry, verifying its size and CRC-32.
pub fn read_entry<R: Read + Seek>(reader: &mut R, entry: &ZipEntry) -> ArchiveResult<Vec<u8>> {
    if entry.is_encrypted() {
        return Err(ArchiveError::Unsupported(format!(
            "encrypted entry {}",
            entry.name
        )));
    }
    if let CompressionMethod::Other(id) = entry.method {
        return Err(ArchiveError::Unsupported(format!(
            "compression method {id} for {}",
            entry.name
        )));
    }

    reader.seek(SeekFrom::Start(entry.header_offset))?;
    let mut header = [0u8; LOCAL_HEADER_LEN];
    reader.read_exact(&mut header)?;
    if le_u32(&header, 0) != LOCAL_HEADER_SIGNATURE {
        return Err(ArchiveError::Corrupt(format!(
            "bad local header for {}",
            entry.name
        )));
    }
    let skip = u64::from(le_u16(&header, 26)) + u64::from(le_u16(&header, 28));
    reader.seek(SeekFrom::Current(skip as i64))?;

    let mut raw = Vec::with_capacity(entry.compressed_size.min(MAX_PREALLOC) as usize);
    reader
        .by_ref()
        .take(entry.compressed_size)
        .read_to_end(&mut raw)?;
    if raw.len() as u64 != entry.compressed_size {
        return Err(ArchiveError::Corrupt(format!(
            "truncated data for {}",
            entry.name
        )));
    }

    let data = match entry.method {
        CompressionMethod::Deflated => {
            let mut out = Vec::with_capacity(entry.uncompressed_size.min(MAX_PREALLOC) as usize);
            DeflateDecoder::new(raw.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| ArchiveError::Corrupt(format!("inflate {}: {e}", entry.name)))?;
            out
        },
        _ => raw,
    };

    if data.len() as u64 != entry.uncompressed_size {
        return Err(ArchiveError::Corrupt(format!(
            "size mismatch for {}: expected {}, got {}",
            entry.name,
            entry.uncompressed_size,
            data.len()
        )));
    }

    let mut crc = Crc::new();
    crc.update(&data);
    if crc.sum() != entry.crc32 {
        return Err(ArchiveError::Corrupt(format!(
            "CRC mismatch for {}",
            entry.name
        )));
    }

    Ok(data)
}

pub(crate) fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

pub(crate) fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
