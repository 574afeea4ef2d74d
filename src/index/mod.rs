//! Binary index reader.
//!
//! # Layout (little-endian)
//! ```text
//! i32                 file count
//! [14 B record] * N   archive u8, level u8, offset i32, zlength i32, length i32
//! i32                 archive name count
//! [7-bit len + text]  archive file names, position = archive index
//! ```
//!
//! Any end-of-stream inside the declared counts is `TruncatedIndex`.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read};

use crate::entry::{FileEntry, ENTRY_RECORD_SIZE};
use crate::error::{GrafError, Result};

/// Upper bound on speculative pre-allocation from an untrusted count.
const MAX_PREALLOC: usize = 64 * 1024;

/// Parsed table: ordered entries (names unset) and ordered archive names.
#[derive(Debug, Clone, Default)]
pub struct IndexTable {
    pub entries:       Vec<FileEntry>,
    pub archive_names: Vec<String>,
}

impl IndexTable {
    /// Read a complete table from a stream positioned at offset 0.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let file_count = read_count(&mut reader, "file count")?;
        let mut entries = Vec::with_capacity(file_count.min(MAX_PREALLOC));
        for i in 0..file_count {
            let entry = FileEntry::read(&mut reader)
                .map_err(|e| truncated(e, format!("file entry {i} of {file_count}")))?;
            entries.push(entry);
        }

        let name_count = read_count(&mut reader, "archive name count")?;
        let mut archive_names = Vec::with_capacity(name_count.min(MAX_PREALLOC));
        for i in 0..name_count {
            archive_names.push(read_prefixed_string(&mut reader, i)?);
        }

        Ok(Self { entries, archive_names })
    }

    /// Serialized size of the entry table including its count.
    pub fn table_size(&self) -> usize {
        4 + self.entries.len() * ENTRY_RECORD_SIZE
    }
}

fn truncated(e: io::Error, what: String) -> GrafError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        GrafError::TruncatedIndex(what)
    } else {
        GrafError::Io(e)
    }
}

fn read_count<R: Read>(reader: &mut R, what: &str) -> Result<usize> {
    let n = reader
        .read_i32::<LittleEndian>()
        .map_err(|e| truncated(e, what.to_owned()))?;
    usize::try_from(n).map_err(|_| GrafError::MalformedIndex(format!("negative {what}: {n}")))
}

/// Read a 7-bit-group length prefix (at most 5 bytes).
fn read_7bit_len<R: Read>(reader: &mut R, which: usize) -> Result<usize> {
    let mut value: u32 = 0;
    for shift in (0..35).step_by(7) {
        let b = reader
            .read_u8()
            .map_err(|e| truncated(e, format!("length of archive name {which}")))?;
        if shift == 28 && b > 0x0F {
            return Err(GrafError::MalformedIndex(format!(
                "archive name {which} length prefix overflows 32 bits"
            )));
        }
        value |= u32::from(b & 0x7F) << shift;
        if b & 0x80 == 0 {
            return usize::try_from(value as i32).map_err(|_| {
                GrafError::MalformedIndex(format!("archive name {which} has negative length"))
            });
        }
    }
    Err(GrafError::MalformedIndex(format!("archive name {which} has an over-long length prefix")))
}

fn read_prefixed_string<R: Read>(reader: &mut R, which: usize) -> Result<String> {
    let len = read_7bit_len(reader, which)?;
    let mut buf = Vec::with_capacity(len.min(MAX_PREALLOC));
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(GrafError::TruncatedIndex(format!("archive name {which}")));
    }
    String::from_utf8(buf)
        .map_err(|_| GrafError::MalformedIndex(format!("archive name {which} is not valid text")))
}
