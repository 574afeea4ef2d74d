use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::io::{self, Read};

/// Raw archive index that marks an entry without stored data.
pub const NO_PAYLOAD_INDEX: u8 = 0xFF;
/// On-disk width of one table record.
pub const ENTRY_RECORD_SIZE: usize = 14;

/// Where an entry's bytes live.  The 0xFF sentinel never leaves the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArchiveSlot {
    Archive(u8),
    NoPayload,
}

impl ArchiveSlot {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            NO_PAYLOAD_INDEX => ArchiveSlot::NoPayload,
            i                => ArchiveSlot::Archive(i),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            ArchiveSlot::Archive(i) => i,
            ArchiveSlot::NoPayload  => NO_PAYLOAD_INDEX,
        }
    }

    pub fn index(self) -> Option<u8> {
        match self {
            ArchiveSlot::Archive(i) => Some(i),
            ArchiveSlot::NoPayload  => None,
        }
    }
}

/// One logical file described by the index table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name:              String,
    pub slot:              ArchiveSlot,
    /// 0 = stored, anything else = zlib stream.
    pub compression_level: u8,
    pub offset:            i32,
    pub compressed_length: i32,
    pub length:            i32,
}

impl FileEntry {
    /// Read one fixed-width record.  The name is filled in later.
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            name:              String::new(),
            slot:              ArchiveSlot::from_raw(reader.read_u8()?),
            compression_level: reader.read_u8()?,
            offset:            reader.read_i32::<LittleEndian>()?,
            compressed_length: reader.read_i32::<LittleEndian>()?,
            length:            reader.read_i32::<LittleEndian>()?,
        })
    }

    pub fn is_compressed(&self) -> bool {
        self.compression_level > 0
    }

    pub fn has_payload(&self) -> bool {
        self.slot != ArchiveSlot::NoPayload
    }

    /// Bytes occupied in the backing archive.
    pub fn stored_length(&self) -> i32 {
        if self.is_compressed() { self.compressed_length } else { self.length }
    }
}
