//! On-disk GRAF fixtures for integration tests.
#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Raw record as written to index.bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEntry {
    pub archive:           u8,
    pub level:             u8,
    pub offset:            i32,
    pub compressed_length: i32,
    pub length:            i32,
}

pub fn write_7bit(out: &mut Vec<u8>, mut n: usize) {
    while n >= 0x80 {
        out.push((n as u8 & 0x7F) | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
}

pub fn index_bytes(entries: &[RawEntry], archive_names: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_i32::<LittleEndian>(entries.len() as i32).unwrap();
    for e in entries {
        out.write_u8(e.archive).unwrap();
        out.write_u8(e.level).unwrap();
        out.write_i32::<LittleEndian>(e.offset).unwrap();
        out.write_i32::<LittleEndian>(e.compressed_length).unwrap();
        out.write_i32::<LittleEndian>(e.length).unwrap();
    }
    out.write_i32::<LittleEndian>(archive_names.len() as i32).unwrap();
    for name in archive_names {
        write_7bit(&mut out, name.len());
        out.extend_from_slice(name.as_bytes());
    }
    out
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Builds one data archive: an 8-byte header, then payloads appended in order.
pub struct PakBuilder {
    pub index: u8,
    pub bytes: Vec<u8>,
}

impl PakBuilder {
    pub fn new(index: u8) -> Self {
        Self { index, bytes: vec![0u8; 8] }
    }

    pub fn gap(&mut self, n: usize) -> &mut Self {
        self.bytes.extend(std::iter::repeat(0xEEu8).take(n));
        self
    }

    pub fn stored(&mut self, data: &[u8]) -> RawEntry {
        let offset = self.bytes.len() as i32;
        self.bytes.extend_from_slice(data);
        RawEntry {
            archive: self.index,
            level: 0,
            offset,
            compressed_length: data.len() as i32,
            length: data.len() as i32,
        }
    }

    pub fn compressed(&mut self, data: &[u8]) -> RawEntry {
        let z = zlib(data);
        let offset = self.bytes.len() as i32;
        self.bytes.extend_from_slice(&z);
        RawEntry {
            archive: self.index,
            level: 6,
            offset,
            compressed_length: z.len() as i32,
            length: data.len() as i32,
        }
    }

    /// Final bytes with the header words (total length, resident size) filled in.
    pub fn finish(&self, resident: i32) -> Vec<u8> {
        let mut b = self.bytes.clone();
        let len = b.len() as i32;
        b[..4].copy_from_slice(&len.to_le_bytes());
        b[4..8].copy_from_slice(&resident.to_le_bytes());
        b
    }
}

pub fn no_payload() -> RawEntry {
    RawEntry { archive: 0xFF, level: 0, offset: -1, compressed_length: 0, length: 0 }
}

pub struct Fixture {
    pub dir:   TempDir,
    pub index: PathBuf,
}

impl Fixture {
    pub fn new(entries: &[RawEntry], paks: &[(&str, Vec<u8>)]) -> Self {
        let dir = TempDir::new().unwrap();
        let names: Vec<&str> = paks.iter().map(|(n, _)| *n).collect();
        let index = dir.path().join("index.bin");
        fs::write(&index, index_bytes(entries, &names)).unwrap();
        for (name, bytes) in paks {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, bytes).unwrap();
        }
        Self { dir, index }
    }

    pub fn with_sidecar(self, xml: &str) -> Self {
        fs::write(self.dir.path().join("pmindex.xml"), xml).unwrap();
        self
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn out(&self) -> PathBuf {
        self.dir.path().join("out")
    }
}

pub fn sidecar(names: &[&str]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<packager>\n");
    for (i, n) in names.iter().enumerate() {
        xml.push_str(&format!("  <file index=\"{i}\" name=\"{n}\" />\n"));
    }
    xml.push_str("</packager>\n");
    xml
}

pub fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap()
}
