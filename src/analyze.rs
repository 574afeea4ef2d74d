//! Physical layout diagnostics for data archives.
//!
//! For every data archive, entries stored in it are ordered by offset and
//! the unused byte ranges between them are measured:
//!
//! ```text
//! 0        e0.offset       e0 end   e1.offset      e1 end       stream end
//! |--pregap--|=====e0=====|-postgap-|=====e1=====|--postgap--|
//! ```
//!
//! The pass reads only the two leading header words of each archive and the
//! first two bytes of every compressed payload.  Nothing is decompressed.

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::info;

use crate::archive::GrafArchive;
use crate::entry::{ArchiveSlot, FileEntry};
use crate::error::Result;

/// Summary file written by [`GrafArchive::analyze`].
pub const SUMMARY_FILE_NAME: &str = "summary.txt";
const CSV_HEADER: &str = "index,name,complevel,offset,length,zlength,delta-length,postgap,z-header";

/// One entry's position in its data archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutRow {
    /// Position in the original table.
    pub index:             usize,
    pub name:              String,
    pub compression_level: u8,
    pub offset:            i32,
    pub length:            i32,
    pub compressed_length: i32,
    /// `compressed_length - length`, only for stored entries.
    pub delta_length:      Option<i64>,
    /// Bytes between this entry's end and the next entry (or stream end).
    pub postgap:           i64,
    /// Leading two payload bytes, compressed entries only.
    pub zlib_header:       Option<u16>,
}

/// Layout of one data archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveLayout {
    pub archive_index:   u8,
    pub name:            String,
    /// First header word of the archive itself.
    pub declared_length: i32,
    /// Second header word of the archive itself.
    pub resident_size:   i32,
    pub stream_length:   u64,
    /// Bytes before the first entry (whole stream when it holds none).
    pub pregap:          i64,
    pub rows:            Vec<LayoutRow>,
    pub compressed:      usize,
    pub uncompressed:    usize,
}

impl ArchiveLayout {
    /// Measure `entries` (already filtered to this archive) against `stream`.
    ///
    /// Entries are ordered by offset; ties keep table order.
    pub fn measure<S: Read + Seek>(
        archive_index: u8,
        name:          &str,
        mut stream:    S,
        entries:       &[(usize, &FileEntry)],
    ) -> Result<Self> {
        let stream_length = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;
        let declared_length = stream.read_i32::<LittleEndian>()?;
        let resident_size = stream.read_i32::<LittleEndian>()?;

        let mut sorted = entries.to_vec();
        sorted.sort_by_key(|&(index, e)| (e.offset, index));

        let pregap = sorted.first().map_or(stream_length as i64, |(_, e)| i64::from(e.offset));
        let mut rows = Vec::with_capacity(sorted.len());
        let (mut compressed, mut uncompressed) = (0, 0);

        for (pos, &(index, e)) in sorted.iter().enumerate() {
            let end = i64::from(e.offset) + i64::from(e.compressed_length);
            let next_start = match sorted.get(pos + 1) {
                Some((_, next)) => i64::from(next.offset),
                None            => stream_length as i64,
            };

            let zlib_header = if e.is_compressed() {
                compressed += 1;
                Some(peek_u16_be(&mut stream, e.offset)?)
            } else {
                uncompressed += 1;
                None
            };

            rows.push(LayoutRow {
                index,
                name:              e.name.clone(),
                compression_level: e.compression_level,
                offset:            e.offset,
                length:            e.length,
                compressed_length: e.compressed_length,
                delta_length:      (!e.is_compressed())
                    .then(|| i64::from(e.compressed_length) - i64::from(e.length)),
                postgap:           next_start - end,
                zlib_header,
            });
        }

        Ok(Self {
            archive_index,
            name: name.to_owned(),
            declared_length,
            resident_size,
            stream_length,
            pregap,
            rows,
            compressed,
            uncompressed,
        })
    }

    /// Tabular report, one line per entry after a leading pregap line.
    pub fn write_csv<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(w, "{CSV_HEADER}")?;
        writeln!(w, "-1,pregap,n/a,0,{},n/a,n/a,n/a,n/a", self.pregap)?;
        for r in &self.rows {
            writeln!(
                w,
                "{},{},{},{},{},{},{},{},{}",
                r.index,
                csv_field(&r.name),
                r.compression_level,
                r.offset,
                r.length,
                r.compressed_length,
                r.delta_length.map_or_else(|| "n/a".to_owned(), |d| d.to_string()),
                r.postgap,
                // Always four digits; a zlib header never has a zero first byte.
                r.zlib_header.map_or_else(|| "n/a".to_owned(), |h| hex::encode_upper(h.to_be_bytes())),
            )?;
        }
        w.flush()
    }

    /// Block for `summary.txt`.
    pub fn write_summary<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(w, "{}:", self.name)?;
        writeln!(w, "pak index: {}", self.archive_index)?;
        writeln!(w, "length (from pak): {}", self.declared_length)?;
        writeln!(w, "resident: {}", self.resident_size)?;
        writeln!(w, "count: {}", self.rows.len())?;
        writeln!(w, "compressed: {}", self.compressed)?;
        writeln!(w, "uncompressed: {}", self.uncompressed)?;
        writeln!(w)
    }
}

fn peek_u16_be<S: Read + Seek>(stream: &mut S, offset: i32) -> io::Result<u16> {
    let offset = u64::try_from(offset)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("negative offset {offset}")))?;
    stream.seek(SeekFrom::Start(offset))?;
    stream.read_u16::<byteorder::BigEndian>()
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_owned()
    }
}

impl GrafArchive {
    /// Layout of the data archive at position `archive_index`.
    pub fn analyze_archive(&self, archive_index: u8) -> Result<ArchiveLayout> {
        let slot = ArchiveSlot::Archive(archive_index);
        let stream = self.registry().resolve(slot)?;
        let name = self.archive_name(slot)?.unwrap_or_default();
        let entries: Vec<(usize, &FileEntry)> = self
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.slot == slot)
            .collect();
        ArchiveLayout::measure(archive_index, name, stream, &entries)
    }

    /// Write `summary.txt` and one `<archive>.csv` per data archive into
    /// `output_dir`.  The first failing archive aborts the pass.
    pub fn analyze<P: AsRef<Path>>(&self, output_dir: P) -> Result<Vec<ArchiveLayout>> {
        let dir = output_dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut summary = BufWriter::new(File::create(dir.join(SUMMARY_FILE_NAME))?);
        let mut layouts = Vec::with_capacity(self.archive_names().len());

        for i in 0..self.archive_names().len() {
            let layout = self.analyze_archive(i as u8)?;
            info!(
                "{}: {} entries ({} compressed), pregap {}",
                layout.name, layout.rows.len(), layout.compressed, layout.pregap
            );
            layout.write_summary(&mut summary)?;
            let stem = Path::new(&layout.name)
                .file_name()
                .map_or_else(|| format!("archive{i}"), |n| n.to_string_lossy().into_owned());
            let csv = BufWriter::new(File::create(dir.join(format!("{stem}.csv")))?);
            layout.write_csv(csv)?;
            layouts.push(layout);
        }
        summary.flush()?;
        Ok(layouts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn entry(level: u8, offset: i32, zlength: i32, length: i32) -> FileEntry {
        FileEntry {
            name:              format!("f{offset}"),
            slot:              ArchiveSlot::Archive(0),
            compression_level: level,
            offset,
            compressed_length: zlength,
            length,
        }
    }

    fn blob(len: usize) -> Vec<u8> {
        let mut b = vec![0u8; len];
        b[..4].copy_from_slice(&(len as i32).to_le_bytes());
        b[4..8].copy_from_slice(&7i32.to_le_bytes());
        b
    }

    #[test]
    fn single_entry_gaps() {
        let e = entry(0, 100, 50, 50);
        let l = ArchiveLayout::measure(0, "a.p", Cursor::new(blob(200)), &[(0, &e)]).unwrap();
        assert_eq!(l.pregap, 100);
        assert_eq!(l.rows[0].postgap, 50);
        assert_eq!(l.rows[0].delta_length, Some(0));
        assert_eq!(l.declared_length, 200);
        assert_eq!(l.resident_size, 7);
        assert_eq!((l.compressed, l.uncompressed), (0, 1));
    }

    #[test]
    fn rows_sorted_by_offset_then_table_order() {
        let mut data = blob(100);
        data[40] = 0x78;
        data[41] = 0x9C;
        let a = entry(0, 60, 10, 10);
        let b = entry(6, 40, 20, 64);
        let c = entry(0, 60, 0, 0);
        let l = ArchiveLayout::measure(0, "a.p", Cursor::new(data), &[(5, &a), (1, &b), (2, &c)]).unwrap();

        let order: Vec<usize> = l.rows.iter().map(|r| r.index).collect();
        assert_eq!(order, [1, 2, 5]);
        assert_eq!(l.pregap, 40);
        assert_eq!(l.rows[0].zlib_header, Some(0x789C));
        assert_eq!(l.rows[0].delta_length, None);
        assert_eq!(l.rows[0].postgap, 0);
        assert_eq!(l.rows[1].postgap, 0);
        assert_eq!(l.rows[2].postgap, 30);
        assert_eq!((l.compressed, l.uncompressed), (1, 2));

        let mut out = Vec::new();
        l.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "-1,pregap,n/a,0,40,n/a,n/a,n/a,n/a");
        assert_eq!(lines[2], "1,f40,6,40,64,20,n/a,0,789C");
        assert_eq!(lines[4], "5,f60,0,60,10,10,0,30,n/a");
    }

    #[test]
    fn empty_archive_pregap_is_whole_stream() {
        let l = ArchiveLayout::measure(3, "e.p", Cursor::new(blob(64)), &[]).unwrap();
        assert_eq!(l.pregap, 64);
        assert!(l.rows.is_empty());
    }

    #[test]
    fn short_archive_header_fails() {
        assert!(ArchiveLayout::measure(0, "s.p", Cursor::new(vec![0u8; 6]), &[]).is_err());
    }

    #[test]
    fn zlib_header_cell_keeps_leading_zeros() {
        let mut data = blob(32);
        data[8] = 0x08;
        data[9] = 0x1D;
        let e = entry(1, 8, 4, 16);
        let l = ArchiveLayout::measure(0, "z.p", Cursor::new(data), &[(0, &e)]).unwrap();
        let mut out = Vec::new();
        l.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().nth(2).unwrap().ends_with(",081D"), "{text}");
    }

    #[test]
    fn csv_quotes_awkward_names() {
        assert_eq!(csv_field("plain/name.bin"), "plain/name.bin");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
