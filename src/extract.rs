//! Seek-and-copy extraction of a single entry.
//!
//! Stored entries are copied straight from the backing stream; compressed
//! entries are fed through a zlib decoder limited to their on-disk span.
//! Either way exactly `entry.length` bytes reach the sink or the call fails.

use flate2::read::ZlibDecoder;
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::trace;

use crate::entry::FileEntry;
use crate::error::{GrafError, Result};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Copy exactly `length` bytes from `src` to `dst`.
///
/// Short reads are accumulated; only a zero-length read before `length` is
/// reached counts as end of data.
pub fn copy_exact<R: Read + ?Sized, W: Write + ?Sized>(src: &mut R, dst: &mut W, length: u64) -> Result<u64> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE.min(length as usize).max(1)];
    let mut remaining = length;
    while remaining > 0 {
        let want = buf.len().min(remaining as usize);
        let n = match src.read(&mut buf[..want]) {
            Ok(0) => {
                return Err(GrafError::UnexpectedEndOfData {
                    expected:  length,
                    available: length - remaining,
                })
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        dst.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    Ok(length)
}

fn non_negative(v: i32, what: &str) -> Result<u64> {
    u64::try_from(v).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("negative {what}: {v}")).into())
}

/// Extract `entry` from its already-resolved backing stream into `sink`.
///
/// The stream must be the archive named by `entry.slot`; the sink is
/// flushed before returning.
pub fn extract_payload<S, W>(mut stream: S, entry: &FileEntry, sink: &mut W) -> Result<u64>
where
    S: Read + Seek,
    W: Write + ?Sized,
{
    if !entry.has_payload() {
        return Err(GrafError::NoPayload);
    }
    let offset = non_negative(entry.offset, "offset")?;
    let length = non_negative(entry.length, "length")?;
    let stored = non_negative(entry.stored_length(), "stored length")?;
    let zlength = non_negative(entry.compressed_length, "compressed length")?;

    // The recorded span must fit even when a raw copy reads less of it.
    let span = zlength.max(stored);
    let stream_len = stream.seek(SeekFrom::End(0))?;
    if offset.saturating_add(span) > stream_len {
        return Err(GrafError::UnexpectedEndOfData {
            expected:  span,
            available: stream_len.saturating_sub(offset),
        });
    }

    stream.seek(SeekFrom::Start(offset))?;
    trace!(offset, stored, length, level = entry.compression_level, "Copying payload");

    let written = if entry.is_compressed() {
        let mut decoder = ZlibDecoder::new(stream.by_ref().take(stored));
        copy_exact(&mut decoder, sink, length)?
    } else {
        copy_exact(&mut stream, sink, length)?
    };
    sink.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ArchiveSlot;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Cursor;

    /// Reader that hands out at most `chunk` bytes per call.
    struct Trickle<'a> {
        data:  &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    fn entry(level: u8, offset: i32, zlength: i32, length: i32) -> FileEntry {
        FileEntry {
            name:              "x".into(),
            slot:              ArchiveSlot::Archive(0),
            compression_level: level,
            offset,
            compressed_length: zlength,
            length,
        }
    }

    #[test]
    fn copy_exact_accumulates_short_reads() {
        let data: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
        let mut src = Trickle { data: &data, chunk: 7 };
        let mut out = Vec::new();
        assert_eq!(copy_exact(&mut src, &mut out, 9_999).unwrap(), 9_999);
        assert_eq!(out, data[..9_999]);
    }

    #[test]
    fn copy_exact_reports_shortfall() {
        let mut out = Vec::new();
        let err = copy_exact(&mut Cursor::new(vec![1u8; 10]), &mut out, 11).unwrap_err();
        assert!(matches!(err, GrafError::UnexpectedEndOfData { expected: 11, available: 10 }));
    }

    #[test]
    fn stored_payload_is_sliced() {
        let blob: Vec<u8> = (0..200u8).collect();
        let mut out = Vec::new();
        extract_payload(Cursor::new(&blob), &entry(0, 100, 50, 50), &mut out).unwrap();
        assert_eq!(out, blob[100..150]);
    }

    #[test]
    fn compressed_payload_is_decoded() {
        let plain = b"the quick brown fox jumps over the lazy dog ".repeat(40);
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&plain).unwrap();
        let z = enc.finish().unwrap();

        let mut blob = vec![0xAAu8; 16];
        blob.extend(&z);
        blob.extend([0xBBu8; 8]);

        let mut out = Vec::new();
        let e = entry(9, 16, z.len() as i32, plain.len() as i32);
        assert_eq!(extract_payload(Cursor::new(&blob), &e, &mut out).unwrap(), plain.len() as u64);
        assert_eq!(out, plain);
    }

    #[test]
    fn span_past_stream_end_is_end_of_data() {
        let blob = vec![0u8; 120];
        let mut out = Vec::new();
        let err = extract_payload(Cursor::new(&blob), &entry(0, 100, 50, 50), &mut out).unwrap_err();
        assert!(matches!(err, GrafError::UnexpectedEndOfData { expected: 50, available: 20 }));
        assert!(out.is_empty());
    }

    #[test]
    fn raw_record_span_past_stream_end_is_end_of_data() {
        let mut blob = vec![0u8; 8];
        blob.extend_from_slice(b"0123456789");
        let mut out = Vec::new();
        let err = extract_payload(Cursor::new(&blob), &entry(0, 8, 500, 10), &mut out).unwrap_err();
        assert!(matches!(err, GrafError::UnexpectedEndOfData { expected: 500, available: 10 }), "{err}");
        assert!(out.is_empty());
    }

    #[test]
    fn sentinel_entry_has_no_payload() {
        let mut e = entry(0, 0, 0, 0);
        e.slot = ArchiveSlot::NoPayload;
        let err = extract_payload(Cursor::new(Vec::<u8>::new()), &e, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, GrafError::NoPayload));
    }
}
