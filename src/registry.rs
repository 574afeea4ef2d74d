//! Backing data archives, keyed by the small index stored in each entry.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::entry::ArchiveSlot;
use crate::error::{GrafError, Result};

/// Open handles for every data archive named by the index.
///
/// Streams are opened once and kept until the registry is dropped;
/// re-registering the same names never reopens a file.
#[derive(Debug)]
pub struct ArchiveRegistry<S = File> {
    base_dir: PathBuf,
    names:    Vec<String>,
    streams:  BTreeMap<u8, S>,
}

impl<S> ArchiveRegistry<S> {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into(), names: Vec::new(), streams: BTreeMap::new() }
    }

    /// Replace the name list and open any stream not already held.
    pub fn register_with<F>(&mut self, names: Vec<String>, mut open: F) -> Result<()>
    where
        F: FnMut(&Path) -> io::Result<S>,
    {
        if names.len() > usize::from(u8::MAX) {
            return Err(GrafError::MalformedIndex(format!(
                "{} data archives declared; at most {} are addressable",
                names.len(),
                u8::MAX
            )));
        }
        for (i, name) in names.iter().enumerate() {
            let key = i as u8;
            if self.streams.contains_key(&key) {
                debug!("Data archive {i} already open, keeping handle");
                continue;
            }
            let path = self.base_dir.join(name);
            info!("Opening {}", path.display());
            let stream = open(&path)?;
            self.streams.insert(key, stream);
        }
        self.names = names;
        Ok(())
    }

    /// Stream for `slot`.  The no-payload slot never resolves.
    pub fn resolve(&self, slot: ArchiveSlot) -> Result<&S> {
        let i = slot.index().ok_or(GrafError::NoPayload)?;
        if usize::from(i) >= self.names.len() {
            return Err(GrafError::UnknownArchive(i));
        }
        self.streams.get(&i).ok_or(GrafError::UnknownArchive(i))
    }

    /// Backing file name for reporting.  `Ok(None)` for the no-payload slot.
    pub fn name_of(&self, slot: ArchiveSlot) -> Result<Option<&str>> {
        match slot {
            ArchiveSlot::NoPayload  => Ok(None),
            ArchiveSlot::Archive(i) => self
                .names
                .get(usize::from(i))
                .map(|n| Some(n.as_str()))
                .ok_or(GrafError::UnknownArchive(i)),
        }
    }

    /// Position of the archive whose name matches the file name part of
    /// `name`, ignoring ASCII case.
    pub fn find(&self, name: &str) -> Option<u8> {
        let wanted = Path::new(name).file_name()?.to_str()?;
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(wanted))
            .map(|i| i as u8)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl ArchiveRegistry<File> {
    /// Open (or keep) read/write handles for `names` under the base directory.
    pub fn register(&mut self, names: Vec<String>) -> Result<()> {
        self.register_with(names, |path| OpenOptions::new().read(true).write(true).open(path))
    }
}
