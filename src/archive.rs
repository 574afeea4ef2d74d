//! High-level [`GrafArchive`] API, the main embedding surface.
//!
//! ```no_run
//! use graf::{GrafArchive, Placeholders};
//!
//! let ar = GrafArchive::load("game/index.bin")?;
//! for entry in ar.entries() {
//!     println!("{} ({} bytes)", entry.name, entry.length);
//! }
//!
//! let mut placeholders = Placeholders::new();
//! placeholders.insert("platform", "pc");
//! let report = ar.extract_all("out", &placeholders);
//! for failure in &report.failed {
//!     eprintln!("{}: {}", failure.name, failure.error);
//! }
//! # Ok::<(), graf::GrafError>(())
//! ```

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::mem;
use tracing::info;

use crate::entry::{ArchiveSlot, FileEntry};
use crate::error::{GrafError, Result};
use crate::extract::extract_payload;
use crate::index::IndexTable;
use crate::names::{resolve_names, PackagerIndex, PACKAGER_FILE_NAME};
use crate::registry::ArchiveRegistry;

// ── OpenOptions ───────────────────────────────────────────────────────────────

/// Configuration for [`GrafArchive::open_with`].
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Sidecar name file.  Relative paths resolve against the index's
    /// directory; `None` skips the sidecar entirely.
    pub metadata_file: Option<PathBuf>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { metadata_file: Some(PathBuf::from(PACKAGER_FILE_NAME)) }
    }
}

// ── GrafArchive ───────────────────────────────────────────────────────────────

/// An opened GRAF index together with its data archives.
///
/// All streams are owned here and released together on drop.
#[derive(Debug)]
pub struct GrafArchive {
    index_path: PathBuf,
    index:      File,
    packager:   Option<PackagerIndex>,
    entries:    Vec<FileEntry>,
    registry:   ArchiveRegistry<File>,
}

impl GrafArchive {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Open the index and sidecar without reading the table yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, OpenOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, opts: OpenOptions) -> Result<Self> {
        let index_path = path.as_ref().to_owned();
        info!("Opening {}", index_path.display());
        let index = File::open(&index_path)?;
        let data_dir = index_path.parent().map(Path::to_owned).unwrap_or_default();

        let packager = match opts.metadata_file {
            Some(file) => {
                let sidecar = data_dir.join(file);
                info!("Opening packager index {}", sidecar.display());
                PackagerIndex::load(&sidecar)?
            }
            None => None,
        };

        Ok(Self {
            index_path,
            index,
            packager,
            entries: Vec::new(),
            registry: ArchiveRegistry::new(data_dir),
        })
    }

    /// Open and read the table in one step.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut ar = Self::open(path)?;
        ar.read_directory()?;
        Ok(ar)
    }

    // ── Table ────────────────────────────────────────────────────────────────

    /// (Re)read the file table, resolve names, and open data archives that
    /// are not already open.
    ///
    /// On failure the previously loaded table is left untouched.
    pub fn read_directory(&mut self) -> Result<()> {
        info!("Reading file table...");
        self.index.seek(SeekFrom::Start(0))?;
        let IndexTable { mut entries, archive_names } = IndexTable::read(BufReader::new(&self.index))?;
        info!("Done reading file table ({} entries).", entries.len());

        resolve_names(&mut entries, self.packager.as_ref())?;
        if self.packager.is_none() {
            info!("Using generated file names.");
        }

        info!("Opening data archives...");
        self.registry.register(archive_names)?;
        self.entries = entries;
        info!("Data archives opened.");
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn archive_names(&self) -> &[String] {
        self.registry.names()
    }

    /// File name of the data archive behind `slot`; `None` for no payload.
    pub fn archive_name(&self, slot: ArchiveSlot) -> Result<Option<&str>> {
        self.registry.name_of(slot)
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Directory holding the index, sidecar and data archives.
    pub fn data_dir(&self) -> &Path {
        self.registry.base_dir()
    }

    pub(crate) fn registry(&self) -> &ArchiveRegistry<File> {
        &self.registry
    }

    /// Whether `entry` is borrowed from this archive's table.
    pub fn contains(&self, entry: &FileEntry) -> bool {
        self.entries.as_ptr_range().contains(&(entry as *const FileEntry))
    }

    /// Table position of `entry`, by identity rather than by value.
    pub fn position_of(&self, entry: &FileEntry) -> Option<usize> {
        if !self.contains(entry) {
            return None;
        }
        let delta = entry as *const FileEntry as usize - self.entries.as_ptr() as usize;
        Some(delta / mem::size_of::<FileEntry>())
    }

    // ── Extraction ───────────────────────────────────────────────────────────

    /// Write exactly `entry.length` bytes of `entry` to `sink`.
    ///
    /// `entry` must be borrowed from [`entries`](Self::entries).
    pub fn extract<W: Write + ?Sized>(&self, entry: &FileEntry, sink: &mut W) -> Result<u64> {
        if !self.contains(entry) {
            return Err(GrafError::ForeignEntry);
        }
        let stream = self.registry.resolve(entry.slot)?;
        extract_payload(stream, entry, sink)
    }

    /// Extract `entry` to a new file at `path`, creating parent directories.
    ///
    /// Nothing is created when the entry cannot be resolved, and a file left
    /// incomplete by a failed copy is removed.
    pub fn extract_to_path(&self, entry: &FileEntry, path: &Path) -> Result<u64> {
        if !self.contains(entry) {
            return Err(GrafError::ForeignEntry);
        }
        let stream = self.registry.resolve(entry.slot)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| GrafError::path(parent, e))?;
            }
        }
        let mut file = File::create(path).map_err(|e| GrafError::path(path, e))?;
        let result = extract_payload(stream, entry, &mut file);
        if result.is_err() {
            drop(file);
            let _ = std::fs::remove_file(path);
        }
        result
    }
}
