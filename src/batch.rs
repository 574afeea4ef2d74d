//! Batch extraction with per-entry failure isolation.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

use crate::archive::GrafArchive;
use crate::entry::{ArchiveSlot, FileEntry};
use crate::error::{GrafError, Result};

// ── Placeholders ──────────────────────────────────────────────────────────────

/// `[key]` → replacement table applied to entry names before extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders {
    map: BTreeMap<String, String>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, replacement: impl Into<String>) -> Option<String> {
        self.map.insert(key.into(), replacement.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Literal substitution of every registered `[key]`; unknown tokens stay.
    pub fn apply(&self, name: &str) -> String {
        let mut out = name.to_owned();
        for (key, value) in &self.map {
            out = out.replace(&format!("[{key}]"), value);
        }
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Placeholders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { map: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

/// Join an entry name under `root`.  Both `/` and `\` separate components;
/// rooted names and `..` are refused.
pub fn output_path(root: &Path, name: &str) -> Result<PathBuf> {
    if name.starts_with(['/', '\\']) {
        return Err(unsafe_name(root, name));
    }
    let mut out = root.to_path_buf();
    let mut pushed = false;
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return Err(unsafe_name(root, name)),
            _ => {
                let mut components = Path::new(part).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => {
                        out.push(part);
                        pushed = true;
                    }
                    _ => return Err(unsafe_name(root, name)),
                }
            }
        }
    }
    if !pushed {
        return Err(unsafe_name(root, name));
    }
    Ok(out)
}

fn unsafe_name(root: &Path, name: &str) -> GrafError {
    GrafError::path(
        root.join(name),
        io::Error::new(io::ErrorKind::InvalidInput, "entry name escapes the output directory"),
    )
}

// ── BatchReport ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct FailedEntry {
    pub index: usize,
    pub name:  String,
    pub error: GrafError,
}

/// Outcome of a batch: every entry is either extracted, skipped, or failed.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Output paths written, in table order.
    pub extracted: Vec<PathBuf>,
    /// Entries without a payload.
    pub skipped:   usize,
    pub failed:    Vec<FailedEntry>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ── Orchestration ─────────────────────────────────────────────────────────────

impl GrafArchive {
    /// Extract every entry under `output_root`.
    pub fn extract_all<P: AsRef<Path>>(&self, output_root: P, placeholders: &Placeholders) -> BatchReport {
        self.extract_where(output_root.as_ref(), placeholders, |_| true)
    }

    /// Extract only entries stored in the data archive called `archive_name`
    /// (file name part, ASCII case-insensitive).  `None` if no such archive
    /// is registered; nothing is written in that case.
    pub fn extract_from_archive<P: AsRef<Path>>(
        &self,
        output_root:  P,
        placeholders: &Placeholders,
        archive_name: &str,
    ) -> Option<BatchReport> {
        let wanted = self.registry().find(archive_name)?;
        info!("Extracting from archive {archive_name}...");
        Some(self.extract_where(output_root.as_ref(), placeholders, |e| {
            e.slot == ArchiveSlot::Archive(wanted)
        }))
    }

    fn extract_where<F>(&self, root: &Path, placeholders: &Placeholders, mut keep: F) -> BatchReport
    where
        F: FnMut(&FileEntry) -> bool,
    {
        let mut report = BatchReport::default();
        for (index, entry) in self.entries().iter().enumerate() {
            if !entry.has_payload() {
                if keep(entry) {
                    report.skipped += 1;
                }
                continue;
            }
            if !keep(entry) {
                continue;
            }
            info!("Extracting {}", entry.name);
            let result = output_path(root, &placeholders.apply(&entry.name))
                .and_then(|path| self.extract_to_path(entry, &path).map(|_| path));
            match result {
                Ok(path) => report.extracted.push(path),
                Err(error) => {
                    warn!("Error extracting {} ({error})", entry.name);
                    report.failed.push(FailedEntry { index, name: entry.name.clone(), error });
                }
            }
        }
        report
    }
}
