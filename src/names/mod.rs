//! Display-name resolution from the packager sidecar (`pmindex.xml`).
//!
//! ```xml
//! <packager>
//!   <file index="0" name="[platform]/textures/sky.dds"/>
//!   <file index="1" name="scripts/main.lua"/>
//! </packager>
//! ```
//!
//! The sidecar is all-or-nothing: if it cannot be read, or the `packager`
//! root never appears, every entry is named `"{index}.bin"`.  Once the root
//! is seen, anything unusable is a load failure.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::entry::FileEntry;
use crate::error::{GrafError, Result};

/// Default sidecar file name, looked up beside the index.
pub const PACKAGER_FILE_NAME: &str = "pmindex.xml";

const ROOT_ELEMENT: &[u8] = b"packager";
const FILE_ELEMENT: &[u8] = b"file";

/// Name lookup by table position.
pub trait NameSource {
    fn lookup(&self, index: usize) -> Option<&str>;
}

/// Parsed `packager` document.
#[derive(Debug, Clone, Default)]
pub struct PackagerIndex {
    names:     HashMap<usize, String>,
    max_index: Option<usize>,
}

impl PackagerIndex {
    /// Load the sidecar at `path`.  `Ok(None)` means "unavailable".
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(t)  => t,
            Err(e) => {
                warn!("Can't open packager index {} ({e}). File names and directory structure will not be available.",
                      path.display());
                return Ok(None);
            }
        };
        let parsed = Self::parse(&text)?;
        if parsed.is_none() {
            warn!("Cannot get names from packager index {}. File names and directory structure will not be available.",
                  path.display());
        }
        Ok(parsed)
    }

    /// Parse sidecar text.  `Ok(None)` when no root element can be found.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        // Locate the root; any failure before it means "no usable source".
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) if e.name().as_ref() == ROOT_ELEMENT => break,
                Ok(Event::Empty(e)) if e.name().as_ref() == ROOT_ELEMENT => {
                    return Ok(Some(Self::default()));
                }
                Ok(Event::Eof) | Err(_) => return Ok(None),
                Ok(_) => {}
            }
        }

        let mut index = Self::default();
        let mut depth = 0usize;
        loop {
            let event = reader
                .read_event()
                .map_err(|e| GrafError::MalformedMetadata(format!("at byte {}: {e}", reader.buffer_position())))?;
            match event {
                Event::Start(e) => {
                    if depth == 0 && e.name().as_ref() == FILE_ELEMENT {
                        index.add(&e)?;
                    }
                    depth += 1;
                }
                Event::Empty(e) => {
                    if depth == 0 && e.name().as_ref() == FILE_ELEMENT {
                        index.add(&e)?;
                    }
                }
                Event::End(_) if depth == 0 => break,
                Event::End(_) => depth -= 1,
                Event::Eof => {
                    return Err(GrafError::MalformedMetadata("unterminated packager element".into()));
                }
                _ => {}
            }
        }

        debug!("Packager index lists {} names", index.names.len());
        Ok(Some(index))
    }

    fn add(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let raw_index = attribute(e, "index")?;
        let idx: usize = raw_index.trim().parse().map_err(|_| {
            GrafError::MalformedMetadata(format!("file index {raw_index:?} is not a number"))
        })?;
        let name = attribute(e, "name")?;
        self.max_index = Some(self.max_index.map_or(idx, |m| m.max(idx)));
        self.names.insert(idx, name);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl NameSource for PackagerIndex {
    fn lookup(&self, index: usize) -> Option<&str> {
        self.names.get(&index).map(String::as_str)
    }
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<String> {
    let attr = e
        .try_get_attribute(key)
        .map_err(|err| GrafError::MalformedMetadata(err.to_string()))?
        .ok_or_else(|| GrafError::MalformedMetadata(format!("file element without {key:?}")))?;
    let value = attr
        .unescape_value()
        .map_err(|err| GrafError::MalformedMetadata(err.to_string()))?;
    Ok(value.into_owned())
}

/// Generated name for entry `index` when no sidecar is usable.
pub fn fallback_name(index: usize) -> String {
    format!("{index}.bin")
}

/// Fill in every entry's name.
///
/// With no source, names fall back uniformly.  With a source, every entry
/// must resolve and every listed index must exist in the table.
pub fn resolve_names(entries: &mut [FileEntry], source: Option<&PackagerIndex>) -> Result<()> {
    let Some(source) = source else {
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.name = fallback_name(i);
        }
        return Ok(());
    };

    if let Some(max) = source.max_index {
        if max >= entries.len() {
            return Err(GrafError::MalformedMetadata(format!(
                "file index {max} is outside the table ({} entries)",
                entries.len()
            )));
        }
    }
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.name = source
            .lookup(i)
            .ok_or_else(|| GrafError::MalformedMetadata(format!("no name for entry {i}")))?
            .to_owned();
    }
    Ok(())
}
