pub mod error;
pub mod entry;
pub mod index;
pub mod names;
pub mod registry;
pub mod extract;
pub mod archive;
pub mod batch;
pub mod analyze;

pub use error::GrafError;
pub use entry::{ArchiveSlot, FileEntry, NO_PAYLOAD_INDEX};
pub use index::IndexTable;
pub use names::{NameSource, PackagerIndex};
pub use registry::ArchiveRegistry;
pub use archive::{GrafArchive, OpenOptions};
pub use batch::{BatchReport, FailedEntry, Placeholders};
pub use analyze::{ArchiveLayout, LayoutRow};
