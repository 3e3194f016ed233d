//! The code-indexing pipeline's ingestion collaborators (spec §4.3): the
//! line-based chunker, the folder scanner, the logical/observed path
//! mapper, and the filesystem watcher.

pub mod chunker;
pub mod path_mapper;
pub mod scanner;
pub mod watcher;

pub use chunker::{chunk_lines, hash_text, LineChunk, DEFAULT_CHUNK_LINES, DEFAULT_OVERLAP_LINES};
pub use path_mapper::PathMapper;
pub use scanner::{hash_bytes, is_allowed_extension, scan_folder, ScannedFile, DEFAULT_MAX_FILE_SIZE};
pub use watcher::{ChangeKind, FileEvent, Watcher, DEFAULT_DEBOUNCE};

pub mod prelude {
    pub use crate::chunker::{chunk_lines, LineChunk};
    pub use crate::path_mapper::PathMapper;
    pub use crate::scanner::{scan_folder, ScannedFile};
    pub use crate::watcher::{ChangeKind, FileEvent, Watcher};
}
