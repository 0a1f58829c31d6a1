//! Typed replacement for the original untyped `meta` bag.
//!
//! The only documented use of `meta` is carrying a partial-read progress report
//! across a failed body read, and carrying the filename/dir a download task
//! writes to. Both are modeled as fields rather than a generic map, per
//! §9's "Meta bag" design note.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReaderProgress {
    pub cur: u64,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMeta {
    pub reader: Option<ReaderProgress>,
    pub download_name: Option<String>,
    pub download_dir: Option<String>,
}
