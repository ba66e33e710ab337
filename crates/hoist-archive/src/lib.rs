//! Deterministic layer tars, content hashing, and OCI layout output for hoist.
//!
//! This crate builds the content-addressed pieces of a package: one tar per
//! module content root (`module_layer_tar`), sha256 diffIDs (`layer_diff_id`),
//! merged tars for flattened module groups (`merge_tars`), and an in-memory
//! `LayoutImage` that serializes to a valid OCI image layout archive.

pub mod layer;
pub mod merge;
pub mod oci;

pub use layer::{file_sha256, layer_diff_id, module_layer_tar, unpack_tar, write_dir_tar};
pub use merge::merge_tars;
pub use oci::{LayoutArchive, LayoutImage};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("layer digest mismatch for '{path}': recorded {recorded}, computed {computed}")]
    DigestMismatch {
        path: String,
        recorded: String,
        computed: String,
    },
    #[error("invalid OCI layout: {0}")]
    InvalidLayout(String),
    #[error("missing blob '{0}' in OCI layout")]
    MissingBlob(String),
}
