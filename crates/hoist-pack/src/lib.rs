//! Module flattening and package assembly for hoist.
//!
//! `ModuleManager` decides which modules share an image layer (a bounded-depth
//! partition of the composition tree); `PackageBuilder` validates the module
//! set, builds content-addressed layers, writes the package labels, and
//! persists the result as an image or an OCI layout archive.

pub mod builder;
pub mod manager;

pub use builder::{ImageFactory, PackageBuilder};
pub use manager::{ModuleManager, FLATTEN_MAX_DEPTH, FLATTEN_NONE};

use hoist_archive::ArchiveError;
use hoist_dist::{DescriptorError, ImageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("a buildpack or an extension root module must be set")]
    NoRootModule,
    #[error("only one of buildpack or extension root module may be set")]
    DualRootModule,
    #[error("buildpack '{module}' must specify a version when referencing buildpack '{reference}'")]
    UnversionedReference { module: String, reference: String },
    #[error("buildpack '{module}' references buildpack '{reference}' which is not present")]
    UnresolvedReference { module: String, reference: String },
    #[error("buildpack '{dependency}' is not used by buildpack '{root}'")]
    UnusedDependency { dependency: String, root: String },
    #[error("no compatible stacks among provided buildpacks")]
    NoCompatibleStacks,
    #[error("adding layer for module '{module}': {message}")]
    AddLayer { module: String, message: String },
    #[error("saving package to '{reference}': {message}")]
    Persist { reference: String, message: String },
    #[error("package I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("label serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("image error: {0}")]
    Image(#[from] ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_reference_names_both_sides() {
        let e = PackageError::UnresolvedReference {
            module: "example/meta@2.0.0".to_owned(),
            reference: "dep/a@1.0.0".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("example/meta@2.0.0"));
        assert!(msg.contains("dep/a@1.0.0"));
        assert!(msg.contains("not present"));
    }

    #[test]
    fn unused_dependency_names_dependency() {
        let e = PackageError::UnusedDependency {
            dependency: "dep/b@1.0.0".to_owned(),
            root: "example/meta@2.0.0".to_owned(),
        };
        assert!(e.to_string().contains("dep/b@1.0.0"));
        assert!(e.to_string().contains("not used"));
    }

    #[test]
    fn persist_error_names_destination() {
        let e = PackageError::Persist {
            reference: "example.com/out:tag".to_owned(),
            message: "push refused".to_owned(),
        };
        assert!(e.to_string().contains("example.com/out:tag"));
        assert!(e.to_string().contains("push refused"));
    }
}
