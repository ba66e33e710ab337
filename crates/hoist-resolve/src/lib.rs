//! Module locator recognition and multi-source resolution for hoist.
//!
//! This crate turns free-form module locators into resolved build modules.
//! A locator may be a registry URN, a container image reference, a local
//! path, or an ambiguous bare identifier; `ModuleDownloader` dispatches over
//! the recognized shape and pulls the root module plus any bundled
//! dependencies through the consumed collaborator traits defined here.

pub mod downloader;
pub mod extract;
pub mod locator;
pub mod reference;

pub use downloader::{DownloadOptions, ModuleDownloader};
pub use extract::extract_packaged_modules;
pub use locator::{parse_locator, Locator, REGISTRY_URN_PREFIX};
pub use reference::{translate_registry, ImageReference, DEFAULT_REGISTRY};

use hoist_archive::ArchiveError;
use hoist_dist::{DescriptorError, ImageError, WorkableImage};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("'{locator}' is not a valid module locator: rejected by {recognizer}")]
    InvalidLocator {
        locator: String,
        recognizer: &'static str,
    },
    #[error("malformed image reference '{reference}': {reason}")]
    MalformedReference { reference: String, reason: String },
    #[error("locating '{locator}' in registry '{registry}': {message}")]
    Registry {
        registry: String,
        locator: String,
        message: String,
    },
    #[error("fetching image '{reference}': {message}")]
    Fetch { reference: String, message: String },
    #[error("downloading content from '{locator}': {message}")]
    Download { locator: String, message: String },
    #[error("image '{reference}' is not a build-module package: missing label '{label}'")]
    NotAPackage { reference: String, label: String },
    #[error("package image '{reference}' does not contain its root module '{full_name}'")]
    MissingRootModule {
        reference: String,
        full_name: String,
    },
    #[error("resolver I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing package label: {0}")]
    LabelParse(#[from] serde_json::Error),
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),
    #[error("image error: {0}")]
    Image(#[from] ImageError),
}

/// How eagerly an image fetch consults the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullPolicy {
    #[default]
    Always,
    Never,
    IfNotPresent,
}

impl fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::Never => f.write_str("never"),
            Self::IfNotPresent => f.write_str("if-not-present"),
        }
    }
}

/// Options forwarded to an [`ImageFetcher`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub daemon: bool,
    pub pull_policy: PullPolicy,
    pub target_os: String,
}

/// Fetches arbitrary content addressed by URI or path into a readable root.
pub trait ContentDownloader: Send + Sync {
    fn download(&self, locator: &str) -> Result<PathBuf, ResolveError>;
}

/// Fetches a container image from a daemon or remote registry.
pub trait ImageFetcher: Send + Sync {
    fn fetch(
        &self,
        reference: &str,
        options: FetchOptions,
    ) -> Result<Box<dyn WorkableImage>, ResolveError>;
}

/// Resolves a module identifier against a named module registry, yielding a
/// canonical container image reference.
pub trait RegistryResolver: Send + Sync {
    fn resolve(&self, registry_name: &str, identifier: &str) -> Result<String, ResolveError>;
}
