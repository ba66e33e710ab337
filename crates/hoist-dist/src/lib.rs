//! Build-module descriptors, package labels, and image abstractions for hoist.
//!
//! This crate defines the data model shared by the packaging pipeline: module
//! identity (`ModuleInfo`), descriptor metadata with stacks and order groups
//! (`Descriptor`), the `BuildModule` capability trait with its buildpack and
//! extension variants, the JSON label types written onto packaged images, and
//! the `WorkableImage` trait consumed by the assembly and resolution layers.

pub mod buildpack;
pub mod descriptor;
pub mod fake;
pub mod image;
pub mod labels;
pub mod module;
pub mod stack;

pub use buildpack::{BuildModule, Buildpack, Extension};
pub use descriptor::{
    parse_descriptor_file, parse_descriptor_str, Descriptor, DescriptorError, GroupEntry,
    OrderGroup,
};
pub use fake::FakeImage;
pub use image::{ImageError, WorkableImage};
pub use labels::{
    add_to_layers, escape_id, DiffId, ModuleLayerInfo, ModuleLayers, PackageMetadata,
    BUILDPACK_LAYERS_LABEL, EXTENSION_LAYERS_LABEL, METADATA_LABEL,
};
pub use module::{ModuleInfo, ModuleKind};
pub use stack::{merge_compatible, Stack};
