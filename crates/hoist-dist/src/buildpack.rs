use crate::descriptor::{parse_descriptor_file, Descriptor, DescriptorError};
use crate::module::ModuleKind;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// A build module ready for packaging: descriptor metadata plus a content
/// root whose tree becomes the module's image layer.
pub trait BuildModule: Send + Sync + Debug {
    fn descriptor(&self) -> &Descriptor;
    fn content_root(&self) -> &Path;
    fn kind(&self) -> ModuleKind;
}

/// An ordinary buildpack, backed by a directory blob.
#[derive(Debug, Clone)]
pub struct Buildpack {
    descriptor: Descriptor,
    root: PathBuf,
}

impl Buildpack {
    /// Read a buildpack from a content root containing `buildpack.toml`.
    pub fn from_root_blob(root: impl Into<PathBuf>) -> Result<Self, DescriptorError> {
        let root = root.into();
        let descriptor = parse_descriptor_file(
            &root.join(ModuleKind::Buildpack.descriptor_file()),
            ModuleKind::Buildpack,
        )?;
        Ok(Self { descriptor, root })
    }

    /// Assemble a buildpack from an already-parsed descriptor.
    pub fn new(descriptor: Descriptor, root: impl Into<PathBuf>) -> Self {
        Self {
            descriptor,
            root: root.into(),
        }
    }
}

impl BuildModule for Buildpack {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn content_root(&self) -> &Path {
        &self.root
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Buildpack
    }
}

/// An image extension. Always a leaf: no stacks, no order.
#[derive(Debug, Clone)]
pub struct Extension {
    descriptor: Descriptor,
    root: PathBuf,
}

impl Extension {
    /// Read an extension from a content root containing `extension.toml`.
    pub fn from_root_blob(root: impl Into<PathBuf>) -> Result<Self, DescriptorError> {
        let root = root.into();
        let descriptor = parse_descriptor_file(
            &root.join(ModuleKind::Extension.descriptor_file()),
            ModuleKind::Extension,
        )?;
        Ok(Self { descriptor, root })
    }

    pub fn new(descriptor: Descriptor, root: impl Into<PathBuf>) -> Self {
        Self {
            descriptor,
            root: root.into(),
        }
    }
}

impl BuildModule for Extension {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn content_root(&self) -> &Path {
        &self.root
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Extension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn buildpack_from_root_blob() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("buildpack.toml"),
            r#"
api = "0.2"

[buildpack]
id = "example/foo"
version = "1.1.0"

[[stacks]]
id = "some.stack.id"
"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin/build"), "#!/bin/sh\n").unwrap();

        let bp = Buildpack::from_root_blob(dir.path()).unwrap();
        assert_eq!(bp.descriptor().full_name(), "example/foo@1.1.0");
        assert_eq!(bp.content_root(), dir.path());
        assert_eq!(bp.kind(), ModuleKind::Buildpack);
    }

    #[test]
    fn buildpack_missing_descriptor_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Buildpack::from_root_blob(dir.path()).is_err());
    }

    #[test]
    fn extension_from_root_blob() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("extension.toml"),
            r#"
[extension]
id = "example/ext"
version = "1.0.0"
"#,
        )
        .unwrap();

        let ext = Extension::from_root_blob(dir.path()).unwrap();
        assert_eq!(ext.descriptor().full_name(), "example/ext@1.0.0");
        assert_eq!(ext.kind(), ModuleKind::Extension);
    }

    #[test]
    fn extension_with_stacks_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("extension.toml"),
            r#"
[extension]
id = "example/ext"
version = "1.0.0"

[[stacks]]
id = "some.stack.id"
"#,
        )
        .unwrap();
        assert!(Extension::from_root_blob(dir.path()).is_err());
    }
}
