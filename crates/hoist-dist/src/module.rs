use crate::descriptor::DescriptorError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a build module.
///
/// Two modules are the same module within one assembly iff their full names
/// (`id@version`, or bare `id` when no version is set) are equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleInfo {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModuleInfo {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            homepage: None,
            description: None,
        }
    }

    /// `id@version`, or the bare id when no version is set.
    pub fn full_name(&self) -> String {
        if self.version.is_empty() {
            self.id.clone()
        } else {
            format!("{}@{}", self.id, self.version)
        }
    }

    /// Like [`full_name`](Self::full_name), but an unversioned module is an
    /// error. Order-group references must pin an explicit version.
    pub fn full_name_with_version(&self) -> Result<String, DescriptorError> {
        if self.version.is_empty() {
            return Err(DescriptorError::MissingVersion(self.id.clone()));
        }
        Ok(format!("{}@{}", self.id, self.version))
    }
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// The two build-module flavors hoist can package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Buildpack,
    Extension,
}

impl ModuleKind {
    /// Directory under `cnb/` where modules of this kind live inside a layer.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Buildpack => "buildpacks",
            Self::Extension => "extensions",
        }
    }

    /// Descriptor file name expected at a module's content root.
    pub fn descriptor_file(self) -> &'static str {
        match self {
            Self::Buildpack => "buildpack.toml",
            Self::Extension => "extension.toml",
        }
    }

    /// TOML table holding the module identity in the descriptor file.
    pub fn info_table(self) -> &'static str {
        match self {
            Self::Buildpack => "buildpack",
            Self::Extension => "extension",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buildpack => f.write_str("buildpack"),
            Self::Extension => f.write_str("extension"),
        }
    }
}
