use crate::module::{ModuleInfo, ModuleKind};
use crate::stack::Stack;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("failed to read descriptor file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse descriptor: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("descriptor at '{path}' is missing the [{table}] table")]
    MissingTable { path: String, table: String },
    #[error("module id must not be empty")]
    EmptyId,
    #[error("module '{0}' must specify a version")]
    MissingVersion(String),
    #[error("extension '{0}' must not declare stacks")]
    ExtensionWithStacks(String),
    #[error("extension '{0}' must not declare an order")]
    ExtensionWithOrder(String),
}

/// One reference inside an order group: a module identity plus an optional
/// flag. Referenced modules must be supplied as dependencies at assembly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupEntry {
    #[serde(flatten)]
    pub info: ModuleInfo,
    #[serde(default)]
    pub optional: bool,
}

/// An ordered list of module references that apply together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderGroup {
    #[serde(default)]
    pub group: Vec<GroupEntry>,
}

/// Immutable metadata describing one build module.
///
/// A module with a non-empty `order` composes other modules (a meta-module);
/// one with an empty order and non-empty `stacks` is a leaf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Descriptor {
    pub api: String,
    pub info: ModuleInfo,
    #[serde(default)]
    pub stacks: Vec<Stack>,
    #[serde(default)]
    pub order: Vec<OrderGroup>,
}

impl Descriptor {
    pub fn is_meta(&self) -> bool {
        !self.order.is_empty()
    }

    pub fn full_name(&self) -> String {
        self.info.full_name()
    }
}

/// On-disk shape of `buildpack.toml` / `extension.toml`. The identity table
/// is named after the module kind, everything else is shared.
#[derive(Debug, Deserialize)]
struct DescriptorFile {
    #[serde(default = "default_api")]
    api: String,
    buildpack: Option<ModuleInfo>,
    extension: Option<ModuleInfo>,
    #[serde(default)]
    stacks: Vec<Stack>,
    #[serde(default)]
    order: Vec<OrderGroup>,
}

fn default_api() -> String {
    "0.1".to_owned()
}

/// Parse a descriptor from TOML text. `origin` only feeds error messages.
pub fn parse_descriptor_str(
    content: &str,
    kind: ModuleKind,
    origin: &str,
) -> Result<Descriptor, DescriptorError> {
    let file: DescriptorFile = toml::from_str(content)?;
    let info = match kind {
        ModuleKind::Buildpack => file.buildpack,
        ModuleKind::Extension => file.extension,
    }
    .ok_or_else(|| DescriptorError::MissingTable {
        path: origin.to_owned(),
        table: kind.info_table().to_owned(),
    })?;

    if info.id.is_empty() {
        return Err(DescriptorError::EmptyId);
    }

    if kind == ModuleKind::Extension {
        if !file.stacks.is_empty() {
            return Err(DescriptorError::ExtensionWithStacks(info.id));
        }
        if !file.order.is_empty() {
            return Err(DescriptorError::ExtensionWithOrder(info.id));
        }
    }

    Ok(Descriptor {
        api: file.api,
        info,
        stacks: file.stacks,
        order: file.order,
    })
}

pub fn parse_descriptor_file(path: &Path, kind: ModuleKind) -> Result<Descriptor, DescriptorError> {
    let content = fs::read_to_string(path)?;
    parse_descriptor_str(&content, kind, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const META_BUILDPACK: &str = r#"
api = "0.2"

[buildpack]
id = "example/meta"
version = "2.0.0"
homepage = "https://example.com"

[[order]]
[[order.group]]
id = "dep/a"
version = "1.0.0"

[[order.group]]
id = "dep/b"
version = "1.0.0"
optional = true
"#;

    #[test]
    fn parses_meta_buildpack() {
        let d = parse_descriptor_str(META_BUILDPACK, ModuleKind::Buildpack, "test").unwrap();
        assert_eq!(d.api, "0.2");
        assert_eq!(d.full_name(), "example/meta@2.0.0");
        assert!(d.is_meta());
        assert_eq!(d.order[0].group.len(), 2);
        assert!(!d.order[0].group[0].optional);
        assert!(d.order[0].group[1].optional);
        assert_eq!(d.info.homepage.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn parses_leaf_buildpack_with_stacks() {
        let d = parse_descriptor_str(
            r#"
[buildpack]
id = "example/foo"
version = "1.1.0"

[[stacks]]
id = "some.stack.id"
"#,
            ModuleKind::Buildpack,
            "test",
        )
        .unwrap();
        assert_eq!(d.api, "0.1", "api defaults when absent");
        assert!(!d.is_meta());
        assert_eq!(d.stacks[0].id, "some.stack.id");
    }

    #[test]
    fn missing_identity_table_names_origin() {
        let err = parse_descriptor_str("api = \"0.2\"", ModuleKind::Buildpack, "bp/buildpack.toml")
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bp/buildpack.toml"));
        assert!(msg.contains("[buildpack]"));
    }

    #[test]
    fn extension_descriptor_parses() {
        let d = parse_descriptor_str(
            r#"
api = "0.9"

[extension]
id = "example/ext"
version = "1.0.0"
"#,
            ModuleKind::Extension,
            "test",
        )
        .unwrap();
        assert_eq!(d.full_name(), "example/ext@1.0.0");
        assert!(d.stacks.is_empty());
    }

    #[test]
    fn extension_rejects_stacks() {
        let err = parse_descriptor_str(
            r#"
[extension]
id = "example/ext"
version = "1.0.0"

[[stacks]]
id = "some.stack.id"
"#,
            ModuleKind::Extension,
            "test",
        )
        .unwrap_err();
        assert!(matches!(err, DescriptorError::ExtensionWithStacks(_)));
    }

    #[test]
    fn extension_rejects_order() {
        let err = parse_descriptor_str(
            r#"
[extension]
id = "example/ext"
version = "1.0.0"

[[order]]
[[order.group]]
id = "dep/a"
version = "1.0.0"
"#,
            ModuleKind::Extension,
            "test",
        )
        .unwrap_err();
        assert!(matches!(err, DescriptorError::ExtensionWithOrder(_)));
    }

    #[test]
    fn empty_id_rejected() {
        let err = parse_descriptor_str(
            r#"
[buildpack]
id = ""
version = "1.0.0"
"#,
            ModuleKind::Buildpack,
            "test",
        )
        .unwrap_err();
        assert!(matches!(err, DescriptorError::EmptyId));
    }
}
