use crate::descriptor::Descriptor;
use crate::module::ModuleInfo;
use crate::stack::Stack;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label holding the package's root module identity and resolved stacks.
pub const METADATA_LABEL: &str = "io.buildpacks.buildpackage.metadata";

/// Label mapping each packaged buildpack's full name to its layer.
pub const BUILDPACK_LAYERS_LABEL: &str = "io.buildpacks.buildpack.layers";

/// Label mapping each packaged extension's full name to its layer.
pub const EXTENSION_LAYERS_LABEL: &str = "io.buildpacks.extension.layers";

/// Content hash of an uncompressed layer tar, rendered `sha256:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffId(String);

impl DiffId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex digest without the algorithm prefix.
    pub fn encoded(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(_, hex)| hex)
    }
}

impl fmt::Display for DiffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DiffId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// JSON body of [`METADATA_LABEL`]. Extensions carry identity only, so the
/// stack list is omitted when empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageMetadata {
    #[serde(flatten)]
    pub info: ModuleInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stacks: Vec<Stack>,
}

/// One entry of the layer-map label: where a module's filesystem lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleLayerInfo {
    pub api: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stacks: Vec<Stack>,
    #[serde(rename = "layerDiffID")]
    pub layer_diff_id: DiffId,
}

/// JSON body of the layer-map labels, keyed by module full name. BTreeMap
/// keeps label bytes and layer iteration order stable across runs.
pub type ModuleLayers = BTreeMap<String, ModuleLayerInfo>;

/// Record a module's (possibly shared) layer under its full name.
pub fn add_to_layers(layers: &mut ModuleLayers, descriptor: &Descriptor, diff_id: DiffId) {
    layers.insert(
        descriptor.full_name(),
        ModuleLayerInfo {
            api: descriptor.api.clone(),
            stacks: descriptor.stacks.clone(),
            layer_diff_id: diff_id,
        },
    );
}

/// Escape a module id for use as a path component inside a layer.
pub fn escape_id(id: &str) -> String {
    id.replace('/', "_")
}
