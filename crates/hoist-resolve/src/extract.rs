use crate::ResolveError;
use hoist_archive::unpack_tar;
use hoist_dist::{
    escape_id, BuildModule, Buildpack, Extension, ModuleKind, ModuleLayers, PackageMetadata,
    WorkableImage, BUILDPACK_LAYERS_LABEL, EXTENSION_LAYERS_LABEL, METADATA_LABEL,
};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Pull the root module and any bundled dependencies out of a fetched
/// package image.
///
/// The image must carry the package metadata label and one of the layer-map
/// labels; each recorded layer is unpacked under `work_dir` and the module
/// descriptor re-read from the unpacked `cnb/` tree. The caller owns
/// `work_dir` and must keep it alive as long as the extracted modules.
pub fn extract_packaged_modules(
    image: &dyn WorkableImage,
    work_dir: &Path,
) -> Result<(Arc<dyn BuildModule>, Vec<Arc<dyn BuildModule>>), ResolveError> {
    let metadata_json = non_empty_label(image, METADATA_LABEL)?
        .ok_or_else(|| not_a_package(image, METADATA_LABEL))?;
    let metadata: PackageMetadata = serde_json::from_str(&metadata_json)?;

    let (layers_json, kind) = if let Some(v) = non_empty_label(image, BUILDPACK_LAYERS_LABEL)? {
        (v, ModuleKind::Buildpack)
    } else if let Some(v) = non_empty_label(image, EXTENSION_LAYERS_LABEL)? {
        (v, ModuleKind::Extension)
    } else {
        return Err(not_a_package(image, BUILDPACK_LAYERS_LABEL));
    };
    let layers: ModuleLayers = serde_json::from_str(&layers_json)?;

    let root_full_name = metadata.info.full_name();
    let mut root: Option<Arc<dyn BuildModule>> = None;
    let mut dependencies: Vec<Arc<dyn BuildModule>> = Vec::new();

    for (full_name, entry) in &layers {
        let tar_path = image.layer(&entry.layer_diff_id)?;
        let dest = work_dir.join(sanitize(full_name));
        unpack_tar(&tar_path, &dest)?;

        let (id, version) = full_name
            .rsplit_once('@')
            .unwrap_or((full_name.as_str(), ""));
        let content_root = dest
            .join("cnb")
            .join(kind.dir_name())
            .join(escape_id(id))
            .join(version);
        debug!(
            "extracted {full_name} from {} into {}",
            image.name(),
            content_root.display()
        );

        let module: Arc<dyn BuildModule> = match kind {
            ModuleKind::Buildpack => Arc::new(Buildpack::from_root_blob(&content_root)?),
            ModuleKind::Extension => Arc::new(Extension::from_root_blob(&content_root)?),
        };
        if *full_name == root_full_name {
            root = Some(module);
        } else {
            dependencies.push(module);
        }
    }

    let root = root.ok_or_else(|| ResolveError::MissingRootModule {
        reference: image.name().to_owned(),
        full_name: root_full_name,
    })?;
    Ok((root, dependencies))
}

/// An absent label and an empty one are the same thing: not a package.
fn non_empty_label(
    image: &dyn WorkableImage,
    key: &str,
) -> Result<Option<String>, ResolveError> {
    Ok(image.label(key)?.filter(|v| !v.is_empty()))
}

fn not_a_package(image: &dyn WorkableImage, label: &str) -> ResolveError {
    ResolveError::NotAPackage {
        reference: image.name().to_owned(),
        label: label.to_owned(),
    }
}

fn sanitize(full_name: &str) -> String {
    full_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
