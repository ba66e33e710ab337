use crate::PackageError;
use hoist_archive::{layer_diff_id, merge_tars, module_layer_tar, LayoutImage};
use hoist_dist::{
    add_to_layers, merge_compatible, BuildModule, DiffId, ModuleLayers, PackageMetadata, Stack,
    WorkableImage, BUILDPACK_LAYERS_LABEL, EXTENSION_LAYERS_LABEL, METADATA_LABEL,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Creates destination images: a local daemon image when `local`, a
/// registry-addressed image otherwise.
pub trait ImageFactory: Send + Sync {
    fn new_image(
        &self,
        reference: &str,
        local: bool,
        target_os: &str,
    ) -> Result<Box<dyn WorkableImage>, PackageError>;
}

struct ToAdd {
    tar_path: PathBuf,
    diff_id: DiffId,
    module: Arc<dyn BuildModule>,
}

/// Assembles one package: validates the module set, builds per-module (or
/// per-group) content-addressed layers, writes the package labels, and
/// persists the result.
///
/// A builder accumulates mutable state across `add_dependency` calls and is
/// owned by a single assembly; it is not meant to be shared.
pub struct PackageBuilder {
    buildpack: Option<Arc<dyn BuildModule>>,
    extension: Option<Arc<dyn BuildModule>>,
    dependencies: Vec<Arc<dyn BuildModule>>,
    image_factory: Box<dyn ImageFactory>,
    flatten_all: bool,
    flatten_groups: Vec<Vec<Arc<dyn BuildModule>>>,
}

impl PackageBuilder {
    pub fn new(image_factory: Box<dyn ImageFactory>) -> Self {
        Self {
            buildpack: None,
            extension: None,
            dependencies: Vec::new(),
            image_factory,
            flatten_all: false,
            flatten_groups: Vec::new(),
        }
    }

    pub fn set_buildpack(&mut self, buildpack: Arc<dyn BuildModule>) {
        self.buildpack = Some(buildpack);
    }

    pub fn set_extension(&mut self, extension: Arc<dyn BuildModule>) {
        self.extension = Some(extension);
    }

    pub fn add_dependency(&mut self, dependency: Arc<dyn BuildModule>) {
        self.dependencies.push(dependency);
    }

    /// Squash every module into one shared layer. Takes precedence over any
    /// per-group flattening.
    pub fn flatten_all_modules(&mut self) {
        self.flatten_all = true;
    }

    /// Record flatten groups computed by a
    /// [`ModuleManager`](crate::ModuleManager); each group shares one layer.
    pub fn add_flatten_groups(&mut self, groups: Vec<Vec<Arc<dyn BuildModule>>>) {
        self.flatten_groups.extend(groups);
    }

    /// Whether the module's layer is shared with others.
    pub fn must_be_flattened(&self, module: &dyn BuildModule) -> bool {
        if self.flatten_all {
            return true;
        }
        let full_name = module.descriptor().full_name();
        self.flatten_groups
            .iter()
            .any(|group| group.iter().any(|m| m.descriptor().full_name() == full_name))
    }

    /// Check the module set before any I/O happens.
    ///
    /// Exactly one root must be set. For a buildpack root, every order
    /// reference must resolve (with an explicit version) to a supplied
    /// dependency, no dependency may go unreferenced, and the leaf modules
    /// must agree on at least one stack.
    pub fn validate(&self) -> Result<(), PackageError> {
        match (&self.buildpack, &self.extension) {
            (None, None) => return Err(PackageError::NoRootModule),
            (Some(_), Some(_)) => return Err(PackageError::DualRootModule),
            _ => {}
        }

        if let Some(buildpack) = &self.buildpack {
            self.validate_buildpacks(buildpack.as_ref())?;
            if self.resolved_stacks().is_empty() {
                return Err(PackageError::NoCompatibleStacks);
            }
        }

        Ok(())
    }

    fn validate_buildpacks(&self, root: &dyn BuildModule) -> Result<(), PackageError> {
        // Index of dependency full names to how often the orders use them.
        let mut reference_counts: BTreeMap<String, usize> = self
            .dependencies
            .iter()
            .map(|dep| (dep.descriptor().full_name(), 0))
            .collect();

        let mut all: Vec<&dyn BuildModule> = vec![root];
        all.extend(self.dependencies.iter().map(|dep| dep.as_ref()));

        for module in all {
            let descriptor = module.descriptor();
            for order in &descriptor.order {
                for entry in &order.group {
                    let full_name = entry.info.full_name_with_version().map_err(|_| {
                        PackageError::UnversionedReference {
                            module: descriptor.full_name(),
                            reference: entry.info.id.clone(),
                        }
                    })?;
                    match reference_counts.get_mut(&full_name) {
                        Some(count) => *count += 1,
                        None => {
                            return Err(PackageError::UnresolvedReference {
                                module: descriptor.full_name(),
                                reference: full_name,
                            })
                        }
                    }
                }
            }
        }

        for (dependency, count) in &reference_counts {
            if *count == 0 {
                return Err(PackageError::UnusedDependency {
                    dependency: dependency.clone(),
                    root: root.descriptor().full_name(),
                });
            }
        }

        Ok(())
    }

    /// Iterative stack intersection across all leaf modules; meta-modules
    /// (empty stacks) are skipped.
    fn resolved_stacks(&self) -> Vec<Stack> {
        let Some(buildpack) = &self.buildpack else {
            return Vec::new();
        };
        let mut stacks = buildpack.descriptor().stacks.clone();
        for dep in &self.dependencies {
            let dep_stacks = &dep.descriptor().stacks;
            if stacks.is_empty() {
                stacks = dep_stacks.clone();
            } else if !dep_stacks.is_empty() {
                stacks = merge_compatible(&stacks, dep_stacks);
            }
        }
        stacks
    }

    /// Dependencies first, root last, so the root's layer ends up topmost.
    fn contributing_modules(&self, root: &Arc<dyn BuildModule>) -> Vec<Arc<dyn BuildModule>> {
        let mut modules = self.dependencies.clone();
        modules.push(root.clone());
        modules
    }

    fn finalize_buildpack_image(
        &self,
        image: &mut dyn WorkableImage,
        tmp_dir: &Path,
    ) -> Result<(), PackageError> {
        let root = self.buildpack.as_ref().ok_or(PackageError::NoRootModule)?;

        let mut collection: BTreeMap<String, ToAdd> = BTreeMap::new();
        for module in self.contributing_modules(root) {
            let (tar_path, diff_id) = module_layer_tar(tmp_dir, module.as_ref())?;
            collection.insert(
                module.descriptor().full_name(),
                ToAdd {
                    tar_path,
                    diff_id,
                    module,
                },
            );
        }

        if self.flatten_all {
            let flatten_dir = tmp_dir.join("flatten-all");
            fs::create_dir_all(&flatten_dir)?;
            let merged = flatten_dir.join("all-modules.tar");
            let sources: Vec<PathBuf> =
                collection.values().map(|t| t.tar_path.clone()).collect();
            merge_tars(&merged, &sources)?;
            let diff_id = layer_diff_id(&merged)?;
            for entry in collection.values_mut() {
                entry.tar_path.clone_from(&merged);
                entry.diff_id = diff_id.clone();
            }
        } else {
            for (i, group) in self.flatten_groups.iter().enumerate() {
                if group.len() < 2 {
                    // a singleton group already has its own tar
                    continue;
                }
                let group_dir = tmp_dir.join(format!("flatten-{i}"));
                fs::create_dir_all(&group_dir)?;
                let merged = group_dir.join(format!("group-{i}.tar"));
                let sources: Vec<PathBuf> = group
                    .iter()
                    .filter_map(|m| {
                        collection
                            .get(&m.descriptor().full_name())
                            .map(|t| t.tar_path.clone())
                    })
                    .collect();
                merge_tars(&merged, &sources)?;
                let diff_id = layer_diff_id(&merged)?;
                for module in group {
                    if let Some(entry) = collection.get_mut(&module.descriptor().full_name()) {
                        entry.tar_path.clone_from(&merged);
                        entry.diff_id = diff_id.clone();
                    }
                }
            }
        }

        let mut layers_md = ModuleLayers::new();
        let mut added: BTreeSet<DiffId> = BTreeSet::new();
        for entry in collection.values() {
            let shared = self.must_be_flattened(entry.module.as_ref());
            // Shared tars may back several modules; each distinct hash goes
            // into the image exactly once.
            let add_layer = if shared {
                added.insert(entry.diff_id.clone())
            } else {
                true
            };
            if add_layer {
                debug!(
                    "adding layer {} with diffID {}",
                    entry.tar_path.display(),
                    entry.diff_id
                );
                image
                    .add_layer_with_diff_id(&entry.tar_path, &entry.diff_id)
                    .map_err(|e| PackageError::AddLayer {
                        module: entry.module.descriptor().full_name(),
                        message: e.to_string(),
                    })?;
            }
            add_to_layers(&mut layers_md, entry.module.descriptor(), entry.diff_id.clone());
        }

        // Labels go on only after every layer is in place.
        let metadata = PackageMetadata {
            info: root.descriptor().info.clone(),
            stacks: self.resolved_stacks(),
        };
        image.set_label(METADATA_LABEL, &serde_json::to_string(&metadata)?)?;
        image.set_label(BUILDPACK_LAYERS_LABEL, &serde_json::to_string(&layers_md)?)?;
        Ok(())
    }

    fn finalize_extension_image(
        &self,
        image: &mut dyn WorkableImage,
        tmp_dir: &Path,
    ) -> Result<(), PackageError> {
        let extension = self.extension.as_ref().ok_or(PackageError::NoRootModule)?;

        let (tar_path, diff_id) = module_layer_tar(tmp_dir, extension.as_ref())?;
        image
            .add_layer_with_diff_id(&tar_path, &diff_id)
            .map_err(|e| PackageError::AddLayer {
                module: extension.descriptor().full_name(),
                message: e.to_string(),
            })?;

        let mut layers_md = ModuleLayers::new();
        add_to_layers(&mut layers_md, extension.descriptor(), diff_id);

        let metadata = PackageMetadata {
            info: extension.descriptor().info.clone(),
            stacks: Vec::new(),
        };
        image.set_label(METADATA_LABEL, &serde_json::to_string(&metadata)?)?;
        image.set_label(EXTENSION_LAYERS_LABEL, &serde_json::to_string(&layers_md)?)?;
        Ok(())
    }

    fn finalize(
        &self,
        image: &mut dyn WorkableImage,
        tmp_dir: &Path,
    ) -> Result<(), PackageError> {
        if self.buildpack.is_some() {
            self.finalize_buildpack_image(image, tmp_dir)
        } else {
            self.finalize_extension_image(image, tmp_dir)
        }
    }

    /// Assemble and persist the package as an image. `publish` selects a
    /// registry-addressed destination instead of the local daemon.
    pub fn save_as_image(
        &self,
        reference: &str,
        publish: bool,
        target_os: &str,
    ) -> Result<Box<dyn WorkableImage>, PackageError> {
        self.validate()?;

        let mut image = self.image_factory.new_image(reference, !publish, target_os)?;

        // Scoped working dir: removed on every exit path below.
        let tmp_dir = tempfile::tempdir()?;
        self.finalize(image.as_mut(), tmp_dir.path())?;

        image.save().map_err(|e| PackageError::Persist {
            reference: reference.to_owned(),
            message: e.to_string(),
        })?;
        Ok(image)
    }

    /// Assemble the package into an OCI layout and serialize the whole
    /// layout into a single archive file at `path`.
    pub fn save_as_file(&self, path: &Path, target_os: &str) -> Result<(), PackageError> {
        self.validate()?;

        let mut layout = LayoutImage::new(path.display().to_string(), target_os);

        let tmp_dir = tempfile::tempdir()?;
        self.finalize(&mut layout, tmp_dir.path())?;

        layout.write_archive(path).map_err(|e| PackageError::Persist {
            reference: path.display().to_string(),
            message: e.to_string(),
        })
    }
}
