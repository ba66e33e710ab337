use crate::extract::extract_packaged_modules;
use crate::locator::{parse_locator, Locator};
use crate::reference::{translate_registry, ImageReference};
use crate::{ContentDownloader, FetchOptions, ImageFetcher, PullPolicy, RegistryResolver, ResolveError};
use hoist_dist::{BuildModule, Buildpack, Extension, ModuleKind};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Options steering one `download` call.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Named module registry consulted for URN and bare-id locators.
    pub registry_name: String,
    /// Explicit image reference; when set it bypasses locator recognition.
    pub image_ref: Option<String>,
    pub target_os: String,
    pub daemon: bool,
    pub pull_policy: PullPolicy,
    /// Base directory for resolving relative path locators.
    pub relative_base_dir: Option<PathBuf>,
    /// Registry host → mirror host rewrites applied before fetching.
    pub registry_mirrors: BTreeMap<String, String>,
    /// Kind expected for path locators (image sources self-describe).
    pub module_kind: ModuleKind,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            registry_name: String::new(),
            image_ref: None,
            target_os: "linux".to_owned(),
            daemon: true,
            pull_policy: PullPolicy::default(),
            relative_base_dir: None,
            registry_mirrors: BTreeMap::new(),
            module_kind: ModuleKind::Buildpack,
        }
    }
}

/// Resolves module locators into build modules, dispatching over the
/// recognized locator shape.
///
/// Modules extracted from package images are unpacked under `work_dir`,
/// which the caller owns and outlives the returned modules with.
pub struct ModuleDownloader {
    content: Box<dyn ContentDownloader>,
    fetcher: Box<dyn ImageFetcher>,
    registry: Box<dyn RegistryResolver>,
    work_dir: PathBuf,
}

impl ModuleDownloader {
    pub fn new(
        content: Box<dyn ContentDownloader>,
        fetcher: Box<dyn ImageFetcher>,
        registry: Box<dyn RegistryResolver>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            content,
            fetcher,
            registry,
            work_dir: work_dir.into(),
        }
    }

    /// Resolve `locator` to the root module plus any bundled dependencies.
    pub fn download(
        &self,
        locator: &str,
        options: &DownloadOptions,
    ) -> Result<(Arc<dyn BuildModule>, Vec<Arc<dyn BuildModule>>), ResolveError> {
        if let Some(image_ref) = &options.image_ref {
            return self.from_image(image_ref, options);
        }

        let shape = parse_locator(
            locator,
            options.relative_base_dir.as_deref(),
            !options.registry_name.is_empty(),
        )?;

        match shape {
            Locator::RegistryUrn(urn) => {
                let reference = self
                    .registry
                    .resolve(&options.registry_name, &urn)
                    .map_err(|e| ResolveError::Registry {
                        registry: options.registry_name.clone(),
                        locator: urn.clone(),
                        message: e.to_string(),
                    })?;
                self.from_image(&reference, options)
            }
            Locator::RegistryId(id) => match self.registry.resolve(&options.registry_name, &id) {
                Ok(reference) => self.from_image(&reference, options),
                Err(e) => {
                    // A bare id that also parses as an image reference may
                    // still resolve as one; anything else surfaces the
                    // registry failure rather than guessing further.
                    if ImageReference::parse(&id).is_ok() {
                        debug!("registry lookup for '{id}' failed ({e}); trying as image");
                        self.from_image(&id, options)
                    } else {
                        Err(ResolveError::Registry {
                            registry: options.registry_name.clone(),
                            locator: id,
                            message: e.to_string(),
                        })
                    }
                }
            },
            Locator::Image(reference) => self.from_image(&reference, options),
            Locator::Path(path) => {
                let blob = self
                    .content
                    .download(&path.to_string_lossy())
                    .map_err(|e| ResolveError::Download {
                        locator: path.display().to_string(),
                        message: e.to_string(),
                    })?;
                let root: Arc<dyn BuildModule> = match options.module_kind {
                    ModuleKind::Buildpack => Arc::new(Buildpack::from_root_blob(blob)?),
                    ModuleKind::Extension => Arc::new(Extension::from_root_blob(blob)?),
                };
                Ok((root, Vec::new()))
            }
        }
    }

    fn from_image(
        &self,
        reference: &str,
        options: &DownloadOptions,
    ) -> Result<(Arc<dyn BuildModule>, Vec<Arc<dyn BuildModule>>), ResolveError> {
        let effective = translate_registry(reference, &options.registry_mirrors)?;
        if effective != reference {
            debug!("pulling '{reference}' via mirror as '{effective}'");
        }

        let image = self.fetcher.fetch(
            &effective,
            FetchOptions {
                daemon: options.daemon,
                pull_policy: options.pull_policy,
                target_os: options.target_os.clone(),
            },
        )?;

        let dest = self.work_dir.join(work_key(&effective));
        extract_packaged_modules(image.as_ref(), &dest)
    }
}

/// Stable per-reference working subdirectory name.
fn work_key(reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(reference.as_bytes());
    hex::encode(hasher.finalize())[..12].to_owned()
}
