use crate::reference::ImageReference;
use crate::ResolveError;
use std::path::{Path, PathBuf};

/// Scheme prefix of registry URN locators.
pub const REGISTRY_URN_PREFIX: &str = "urn:cnb:registry:";

/// Build-time placeholder syntax only meaningful inside composition groups;
/// never a resolvable locator.
const BUILDER_PLACEHOLDER: &str = "from=builder";

/// The recognized shape of a module locator string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// `urn:cnb:registry:<id>[@version]`; the full URN is kept for the
    /// registry resolver.
    RegistryUrn(String),
    /// A valid container image reference.
    Image(String),
    /// An existing filesystem path (already joined to the base dir).
    Path(PathBuf),
    /// A bare `id@version` identifier; tried against the registry first.
    RegistryId(String),
}

/// Recognize the shape of `locator`.
///
/// Recognition is ordered: the builder placeholder is rejected outright, a
/// registry URN always wins, an existing path (absolute, or relative when a
/// base dir is configured) beats the registry-id shape, and a plain image
/// reference comes last. Each recognizer rejects on shape only; resolution
/// failures are the downloader's business.
pub fn parse_locator(
    locator: &str,
    relative_base_dir: Option<&Path>,
    has_registry: bool,
) -> Result<Locator, ResolveError> {
    if locator == BUILDER_PLACEHOLDER || locator.starts_with("from=builder:") {
        return Err(ResolveError::InvalidLocator {
            locator: locator.to_owned(),
            recognizer: "builder placeholder",
        });
    }

    if locator.starts_with(REGISTRY_URN_PREFIX) {
        return Ok(Locator::RegistryUrn(locator.to_owned()));
    }

    let path = Path::new(locator);
    if path.is_absolute() && path.exists() {
        return Ok(Locator::Path(path.to_path_buf()));
    }
    if let Some(base) = relative_base_dir {
        let joined = base.join(locator);
        if joined.exists() {
            return Ok(Locator::Path(joined));
        }
    }

    if has_registry && is_registry_id(locator) {
        return Ok(Locator::RegistryId(locator.to_owned()));
    }

    if ImageReference::parse(locator).is_ok() {
        return Ok(Locator::Image(locator.to_owned()));
    }

    Err(ResolveError::InvalidLocator {
        locator: locator.to_owned(),
        recognizer: "image reference",
    })
}

/// A bare registry identifier: `namespace/name@version`, no scheme.
fn is_registry_id(locator: &str) -> bool {
    let Some((id, version)) = locator.rsplit_once('@') else {
        return false;
    };
    let Some((namespace, name)) = id.split_once('/') else {
        return false;
    };
    let part_ok = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c))
    };
    part_ok(namespace)
        && part_ok(name)
        && !name.contains('/')
        && !version.is_empty()
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || ".+-".contains(c))
}
