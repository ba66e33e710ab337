use crate::ResolveError;
use std::collections::BTreeMap;
use std::fmt;

/// Registry host assumed when a reference names none.
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

/// A parsed container image reference:
/// `[host[:port]/]repository[:tag][@digest]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    registry: Option<String>,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self, ResolveError> {
        let err = |reason: &str| ResolveError::MalformedReference {
            reference: reference.to_owned(),
            reason: reason.to_owned(),
        };

        if reference.is_empty() {
            return Err(err("empty reference"));
        }
        if reference.chars().any(char::is_whitespace) {
            return Err(err("contains whitespace"));
        }

        let (rest, digest) = match reference.split_once('@') {
            Some((r, d)) => {
                if !is_valid_digest(d) {
                    return Err(err("invalid digest"));
                }
                (r, Some(d.to_owned()))
            }
            None => (reference, None),
        };

        // The first path component is a registry host only when it can be
        // one: it contains a dot or port, or is the literal "localhost".
        let (registry, path) = match rest.split_once('/') {
            Some((first, remainder))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                if !is_valid_host(first) {
                    return Err(err("invalid registry host"));
                }
                (Some(first.to_owned()), remainder)
            }
            _ => (None, rest),
        };

        // A tag can only live in the last path segment.
        let (repository, tag) = match path.rsplit_once('/') {
            Some((head, last)) => match last.split_once(':') {
                Some((name, t)) => (format!("{head}/{name}"), Some(t.to_owned())),
                None => (path.to_owned(), None),
            },
            None => match path.split_once(':') {
                Some((name, t)) => (name.to_owned(), Some(t.to_owned())),
                None => (path.to_owned(), None),
            },
        };

        if let Some(t) = &tag {
            if !is_valid_tag(t) {
                return Err(err("invalid tag"));
            }
        }

        if repository.is_empty() {
            return Err(err("empty repository"));
        }
        for component in repository.split('/') {
            if !is_valid_repo_component(component) {
                return Err(err("invalid repository component"));
            }
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// The registry host, defaulting when the reference names none.
    pub fn registry_str(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Digest when present, else tag, else `latest`.
    pub fn identifier(&self) -> String {
        if let Some(d) = &self.digest {
            d.clone()
        } else if let Some(t) = &self.tag {
            t.clone()
        } else {
            "latest".to_owned()
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        f.write_str(&self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

fn is_valid_digest(digest: &str) -> bool {
    let Some((algorithm, hex_part)) = digest.split_once(':') else {
        return false;
    };
    !algorithm.is_empty()
        && algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && hex_part.len() >= 32
        && hex_part
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

fn is_valid_host(host: &str) -> bool {
    let (name, port) = match host.split_once(':') {
        Some((n, p)) => (n, Some(p)),
        None => (host, None),
    };
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return false;
    }
    let first = name.chars().next().unwrap_or(' ');
    let last = name.chars().next_back().unwrap_or(' ');
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return false;
    }
    match port {
        Some(p) => !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()),
        None => true,
    }
}

fn is_valid_tag(tag: &str) -> bool {
    if tag.is_empty() || tag.len() > 128 {
        return false;
    }
    let mut chars = tag.chars();
    let first = chars.next().unwrap_or(' ');
    (first.is_ascii_alphanumeric() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

fn is_valid_repo_component(component: &str) -> bool {
    if component.is_empty() {
        return false;
    }
    let lower_ok = component
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_' || c == '-');
    let first = component.chars().next().unwrap_or(' ');
    let last = component.chars().next_back().unwrap_or(' ');
    lower_ok && first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric()
}

/// Rewrite an image reference against a registry mirror map.
///
/// If the map has an entry for the reference's registry host, the effective
/// pull reference becomes `<mirror>/<repository>:<identifier>`; a rewrite
/// that no longer parses is a hard error. With no matching entry, the
/// reference is returned unchanged.
pub fn translate_registry(
    name: &str,
    mirrors: &BTreeMap<String, String>,
) -> Result<String, ResolveError> {
    if mirrors.is_empty() {
        return Ok(name.to_owned());
    }

    let reference = ImageReference::parse(name)?;
    let Some(mirror) = mirrors.get(reference.registry_str()) else {
        return Ok(name.to_owned());
    };

    let rewritten = format!("{}/{}:{}", mirror, reference.repository(), reference.identifier());
    ImageReference::parse(&rewritten)?;
    Ok(rewritten)
}
