use crate::layer::{file_sha256, unpack_tar, write_dir_tar};
use crate::ArchiveError;
use chrono::{SecondsFormat, Utc};
use hoist_dist::{DiffId, ImageError, WorkableImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const MEDIA_TYPE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const MEDIA_TYPE_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct OciDescriptor {
    #[serde(rename = "mediaType")]
    media_type: String,
    digest: String,
    size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct OciIndex {
    #[serde(rename = "schemaVersion")]
    schema_version: u32,
    manifests: Vec<OciDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OciManifest {
    #[serde(rename = "schemaVersion")]
    schema_version: u32,
    #[serde(rename = "mediaType")]
    media_type: String,
    config: OciDescriptor,
    layers: Vec<OciDescriptor>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigSection {
    #[serde(rename = "Labels", default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RootFs {
    #[serde(rename = "type")]
    fs_type: String,
    diff_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigFile {
    created: String,
    architecture: String,
    os: String,
    config: ConfigSection,
    rootfs: RootFs,
}

/// An in-memory image that serializes to an OCI image layout.
///
/// Layer tars are referenced by path, not copied; they must stay on disk
/// until [`write_layout`](Self::write_layout) or
/// [`write_archive`](Self::write_archive) has run. `save()` is a no-op;
/// persistence happens through the explicit write methods.
#[derive(Debug)]
pub struct LayoutImage {
    name: String,
    os: String,
    labels: BTreeMap<String, String>,
    layers: Vec<(PathBuf, DiffId)>,
}

impl LayoutImage {
    pub fn new(name: impl Into<String>, target_os: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            os: target_os.into(),
            labels: BTreeMap::new(),
            layers: Vec::new(),
        }
    }

    /// Write a complete OCI image layout (oci-layout, index.json, blobs)
    /// into `dir`. Layer blob digests are verified against their recorded
    /// diffIDs; layers are uncompressed, so the two must agree.
    pub fn write_layout(&self, dir: &Path) -> Result<(), ArchiveError> {
        let blobs = dir.join("blobs").join("sha256");
        fs::create_dir_all(&blobs)?;

        let mut layer_descriptors = Vec::new();
        let mut diff_ids = Vec::new();
        for (tar_path, diff_id) in &self.layers {
            let computed = file_sha256(tar_path)?;
            if computed != diff_id.encoded() {
                return Err(ArchiveError::DigestMismatch {
                    path: tar_path.display().to_string(),
                    recorded: diff_id.to_string(),
                    computed: format!("sha256:{computed}"),
                });
            }
            let dest = blobs.join(&computed);
            if !dest.exists() {
                fs::copy(tar_path, &dest)?;
            }
            layer_descriptors.push(OciDescriptor {
                media_type: MEDIA_TYPE_LAYER.to_owned(),
                digest: format!("sha256:{computed}"),
                size: fs::metadata(&dest)?.len(),
            });
            diff_ids.push(diff_id.to_string());
        }

        let config = ConfigFile {
            created: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            architecture: "amd64".to_owned(),
            os: self.os.clone(),
            config: ConfigSection {
                labels: self.labels.clone(),
            },
            rootfs: RootFs {
                fs_type: "layers".to_owned(),
                diff_ids,
            },
        };
        let config_descriptor = write_json_blob(&blobs, MEDIA_TYPE_CONFIG, &config)?;

        let manifest = OciManifest {
            schema_version: 2,
            media_type: MEDIA_TYPE_MANIFEST.to_owned(),
            config: config_descriptor,
            layers: layer_descriptors,
        };
        let manifest_descriptor = write_json_blob(&blobs, MEDIA_TYPE_MANIFEST, &manifest)?;

        let index = OciIndex {
            schema_version: 2,
            manifests: vec![manifest_descriptor],
        };
        fs::write(dir.join("index.json"), serde_json::to_vec(&index)?)?;
        fs::write(dir.join("oci-layout"), br#"{"imageLayoutVersion":"1.0.0"}"#)?;
        Ok(())
    }

    /// Serialize the whole layout into a single tar archive at `path`.
    pub fn write_archive(&self, path: &Path) -> Result<(), ArchiveError> {
        let staging = tempfile::tempdir()?;
        self.write_layout(staging.path())?;
        write_dir_tar(path, staging.path(), "")
    }
}

fn write_json_blob<T: Serialize>(
    blobs: &Path,
    media_type: &str,
    value: &T,
) -> Result<OciDescriptor, ArchiveError> {
    let bytes = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let hex_digest = hex::encode(hasher.finalize());
    fs::write(blobs.join(&hex_digest), &bytes)?;
    Ok(OciDescriptor {
        media_type: media_type.to_owned(),
        digest: format!("sha256:{hex_digest}"),
        size: bytes.len() as u64,
    })
}

impl WorkableImage for LayoutImage {
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self, key: &str) -> Result<Option<String>, ImageError> {
        Ok(self.labels.get(key).cloned())
    }

    fn set_label(&mut self, key: &str, value: &str) -> Result<(), ImageError> {
        self.labels.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn add_layer_with_diff_id(
        &mut self,
        tar_path: &Path,
        diff_id: &DiffId,
    ) -> Result<(), ImageError> {
        self.layers.push((tar_path.to_path_buf(), diff_id.clone()));
        Ok(())
    }

    fn layer(&self, diff_id: &DiffId) -> Result<PathBuf, ImageError> {
        self.layers
            .iter()
            .find(|(_, d)| d == diff_id)
            .map(|(p, _)| p.clone())
            .ok_or_else(|| ImageError::MissingLayer(diff_id.to_string()))
    }

    fn save(&mut self) -> Result<(), ImageError> {
        Ok(())
    }
}

/// A package archive written by [`LayoutImage::write_archive`], re-opened.
///
/// The archive is unpacked into a private temp directory that lives as long
/// as this value; blob paths handed out stay readable until then.
pub struct LayoutArchive {
    labels: BTreeMap<String, String>,
    diff_ids: Vec<DiffId>,
    dir: TempDir,
}

impl LayoutArchive {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let dir = tempfile::tempdir()?;
        unpack_tar(path, dir.path())?;

        let index: OciIndex = read_json(&dir.path().join("index.json"))?;
        let manifest_descriptor = index
            .manifests
            .first()
            .ok_or_else(|| ArchiveError::InvalidLayout("index has no manifests".to_owned()))?;

        let manifest: OciManifest = read_json(&blob_path(dir.path(), &manifest_descriptor.digest)?)?;
        let config: ConfigFile = read_json(&blob_path(dir.path(), &manifest.config.digest)?)?;

        let diff_ids = config
            .rootfs
            .diff_ids
            .into_iter()
            .map(DiffId::new)
            .collect();

        Ok(Self {
            labels: config.config.labels,
            diff_ids,
            dir,
        })
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn diff_ids(&self) -> &[DiffId] {
        &self.diff_ids
    }

    /// Path to the layer blob recorded under `diff_id`.
    pub fn layer_path(&self, diff_id: &DiffId) -> Result<PathBuf, ArchiveError> {
        let path = self
            .dir
            .path()
            .join("blobs")
            .join("sha256")
            .join(diff_id.encoded());
        if !path.exists() {
            return Err(ArchiveError::MissingBlob(diff_id.to_string()));
        }
        Ok(path)
    }
}

fn blob_path(layout_dir: &Path, digest: &str) -> Result<PathBuf, ArchiveError> {
    let hex_digest = digest
        .strip_prefix("sha256:")
        .ok_or_else(|| ArchiveError::InvalidLayout(format!("unsupported digest '{digest}'")))?;
    let path = layout_dir.join("blobs").join("sha256").join(hex_digest);
    if !path.exists() {
        return Err(ArchiveError::MissingBlob(digest.to_owned()));
    }
    Ok(path)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ArchiveError> {
    let content = fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}
