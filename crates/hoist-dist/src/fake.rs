use crate::image::{ImageError, WorkableImage};
use crate::labels::DiffId;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// In-memory image double used across the workspace's tests.
///
/// Layer tars are copied into a private temp directory so they stay readable
/// after the caller's working directory is gone (a packaged fake can later be
/// handed to the resolver as a fetched image).
#[derive(Debug)]
pub struct FakeImage {
    name: String,
    labels: BTreeMap<String, String>,
    layers: Vec<(PathBuf, DiffId)>,
    dir: TempDir,
    saved: bool,
    save_error: Option<String>,
}

impl FakeImage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            layers: Vec::new(),
            dir: tempfile::tempdir().expect("create fake image dir"),
            saved: false,
            save_error: None,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn diff_ids(&self) -> Vec<DiffId> {
        self.layers.iter().map(|(_, d)| d.clone()).collect()
    }

    /// Make the next `save()` fail with the given message.
    pub fn set_save_error(&mut self, message: impl Into<String>) {
        self.save_error = Some(message.into());
    }
}

impl WorkableImage for FakeImage {
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
        let dest = self.dir.path().join(format!("layer-{}.tar", self.layers.len()));
        fs::copy(tar_path, &dest)?;
        self.layers.push((dest, diff_id.clone()));
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
        if let Some(message) = self.save_error.take() {
            return Err(ImageError::Save {
                name: self.name.clone(),
                message,
            });
        }
        self.saved = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_roundtrip() {
        let mut img = FakeImage::new("some/package:tag");
        img.set_label("k", "v").unwrap();
        assert_eq!(img.label("k").unwrap().as_deref(), Some("v"));
        assert_eq!(img.label("missing").unwrap(), None);
    }

    #[test]
    fn layers_survive_source_removal() {
        let src = tempfile::tempdir().unwrap();
        let tar = src.path().join("m.tar");
        fs::write(&tar, b"tar bytes").unwrap();

        let mut img = FakeImage::new("some/package");
        let diff = DiffId::new("sha256:abc");
        img.add_layer_with_diff_id(&tar, &diff).unwrap();
        drop(src);

        let kept = img.layer(&diff).unwrap();
        assert_eq!(fs::read(kept).unwrap(), b"tar bytes");
    }

    #[test]
    fn missing_layer_is_an_error() {
        let img = FakeImage::new("some/package");
        let err = img.layer(&DiffId::new("sha256:nope")).unwrap_err();
        assert!(err.to_string().contains("sha256:nope"));
    }

    #[test]
    fn save_marks_and_can_fail() {
        let mut img = FakeImage::new("some/package");
        assert!(!img.is_saved());
        img.save().unwrap();
        assert!(img.is_saved());

        let mut failing = FakeImage::new("other/package");
        failing.set_save_error("push refused");
        let err = failing.save().unwrap_err();
        assert!(err.to_string().contains("push refused"));
        assert!(!failing.is_saved());
    }
}
