use crate::labels::DiffId;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image has no layer with diffID '{0}'")]
    MissingLayer(String),
    #[error("failed to save image '{name}': {message}")]
    Save { name: String, message: String },
}

/// The image surface the packaging core works against.
///
/// Implemented by the OCI layout image in `hoist-archive`, by the in-memory
/// [`FakeImage`](crate::fake::FakeImage), and by whatever daemon/registry
/// image type the embedding application supplies.
pub trait WorkableImage: Send + Debug {
    /// The destination or source reference this image is known by.
    fn name(&self) -> &str;

    fn label(&self, key: &str) -> Result<Option<String>, ImageError>;

    fn set_label(&mut self, key: &str, value: &str) -> Result<(), ImageError>;

    /// Append an uncompressed layer tar whose content hash is `diff_id`.
    fn add_layer_with_diff_id(&mut self, tar_path: &Path, diff_id: &DiffId)
        -> Result<(), ImageError>;

    /// Path to the layer tar previously recorded under `diff_id`.
    fn layer(&self, diff_id: &DiffId) -> Result<PathBuf, ImageError>;

    fn save(&mut self) -> Result<(), ImageError>;
}
