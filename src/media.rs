// src/media.rs

use crate::errors::{InferenceError, InferenceResult};
use crate::utils::guess_image_mime;
use base64::{engine::general_purpose, Engine as _};
use std::fs;
use std::path::{Path, PathBuf};

/// Maps an image reference held by a message to a readable local file.
pub trait ImageResolver {
    fn resolve(&self, reference: &str) -> Option<PathBuf>;
}

/// Resolves `file://` URIs and plain paths that exist on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileResolver;

impl ImageResolver for LocalFileResolver {
    fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let raw = reference.strip_prefix("file://").unwrap_or(reference);
        if raw.is_empty() {
            return None;
        }
        let path = PathBuf::from(raw);
        path.is_file().then_some(path)
    }
}

/// Reads an image and embeds it as a base64 `data:` URL.
pub fn encode_image_to_data_url(path: &Path) -> InferenceResult<String> {
    let path_str = path.to_string_lossy();
    let mime_type = guess_image_mime(&path_str).ok_or_else(|| {
        InferenceError::media_error(format!(
            "Could not determine MIME type of the file: {}",
            path_str
        ))
    })?;

    let bytes = fs::read(path)?;
    let encoded = general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime_type, encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_local_file_resolver() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("photo.jpg");
        fs::write(&image, [0xFF, 0xD8, 0xFF]).unwrap();

        let resolver = LocalFileResolver;
        let uri = format!("file://{}", image.display());
        assert_eq!(resolver.resolve(&uri), Some(image.clone()));
        assert_eq!(resolver.resolve(image.to_str().unwrap()), Some(image));
        assert_eq!(resolver.resolve("content://media/external/images/42"), None);
        assert_eq!(resolver.resolve(""), None);
    }

    #[test]
    fn test_encode_image_to_data_url() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("dot.png");
        fs::write(&image, b"png!").unwrap();

        let url = encode_image_to_data_url(&image).unwrap();
        assert_eq!(url, "data:image/png;base64,cG5nIQ==");
    }

    #[test]
    fn test_encode_image_unknown_mime() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("scan.xyz");
        fs::write(&file, b"??").unwrap();

        assert!(matches!(
            encode_image_to_data_url(&file),
            Err(InferenceError::Media(_))
        ));
    }
}
