use std::path::{Component, Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use uuid::Uuid;

use crate::{constants::IMAGE_FORMATS, error::RecipeError};

/// A decoded `data:image/<type>;base64,<payload>` upload.
#[derive(Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

fn invalid_image() -> RecipeError {
    RecipeError::InvalidField(String::from(
        "Image must be a base64 encoded data URL of a png, jpeg, gif or webp image",
    ))
}

pub fn decode_data_url(data_url: &str) -> Result<DecodedImage, RecipeError> {
    let (mime, payload) = data_url
        .trim()
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .ok_or_else(invalid_image)?;

    let mime = mime.to_ascii_lowercase();
    let extension = IMAGE_FORMATS
        .iter()
        .find(|(format, _)| *format == mime)
        .map(|(_, extension)| *extension)
        .ok_or_else(invalid_image)?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| invalid_image())?;

    if bytes.is_empty() {
        return Err(invalid_image());
    }

    Ok(DecodedImage { extension, bytes })
}

/// Only plain relative paths produced by [`MediaStore::save`] are accepted back.
fn is_stored_path(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Uploaded files under the media root; the database keeps paths relative to it.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decodes and writes an upload into `dir`, returning its stored path.
    pub async fn save(&self, data_url: &str, dir: &str) -> Result<String, RecipeError> {
        let image = decode_data_url(data_url)?;
        let relative = format!("{dir}/{}.{}", Uuid::new_v4(), image.extension);
        let target = self.root.join(&relative);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                log::error!("Could not create media directory {}: {e}", parent.display());
                RecipeError::Storage(String::from("Could not store image"))
            })?;
        }

        tokio::fs::write(&target, &image.bytes).await.map_err(|e| {
            log::error!("Could not write {}: {e}", target.display());
            RecipeError::Storage(String::from("Could not store image"))
        })?;

        Ok(relative)
    }

    /// Best effort; a file that is already gone is not an error.
    pub async fn remove(&self, path: &str) {
        if !is_stored_path(path) {
            log::warn!("Refusing to remove media outside the media root: {path}");
            return;
        }

        match tokio::fs::remove_file(self.root.join(path)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Could not remove media file {path}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent png
    const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

    #[test]
    fn decodes_known_formats() {
        let image = decode_data_url(&format!("data:image/png;base64,{PIXEL}")).unwrap();
        assert_eq!(image.extension, "png");
        assert_eq!(&image.bytes[1..4], b"PNG");

        let image = decode_data_url(&format!("data:image/JPEG;base64,{PIXEL}")).unwrap();
        assert_eq!(image.extension, "jpg");
    }

    #[test]
    fn rejects_malformed_uploads() {
        for input in [
            "",
            PIXEL,
            "data:image/png,plain",
            "data:text/plain;base64,aGVsbG8=",
            "data:image/png;base64,***",
            "data:image/png;base64,",
        ] {
            assert!(
                matches!(decode_data_url(input), Err(RecipeError::InvalidField(_))),
                "{input}"
            );
        }
    }

    #[test]
    fn stored_paths_stay_inside_root() {
        assert!(is_stored_path("recipes/images/a.png"));
        assert!(!is_stored_path("../etc/passwd"));
        assert!(!is_stored_path("/etc/passwd"));
        assert!(!is_stored_path(""));
    }

    #[tokio::test]
    async fn save_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        let path = store
            .save(&format!("data:image/png;base64,{PIXEL}"), "recipes/images")
            .await
            .unwrap();

        assert!(path.starts_with("recipes/images/"));
        assert!(path.ends_with(".png"));
        assert!(dir.path().join(&path).exists());

        store.remove(&path).await;
        assert!(!dir.path().join(&path).exists());

        // second removal is silent
        store.remove(&path).await;
    }
}
