//! Generated media persistence.
//!
//! Images land under `<root>/<agent>/gallery/<YYYY-MM-DD>/`, with a
//! running `main.json` manifest per gallery; speech clips land under
//! `<root>/<agent>/audio/`. The public URLs mirror the on-disk layout.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use deva_core::error::{Error, Result};
use deva_core::hash;
use deva_providers::GeneratedImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes generated assets beneath a configured root directory.
pub struct MediaStore {
    root: PathBuf,
}

/// A persisted generated image, also the gallery manifest entry shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedImage {
    pub name: String,
    pub path: PathBuf,
    pub url: String,
    pub prompt: String,
    pub created: i64,
    pub hash: String,
}

/// A persisted speech clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAudio {
    pub name: String,
    pub path: PathBuf,
    pub url: String,
    pub hash: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GalleryManifest {
    images: Vec<SavedImage>,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Decode and write a generated image, appending it to the agent's
    /// gallery manifest.
    pub async fn save_image(
        &self,
        agent_key: &str,
        image: &GeneratedImage,
        fallback_prompt: &str,
    ) -> Result<SavedImage> {
        let bytes = BASE64
            .decode(&image.b64_json)
            .map_err(|e| Error::Internal(format!("image payload decode: {e}")))?;

        let created = Utc::now();
        let name = format!("{}.png", created.timestamp_millis());
        let day = created.format("%Y-%m-%d").to_string();

        let gallery = self.root.join(agent_key).join("gallery");
        let dir = gallery.join(&day);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(&name);
        tokio::fs::write(&path, &bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote generated image");

        let prompt = image
            .revised_prompt
            .clone()
            .unwrap_or_else(|| fallback_prompt.to_string());
        let url = format!("/assets/devas/{agent_key}/gallery/{name}");

        let mut saved = SavedImage {
            name,
            path,
            url,
            prompt,
            created: created.timestamp(),
            hash: String::new(),
        };
        saved.hash = hash::sha256_hex(&saved)?;

        self.append_manifest(&gallery, &saved).await?;
        Ok(saved)
    }

    /// Write a speech clip under the agent's audio directory.
    pub async fn save_audio(&self, agent_key: &str, bytes: &[u8]) -> Result<SavedAudio> {
        let created = Utc::now();
        let name = format!("{}.mp3", created.timestamp_millis());

        let dir = self.root.join(agent_key).join("audio");
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(&name);
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote speech clip");

        let url = format!("/assets/devas/{agent_key}/audio/{name}");
        let mut saved = SavedAudio {
            name,
            path,
            url,
            hash: String::new(),
        };
        saved.hash = hash::sha256_hex(&saved)?;
        Ok(saved)
    }

    /// Read-modify-write the gallery manifest, creating it when missing.
    async fn append_manifest(&self, gallery: &Path, entry: &SavedImage) -> Result<()> {
        let manifest_path = gallery.join("main.json");
        let mut manifest = match tokio::fs::read_to_string(&manifest_path).await {
            Ok(raw) => serde_json::from_str::<GalleryManifest>(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => GalleryManifest::default(),
            Err(e) => return Err(e.into()),
        };

        manifest.images.push(entry.clone());
        tokio::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?).await?;
        Ok(())
    }
}
