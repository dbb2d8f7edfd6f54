//! Durable homes for generated images.
//!
//! Generated image URLs are short-lived, so the pipeline copies each image to
//! an [`ImageHost`] and stores the hosted URL instead.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use daybook_shared::constants::IMAGE_FOLDER;

use crate::config::CloudinaryCredentials;

const IMAGE_EXTENSION: &str = "png";

#[derive(Debug, Error)]
pub enum ImageHostError {
    #[error("Image transfer failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image host returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Image too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Image is empty")]
    Empty,

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Invalid image name: {0}")]
    InvalidName(String),

    #[error("Image storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image host rejected the request: {0}")]
    Rejected(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Copy the image at `source_url` to durable hosting and return its URL.
    async fn upload(&self, source_url: &str) -> Result<String, ImageHostError>;

    /// Release a hosted image. Unknown images are not an error.
    async fn delete(&self, hosted_url: &str) -> Result<(), ImageHostError>;
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

/// Verify that a resolved path stays within the expected base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ImageHostError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(base)
        .unwrap_or(target)
        .components()
    {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::ParentDir => {
                return Err(ImageHostError::InvalidName(target.display().to_string()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ImageHostError::InvalidName(target.display().to_string()));
    }
    Ok(resolved)
}

/// Accept only names this host produced: `<uuid>.png`.
fn parse_image_name(name: &str) -> Result<Uuid, ImageHostError> {
    name.strip_suffix(IMAGE_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .and_then(|stem| Uuid::parse_str(stem).ok())
        .ok_or_else(|| ImageHostError::InvalidName(name.to_string()))
}

/// Images stored as files and served back by this process under `/images`.
#[derive(Debug, Clone)]
pub struct LocalImageHost {
    client: Client,
    base_path: PathBuf,
    public_base_url: String,
    max_size: usize,
}

impl LocalImageHost {
    pub async fn new(
        base_path: PathBuf,
        public_base_url: &str,
        max_size: usize,
        timeout: Duration,
    ) -> Result<Self, ImageHostError> {
        fs::create_dir_all(&base_path).await?;
        let client = Client::builder().timeout(timeout).build()?;

        info!(path = %base_path.display(), "Local image host initialized");

        Ok(Self {
            client,
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            max_size,
        })
    }

    fn url_prefix(&self) -> String {
        format!("{}/images/", self.public_base_url)
    }

    fn safe_image_path(&self, id: &Uuid) -> Result<PathBuf, ImageHostError> {
        let raw = self.base_path.join(format!("{id}.{IMAGE_EXTENSION}"));
        ensure_within(&self.base_path, &raw)
    }

    /// Write image bytes under a fresh name and return the public URL.
    pub async fn store(&self, data: &[u8]) -> Result<String, ImageHostError> {
        if data.is_empty() {
            return Err(ImageHostError::Empty);
        }
        if data.len() > self.max_size {
            return Err(ImageHostError::TooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let id = Uuid::new_v4();
        let path = self.safe_image_path(&id)?;
        fs::write(&path, data).await?;

        debug!(id = %id, size = data.len(), "Stored image");
        Ok(format!("{}{id}.{IMAGE_EXTENSION}", self.url_prefix()))
    }

    /// Read a stored image by its file name, for `GET /images/{name}`.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, ImageHostError> {
        let id = parse_image_name(name)?;
        let path = self.safe_image_path(&id)?;

        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ImageHostError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ImageHost for LocalImageHost {
    async fn upload(&self, source_url: &str) -> Result<String, ImageHostError> {
        let mut response = self.client.get(source_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageHostError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if let Some(length) = response.content_length() {
            let length = usize::try_from(length).unwrap_or(usize::MAX);
            if length > self.max_size {
                return Err(ImageHostError::TooLarge {
                    size: length,
                    max: self.max_size,
                });
            }
        }

        // The declared length may be absent; enforce the limit as the body arrives.
        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let size = data.len() + chunk.len();
            if size > self.max_size {
                return Err(ImageHostError::TooLarge {
                    size,
                    max: self.max_size,
                });
            }
            data.extend_from_slice(&chunk);
        }

        self.store(&data).await
    }

    async fn delete(&self, hosted_url: &str) -> Result<(), ImageHostError> {
        let Some(name) = hosted_url.strip_prefix(&self.url_prefix()) else {
            debug!(url = %hosted_url, "Image is not hosted locally, nothing to delete");
            return Ok(());
        };

        let id = parse_image_name(name)?;
        let path = self.safe_image_path(&id)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(id = %id, "Deleted image");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Cloudinary
// ---------------------------------------------------------------------------

const CLOUDINARY_API: &str = "https://api.cloudinary.com/v1_1";

/// Cloudinary-hosted images, uploaded by URL into the entries folder.
pub struct CloudinaryImageHost {
    client: Client,
    credentials: CloudinaryCredentials,
}

#[derive(Deserialize)]
struct UploadReply {
    secure_url: String,
}

#[derive(Deserialize)]
struct DestroyReply {
    result: String,
}

impl CloudinaryImageHost {
    pub fn new(
        credentials: CloudinaryCredentials,
        timeout: Duration,
    ) -> Result<Self, ImageHostError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            credentials,
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{CLOUDINARY_API}/{}/image/{action}",
            self.credentials.cloud_name
        )
    }

    /// Signed form post. `params` must not include the credential fields.
    async fn signed_post(
        &self,
        action: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<reqwest::Response, ImageHostError> {
        params.push(("timestamp", chrono::Utc::now().timestamp().to_string()));
        let signature = sign(&params, &self.credentials.api_secret);
        params.push(("api_key", self.credentials.api_key.clone()));
        params.push(("signature", signature));
        params.push(("signature_algorithm", "sha256".to_string()));

        let response = self
            .client
            .post(self.endpoint(action))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageHostError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ImageHost for CloudinaryImageHost {
    async fn upload(&self, source_url: &str) -> Result<String, ImageHostError> {
        let response = self
            .signed_post(
                "upload",
                vec![
                    ("file", source_url.to_string()),
                    ("folder", IMAGE_FOLDER.to_string()),
                ],
            )
            .await?;

        let reply: UploadReply = response
            .json()
            .await
            .map_err(|e| ImageHostError::Rejected(e.to_string()))?;
        Ok(reply.secure_url)
    }

    async fn delete(&self, hosted_url: &str) -> Result<(), ImageHostError> {
        let public_id = public_id_from_url(hosted_url)
            .ok_or_else(|| ImageHostError::InvalidName(hosted_url.to_string()))?;

        let response = self
            .signed_post("destroy", vec![("public_id", public_id.clone())])
            .await?;
        let reply: DestroyReply = response
            .json()
            .await
            .map_err(|e| ImageHostError::Rejected(e.to_string()))?;

        match reply.result.as_str() {
            "ok" | "not found" => {
                debug!(public_id = %public_id, result = %reply.result, "Destroyed image");
                Ok(())
            }
            other => Err(ImageHostError::Rejected(other.to_string())),
        }
    }
}

/// `folder/<last path segment without extension>`.
fn public_id_from_url(url: &str) -> Option<String> {
    let file = url.rsplit('/').next()?;
    let stem = file.split('.').next()?;
    if stem.is_empty() {
        return None;
    }
    Some(format!("{IMAGE_FOLDER}/{stem}"))
}

/// SHA-256 over the alphabetically sorted `key=value` pairs followed by the
/// API secret, hex encoded.
fn sign(params: &[(&'static str, String)], secret: &str) -> String {
    let mut sorted: Vec<_> = params
        .iter()
        .filter(|(key, _)| *key != "file")
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
