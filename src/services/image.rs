//! Blog image uploads
//!
//! Files are validated against the upload config, written under
//! `{upload.path}/images/blogs/` and recorded as unattached images.

use crate::config::UploadConfig;
use crate::db::repositories::ImageRepository;
use crate::models::{Image, NewAuditLog, User};
use crate::services::audit::{actions, targets, AuditService};
use anyhow::Context;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;

/// Directory below the upload root, also the URL path below `/uploads`
const BLOG_IMAGE_DIR: &str = "images/blogs";

#[derive(Debug, thiserror::Error)]
pub enum ImageServiceError {
    #[error("{0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ImageService {
    images: Arc<dyn ImageRepository>,
    config: Arc<UploadConfig>,
    audit: Arc<AuditService>,
}

impl ImageService {
    pub fn new(images: Arc<dyn ImageRepository>, config: Arc<UploadConfig>, audit: Arc<AuditService>) -> Self {
        Self { images, config, audit }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Check type and size before anything touches the disk
    pub fn validate(&self, content_type: &str, size: usize) -> Result<(), ImageServiceError> {
        if size == 0 {
            return Err(ImageServiceError::ValidationError(
                "No image file provided.".to_string(),
            ));
        }
        if !self.config.is_type_allowed(content_type) {
            return Err(ImageServiceError::ValidationError(format!(
                "Invalid file type: {}. Allowed types: {}",
                content_type,
                self.config.allowed_types.join(", ")
            )));
        }
        if size as u64 > self.config.max_file_size {
            return Err(ImageServiceError::ValidationError(format!(
                "File too large. Maximum size: {} MB",
                self.config.max_file_size / 1024 / 1024
            )));
        }
        Ok(())
    }

    /// Store an uploaded blog image and record it
    pub async fn store(
        &self,
        uploader: &User,
        original_name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<Image, ImageServiceError> {
        self.validate(content_type, data.len())?;

        let dir = self.directory();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create upload directory {}", dir.display()))?;

        let mut name = sanitize_file_name(original_name);
        if name.is_empty() {
            name = format!("image.{}", self.config.get_extension(content_type));
        }
        let file_name = format!("{}-{}", Utc::now().timestamp_millis(), name);
        let path = dir.join(&file_name);
        fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let url = format!("/uploads/{}/{}", BLOG_IMAGE_DIR, file_name);
        let image = self
            .images
            .create(&url, Some(uploader.id))
            .await
            .context("Failed to record image")?;

        self.audit
            .record(
                NewAuditLog::new(actions::UPLOAD_IMAGE, targets::IMAGE, image.id, uploader.id)
                    .with_details(url.clone()),
            )
            .await;
        tracing::info!("Image uploaded: {} ({} bytes) by {}", url, data.len(), uploader.username);

        Ok(image)
    }

    fn directory(&self) -> PathBuf {
        self.config.path.join(BLOG_IMAGE_DIR)
    }
}

/// Whitespace to `_`, lowercase, then only `[a-z0-9._-]` survives
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c.to_ascii_lowercase() })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}
