//! Attachment resolution.
//!
//! Image attachments are sent to the model as `image_url` parts, which must
//! be either a remote URL or an embeddable `data:` URI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;
use tracing::debug;

use parley_core::Attachment;

/// Why an attachment could not be resolved.
#[derive(Error, Debug)]
pub enum AttachmentError {
    #[error("Failed to read attachment {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported attachment URI: {0}")]
    Unsupported(String),
}

/// Turns an attachment into a URL the model endpoint can fetch or embed.
#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    async fn resolve(&self, attachment: &Attachment) -> Result<String, AttachmentError>;
}

/// Resolver that inlines local files as base64 `data:` URIs.
///
/// `data:` and `http(s)` URIs are passed through unchanged. Anything else
/// is read from disk, either as a `file://` URI or a plain path.
#[derive(Debug, Clone, Default)]
pub struct InlineAttachmentResolver {
    /// Base directory for relative paths
    base_dir: Option<PathBuf>,
}

impl InlineAttachmentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `dir`.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn local_path(&self, uri: &str) -> Result<PathBuf, AttachmentError> {
        let raw = uri.strip_prefix("file://").unwrap_or(uri);
        if raw.is_empty() || raw.contains("://") {
            return Err(AttachmentError::Unsupported(uri.to_string()));
        }
        let path = Path::new(raw);
        Ok(match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        })
    }
}

/// MIME type for a path, from its extension.
pub fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[async_trait]
impl AttachmentResolver for InlineAttachmentResolver {
    async fn resolve(&self, attachment: &Attachment) -> Result<String, AttachmentError> {
        let uri = attachment.uri.trim();
        let lower = uri.to_ascii_lowercase();
        if lower.starts_with("data:") || lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(uri.to_string());
        }

        let path = self.local_path(uri)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| AttachmentError::Read {
                path: path.clone(),
                source,
            })?;

        let mime_type = attachment
            .mime_type
            .clone()
            .unwrap_or_else(|| guess_mime_type(&path));
        debug!(path = %path.display(), mime = %mime_type, bytes = bytes.len(), "Inlining attachment");

        Ok(format!("data:{};base64,{}", mime_type, STANDARD.encode(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_pass_through_uris() {
        let resolver = InlineAttachmentResolver::new();
        for uri in [
            "data:image/png;base64,AAAA",
            "https://example.com/cat.jpg",
            "HTTP://example.com/a.png",
        ] {
            let resolved = resolver.resolve(&Attachment::image(uri)).await.unwrap();
            assert_eq!(resolved, uri);
        }
    }

    #[tokio::test]
    async fn test_inline_local_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("pixel.png"), [0x89, b'P', b'N', b'G']).unwrap();

        let resolver = InlineAttachmentResolver::new().with_base_dir(dir.path());
        let resolved = resolver
            .resolve(&Attachment::image("pixel.png"))
            .await
            .unwrap();
        assert_eq!(resolved, "data:image/png;base64,iVBORw==");
    }

    #[tokio::test]
    async fn test_explicit_mime_type_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, b"abc").unwrap();

        let attachment = Attachment::image(format!("file://{}", path.display()))
            .with_mime_type("image/webp");
        let resolved = InlineAttachmentResolver::new()
            .resolve(&attachment)
            .await
            .unwrap();
        assert_eq!(resolved, "data:image/webp;base64,YWJj");
    }

    #[tokio::test]
    async fn test_missing_file_and_unsupported_scheme() {
        let resolver = InlineAttachmentResolver::new();
        let err = resolver
            .resolve(&Attachment::image("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Read { .. }));

        let err = resolver
            .resolve(&Attachment::image("s3://bucket/key.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Unsupported(_)));
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(guess_mime_type(Path::new("a.unknownext")), "application/octet-stream");
    }
}
