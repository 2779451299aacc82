//! Image embedding and content-type lookup for generated artifacts.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::errors::ApplicationError;

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// MIME type for images inlined into the proposal. Unknown extensions are treated as PNG.
pub fn image_mime_type(path: &Path) -> &'static str {
    match extension_of(path).as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

/// MIME type used when uploading artifacts to file storage.
pub fn file_mime_type(path: &Path) -> &'static str {
    match extension_of(path).as_str() {
        "html" | "htm" => "text/html",
        "txt" => "text/plain",
        "json" => "application/json",
        "md" => "text/markdown",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

pub async fn image_data_uri(path: &Path) -> Result<String, ApplicationError> {
    let bytes = tokio::fs::read(path).await.map_err(|error| {
        ApplicationError::Storage(format!("could not read image `{}`: {error}", path.display()))
    })?;
    Ok(data_uri(image_mime_type(path), &bytes))
}

/// Reads an optional image, returning `None` when it is unset or missing on disk.
pub async fn optional_image_data_uri(path: Option<&Path>) -> Option<String> {
    let path = path?;
    match image_data_uri(path).await {
        Ok(uri) => Some(uri),
        Err(error) => {
            tracing::warn!(
                event_name = "assets.image.skipped",
                path = %path.display(),
                error = %error,
                "image could not be embedded"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::{data_uri, file_mime_type, image_data_uri, image_mime_type, optional_image_data_uri};

    #[test]
    fn image_types_follow_extension_with_png_fallback() {
        assert_eq!(image_mime_type(Path::new("logo.JPG")), "image/jpeg");
        assert_eq!(image_mime_type(Path::new("logo.svg")), "image/svg+xml");
        assert_eq!(image_mime_type(Path::new("logo")), "image/png");
    }

    #[test]
    fn file_types_fall_back_to_octet_stream() {
        assert_eq!(file_mime_type(Path::new("proposal.html")), "text/html");
        assert_eq!(file_mime_type(Path::new("data.json")), "application/json");
        assert_eq!(file_mime_type(Path::new("archive.tar")), "application/octet-stream");
    }

    #[test]
    fn data_uri_is_base64() {
        assert_eq!(data_uri("image/png", b"hi"), "data:image/png;base64,aGk=");
    }

    #[tokio::test]
    async fn reads_image_into_data_uri() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("logo.gif");
        std::fs::write(&path, b"GIF89a").expect("write");

        let uri = image_data_uri(&path).await.expect("data uri");
        assert_eq!(uri, "data:image/gif;base64,R0lGODlh");
    }

    #[tokio::test]
    async fn missing_optional_image_is_skipped() {
        assert!(optional_image_data_uri(None).await.is_none());
        assert!(optional_image_data_uri(Some(Path::new("/definitely/not/here.png"))).await.is_none());
    }
}
