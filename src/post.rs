use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{AppError, AppResult};

pub const MAX_POST_LENGTH: usize = 3000;
pub const MAX_IMAGE_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    Public,
    Connections,
}

impl Visibility {
    pub fn describe(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Connections => "connections only",
        }
    }
}

/// Where the post text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSource {
    Inline(String),
    File(PathBuf),
    Stdin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostContent {
    pub text: String,
    pub visibility: Visibility,
    pub image_path: Option<PathBuf>,
}

impl PostContent {
    /// Trims and validates everything locally, so bad input fails before any
    /// request is made.
    pub fn new(
        text: &str,
        visibility: Visibility,
        image_path: Option<PathBuf>,
    ) -> AppResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::InvalidInput("Empty post text, aborting".into()));
        }
        let length = text.chars().count();
        if length > MAX_POST_LENGTH {
            return Err(AppError::InvalidInput(format!(
                "Post too long: {}/{} characters",
                length, MAX_POST_LENGTH
            )));
        }
        if let Some(path) = &image_path {
            validate_image(path)?;
        }

        Ok(Self {
            text: text.to_string(),
            visibility,
            image_path,
        })
    }
}

pub fn read_text(source: &TextSource, stdin: &mut dyn Read) -> AppResult<String> {
    match source {
        TextSource::Inline(text) => Ok(text.clone()),
        TextSource::File(path) => fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                AppError::InvalidInput(format!("File not found: {}", path.display()))
            }
            ErrorKind::InvalidData => {
                AppError::InvalidInput(format!("{} is not valid UTF-8", path.display()))
            }
            _ => AppError::Io(e),
        }),
        TextSource::Stdin => {
            let mut text = String::new();
            stdin.read_to_string(&mut text).map_err(|e| match e.kind() {
                ErrorKind::InvalidData => {
                    AppError::InvalidInput("Standard input is not valid UTF-8".into())
                }
                _ => AppError::Io(e),
            })?;
            Ok(text)
        }
    }
}

/// Checks format and size of an attachment, returning its content type.
pub fn validate_image(path: &Path) -> AppResult<&'static str> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => AppError::InvalidInput(format!("Image not found: {}", path.display())),
        _ => AppError::Io(e),
    })?;
    if !metadata.is_file() {
        return Err(AppError::InvalidInput(format!(
            "Image is not a file: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let content_type = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        other => {
            return Err(AppError::InvalidInput(format!(
                "Unsupported image format '.{}'. Supported: .gif, .jpeg, .jpg, .png",
                other
            )))
        }
    };

    if metadata.len() > MAX_IMAGE_SIZE {
        return Err(AppError::InvalidInput(format!(
            "Image too large: {} bytes (max {} bytes / 100 MB)",
            metadata.len(),
            MAX_IMAGE_SIZE
        )));
    }

    Ok(content_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_text_is_trimmed() {
        let post = PostContent::new("  Hello world!\n", Visibility::Public, None).unwrap();
        assert_eq!(post.text, "Hello world!");
    }

    #[test]
    fn test_blank_text_rejected() {
        for text in ["", "   \n\t"] {
            let err = PostContent::new(text, Visibility::Public, None).unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_length_limit_counts_characters() {
        let at_limit = "é".repeat(MAX_POST_LENGTH);
        assert!(PostContent::new(&at_limit, Visibility::Public, None).is_ok());

        let over = "a".repeat(MAX_POST_LENGTH + 1);
        let err = PostContent::new(&over, Visibility::Public, None).unwrap_err();
        assert!(err.to_string().contains("3001/3000"));
    }

    #[test]
    fn test_read_from_stdin_until_eof() {
        let mut stdin = Cursor::new("line one\nline two\n");
        let text = read_text(&TextSource::Stdin, &mut stdin).unwrap();
        assert_eq!(text, "line one\nline two\n");
    }

    #[test]
    fn test_read_from_missing_file() {
        let dir = tempdir().unwrap();
        let source = TextSource::File(dir.path().join("missing.txt"));
        let err = read_text(&source, &mut std::io::empty()).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_read_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("post.txt");
        fs::write(&path, "From a file\n").unwrap();

        let text = read_text(&TextSource::File(path), &mut std::io::empty()).unwrap();
        assert_eq!(text, "From a file\n");
    }

    #[test]
    fn test_image_validation() {
        let dir = tempdir().unwrap();
        let png = dir.path().join("photo.PNG");
        fs::write(&png, b"\x89PNG").unwrap();
        assert_eq!(validate_image(&png).unwrap(), "image/png");

        let bmp = dir.path().join("photo.bmp");
        fs::write(&bmp, b"BM").unwrap();
        assert!(validate_image(&bmp)
            .unwrap_err()
            .to_string()
            .contains("Unsupported image format '.bmp'"));

        let missing = dir.path().join("nope.jpg");
        assert!(matches!(
            PostContent::new("hi", Visibility::Public, Some(missing)),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_visibility_wire_names() {
        assert_eq!(serde_json::to_value(Visibility::Public).unwrap(), "PUBLIC");
        assert_eq!(
            serde_json::to_value(Visibility::Connections).unwrap(),
            "CONNECTIONS"
        );
    }
}
