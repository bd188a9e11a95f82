// Input locator resolution
//
// Turns the caller's opaque locator into a readable file on local storage:
// - plain filesystem paths
// - file:// and file:/ locators (query component stripped)
// - content: references, looked up through a host ContentResolver

pub mod provider;

use percent_encoding::percent_decode_str;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub use provider::*;

use crate::error::{BridgeError, Result};

/// Shape of a decoded locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Path(PathBuf),
    Content(String),
}

impl Locator {
    /// Decode and classify a raw locator. Does not touch the filesystem.
    pub fn parse(raw: &str) -> Result<Self> {
        let decoded = decode_locator(raw)?;
        if decoded.trim().is_empty() {
            return Err(BridgeError::InvalidLocator("locator is empty".to_string()));
        }

        if decoded.starts_with("content:") {
            return Ok(Locator::Content(decoded));
        }
        if let Some(rest) = decoded.strip_prefix("file://") {
            let path = rest.split_once('?').map_or(rest, |(path, _)| path);
            return Self::non_empty_path(path, raw);
        }
        if decoded.starts_with("file:/") {
            // Single-slash form is already rooted; keep the slash
            return Self::non_empty_path(&decoded["file:".len()..], raw);
        }
        if let Some(scheme) = foreign_scheme(&decoded) {
            return Err(BridgeError::InvalidLocator(format!(
                "unsupported scheme '{}' in {}",
                scheme, raw
            )));
        }
        Ok(Locator::Path(PathBuf::from(decoded)))
    }

    fn non_empty_path(path: &str, raw: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(BridgeError::InvalidLocator(format!("no path in {}", raw)));
        }
        Ok(Locator::Path(PathBuf::from(path)))
    }
}

/// URL-decode a locator the way form-encoded strings are decoded:
/// `+` becomes a space and `%XX` sequences are unescaped.
pub fn decode_locator(raw: &str) -> Result<String> {
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| BridgeError::InvalidLocator(format!("cannot decode '{}': {}", raw, e)))
}

/// Scheme of a `scheme://...` locator other than file/content
fn foreign_scheme(decoded: &str) -> Option<&str> {
    let (scheme, _) = decoded.split_once("://")?;
    let valid = scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

pub struct PathResolver {
    content: Arc<dyn ContentResolver>,
}

impl PathResolver {
    pub fn new(content: Arc<dyn ContentResolver>) -> Self {
        Self { content }
    }

    /// Resolve `locator` to an absolute path of an existing, readable file
    pub fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let path = match Locator::parse(locator)? {
            Locator::Path(path) => path,
            Locator::Content(content_locator) => {
                let provider = Provider::classify(&content_locator)?;
                provider.lookup(self.content.as_ref(), &content_locator)?
            }
        };

        let path = std::path::absolute(&path).map_err(|e| {
            BridgeError::InvalidLocator(format!("cannot make {} absolute: {}", path.display(), e))
        })?;
        check_readable(&path)?;

        debug!("Resolved locator {} to {}", locator, path.display());
        Ok(path)
    }
}

fn check_readable(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => BridgeError::InputNotFound(path.display().to_string()),
        _ => BridgeError::InputUnreadable(format!("{}: {}", path.display(), e)),
    })?;
    if metadata.is_dir() {
        return Err(BridgeError::InputUnreadable(format!("{} is a directory", path.display())));
    }

    File::open(path)
        .map(drop)
        .map_err(|e| BridgeError::InputUnreadable(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PathResolver {
        PathResolver::new(Arc::new(LocalContentResolver::new("/nonexistent-root")))
    }

    #[test]
    fn test_file_locator_strips_query() {
        assert_eq!(
            Locator::parse("file:///a/b/c.mp4?token=x").unwrap(),
            Locator::Path(PathBuf::from("/a/b/c.mp4"))
        );
    }

    #[test]
    fn test_single_slash_file_locator() {
        assert_eq!(
            Locator::parse("file:/a/b/c.mp4").unwrap(),
            Locator::Path(PathBuf::from("/a/b/c.mp4"))
        );
    }

    #[test]
    fn test_resolve_single_slash_file_locator() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("c.mp4");
        std::fs::write(&file, b"data").unwrap();

        let locator = format!("file:{}", file.display());
        assert_eq!(resolver().resolve(&locator).unwrap(), file);
    }

    #[test]
    fn test_locator_is_url_decoded() {
        assert_eq!(
            Locator::parse("file:///sdcard/My%20Clip+1.mp4").unwrap(),
            Locator::Path(PathBuf::from("/sdcard/My Clip 1.mp4"))
        );
        assert!(matches!(
            Locator::parse("%FF%FE"),
            Err(BridgeError::InvalidLocator(_))
        ));
    }

    #[test]
    fn test_foreign_scheme_rejected() {
        assert!(matches!(
            Locator::parse("https://example.com/a.mp4"),
            Err(BridgeError::InvalidLocator(_))
        ));
        assert!(matches!(Locator::parse(""), Err(BridgeError::InvalidLocator(_))));
    }

    #[test]
    fn test_content_locator_kept_whole() {
        assert_eq!(
            Locator::parse("content://media/external/video/media/42").unwrap(),
            Locator::Content("content://media/external/video/media/42".to_string())
        );
    }

    #[test]
    fn test_resolve_existing_file_with_query() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("c.mp4");
        std::fs::write(&file, b"data").unwrap();

        let locator = format!("file://{}?token=x", file.display());
        assert_eq!(resolver().resolve(&locator).unwrap(), file);
    }

    #[test]
    fn test_resolve_missing_file() {
        let err = resolver().resolve("/definitely/not/here.mp4").unwrap_err();
        assert!(matches!(err, BridgeError::InputNotFound(_)));
    }

    #[test]
    fn test_resolve_directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver().resolve(&dir.path().display().to_string()).unwrap_err();
        assert!(matches!(err, BridgeError::InputUnreadable(_)));
    }

    #[test]
    fn test_resolve_primary_storage_document() {
        use assert_fs::prelude::*;

        let root = assert_fs::TempDir::new().unwrap();
        root.child("Movies").create_dir_all().unwrap();
        let movie = root.child("Movies/a.mp4");
        movie.write_binary(b"data").unwrap();

        let resolver = PathResolver::new(Arc::new(LocalContentResolver::new(root.path())));
        let path = resolver
            .resolve("content://com.android.externalstorage.documents/document/primary%3AMovies%2Fa.mp4")
            .unwrap();
        assert_eq!(path, movie.path());
    }

    #[test]
    fn test_resolve_content_query_without_service() {
        let err = resolver()
            .resolve("content://media/external/video/media/42")
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidLocator(_)));
    }
}
