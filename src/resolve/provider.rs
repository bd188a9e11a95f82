use std::path::PathBuf;
use tracing::debug;

use crate::error::{BridgeError, Result};

pub const EXTERNAL_STORAGE_AUTHORITY: &str = "com.android.externalstorage.documents";
pub const DOWNLOADS_AUTHORITY: &str = "com.android.providers.downloads.documents";
pub const MEDIA_AUTHORITY: &str = "com.android.providers.media.documents";

const PUBLIC_DOWNLOADS_URI: &str = "content://downloads/public_downloads";

/// Host service that maps content references onto real files.
#[cfg_attr(test, mockall::automock)]
pub trait ContentResolver: Send + Sync {
    /// Root directory of the primary shared storage volume
    fn external_storage_root(&self) -> PathBuf;

    /// Look up the `_data` column (the backing file path) selected by `query`.
    /// `Ok(None)` means the query matched no row.
    fn query_data_column(&self, query: &DataQuery) -> Result<Option<String>>;
}

/// A data-column lookup against one content collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataQuery {
    pub uri: String,
    pub selection: Option<String>,
    pub selection_args: Vec<String>,
}

impl DataQuery {
    pub fn uri<S: Into<String>>(uri: S) -> Self {
        Self {
            uri: uri.into(),
            selection: None,
            selection_args: Vec::new(),
        }
    }

    pub fn with_selection<S: Into<String>>(mut self, selection: S, args: Vec<String>) -> Self {
        self.selection = Some(selection.into());
        self.selection_args = args;
        self
    }
}

/// Content resolver for hosts without a content-provider service.
/// Shared-storage documents still resolve against the configured root.
pub struct LocalContentResolver {
    external_root: PathBuf,
}

impl LocalContentResolver {
    pub fn new<P: Into<PathBuf>>(external_root: P) -> Self {
        Self {
            external_root: external_root.into(),
        }
    }
}

impl ContentResolver for LocalContentResolver {
    fn external_storage_root(&self) -> PathBuf {
        self.external_root.clone()
    }

    fn query_data_column(&self, query: &DataQuery) -> Result<Option<String>> {
        Err(BridgeError::InvalidLocator(format!(
            "content lookup is not available on this host: {}",
            query.uri
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCollection {
    Images,
    Video,
    Audio,
}

impl MediaCollection {
    fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "image" => Some(MediaCollection::Images),
            "video" => Some(MediaCollection::Video),
            "audio" => Some(MediaCollection::Audio),
            _ => None,
        }
    }

    pub fn content_uri(&self) -> &'static str {
        match self {
            MediaCollection::Images => "content://media/external/images/media",
            MediaCollection::Video => "content://media/external/video/media",
            MediaCollection::Audio => "content://media/external/audio/media",
        }
    }
}

/// Which storage provider a `content:` locator belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// Shared storage document, `<volume>:<relative path>`
    ExternalStorage { volume: String, relative: String },
    /// Downloads document, numeric row id
    Downloads { id: i64 },
    /// Typed media document, `<image|video|audio>:<row id>`
    Media { collection: MediaCollection, id: String },
    /// Any other content reference, queried as-is
    Generic,
}

impl Provider {
    /// Classify a decoded `content://authority/path` locator
    pub fn classify(locator: &str) -> Result<Self> {
        let rest = locator
            .strip_prefix("content://")
            .ok_or_else(|| BridgeError::InvalidLocator(format!("not a content locator: {}", locator)))?;
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        if authority.is_empty() {
            return Err(BridgeError::InvalidLocator(format!("missing authority: {}", locator)));
        }

        let Some(document_id) = document_id(path) else {
            return Ok(Provider::Generic);
        };

        match authority {
            EXTERNAL_STORAGE_AUTHORITY => {
                let (volume, relative) = split_typed_id(document_id, locator)?;
                Ok(Provider::ExternalStorage {
                    volume: volume.to_string(),
                    relative: relative.to_string(),
                })
            }
            DOWNLOADS_AUTHORITY => {
                let id = document_id.parse::<i64>().map_err(|_| {
                    BridgeError::InvalidLocator(format!("downloads id is not numeric: {}", document_id))
                })?;
                Ok(Provider::Downloads { id })
            }
            MEDIA_AUTHORITY => {
                let (kind, id) = split_typed_id(document_id, locator)?;
                let collection = MediaCollection::from_type(kind).ok_or_else(|| {
                    BridgeError::InvalidLocator(format!("unsupported media type '{}'", kind))
                })?;
                Ok(Provider::Media {
                    collection,
                    id: id.to_string(),
                })
            }
            _ => Ok(Provider::Generic),
        }
    }

    /// Ask the content resolver for the backing file of `locator`
    pub fn lookup(&self, content: &dyn ContentResolver, locator: &str) -> Result<PathBuf> {
        debug!("Resolving content locator {} as {:?}", locator, self);
        let data = match self {
            Provider::ExternalStorage { volume, relative } => {
                if !volume.eq_ignore_ascii_case("primary") {
                    return Err(BridgeError::InvalidLocator(format!(
                        "storage volume '{}' is not supported",
                        volume
                    )));
                }
                return Ok(content.external_storage_root().join(relative));
            }
            Provider::Downloads { id } => {
                content.query_data_column(&DataQuery::uri(format!("{}/{}", PUBLIC_DOWNLOADS_URI, id)))?
            }
            Provider::Media { collection, id } => content.query_data_column(
                &DataQuery::uri(collection.content_uri()).with_selection("_id=?", vec![id.clone()]),
            )?,
            Provider::Generic => content.query_data_column(&DataQuery::uri(locator))?,
        };

        data.map(PathBuf::from)
            .ok_or_else(|| BridgeError::InputNotFound(locator.to_string()))
    }
}

/// Document id of a document or tree-document path, if it is one
fn document_id(path: &str) -> Option<&str> {
    if let Some(id) = path.strip_prefix("document/") {
        return Some(id).filter(|id| !id.is_empty());
    }
    if path.starts_with("tree/") {
        return path
            .split_once("/document/")
            .map(|(_, id)| id)
            .filter(|id| !id.is_empty());
    }
    None
}

fn split_typed_id<'a>(document_id: &'a str, locator: &str) -> Result<(&'a str, &'a str)> {
    document_id
        .split_once(':')
        .ok_or_else(|| BridgeError::InvalidLocator(format!("malformed document id in {}", locator)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn test_classify_external_storage() {
        let provider = Provider::classify(
            "content://com.android.externalstorage.documents/document/primary:Movies/a.mp4",
        )
        .unwrap();
        assert_eq!(
            provider,
            Provider::ExternalStorage {
                volume: "primary".to_string(),
                relative: "Movies/a.mp4".to_string()
            }
        );
    }

    #[test]
    fn test_classify_tree_document() {
        let provider = Provider::classify(
            "content://com.android.providers.media.documents/tree/root/document/video:42",
        )
        .unwrap();
        assert_eq!(
            provider,
            Provider::Media {
                collection: MediaCollection::Video,
                id: "42".to_string()
            }
        );
    }

    #[test]
    fn test_classify_downloads() {
        let provider =
            Provider::classify("content://com.android.providers.downloads.documents/document/17").unwrap();
        assert_eq!(provider, Provider::Downloads { id: 17 });

        let err = Provider::classify("content://com.android.providers.downloads.documents/document/abc")
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidLocator(_)));
    }

    #[test]
    fn test_classify_generic() {
        assert_eq!(
            Provider::classify("content://media/external/video/media/42").unwrap(),
            Provider::Generic
        );
        assert!(Provider::classify("content:///nothing").is_err());
    }

    #[test]
    fn test_unknown_media_type() {
        let err = Provider::classify("content://com.android.providers.media.documents/document/doc:1")
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidLocator(_)));
    }

    #[test]
    fn test_lookup_external_storage_uses_root() {
        let mut content = MockContentResolver::new();
        content
            .expect_external_storage_root()
            .return_const(PathBuf::from("/storage/emulated/0"));

        let provider = Provider::ExternalStorage {
            volume: "primary".to_string(),
            relative: "DCIM/clip.mp4".to_string(),
        };
        let path = provider.lookup(&content, "content://x").unwrap();
        assert_eq!(path, PathBuf::from("/storage/emulated/0/DCIM/clip.mp4"));
    }

    #[test]
    fn test_lookup_secondary_volume_rejected() {
        let content = MockContentResolver::new();
        let provider = Provider::ExternalStorage {
            volume: "1234-5678".to_string(),
            relative: "clip.mp4".to_string(),
        };
        assert!(matches!(
            provider.lookup(&content, "content://x"),
            Err(BridgeError::InvalidLocator(_))
        ));
    }

    #[test]
    fn test_lookup_downloads_queries_public_downloads() {
        let mut content = MockContentResolver::new();
        content
            .expect_query_data_column()
            .with(eq(DataQuery::uri("content://downloads/public_downloads/17")))
            .times(1)
            .returning(|_| Ok(Some("/sdcard/Download/clip.mp4".to_string())));

        let path = Provider::Downloads { id: 17 }.lookup(&content, "content://x").unwrap();
        assert_eq!(path, PathBuf::from("/sdcard/Download/clip.mp4"));
    }

    #[test]
    fn test_lookup_media_uses_selection() {
        let mut content = MockContentResolver::new();
        content
            .expect_query_data_column()
            .withf(|query| {
                query.uri == "content://media/external/video/media"
                    && query.selection.as_deref() == Some("_id=?")
                    && query.selection_args == vec!["42".to_string()]
            })
            .times(1)
            .returning(|_| Ok(Some("/sdcard/Movies/clip.mp4".to_string())));

        let provider = Provider::Media {
            collection: MediaCollection::Video,
            id: "42".to_string(),
        };
        let path = provider.lookup(&content, "content://x").unwrap();
        assert_eq!(path, PathBuf::from("/sdcard/Movies/clip.mp4"));
    }

    #[test]
    fn test_lookup_no_row_is_not_found() {
        let mut content = MockContentResolver::new();
        content
            .expect_query_data_column()
            .with(eq(DataQuery::uri("content://media/external/video/media/9")))
            .returning(|_| Ok(None));

        let err = Provider::Generic
            .lookup(&content, "content://media/external/video/media/9")
            .unwrap_err();
        assert!(matches!(err, BridgeError::InputNotFound(_)));
    }
}
