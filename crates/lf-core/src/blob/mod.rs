//! Folder-keyed object storage for report photos.
//!
//! Each report stage uploads into a deterministic folder derived from the
//! escalation's link ID. Listing a folder is the index; there is no
//! manifest, so uploads that precede a failed record write stay orphaned.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Accepted photo extensions (lowercase).
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "gif", "heic"];

const HASH_PREFIX_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<BlobError> for lf_common::Error {
    fn from(err: BlobError) -> Self {
        lf_common::Error::Storage(err.to_string())
    }
}

/// A stored blob and its public address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub path: String,
    pub url: String,
}

/// Object store contract.
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` at `path`, replacing any existing object.
    fn put(&self, path: &str, bytes: &[u8]) -> Result<StoredObject, BlobError>;

    /// Objects directly under `folder`, sorted by path.
    fn list(&self, folder: &str) -> Result<Vec<StoredObject>, BlobError>;

    fn public_url(&self, path: &str) -> String;
}

/// Upload folder of one report stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageFolder {
    /// Photos attached when the report is created.
    Reports,
    InProgress,
    Resolved,
}

impl StageFolder {
    fn prefix(self) -> &'static str {
        match self {
            StageFolder::Reports => "report_upload/reports",
            StageFolder::InProgress => "in_progress",
            StageFolder::Resolved => "report_upload/resolved",
        }
    }

    /// Folder path for a link, e.g. `in_progress/LAG01-IBD02`.
    pub fn folder(self, link_id: &str) -> String {
        format!("{}/{}", self.prefix(), sanitize(link_id))
    }

    /// Minimum photo count the stage accepts.
    pub fn min_images(self) -> usize {
        match self {
            StageFolder::Reports => 0,
            StageFolder::InProgress | StageFolder::Resolved => 1,
        }
    }

    pub fn stage_name(self) -> &'static str {
        match self {
            StageFolder::Reports => "report creation",
            StageFolder::InProgress => "in-progress update",
            StageFolder::Resolved => "resolution",
        }
    }
}

/// A photo submitted with a stage transition.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        ImageUpload {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read a photo from disk, keeping only its file name.
    pub fn from_path(path: &Path) -> Result<Self, BlobError> {
        let bytes = std::fs::read(path).map_err(|e| BlobError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        Ok(ImageUpload { file_name, bytes })
    }

    fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

/// Check photo count and contents for a stage.
///
/// Runs before any upload or record write.
pub fn validate_images(
    stage: StageFolder,
    images: &[ImageUpload],
    max_photos: usize,
) -> lf_common::Result<()> {
    let min = stage.min_images();
    if images.len() < min || images.len() > max_photos {
        return Err(lf_common::Error::ImageCount {
            stage: stage.stage_name().to_string(),
            min,
            max: max_photos,
            got: images.len(),
        });
    }
    for image in images {
        if image.bytes.is_empty() {
            return Err(lf_common::Error::invalid(
                "images",
                format!("{} is empty", image.file_name),
            ));
        }
        let allowed = image
            .extension()
            .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()));
        if !allowed {
            return Err(lf_common::Error::invalid(
                "images",
                format!(
                    "{} must be one of: {}",
                    image.file_name,
                    ALLOWED_EXTENSIONS.join(", ")
                ),
            ));
        }
    }
    Ok(())
}

/// Upload every photo of a stage and return the public URLs in order.
pub fn upload_stage_images(
    store: &dyn ObjectStore,
    stage: StageFolder,
    link_id: &str,
    images: &[ImageUpload],
    now: DateTime<Utc>,
) -> Result<Vec<String>, BlobError> {
    let folder = stage.folder(link_id);
    let mut urls = Vec::with_capacity(images.len());
    for (index, image) in images.iter().enumerate() {
        let name = object_name(now.timestamp_millis(), index, &image.bytes, &image.file_name);
        let stored = store.put(&format!("{}/{}", folder, name), &image.bytes)?;
        tracing::debug!(
            target: crate::logging::event_names::MEDIA_UPLOADED,
            stage = %crate::logging::Stage::Media,
            path = %stored.path,
            bytes = image.bytes.len(),
            "photo uploaded"
        );
        urls.push(stored.url);
    }
    Ok(urls)
}

/// Object name: `{unix_millis}-{index}-{sha256 prefix}-{sanitized file name}`.
///
/// `index` is the photo's position within one upload, so identical photos
/// in the same stage land on distinct objects.
pub fn object_name(unix_millis: i64, index: usize, bytes: &[u8], file_name: &str) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    format!(
        "{}-{}-{}-{}",
        unix_millis,
        index,
        &digest[..HASH_PREFIX_LEN],
        sanitize(file_name)
    )
}

fn sanitize(raw: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));
    let cleaned = re.replace_all(raw.trim(), "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        FsObjectStore {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let rel = Path::new(path);
        let clean = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !clean {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<StoredObject, BlobError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BlobError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(&full, bytes).map_err(|e| BlobError::Io {
            path: full.clone(),
            source: e,
        })?;
        Ok(StoredObject {
            path: path.to_string(),
            url: self.public_url(path),
        })
    }

    fn list(&self, folder: &str) -> Result<Vec<StoredObject>, BlobError> {
        let dir = self.resolve(folder)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| BlobError::Io {
            path: dir.clone(),
            source: e,
        })?;
        let mut objects = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BlobError::Io {
                path: dir.clone(),
                source: e,
            })?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let path = format!("{}/{}", folder.trim_end_matches('/'), name);
            objects.push(StoredObject {
                url: self.public_url(&path),
                path,
            });
        }
        objects.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(objects)
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn jpg(name: &str) -> ImageUpload {
        ImageUpload::new(name, vec![0xFF, 0xD8, 0xFF, 0xE0])
    }

    #[test]
    fn test_stage_folders() {
        assert_eq!(StageFolder::Reports.folder("SEG-1"), "report_upload/reports/SEG-1");
        assert_eq!(StageFolder::InProgress.folder("A-B"), "in_progress/A-B");
        assert_eq!(
            StageFolder::Resolved.folder("KM 12/x"),
            "report_upload/resolved/KM_12_x"
        );
    }

    #[test]
    fn test_object_name_shape() {
        let name = object_name(1_700_000_000_000, 2, b"abc", "site photo.JPG");
        let parts: Vec<&str> = name.splitn(4, '-').collect();
        assert_eq!(parts[0], "1700000000000");
        assert_eq!(parts[1], "2");
        assert_eq!(parts[2].len(), HASH_PREFIX_LEN);
        assert_eq!(parts[3], "site_photo.JPG");
    }

    #[test]
    fn test_validate_counts_per_stage() {
        assert!(validate_images(StageFolder::Reports, &[], 3).is_ok());
        let err = validate_images(StageFolder::Resolved, &[], 3).unwrap_err();
        assert!(matches!(err, lf_common::Error::ImageCount { min: 1, got: 0, .. }));

        let four = vec![jpg("a.jpg"), jpg("b.jpg"), jpg("c.jpg"), jpg("d.jpg")];
        assert!(validate_images(StageFolder::InProgress, &four, 3).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_extension_and_empty() {
        let pdf = ImageUpload::new("notes.pdf", vec![1]);
        assert!(validate_images(StageFolder::Resolved, &[pdf], 3).is_err());
        let empty = ImageUpload::new("x.png", Vec::new());
        assert!(validate_images(StageFolder::Resolved, &[empty], 3).is_err());
        assert!(validate_images(StageFolder::Resolved, &[jpg("ok.HEIC")], 3).is_ok());
    }

    #[test]
    fn test_upload_then_list_is_index() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path(), "https://cdn.example/media/");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let urls = upload_stage_images(
            &store,
            StageFolder::InProgress,
            "A-B",
            &[jpg("one.jpg"), ImageUpload::new("two.png", vec![9, 9])],
            now,
        )
        .unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls[0].starts_with("https://cdn.example/media/in_progress/A-B/"));

        let listed = store.list("in_progress/A-B").unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.windows(2).all(|w| w[0].path <= w[1].path));
        assert!(store.list("in_progress/none").unwrap().is_empty());
    }

    #[test]
    fn test_identical_photos_stay_distinct() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path(), "file:///m");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let urls = upload_stage_images(
            &store,
            StageFolder::Resolved,
            "A-B",
            &[jpg("splice.jpg"), jpg("splice.jpg")],
            now,
        )
        .unwrap();
        assert_ne!(urls[0], urls[1]);
        assert_eq!(store.list("report_upload/resolved/A-B").unwrap().len(), 2);
    }

    #[test]
    fn test_put_rejects_traversal() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path(), "file:///m");
        assert!(matches!(
            store.put("../escape.jpg", b"x"),
            Err(BlobError::InvalidPath(_))
        ));
        assert!(store.put("/abs.jpg", b"x").is_err());
    }
}
