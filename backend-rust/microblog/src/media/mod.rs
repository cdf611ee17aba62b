use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::MediaConfig;
use crate::error::AppResult;
use crate::models::{Media, MediaId};
use crate::store::{Store, StoreError};

/// Where uploaded bytes end up
pub trait MediaStorage: Send + Sync {
    fn write(&self, filename: &str, bytes: &[u8]) -> io::Result<()>;
}

/// Stores each upload as a file in one directory
pub struct FileSystemMediaStorage {
    dir: PathBuf,
}

impl FileSystemMediaStorage {
    /// Creates the directory if it does not exist yet
    pub fn new(config: &MediaConfig) -> io::Result<Self> {
        fs::create_dir_all(&config.dir)?;
        Ok(Self {
            dir: config.dir.clone(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MediaStorage for FileSystemMediaStorage {
    fn write(&self, filename: &str, bytes: &[u8]) -> io::Result<()> {
        fs::write(self.dir.join(filename), bytes)
    }
}

pub struct MediaService {
    store: Arc<Store>,
    storage: Arc<dyn MediaStorage>,
}

impl MediaService {
    pub fn new(store: Arc<Store>, storage: Arc<dyn MediaStorage>) -> Self {
        Self { store, storage }
    }

    /// Persist an upload under a fresh id, keeping the original extension.
    /// The record and the file are written in one transaction.
    pub fn save(&self, bytes: &[u8], original_filename: &str) -> AppResult<MediaId> {
        let id = Uuid::new_v4().to_string();
        let mut media = Media {
            filename: stored_filename(&id, original_filename),
            id,
            size: bytes.len() as i64,
            created_at: Utc::now(),
        };

        self.store.transaction(|s| -> AppResult<()> {
            s.create(&mut media)?;
            self.storage
                .write(&media.filename, bytes)
                .map_err(StoreError::from)?;
            Ok(())
        })?;

        log::info!("Saved media {} ({} bytes)", media.filename, media.size);
        Ok(MediaId { id: media.id })
    }
}

fn stored_filename(id: &str, original_filename: &str) -> String {
    match Path::new(original_filename)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(ext) if !ext.is_empty() => format!("{}.{}", id, ext),
        _ => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    struct FailingStorage;

    impl MediaStorage for FailingStorage {
        fn write(&self, _filename: &str, _bytes: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[test]
    fn test_stored_filename_keeps_extension() {
        assert_eq!(stored_filename("abc", "photo.png"), "abc.png");
        assert_eq!(stored_filename("abc", "archive.tar.gz"), "abc.gz");
        assert_eq!(stored_filename("abc", "README"), "abc");
    }

    #[test]
    fn test_save_writes_file_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemMediaStorage::new(&MediaConfig {
            dir: dir.path().join("medias"),
        })
        .unwrap();
        let store = Arc::new(Store::in_memory().unwrap());
        let service = MediaService::new(store.clone(), Arc::new(storage));

        let saved = service.save(b"\x89PNG", "cat.png").unwrap();

        let path = dir.path().join("medias").join(format!("{}.png", saved.id));
        assert_eq!(fs::read(path).unwrap(), b"\x89PNG");

        let media: Media = store.transaction(|s| s.get_by_id(&saved.id, &[])).unwrap();
        assert_eq!(media.size, 4);
    }

    #[test]
    fn test_failed_write_leaves_no_record() {
        let store = Arc::new(Store::in_memory().unwrap());
        let service = MediaService::new(store.clone(), Arc::new(FailingStorage));

        let err = service.save(b"data", "x.jpg").unwrap_err();
        assert!(matches!(err, AppError::Internal));

        let all: Vec<Media> = store.transaction(|s| s.get_all(&[])).unwrap();
        assert!(all.is_empty());
    }
}
