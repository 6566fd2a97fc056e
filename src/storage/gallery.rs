//! Persistent gallery of captured and imported images
//!
//! Keeps the image index in memory behind one exclusive lock and rewrites the
//! whole index file on every mutation. Writes go to a temp file that is then
//! renamed over the index, so a crash never leaves a half-written index behind.

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::index;
use crate::capture::frame::Frame;
use crate::error::StoreError;
use crate::shared::Broadcast;
use crate::vision::OcrResult;

/// Name of the index file inside the gallery directory
pub const INDEX_FILE_NAME: &str = "index.txt";

/// A persisted gallery record
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryImage {
    /// Unique identifier
    pub id: String,
    /// Where the image bytes live (a file path)
    pub locator: String,
    /// Creation time, epoch milliseconds
    pub created_at: i64,
    /// Cached recognition output, in detection order
    pub ocr_result: Option<Vec<OcrResult>>,
    /// Whether OCR has completed for this image
    pub ocr_processed: bool,
}

impl GalleryImage {
    /// Create an unprocessed record stamped with the current time
    pub fn new(id: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            locator: locator.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
            ocr_result: None,
            ocr_processed: false,
        }
    }

    /// Filesystem path of the backing image
    pub fn path(&self) -> PathBuf {
        locator_path(&self.locator)
    }
}

/// Resolve a locator into a path, accepting `file://` URIs
pub fn locator_path(locator: &str) -> PathBuf {
    PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator))
}

/// File-backed gallery index
pub struct GalleryStore {
    dir: PathBuf,
    index_path: PathBuf,
    jpeg_quality: u8,
    /// Most recent first
    images: Mutex<Vec<GalleryImage>>,
    added: Broadcast<GalleryImage>,
}

impl GalleryStore {
    /// Open (or create) the gallery in `dir`
    pub fn open(dir: impl Into<PathBuf>, jpeg_quality: u8) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        let index_path = dir.join(INDEX_FILE_NAME);

        let images = load_index(&index_path)?;
        info!("Opened gallery at {:?} with {} images", dir, images.len());

        Ok(Self {
            dir,
            index_path,
            jpeg_quality,
            images: Mutex::new(images),
            added: Broadcast::new(),
        })
    }

    /// Directory holding the index and image files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Subscribe to "image added" events published after this call
    pub fn subscribe(&self) -> Receiver<GalleryImage> {
        self.added.subscribe()
    }

    /// Disconnect all subscribers
    pub fn close_events(&self) {
        self.added.close();
    }

    /// Insert a record at the head of the gallery and persist it
    pub fn add(&self, image: GalleryImage) -> Result<(), StoreError> {
        if !index::is_valid_id(&image.id) {
            return Err(StoreError::InvalidId(image.id));
        }
        {
            let mut images = self.images.lock();
            if images.iter().any(|i| i.id == image.id) {
                return Err(StoreError::DuplicateId(image.id));
            }

            images.insert(0, image.clone());
            if let Err(e) = self.persist(&images) {
                images.remove(0);
                return Err(e);
            }
            debug!("Index saved, total images: {}", images.len());
        }

        self.added.publish(image);
        Ok(())
    }

    /// Encode a camera frame as JPEG into the gallery and add it
    pub fn save_capture(&self, frame: &Frame) -> Result<GalleryImage, StoreError> {
        let id = Uuid::new_v4().to_string();
        let dest = self.dir.join(format!("{}.jpg", id));

        let file = File::create(&dest).map_err(|e| StoreError::io(&dest, e))?;
        let mut writer = BufWriter::new(file);
        frame.write_jpeg(&mut writer, self.jpeg_quality)?;
        writer.flush().map_err(|e| StoreError::io(&dest, e))?;

        self.add_file(id, dest)
    }

    /// Copy an existing image file into the gallery and add it
    pub fn import(&self, source: &Path) -> Result<GalleryImage, StoreError> {
        if !source.is_file() {
            return Err(StoreError::NotAFile(source.to_path_buf()));
        }

        let id = Uuid::new_v4().to_string();
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg")
            .to_lowercase();
        let dest = self.dir.join(format!("{}.{}", id, ext));
        std::fs::copy(source, &dest).map_err(|e| StoreError::io(&dest, e))?;

        self.add_file(id, dest)
    }

    fn add_file(&self, id: String, dest: PathBuf) -> Result<GalleryImage, StoreError> {
        let image = GalleryImage::new(id, dest.to_string_lossy().into_owned());
        if let Err(e) = self.add(image.clone()) {
            let _ = std::fs::remove_file(&dest);
            return Err(e);
        }
        info!("Added image {} to gallery", image.id);
        Ok(image)
    }

    /// Remove a record and its backing bytes. Returns whether the id existed.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut images = self.images.lock();
        let Some(pos) = images.iter().position(|i| i.id == id) else {
            return Ok(false);
        };

        let removed = images.remove(pos);
        if let Err(e) = self.persist(&images) {
            images.insert(pos, removed);
            return Err(e);
        }

        let path = removed.path();
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to remove image file {:?}: {}", path, e);
            }
        }
        info!("Deleted image {}", id);
        Ok(true)
    }

    /// Cache OCR results for an image and mark it processed.
    ///
    /// Overwrites any previous results. Returns whether the id existed.
    pub fn attach_ocr_result(&self, id: &str, results: Vec<OcrResult>) -> Result<bool, StoreError> {
        let mut images = self.images.lock();
        let Some(image) = images.iter_mut().find(|i| i.id == id) else {
            return Ok(false);
        };

        let previous = (image.ocr_result.replace(results), image.ocr_processed);
        image.ocr_processed = true;

        if let Err(e) = self.persist(&images) {
            if let Some(image) = images.iter_mut().find(|i| i.id == id) {
                image.ocr_result = previous.0;
                image.ocr_processed = previous.1;
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Snapshot of all records, most recent first
    pub fn list(&self) -> Vec<GalleryImage> {
        self.images.lock().clone()
    }

    /// Snapshot of one record
    pub fn get(&self, id: &str) -> Option<GalleryImage> {
        self.images.lock().iter().find(|i| i.id == id).cloned()
    }

    /// Cached results, only for processed images
    pub fn cached_ocr_result(&self, id: &str) -> Option<Vec<OcrResult>> {
        self.images
            .lock()
            .iter()
            .find(|i| i.id == id && i.ocr_processed)
            .and_then(|i| i.ocr_result.clone())
    }

    /// Ids of images still waiting for OCR, most recent first
    pub fn unprocessed_ids(&self) -> Vec<String> {
        self.images
            .lock()
            .iter()
            .filter(|i| !i.ocr_processed)
            .map(|i| i.id.clone())
            .collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.images.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, images: &[GalleryImage]) -> Result<(), StoreError> {
        let content = index::encode_index(images)?;
        let tmp_path = self.index_path.with_extension("txt.tmp");

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, &self.index_path)
        };

        write().map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            StoreError::io(&self.index_path, e)
        })
    }
}

/// Load the index, dropping records whose image file no longer exists
fn load_index(path: &Path) -> Result<Vec<GalleryImage>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let mut images: Vec<GalleryImage> = index::decode_index(&content)
        .into_iter()
        .filter(|image| {
            let exists = image.path().exists();
            if !exists {
                warn!("File not found: {:?}", image.path());
            }
            exists
        })
        .collect();

    images.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(images)
}
