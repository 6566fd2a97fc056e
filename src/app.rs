//! Application Coordinator
//!
//! Builds the gallery store, engine manager, queue processor and live
//! pipeline from the configuration, wires the queue to new-image events and
//! tears everything down in order.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

use crate::capture::LivePipeline;
use crate::config::AppConfig;
use crate::processing::QueueProcessor;
use crate::storage::{self, GalleryStore};
use crate::vision::{Accelerator, EngineFactory, EngineManager};

/// Main application coordinator
pub struct OcrDeck {
    config: AppConfig,
    store: Arc<GalleryStore>,
    engine: Arc<EngineManager>,
    queue: Arc<QueueProcessor>,
    live: Arc<LivePipeline>,
    /// Thread forwarding image-added events into the queue
    listener: Option<JoinHandle<()>>,
}

impl OcrDeck {
    /// Create all services. No engine is loaded until [`start`](Self::start).
    pub fn new(config: AppConfig, factory: Box<dyn EngineFactory>) -> Result<Self> {
        let gallery_dir = match &config.gallery.directory {
            Some(dir) => dir.clone(),
            None => storage::default_gallery_dir()?,
        };
        let store = Arc::new(
            GalleryStore::open(&gallery_dir, config.gallery.jpeg_quality)
                .with_context(|| format!("Failed to open gallery at {:?}", gallery_dir))?,
        );
        let engine = Arc::new(EngineManager::new(factory));
        let queue = Arc::new(QueueProcessor::new(
            Arc::clone(&store),
            Arc::clone(&engine),
            config.engine.accelerator,
        ));
        let live = Arc::new(LivePipeline::new(
            Arc::clone(&engine),
            Arc::clone(&store),
            config.stability.to_gate_config(),
        ));

        Ok(Self {
            config,
            store,
            engine,
            queue,
            live,
            listener: None,
        })
    }

    /// Load the engine, follow new images and resume interrupted work.
    ///
    /// Returns the accelerator the engine actually activated.
    pub fn start(&mut self) -> Result<Accelerator> {
        let accelerator = self
            .engine
            .initialize(self.config.engine.accelerator)
            .context("Failed to start OCR engine")?;

        if self.listener.is_none() {
            let handle = self
                .queue
                .follow(self.store.subscribe())
                .context("Failed to spawn gallery listener")?;
            self.listener = Some(handle);
        }

        self.queue.enqueue_all_unprocessed();
        info!("OcrDeck started ({} images in gallery)", self.store.len());
        Ok(accelerator)
    }

    /// Replace the running engine with one built for `accelerator`.
    ///
    /// In-flight inference finishes first; its result is discarded.
    pub fn switch_accelerator(&self, accelerator: Accelerator) -> Result<Accelerator> {
        let active = self
            .engine
            .reconfigure(accelerator)
            .context("Failed to switch OCR engine")?;
        info!("OCR engine switched to {}", active);
        Ok(active)
    }

    /// Wait for queued OCR work to finish
    pub fn process_pending(&self, timeout: Duration) -> bool {
        let drained = self.queue.wait_idle(timeout);
        if !drained {
            warn!(
                "OCR queue still busy after {:?} ({} pending)",
                timeout,
                self.queue.pending().len()
            );
        }
        drained
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<GalleryStore> {
        Arc::clone(&self.store)
    }

    pub fn engine(&self) -> Arc<EngineManager> {
        Arc::clone(&self.engine)
    }

    pub fn queue(&self) -> Arc<QueueProcessor> {
        Arc::clone(&self.queue)
    }

    pub fn live(&self) -> Arc<LivePipeline> {
        Arc::clone(&self.live)
    }
}

impl Drop for OcrDeck {
    fn drop(&mut self) {
        // Disconnect the listener, then wait for it
        self.store.close_events();
        if let Some(handle) = self.listener.take() {
            let _ = handle.join();
        }
        self.engine.close();
    }
}
