//! Storage Layer
//!
//! Handles persistence of the image gallery and its OCR cache, plus the
//! platform directories the application keeps its data in.

pub mod gallery;
pub mod index;

pub use gallery::{GalleryImage, GalleryStore};

use anyhow::Result;
use std::path::PathBuf;

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "ocrdeck", "OcrDeck")
        .ok_or_else(|| anyhow::anyhow!("Could not determine application directories"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Default gallery location inside the data directory
pub fn default_gallery_dir() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("gallery"))
}
