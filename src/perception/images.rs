//! Reference image repository.
//!
//! Every decodable file in the image directory becomes a reference image
//! keyed by its file stem (`orders.png` → `"orders"`). Presence in the
//! directory is the only registration mechanism.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::errors::{MarketError, MarketResult};
use crate::perception::traits::ImageLookup;

pub struct ImageRepository {
    dir: PathBuf,
    images: HashMap<String, RgbaImage>,
}

impl ImageRepository {
    /// Scan `dir` and decode every image in it.
    ///
    /// A missing directory is created empty when `create_if_missing` is set,
    /// otherwise the load fails with [`MarketError::NoImages`].
    pub fn load(dir: impl Into<PathBuf>, create_if_missing: bool) -> MarketResult<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            if !create_if_missing {
                return Err(MarketError::NoImages(format!(
                    "image directory {} does not exist",
                    dir.display()
                )));
            }
            std::fs::create_dir_all(&dir)?;
            tracing::info!(path = %dir.display(), "image directory created. Fill it with images!");
        }
        let mut repo = Self {
            dir,
            images: HashMap::new(),
        };
        repo.reload()?;
        Ok(repo)
    }

    /// An empty repository not backed by any directory contents.
    pub fn empty(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            images: HashMap::new(),
        }
    }

    /// Replace the whole map with the current directory contents.
    pub fn reload(&mut self) -> MarketResult<()> {
        self.images = scan_dir(&self.dir)?;
        tracing::debug!(count = self.images.len(), path = %self.dir.display(), "images loaded");
        Ok(())
    }

    /// Register an image under `name`, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, image: RgbaImage) {
        self.images.insert(name.into(), image);
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Sorted image names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.images.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ImageLookup for ImageRepository {
    fn lookup(&self, name: &str) -> Option<&RgbaImage> {
        self.images.get(name)
    }
}

fn scan_dir(dir: &Path) -> MarketResult<HashMap<String, RgbaImage>> {
    let mut images = HashMap::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            tracing::warn!(path = %path.display(), "skipping file with non UTF-8 name");
            continue;
        };
        match image::open(&path) {
            Ok(decoded) => {
                images.insert(stem.to_string(), decoded.to_rgba8());
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Error loading image");
            }
        }
    }
    Ok(images)
}
