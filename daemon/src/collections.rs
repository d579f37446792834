use anyhow::{Context, Result};
use common::Image;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::config::{CollectionSettings, Config};

/// An entry of the plain image list: a bare URL or a full image object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListEntry {
    Url(String),
    Image(Image),
}

#[derive(Debug, Deserialize)]
struct ImageList {
    #[serde(default)]
    images: Vec<ListEntry>,
}

/// The two bundled image lists served without any network access
#[derive(Debug, Clone, Default)]
pub struct LocalCollections {
    pub firetv: Vec<Image>,
    pub chromecast: Vec<Image>,
}

impl LocalCollections {
    /// Load both lists. A list that can't be read is logged and left empty.
    pub fn load(settings: &CollectionSettings) -> Self {
        let firetv = Self::load_or_empty(&Config::collection_path(&settings.firetv), Self::load_image_list);
        let chromecast = Self::load_or_empty(
            &Config::collection_path(&settings.chromecast),
            Self::load_shaped_list,
        );

        Self { firetv, chromecast }
    }

    fn load_or_empty(path: &Path, loader: fn(&Path) -> Result<Vec<Image>>) -> Vec<Image> {
        match loader(path) {
            Ok(images) => {
                log::info!("Loaded {} images from {}", images.len(), path.display());
                images
            }
            Err(e) => {
                log::warn!("{:#}", e);
                Vec::new()
            }
        }
    }

    /// `{"images": [...]}` where each entry is a URL or an image object
    fn load_image_list(path: &Path) -> Result<Vec<Image>> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read image list: {}", path.display()))?;
        let list: ImageList = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse image list: {}", path.display()))?;

        Ok(list
            .images
            .into_iter()
            .map(|entry| match entry {
                ListEntry::Url(url) => Image::new(url),
                ListEntry::Image(image) => image,
            })
            .collect())
    }

    /// A top-level array of image objects
    fn load_shaped_list(path: &Path) -> Result<Vec<Image>> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read image list: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse image list: {}", path.display()))
    }
}
