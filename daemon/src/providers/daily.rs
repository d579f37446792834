use common::{FetchRequest, Image};
use serde::Deserialize;

use super::parse_records;
use crate::error::FetchError;
use crate::http::HttpRequest;

const HOST: &str = "https://www.bing.com";

#[derive(Debug, Deserialize)]
struct Archive {
    #[serde(default)]
    images: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ArchiveImage {
    urlbase: String,
    copyright: Option<String>,
}

pub fn request(request: &FetchRequest) -> HttpRequest {
    HttpRequest::get(format!(
        "{}/HPImageArchive.aspx?format=js&idx=0&n={}",
        HOST, request.maximum_entries
    ))
}

pub fn parse(request: &FetchRequest, body: &str) -> Result<Vec<Image>, FetchError> {
    let archive: Archive = serde_json::from_str(body)?;
    let (width, height) = if request.is_vertical() {
        (1080, 1920)
    } else {
        (1920, 1080)
    };

    let images = parse_records::<ArchiveImage>(archive.images, "daily image")
        .map(|image| {
            let url = format!("{}{}_{}x{}.jpg", HOST, image.urlbase, width, height);
            Image::new(url).with_caption(image.copyright)
        })
        .take(request.maximum_entries)
        .collect();

    Ok(images)
}
