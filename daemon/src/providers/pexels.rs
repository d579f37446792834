use common::{FetchRequest, Image};
use serde::Deserialize;
use std::collections::HashMap;

use super::parse_records;
use crate::error::FetchError;
use crate::http::HttpRequest;

const SEARCH_URL: &str = "https://api.pexels.com/v1/search";

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    photos: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    photographer: Option<String>,
    src: HashMap<String, String>,
}

pub fn request(request: &FetchRequest) -> Result<HttpRequest, FetchError> {
    let key = request
        .pexels_key
        .as_deref()
        .ok_or_else(|| FetchError::InvalidRequest("pexels source requires pexels_key".to_string()))?;
    let query = request.pexels_search.as_deref().unwrap_or_default();
    let per_page = request.maximum_entries.to_string();

    let url = reqwest::Url::parse_with_params(
        SEARCH_URL,
        &[("query", query), ("per_page", per_page.as_str())],
    )
    .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;

    Ok(HttpRequest::get(url.to_string()).header("Authorization", key))
}

/// One image per photo, already cut for the requested orientation
pub fn parse(request: &FetchRequest, body: &str) -> Result<Vec<Image>, FetchError> {
    let result: SearchResult = serde_json::from_str(body)?;
    let size = if request.is_vertical() { "portrait" } else { "landscape" };

    let mut images: Vec<Image> = parse_records::<Photo>(result.photos, "pexels")
        .filter_map(|mut photo| {
            let url = photo.src.remove(size)?;
            let caption = photo
                .photographer
                .map(|name| format!("Photographer:{}", name));
            Some(Image::new(url).with_caption(caption))
        })
        .collect();
    images.truncate(request.maximum_entries);

    Ok(images)
}
