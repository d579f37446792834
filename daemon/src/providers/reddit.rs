use common::{FetchRequest, Image, Variant};
use serde::Deserialize;

use super::{parse_records, unescape_amp};
use crate::error::FetchError;
use crate::http::HttpRequest;
use crate::variants;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Post {
    kind: String,
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    #[serde(default)]
    pinned: bool,
    #[serde(default)]
    stickied: bool,
    #[serde(default)]
    over_18: bool,
    post_hint: Option<String>,
    url: Option<String>,
    title: Option<String>,
    preview: Option<Preview>,
}

#[derive(Debug, Deserialize)]
struct Preview {
    #[serde(default)]
    images: Vec<PreviewImage>,
}

#[derive(Debug, Deserialize)]
struct PreviewImage {
    source: Variant,
    #[serde(default)]
    resolutions: Vec<Variant>,
}

pub fn request(source: &str, user_agent: &str) -> HttpRequest {
    HttpRequest::get(format!("https://www.reddit.com{}/hot.json", source))
        .header("user-agent", user_agent)
}

/// Image posts from a subreddit listing, in listing order
pub fn parse(request: &FetchRequest, body: &str) -> Result<Vec<Image>, FetchError> {
    let listing: Listing = serde_json::from_str(body)?;

    let mut images = Vec::new();
    for post in parse_records::<Post>(listing.data.children, "reddit") {
        if !is_eligible(&post, request.nsfw) {
            continue;
        }

        let Some(image) = to_image(post.data) else {
            log::debug!("Skipping reddit post without preview or url");
            continue;
        };
        images.push(image);

        if images.len() == request.maximum_entries {
            break;
        }
    }

    Ok(images)
}

fn is_eligible(post: &Post, nsfw: bool) -> bool {
    let data = &post.data;
    post.kind == "t3"
        && !data.pinned
        && !data.stickied
        && data.post_hint.as_deref() == Some("image")
        && (nsfw || !data.over_18)
}

fn to_image(data: PostData) -> Option<Image> {
    let url = data.url?;
    let preview = data.preview?.images.into_iter().next()?;

    let mut variants = preview.resolutions;
    variants.push(preview.source);
    for variant in &mut variants {
        variant.url = unescape_amp(&variant.url);
    }
    variants::sort_by_area(&mut variants);

    Some(Image {
        url: unescape_amp(&url),
        caption: data.title,
        variants,
    })
}
