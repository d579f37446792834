use common::{FetchRequest, Image};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::LazyLock;

use super::parse_records;
use crate::error::FetchError;
use crate::http::HttpRequest;

/// One backslash escape; escapes pair up left to right, so `\\` is never split
static ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\(.)").expect("escape pattern is valid"));

/// The three public Flickr feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    GroupPool,
    Public,
    Faves,
}

impl Feed {
    fn path(&self) -> &'static str {
        match self {
            Self::GroupPool => "groups_pool.gne",
            Self::Public => "photos_public.gne",
            Self::Faves => "photos_faves.gne",
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedBody {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    media: Media,
}

#[derive(Debug, Deserialize)]
struct Media {
    m: String,
}

pub fn request(feed: Feed, id: &str) -> HttpRequest {
    HttpRequest::get(format!(
        "https://api.flickr.com/services/feeds/{}?format=json&id={}",
        feed.path(),
        id
    ))
}

/// Feed items upsized from the medium rendition to the large one
pub fn parse(request: &FetchRequest, body: &str) -> Result<Vec<Image>, FetchError> {
    let json = strip_callback(body)
        .ok_or_else(|| FetchError::Parse("no JSON object in Flickr feed".to_string()))?;
    let feed: FeedBody = serde_json::from_str(&unescape_quotes(json))?;

    let images = parse_records::<Item>(feed.items, "flickr")
        .map(|item| Image::new(item.media.m.replacen("_m.", "_h.", 1)).with_caption(item.title))
        .take(request.maximum_entries)
        .collect();

    Ok(images)
}

/// Flickr escapes single quotes as `\'`, which JSON doesn't allow
fn unescape_quotes(json: &str) -> Cow<'_, str> {
    ESCAPE.replace_all(json, |caps: &Captures| {
        if &caps[1] == "'" {
            "'".to_string()
        } else {
            caps[0].to_string()
        }
    })
}

/// Drop the JSONP wrapper: everything before the first `{` and after the last `}`
fn strip_callback(body: &str) -> Option<&str> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start <= end).then(|| &body[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"jsonFlickrFeed({
        "title": "Uploads from everyone",
        "items": [
            {"title": "Dawn", "media": {"m": "https://live.staticflickr.com/1/abc_m.jpg"}},
            {"title": "Rock\'s edge", "media": {"m": "https://live.staticflickr.com/2/def_m.jpg"}},
            {"title": "No media"},
            {"title": "Dusk", "media": {"m": "https://live.staticflickr.com/3/ghi_m.jpg"}}
        ]
    })"#;

    #[test]
    fn test_strips_wrapper_and_upsizes() {
        let images = parse(&FetchRequest::default(), BODY).unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(images[0].url, "https://live.staticflickr.com/1/abc_h.jpg");
        assert_eq!(images[0].caption.as_deref(), Some("Dawn"));
        assert_eq!(images[1].caption.as_deref(), Some("Rock's edge"));
    }

    #[test]
    fn test_stops_at_maximum_entries() {
        let request = FetchRequest {
            maximum_entries: 1,
            ..Default::default()
        };
        assert_eq!(parse(&request, BODY).unwrap().len(), 1);
    }

    #[test]
    fn test_escaped_backslash_before_quote_is_kept() {
        let body = r#"jsonFlickrFeed({"items":[{"title":"a\\'b","media":{"m":"https://x/1_m.jpg"}}]})"#;
        let images = parse(&FetchRequest::default(), body).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].caption.as_deref(), Some("a\\'b"));
        assert_eq!(images[0].url, "https://x/1_h.jpg");
    }

    #[test]
    fn test_unescape_quotes() {
        assert_eq!(unescape_quotes(r"it\'s"), "it's");
        assert_eq!(unescape_quotes(r"a\\'b"), r"a\\'b");
        assert_eq!(unescape_quotes(r"a\\\'b"), r"a\\'b");
        assert_eq!(unescape_quotes(r#"q\"x\n\'\'"#), r#"q\"x\n''"#);
    }

    #[test]
    fn test_strip_callback() {
        assert_eq!(strip_callback("cb({\"a\":1});\n"), Some("{\"a\":1}"));
        assert_eq!(strip_callback("no json here"), None);
        assert_eq!(strip_callback("} backwards {"), None);
    }

    #[test]
    fn test_body_without_object_is_parse_error() {
        let err = parse(&FetchRequest::default(), "jsonFlickrFeed()").unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[test]
    fn test_feed_urls() {
        assert_eq!(
            request(Feed::GroupPool, "123@N01").url,
            "https://api.flickr.com/services/feeds/groups_pool.gne?format=json&id=123@N01"
        );
        assert!(request(Feed::Public, "9").url.contains("/photos_public.gne?"));
        assert!(request(Feed::Faves, "9").url.contains("/photos_faves.gne?"));
    }
}
