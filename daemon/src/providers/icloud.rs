//! iCloud shared album resolution.
//!
//! Resolving a shared album into direct image URLs takes two sequential
//! calls against the album's CDN host:
//!
//! 1. `webstream` lists the photos and their derivatives (one per
//!    resolution, identified by checksum). The host may answer 330 with a
//!    replacement host in `X-Apple-MMe-Host`; the same call is then repeated
//!    against that host.
//! 2. `webasseturls` maps the checksums of the selected photos to asset
//!    locations, from which the final URLs are built.
//!
//! An [`ICloudSession`] owns the state of one such exchange and is dropped
//! once the images are produced.

use common::{Image, Variant};
use rand::rng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};

use super::parse_records;
use crate::config::ICloudSettings;
use crate::error::FetchError;
use crate::http::{self, HttpRequest, HttpResponse, HttpTransport};
use crate::variants;

/// Status the webstream endpoint uses to point at another host
const REDIRECT_STATUS: u16 = 330;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Webstream,
    WebAssetUrls,
}

/// What to do after feeding a response to the session
#[derive(Debug)]
pub enum Step {
    Send(HttpRequest),
    Done(Vec<Image>),
}

#[derive(Debug, Deserialize)]
struct Redirect {
    #[serde(rename = "X-Apple-MMe-Host")]
    host: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Webstream {
    #[serde(default)]
    photos: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct Photo {
    #[serde(rename = "photoGuid")]
    guid: String,
    caption: Option<String>,
    #[serde(rename = "mediaAssetType")]
    media_asset_type: Option<String>,
    #[serde(default)]
    derivatives: BTreeMap<String, Derivative>,
}

impl Photo {
    fn is_video(&self) -> bool {
        self.media_asset_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("video"))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Derivative {
    checksum: Option<String>,
    #[serde(default, deserialize_with = "dimension")]
    width: u32,
    #[serde(default, deserialize_with = "dimension")]
    height: u32,
    /// Filled in from the webasseturls response
    #[serde(skip)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssetUrls {
    #[serde(default)]
    items: HashMap<String, AssetItem>,
    #[serde(default)]
    locations: HashMap<String, AssetLocation>,
}

#[derive(Debug, Deserialize)]
struct AssetItem {
    url_location: String,
    url_path: String,
}

#[derive(Debug, Deserialize)]
struct AssetLocation {
    scheme: String,
    #[serde(default)]
    hosts: Vec<String>,
}

/// iCloud sends dimensions as strings; accept numbers too
fn dimension<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// State of one shared album resolution
#[derive(Debug)]
pub struct ICloudSession {
    album: String,
    host: String,
    state: SessionState,
    photos: Vec<Photo>,
    maximum_entries: usize,
    redirects: u32,
    max_redirects: u32,
}

impl ICloudSession {
    pub fn new(album: &str, settings: &ICloudSettings, maximum_entries: usize) -> Self {
        Self {
            album: album.to_string(),
            host: settings.default_host.clone(),
            state: SessionState::Webstream,
            photos: Vec::new(),
            maximum_entries,
            redirects: 0,
            max_redirects: settings.max_redirects,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, endpoint: &str) -> String {
        format!("https://{}/{}/sharedstreams/{}", self.host, self.album, endpoint)
    }

    /// The request for the current state
    pub fn request(&self) -> HttpRequest {
        match self.state {
            SessionState::Webstream => {
                HttpRequest::post(self.url("webstream"), r#"{"streamCtag":null}"#)
            }
            SessionState::WebAssetUrls => {
                let guids: Vec<&str> = self.photos.iter().map(|p| p.guid.as_str()).collect();
                let body = serde_json::json!({ "photoGuids": guids });
                HttpRequest::post(self.url("webasseturls"), body.to_string())
            }
        }
    }

    /// Feed the response to the last request and decide what comes next
    pub fn advance(&mut self, response: HttpResponse) -> Result<Step, FetchError> {
        if response.body.trim().is_empty() {
            log::debug!("Empty iCloud response in {:?} state", self.state);
            return Ok(Step::Done(Vec::new()));
        }

        match self.state {
            SessionState::Webstream => self.on_webstream(response),
            SessionState::WebAssetUrls => {
                let assets: AssetUrls = serde_json::from_str(&response.body)?;
                self.apply_asset_urls(assets);
                Ok(Step::Done(self.images()))
            }
        }
    }

    /// Drive the exchange to completion
    pub async fn run(mut self, transport: &dyn HttpTransport) -> Result<Vec<Image>, FetchError> {
        let mut request = self.request();
        loop {
            log::debug!("iCloud {:?} request to {}", self.state(), self.host());
            let response = http::execute(transport, request).await?;
            match self.advance(response)? {
                Step::Send(next) => request = next,
                Step::Done(images) => return Ok(images),
            }
        }
    }

    fn on_webstream(&mut self, response: HttpResponse) -> Result<Step, FetchError> {
        match response.status {
            REDIRECT_STATUS => {
                let redirect: Redirect = serde_json::from_str(&response.body)?;
                let host = redirect
                    .host
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| FetchError::Protocol("330 without X-Apple-MMe-Host".to_string()))?;

                self.redirects += 1;
                if self.redirects > self.max_redirects {
                    return Err(FetchError::Protocol(format!(
                        "gave up after {} host redirects",
                        self.max_redirects
                    )));
                }

                log::debug!("iCloud album {} redirected to {}", self.album, host);
                self.host = host;
                Ok(Step::Send(self.request()))
            }
            200 => {
                let stream: Webstream = serde_json::from_str(&response.body)?;
                let mut photos: Vec<Photo> = parse_records::<Photo>(stream.photos, "iCloud")
                    .filter(|p| !p.is_video())
                    .collect();
                photos.shuffle(&mut rng());
                photos.truncate(self.maximum_entries);

                if photos.is_empty() {
                    return Ok(Step::Done(Vec::new()));
                }

                self.photos = photos;
                self.state = SessionState::WebAssetUrls;
                Ok(Step::Send(self.request()))
            }
            status => Err(FetchError::Status {
                status,
                url: self.url("webstream"),
            }),
        }
    }

    /// Attach a direct URL to every derivative whose checksum has an asset
    fn apply_asset_urls(&mut self, assets: AssetUrls) {
        for (checksum, item) in &assets.items {
            let Some(location) = assets.locations.get(&item.url_location) else {
                log::debug!("iCloud asset {} has unknown location {}", checksum, item.url_location);
                continue;
            };
            let Some(host) = location.hosts.choose(&mut rng()) else {
                continue;
            };
            let url = format!("{}://{}{}", location.scheme, host, item.url_path);

            for derivative in self
                .photos
                .iter_mut()
                .flat_map(|p| p.derivatives.values_mut())
                .filter(|d| d.checksum.as_deref() == Some(checksum.as_str()))
            {
                derivative.url = Some(url.clone());
            }
        }
    }

    /// Final images; photos with no resolved derivative are dropped
    fn images(&self) -> Vec<Image> {
        self.photos
            .iter()
            .filter_map(|photo| {
                let mut variants: Vec<Variant> = photo
                    .derivatives
                    .values()
                    .filter(|d| d.width > 0)
                    .filter_map(|d| d.url.as_ref().map(|url| Variant::new(url.clone(), d.width, d.height)))
                    .collect();

                let Some(url) = variants::select_primary(&mut variants) else {
                    log::debug!("Dropping iCloud photo {} without resolved derivatives", photo.guid);
                    return None;
                };

                Some(Image {
                    url,
                    caption: photo.caption.clone(),
                    variants,
                })
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::http::testing::ScriptedTransport;
    use serde_json::json;

    pub(crate) fn settings() -> ICloudSettings {
        ICloudSettings {
            default_host: "p04-sharedstreams.icloud.com".to_string(),
            max_redirects: 2,
        }
    }

    pub(crate) fn webstream_body() -> String {
        json!({
            "streamName": "Album",
            "photos": [
                {
                    "photoGuid": "G1",
                    "caption": "Lake",
                    "derivatives": {
                        "1024": {"checksum": "c1-small", "width": "1024", "height": "768"},
                        "2048": {"checksum": "c1-large", "width": "2048", "height": "1536"}
                    }
                },
                null,
                {
                    "photoGuid": "G2",
                    "mediaAssetType": "video",
                    "derivatives": {
                        "PosterFrame": {"checksum": "c2", "width": "640", "height": "480"}
                    }
                },
                {
                    "photoGuid": "G3",
                    "derivatives": {
                        "1024": {"checksum": "c3-unresolved", "width": "1024", "height": "768"}
                    }
                }
            ]
        })
        .to_string()
    }

    pub(crate) fn asset_urls_body() -> String {
        json!({
            "items": {
                "c1-small": {"url_location": "loc1", "url_path": "/small.jpg?o=1"},
                "c1-large": {"url_location": "loc1", "url_path": "/large.jpg?o=1"},
                "orphan": {"url_location": "missing", "url_path": "/x.jpg"}
            },
            "locations": {
                "loc1": {"scheme": "https", "hosts": ["cvws.icloud-content.com"]}
            }
        })
        .to_string()
    }

    #[test]
    fn test_redirect_retargets_webstream() {
        let mut session = ICloudSession::new("B0album", &settings(), 10);
        assert_eq!(
            session.request().url,
            "https://p04-sharedstreams.icloud.com/B0album/sharedstreams/webstream"
        );

        let step = session
            .advance(HttpResponse::new(330, r#"{"X-Apple-MMe-Host": "new.host"}"#))
            .unwrap();

        let Step::Send(next) = step else {
            panic!("expected another request");
        };
        assert_eq!(next.url, "https://new.host/B0album/sharedstreams/webstream");
        assert_eq!(next.body.as_deref(), Some(r#"{"streamCtag":null}"#));
        assert_eq!(session.state(), SessionState::Webstream);
        assert_eq!(session.host(), "new.host");
    }

    #[test]
    fn test_redirect_without_host_is_protocol_error() {
        let mut session = ICloudSession::new("B0album", &settings(), 10);
        let err = session.advance(HttpResponse::new(330, "{}")).unwrap_err();
        assert!(matches!(err, FetchError::Protocol(_)));
    }

    #[test]
    fn test_redirect_loop_is_capped() {
        let mut session = ICloudSession::new("B0album", &settings(), 10);
        let redirect = r#"{"X-Apple-MMe-Host": "loop.host"}"#;
        assert!(session.advance(HttpResponse::new(330, redirect)).is_ok());
        assert!(session.advance(HttpResponse::new(330, redirect)).is_ok());
        let err = session.advance(HttpResponse::new(330, redirect)).unwrap_err();
        assert!(matches!(err, FetchError::Protocol(_)));
    }

    #[test]
    fn test_webstream_selects_photos_and_advances() {
        let mut session = ICloudSession::new("B0album", &settings(), 10);
        let step = session.advance(HttpResponse::new(200, webstream_body())).unwrap();

        let Step::Send(next) = step else {
            panic!("expected webasseturls request");
        };
        assert_eq!(session.state(), SessionState::WebAssetUrls);
        assert!(next.url.ends_with("/B0album/sharedstreams/webasseturls"));

        let body: serde_json::Value = serde_json::from_str(next.body.as_deref().unwrap()).unwrap();
        let mut guids: Vec<String> = serde_json::from_value(body["photoGuids"].clone()).unwrap();
        guids.sort();
        assert_eq!(guids, vec!["G1", "G3"]);
    }

    #[test]
    fn test_webstream_truncates_to_maximum_entries() {
        let mut session = ICloudSession::new("B0album", &settings(), 1);
        session.advance(HttpResponse::new(200, webstream_body())).unwrap();
        assert_eq!(session.photos.len(), 1);
    }

    #[test]
    fn test_asset_urls_build_images() {
        let mut session = ICloudSession::new("B0album", &settings(), 10);
        session.advance(HttpResponse::new(200, webstream_body())).unwrap();
        let step = session.advance(HttpResponse::new(200, asset_urls_body())).unwrap();

        let Step::Done(images) = step else {
            panic!("expected final images");
        };
        // G3's only derivative never resolved, so only G1 survives
        assert_eq!(images.len(), 1);
        let image = &images[0];
        assert_eq!(image.url, "https://cvws.icloud-content.com/large.jpg?o=1");
        assert_eq!(image.caption.as_deref(), Some("Lake"));
        let widths: Vec<u32> = image.variants.iter().map(|v| v.width).collect();
        assert_eq!(widths, vec![1024, 2048]);
    }

    #[test]
    fn test_partially_resolved_photo_keeps_usable_derivatives() {
        let webstream = json!({
            "photos": [{
                "photoGuid": "P1",
                "caption": "Harbour",
                "derivatives": {
                    "1024": {"checksum": "p1-ok", "width": "1024", "height": "768"},
                    "2048": {"checksum": "p1-unmatched", "width": "2048", "height": "1536"},
                    "thumb": {"checksum": "p1-flat", "width": "0", "height": "0"}
                }
            }]
        });
        let assets = json!({
            "items": {
                "p1-ok": {"url_location": "loc1", "url_path": "/ok.jpg"},
                "p1-flat": {"url_location": "loc1", "url_path": "/flat.jpg"}
            },
            "locations": {
                "loc1": {"scheme": "https", "hosts": ["cvws.icloud-content.com"]}
            }
        });

        let mut session = ICloudSession::new("B0album", &settings(), 10);
        session.advance(HttpResponse::new(200, webstream.to_string())).unwrap();
        let step = session.advance(HttpResponse::new(200, assets.to_string())).unwrap();

        let Step::Done(images) = step else {
            panic!("expected final images");
        };
        assert_eq!(images.len(), 1);
        let image = &images[0];
        assert_eq!(image.url, "https://cvws.icloud-content.com/ok.jpg");
        assert_eq!(image.caption.as_deref(), Some("Harbour"));
        assert_eq!(image.variants.len(), 1);
        assert_eq!(image.variants[0].width, 1024);
    }

    #[test]
    fn test_dimension_accepts_numbers_and_strings() {
        let d: Derivative = serde_json::from_str(r#"{"checksum": "a", "width": 640, "height": "480"}"#).unwrap();
        assert_eq!((d.width, d.height), (640, 480));
        let d: Derivative = serde_json::from_str(r#"{"checksum": "a", "width": "n/a"}"#).unwrap();
        assert_eq!((d.width, d.height), (0, 0));
    }

    #[tokio::test]
    async fn test_run_follows_redirect_then_resolves() {
        let transport = ScriptedTransport::new()
            .respond(330, r#"{"X-Apple-MMe-Host": "p99-sharedstreams.icloud.com"}"#)
            .respond(200, &webstream_body())
            .respond(200, &asset_urls_body());

        let session = ICloudSession::new("B0album", &settings(), 10);
        let images = session.run(&transport).await.unwrap();
        assert_eq!(images.len(), 1);

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].url.starts_with("https://p04-sharedstreams.icloud.com/"));
        assert!(requests[1].url.starts_with("https://p99-sharedstreams.icloud.com/"));
        assert!(requests[1].url.ends_with("/webstream"));
        assert!(requests[2].url.starts_with("https://p99-sharedstreams.icloud.com/"));
        assert!(requests[2].url.ends_with("/webasseturls"));
    }

    #[tokio::test]
    async fn test_run_surfaces_http_errors() {
        let transport = ScriptedTransport::new().respond(500, "oops");
        let session = ICloudSession::new("B0album", &settings(), 10);
        let err = session.run(&transport).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
    }
}
