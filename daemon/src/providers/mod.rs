//! Wallpaper providers.
//!
//! A resolved source string is matched against [`REGISTRY`] in order; the
//! first matching pattern picks the provider. Order matters because some
//! prefixes shadow others (`flickr-user-faves:` must win over
//! `flickr-user:`). Anything unmatched falls through to the daily image.
//!
//! Each provider turns a request into a [`Plan`] and, for single-request
//! providers, parses the response body into images. Records that lack the
//! data a provider needs are dropped individually; only a body that can't
//! be parsed at all fails the fetch.

pub mod daily;
pub mod flickr;
pub mod icloud;
pub mod lightroom;
pub mod local;
pub mod pexels;
pub mod reddit;

use common::{FetchRequest, Image};

use crate::collections::LocalCollections;
use crate::config::ICloudSettings;
use crate::error::FetchError;
use crate::http::HttpRequest;

pub use icloud::ICloudSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    FireTv,
    Chromecast,
    DirectUrl,
    Reddit,
    Pexels,
    ICloud,
    FlickrGroup,
    FlickrFaves,
    FlickrUser,
    Lightroom,
    DailyImage,
}

/// How a source string is recognised
#[derive(Debug, Clone, Copy)]
enum Pattern {
    Exact(&'static str),
    Prefix(&'static str),
}

impl Pattern {
    /// Length of the matched prefix, compared ASCII case-insensitively
    fn matches(&self, source: &str) -> Option<usize> {
        match self {
            Self::Exact(name) => source.eq_ignore_ascii_case(name).then_some(source.len()),
            Self::Prefix(prefix) => source
                .as_bytes()
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
                .then_some(prefix.len()),
        }
    }
}

/// Provider dispatch table, tested top to bottom
const REGISTRY: &[(Pattern, ProviderKind)] = &[
    (Pattern::Exact("firetv"), ProviderKind::FireTv),
    (Pattern::Exact("chromecast"), ProviderKind::Chromecast),
    (Pattern::Prefix("http://"), ProviderKind::DirectUrl),
    (Pattern::Prefix("https://"), ProviderKind::DirectUrl),
    (Pattern::Prefix("/r/"), ProviderKind::Reddit),
    (Pattern::Exact("pexels"), ProviderKind::Pexels),
    (Pattern::Prefix("icloud:"), ProviderKind::ICloud),
    (Pattern::Prefix("flickr-group:"), ProviderKind::FlickrGroup),
    (Pattern::Prefix("flickr-user-faves:"), ProviderKind::FlickrFaves),
    (Pattern::Prefix("flickr-user:"), ProviderKind::FlickrUser),
    (Pattern::Prefix("lightroom:"), ProviderKind::Lightroom),
];

/// What the orchestrator has to do to obtain images
#[derive(Debug)]
pub enum Plan {
    /// Images are available without touching the network
    Ready(Vec<Image>),
    /// A single request whose body [`Provider::parse`] understands
    Request(HttpRequest),
    /// The multi-step iCloud shared album exchange
    ICloud(ICloudSession),
}

/// Everything providers need besides the request itself
pub struct ProviderContext<'a> {
    pub collections: &'a LocalCollections,
    pub user_agent: &'a str,
    pub icloud: &'a ICloudSettings,
}

/// A resolved source bound to the provider that serves it
#[derive(Debug, Clone, Copy)]
pub struct Provider<'a> {
    kind: ProviderKind,
    /// The full source string, original case
    source: &'a str,
    /// The source with the matched prefix removed, original case
    argument: &'a str,
}

impl<'a> Provider<'a> {
    pub fn resolve(source: &'a str) -> Self {
        REGISTRY
            .iter()
            .find_map(|(pattern, kind)| {
                pattern.matches(source).map(|len| Self {
                    kind: *kind,
                    source,
                    argument: &source[len..],
                })
            })
            .unwrap_or(Self {
                kind: ProviderKind::DailyImage,
                source,
                argument: source,
            })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn plan(&self, request: &FetchRequest, ctx: &ProviderContext) -> Result<Plan, FetchError> {
        let plan = match self.kind {
            ProviderKind::FireTv => Plan::Ready(local::pick(&ctx.collections.firetv, request)),
            ProviderKind::Chromecast => {
                Plan::Ready(local::pick(&ctx.collections.chromecast, request))
            }
            ProviderKind::DirectUrl => Plan::Ready(local::direct(self.source)),
            ProviderKind::Reddit => Plan::Request(reddit::request(self.source, ctx.user_agent)),
            ProviderKind::Pexels => Plan::Request(pexels::request(request)?),
            ProviderKind::ICloud => Plan::ICloud(ICloudSession::new(
                self.argument,
                ctx.icloud,
                request.maximum_entries,
            )),
            ProviderKind::FlickrGroup => {
                Plan::Request(flickr::request(flickr::Feed::GroupPool, self.argument))
            }
            ProviderKind::FlickrFaves => {
                Plan::Request(flickr::request(flickr::Feed::Faves, self.argument))
            }
            ProviderKind::FlickrUser => {
                Plan::Request(flickr::request(flickr::Feed::Public, self.argument))
            }
            ProviderKind::Lightroom => Plan::Request(lightroom::request(self.argument)),
            ProviderKind::DailyImage => Plan::Request(daily::request(request)),
        };

        Ok(plan)
    }

    /// Parse the body of the request built by [`Provider::plan`]
    pub fn parse(&self, request: &FetchRequest, body: &str) -> Result<Vec<Image>, FetchError> {
        match self.kind {
            ProviderKind::Reddit => reddit::parse(request, body),
            ProviderKind::Pexels => pexels::parse(request, body),
            ProviderKind::FlickrGroup | ProviderKind::FlickrFaves | ProviderKind::FlickrUser => {
                flickr::parse(request, body)
            }
            ProviderKind::Lightroom => Ok(lightroom::parse(request, body)),
            ProviderKind::DailyImage => daily::parse(request, body),
            ProviderKind::FireTv
            | ProviderKind::Chromecast
            | ProviderKind::DirectUrl
            | ProviderKind::ICloud => Ok(Vec::new()),
        }
    }
}

/// Undo the HTML escaping providers apply to query strings in URLs
pub fn unescape_amp(url: &str) -> String {
    url.replace("&amp;", "&")
}

/// Deserialize each record on its own so one bad record doesn't sink the batch
pub fn parse_records<T: serde::de::DeserializeOwned>(
    records: Vec<serde_json::Value>,
    provider: &str,
) -> impl Iterator<Item = T> {
    let provider = provider.to_string();
    records
        .into_iter()
        .filter_map(move |record| match serde_json::from_value(record) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                log::debug!("Skipping malformed {} record: {}", provider, e);
                None
            }
        })
}
