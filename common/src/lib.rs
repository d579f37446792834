//! Common types and utilities for wallfetch.
//!
//! This crate defines the shared data structures and IPC protocol used for
//! communication between the daemon (`wallfetchd`) and
//! client (`wfctl`).
//!
//! # IPC Protocol
//!
//! Communication happens over a Unix domain socket using newline-delimited
//! JSON. The client sends [`Command`] variants and receives [`Response`]
//! variants. A [`Command::FetchWallpapers`] is fire-and-forget: the daemon
//! answers later with either [`Response::Wallpapers`] or
//! [`Response::FetchError`], or with nothing at all when the provider had no
//! usable images this cycle.
//!
//! # Examples
//!
//! ```no_run
//! use common::{Command, FetchRequest, SourceSpec};
//!
//! let cmd = Command::FetchWallpapers(FetchRequest {
//!     source: SourceSpec::One("/r/EarthPorn".to_string()),
//!     maximum_entries: 3,
//!     ..Default::default()
//! });
//!
//! // Serialize for sending over IPC
//! let json = serde_json::to_string(&cmd).unwrap();
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common error types shared between client and daemon.
///
/// All errors are serializable for transmission over IPC.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum WallpaperError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("IPC error: {0}")]
    Ipc(String),
}

impl From<std::io::Error> for WallpaperError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for WallpaperError {
    fn from(e: serde_json::Error) -> Self {
        Self::Ipc(e.to_string())
    }
}

/// Commands sent from client to daemon via IPC.
#[derive(Debug, Serialize, Deserialize)]
pub enum Command {
    /// Fetch a set of wallpapers.
    ///
    /// The reply arrives asynchronously on the same connection as a
    /// `WALLPAPERS` or `FETCH_ERROR` response.
    #[serde(rename = "FETCH_WALLPAPERS")]
    FetchWallpapers(FetchRequest),
    /// Query daemon status and cache contents
    Query,
    /// Kill the daemon
    Kill,
    /// Ping the daemon
    Ping,
}

/// Response from daemon to client
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Error(WallpaperError),
    Status(DaemonStatus),
    Pong,
    /// A successful fetch, either fresh or served from the cache.
    #[serde(rename = "WALLPAPERS")]
    Wallpapers(WallpaperSet),
    /// A transport-level failure for one fetch cycle.
    #[serde(rename = "FETCH_ERROR")]
    FetchError { error: String },
}

/// Daemon status information
#[derive(Debug, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub cache: Vec<CacheStatus>,
}

/// One cache entry as reported by [`Command::Query`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub key: String,
    pub images: usize,
    /// Milliseconds until the entry goes stale, zero once expired
    pub expires_in_ms: u64,
}

/// Where to fetch wallpapers from.
///
/// A list of candidates is resolved by picking one at random on every
/// fetch; the picked value is what keys the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    One(String),
    Many(Vec<String>),
}

impl SourceSpec {
    /// All candidate source strings, in configured order
    pub fn candidates(&self) -> &[String] {
        match self {
            Self::One(source) => std::slice::from_ref(source),
            Self::Many(sources) => sources,
        }
    }
}

impl Default for SourceSpec {
    fn default() -> Self {
        Self::One("bing".to_string())
    }
}

/// A single fetch request as sent by the host.
///
/// Field names follow the host's wire format, hence the mix of camelCase
/// and snake_case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub source: SourceSpec,

    /// `"vertical"`, or anything else for horizontal. Echoed back verbatim.
    #[serde(default = "default_orientation")]
    pub orientation: String,

    #[serde(rename = "maximumEntries", default = "default_maximum_entries")]
    pub maximum_entries: usize,

    /// Refresh interval of the caller in milliseconds
    #[serde(rename = "updateInterval", default = "default_update_interval")]
    pub update_interval: u64,

    #[serde(default = "default_true")]
    pub nsfw: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pexels_search: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pexels_key: Option<String>,
}

fn default_orientation() -> String {
    "horizontal".to_string()
}
fn default_maximum_entries() -> usize {
    10
}
fn default_update_interval() -> u64 {
    60 * 60 * 1000
}
fn default_true() -> bool {
    true
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            source: SourceSpec::default(),
            orientation: default_orientation(),
            maximum_entries: default_maximum_entries(),
            update_interval: default_update_interval(),
            nsfw: true,
            pexels_search: None,
            pexels_key: None,
        }
    }
}

impl FetchRequest {
    pub fn is_vertical(&self) -> bool {
        self.orientation == "vertical"
    }
}

/// One resolution of an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl Variant {
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
        }
    }

    /// Pixel area, used to order variants
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A wallpaper as returned to the host.
///
/// `variants` is ordered ascending by area and may be empty for providers
/// that carry no resolution metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Variant>,
}

impl Image {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            caption: None,
            variants: Vec::new(),
        }
    }

    pub fn with_caption(mut self, caption: Option<String>) -> Self {
        self.caption = caption;
        self
    }
}

/// Payload of a `WALLPAPERS` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallpaperSet {
    pub source: String,
    pub orientation: String,
    pub images: Vec<Image>,
}

/// IPC socket path helper
pub fn get_socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));

    std::path::PathBuf::from(runtime_dir).join("wallfetch.sock")
}
