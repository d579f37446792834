use common::{CacheStatus, FetchRequest, Image, Response, SourceSpec, WallpaperSet};
use rand::rng;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, mpsc};

use crate::cache::CacheStore;
use crate::collections::LocalCollections;
use crate::config::{Config, ICloudSettings};
use crate::error::FetchError;
use crate::http::{self, HttpTransport};
use crate::log_and_continue;
use crate::providers::{Plan, Provider, ProviderContext};

/// Serves fetch requests from the cache or the matching provider.
///
/// Fetches for the same cache key are serialised, so a second request
/// waiting on an in-flight one is answered from the cache it fills.
/// Different keys proceed concurrently.
pub struct Orchestrator {
    transport: Arc<dyn HttpTransport>,
    collections: LocalCollections,
    user_agent: String,
    icloud: ICloudSettings,
    cache: Mutex<CacheStore>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        collections: LocalCollections,
        config: &Config,
    ) -> Self {
        Self {
            transport,
            collections,
            user_agent: config.http.user_agent.clone(),
            icloud: config.icloud.clone(),
            cache: Mutex::new(CacheStore::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run one fetch cycle and emit its outcome.
    ///
    /// Emits `WALLPAPERS` on success and `FETCH_ERROR` on failure. A cycle
    /// that yields no images emits nothing.
    pub async fn fetch(&self, request: FetchRequest, events: &mpsc::UnboundedSender<Response>) {
        match self.run(request).await {
            Ok(Some(set)) => {
                log::info!(
                    "Sending {} wallpapers for {}::{}",
                    set.images.len(),
                    set.source,
                    set.orientation
                );
                log_and_continue!(events.send(Response::Wallpapers(set)), "deliver wallpapers");
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("Fetch failed: {}", e);
                log_and_continue!(
                    events.send(Response::FetchError {
                        error: e.to_string()
                    }),
                    "deliver fetch error"
                );
            }
        }
    }

    pub async fn cache_status(&self) -> Vec<CacheStatus> {
        self.cache.lock().await.status(Instant::now())
    }

    async fn run(&self, mut request: FetchRequest) -> Result<Option<WallpaperSet>, FetchError> {
        if request.maximum_entries == 0 {
            return Err(FetchError::InvalidRequest(
                "maximumEntries must be at least 1".to_string(),
            ));
        }

        let source = resolve_source(&request.source)?;
        request.source = SourceSpec::One(source.clone());
        let key = CacheStore::key(&source, &request.orientation);

        let key_lock = self.key_lock(&key).await;
        let _guard = key_lock.lock().await;

        if let Some(images) = self.fresh_images(&key, request.maximum_entries).await {
            log::debug!("Cache hit for {}", key);
            return Ok(Some(wallpaper_set(source, &request, images)));
        }
        log::debug!("Cache miss for {}", key);

        let images = self.fetch_from_provider(&source, &request).await?;
        if images.is_empty() {
            log::info!("No usable images from {}", source);
            return Ok(None);
        }

        let mut cache = self.cache.lock().await;
        cache.put(&key, images, request.update_interval);
        let images = cache
            .get(&key)
            .map(|entry| entry.images.clone())
            .unwrap_or_default();

        Ok(Some(wallpaper_set(source, &request, images)))
    }

    async fn fresh_images(&self, key: &str, min_count: usize) -> Option<Vec<Image>> {
        let cache = self.cache.lock().await;
        if !cache.is_fresh(key, min_count) {
            return None;
        }
        cache.get(key).map(|entry| entry.images.clone())
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks.entry(key.to_string()).or_default().clone()
    }

    async fn fetch_from_provider(
        &self,
        source: &str,
        request: &FetchRequest,
    ) -> Result<Vec<Image>, FetchError> {
        let provider = Provider::resolve(source);
        log::info!("Fetching {} via {:?}", source, provider.kind());

        let ctx = ProviderContext {
            collections: &self.collections,
            user_agent: &self.user_agent,
            icloud: &self.icloud,
        };

        match provider.plan(request, &ctx)? {
            Plan::Ready(images) => Ok(images),
            Plan::Request(http_request) => {
                let response = http::execute(self.transport.as_ref(), http_request).await?;
                if response.body.is_empty() {
                    return Ok(Vec::new());
                }
                provider.parse(request, &response.body)
            }
            Plan::ICloud(session) => session.run(self.transport.as_ref()).await,
        }
    }
}

/// Pick the concrete source for this cycle
fn resolve_source(sources: &SourceSpec) -> Result<String, FetchError> {
    sources.candidates()
        .choose(&mut rng())
        .cloned()
        .ok_or_else(|| FetchError::InvalidRequest("source list is empty".to_string()))
}

fn wallpaper_set(source: String, request: &FetchRequest, images: Vec<Image>) -> WallpaperSet {
    WallpaperSet {
        source,
        orientation: request.orientation.clone(),
        images,
    }
}
