//! Legacy resource list handler.
//!
//! # Responsibilities
//! - Fetch the live asset index through `AssetIndexSource`
//! - Translate it into the legacy `name,size,0` list
//! - Serve an empty list whenever anything upstream goes wrong
//!
//! # Design Decisions
//! - The client needs *some* well-formed list to finish starting up, so
//!   failures degrade to an empty body with status 200
//! - Successful translations are cached for `manifest_cache_secs`;
//!   readers load the cache through `ArcSwapOption` without locking

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use bytes::Bytes;

use crate::handlers::HandlerError;
use crate::http::response::ResponseDescriptor;
use crate::translate::asset_index_to_legacy;
use crate::upstream::AssetIndexSource;

#[derive(Debug)]
struct CachedManifest {
    body: Bytes,
    fetched_at: Instant,
}

/// Serves `/resources/` from the live asset index.
#[derive(Debug)]
pub struct AssetManifestHandler {
    source: AssetIndexSource,
    cache: ArcSwapOption<CachedManifest>,
    cache_ttl: Duration,
}

impl AssetManifestHandler {
    pub fn new(source: AssetIndexSource, cache_ttl: Duration) -> Self {
        Self {
            source,
            cache: ArcSwapOption::empty(),
            cache_ttl,
        }
    }

    pub async fn handle(&self) -> ResponseDescriptor {
        match self.manifest().await {
            Ok(body) => ResponseDescriptor::ok("text/plain", body),
            Err(e) => {
                tracing::warn!(error = %e, "Asset manifest unavailable, serving empty list");
                ResponseDescriptor::ok("text/plain", Bytes::new())
            }
        }
    }

    async fn manifest(&self) -> Result<Bytes, HandlerError> {
        if let Some(cached) = self.cached() {
            tracing::debug!("Serving cached asset manifest");
            return Ok(cached);
        }

        let index = self.source.fetch_index().await?;
        let body = Bytes::from(asset_index_to_legacy(&index)?);
        tracing::info!(bytes = body.len(), "Asset manifest translated");

        if !self.cache_ttl.is_zero() {
            self.cache.store(Some(Arc::new(CachedManifest {
                body: body.clone(),
                fetched_at: Instant::now(),
            })));
        }
        Ok(body)
    }

    fn cached(&self) -> Option<Bytes> {
        self.cache
            .load_full()
            .filter(|c| c.fetched_at.elapsed() < self.cache_ttl)
            .map(|c| c.body.clone())
    }
}
