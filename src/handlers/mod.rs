//! Rule handlers.
//!
//! # Data Flow
//! ```text
//! Matched Rule (HandlerKind) + RequestDescriptor
//!     → auth.rs   (fixed success token, no upstream)
//!     → assets.rs (asset index → legacy list, empty on failure)
//!     → skin.rs   (username → skin image, 404 on failure)
//!     → ResponseDescriptor
//! ```
//!
//! # Design Decisions
//! - Each handler owns its fallback policy; `dispatch` never fails
//! - Handlers share only read-only sources and the lock-free manifest cache

pub mod assets;
pub mod auth;
pub mod skin;

use std::time::Duration;

use thiserror::Error;

use crate::config::{HandlerKind, UpstreamConfig};
use crate::http::request::RequestDescriptor;
use crate::http::response::ResponseDescriptor;
use crate::translate::TranslateError;
use crate::upstream::{AssetIndexSource, SkinSource, UpstreamClient, UpstreamError};

pub use assets::AssetManifestHandler;
pub use skin::SkinHandler;

/// Failure inside a handler before its fallback is applied.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Translate(#[from] TranslateError),
}

/// All handlers, built once at startup and shared by every session.
#[derive(Debug)]
pub struct Handlers {
    assets: AssetManifestHandler,
    skins: SkinHandler,
}

impl Handlers {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = UpstreamClient::new(config)?;
        tracing::debug!(timeout_ms = client.timeout().as_millis() as u64, "Upstream client ready");
        let assets = AssetManifestHandler::new(
            AssetIndexSource::new(client.clone(), config.version_manifest_url.clone()),
            Duration::from_secs(config.manifest_cache_secs),
        );
        let skins = SkinHandler::new(SkinSource::new(
            client,
            config.profiles_url.clone(),
            config.sessions_url.clone(),
        ));
        Ok(Self { assets, skins })
    }

    /// Produce the response for a matched rule.
    pub async fn dispatch(&self, kind: HandlerKind, req: &RequestDescriptor) -> ResponseDescriptor {
        match kind {
            HandlerKind::AuthStub => auth::handle(req),
            HandlerKind::AssetManifest => self.assets.handle().await,
            HandlerKind::Skin => self.skins.handle(req).await,
        }
    }
}
