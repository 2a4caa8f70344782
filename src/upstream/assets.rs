//! Asset index lookup through the live version manifest.
//!
//! ```text
//! version_manifest_url ──▶ first "old_alpha" version ──▶ package JSON
//!     ──▶ assetIndex.url ──▶ asset index body (raw bytes)
//! ```

use bytes::Bytes;
use serde::Deserialize;

use crate::upstream::client::{UpstreamClient, UpstreamError, UpstreamResult};

/// Release type whose asset index matches what pre-release clients expect.
pub const LEGACY_RELEASE_TYPE: &str = "old_alpha";

#[derive(Debug, Deserialize)]
struct VersionManifest {
    versions: Vec<VersionRef>,
}

#[derive(Debug, Deserialize)]
struct VersionRef {
    #[serde(rename = "type")]
    kind: String,
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionPackage {
    asset_index: AssetIndexRef,
}

#[derive(Debug, Deserialize)]
struct AssetIndexRef {
    url: String,
}

/// Walks the version manifest to the asset index used by legacy releases.
#[derive(Debug, Clone)]
pub struct AssetIndexSource {
    client: UpstreamClient,
    version_manifest_url: String,
}

impl AssetIndexSource {
    pub fn new(client: UpstreamClient, version_manifest_url: impl Into<String>) -> Self {
        Self {
            client,
            version_manifest_url: version_manifest_url.into(),
        }
    }

    /// Fetch the raw asset index document.
    pub async fn fetch_index(&self) -> UpstreamResult<Bytes> {
        let manifest: VersionManifest = self.client.fetch_json(&self.version_manifest_url).await?;

        let version = manifest
            .versions
            .into_iter()
            .find(|v| v.kind == LEGACY_RELEASE_TYPE)
            .ok_or_else(|| UpstreamError::Decode {
                url: self.version_manifest_url.clone(),
                reason: format!("no '{}' version listed", LEGACY_RELEASE_TYPE),
            })?;

        let package: VersionPackage = self.client.fetch_json(&version.url).await?;
        tracing::debug!(index_url = %package.asset_index.url, "Resolved legacy asset index");

        self.client.fetch(&package.asset_index.url).await
    }
}
