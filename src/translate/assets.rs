//! Asset index → legacy resource list.
//!
//! The legacy client downloads `/resources/` and expects one record per
//! line: `name,size,0`. The trailing field is a modification time the
//! client ignores when zero.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::translate::TranslateError;

/// One object from the live asset index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetEntry {
    #[serde(skip)]
    pub name: String,
    pub hash: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct AssetIndex {
    objects: Map<String, Value>,
}

/// Parse an asset index document, preserving object order.
pub fn parse_asset_index(body: &[u8]) -> Result<Vec<AssetEntry>, TranslateError> {
    let index: AssetIndex = serde_json::from_slice(body)?;

    index
        .objects
        .into_iter()
        .map(|(name, value)| {
            let mut entry: AssetEntry = serde_json::from_value(value)
                .map_err(|e| TranslateError::Field(format!("objects.{}: {}", name, e)))?;
            if name.is_empty() || name.contains([',', '\n', '\r']) {
                return Err(TranslateError::Field(format!("unusable asset name {:?}", name)));
            }
            entry.name = name;
            Ok(entry)
        })
        .collect()
}

/// Render entries in the legacy `name,size,0` line format.
pub fn render_legacy_list(entries: &[AssetEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{},{},0", e.name, e.size))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Translate an asset index body straight into the legacy list.
pub fn asset_index_to_legacy(body: &[u8]) -> Result<String, TranslateError> {
    Ok(render_legacy_list(&parse_asset_index(body)?))
}
