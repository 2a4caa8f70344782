//! Player skin handler.
//!
//! Legacy clients ask for skins under several URL shapes that all end in
//! `<username>.png`; the username is taken from the last path segment.

use hyper::StatusCode;

use crate::handlers::HandlerError;
use crate::http::request::RequestDescriptor;
use crate::http::response::ResponseDescriptor;
use crate::translate::skin_to_legacy;
use crate::upstream::SkinSource;

const MAX_USERNAME_LEN: usize = 16;

/// Extract the username from `/any/prefix/<name>[.ext]`.
pub fn username_from_path(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next()?;
    let name = segment.split('.').next()?;
    let valid = !name.is_empty()
        && name.len() <= MAX_USERNAME_LEN
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    valid.then_some(name)
}

/// Serves skin images resolved through the profile services.
#[derive(Debug)]
pub struct SkinHandler {
    source: SkinSource,
}

impl SkinHandler {
    pub fn new(source: SkinSource) -> Self {
        Self { source }
    }

    pub async fn handle(&self, req: &RequestDescriptor) -> ResponseDescriptor {
        let Some(username) = username_from_path(&req.path) else {
            tracing::debug!(path = %req.path, "No usable username in skin path");
            return ResponseDescriptor::status(StatusCode::NOT_FOUND);
        };

        match self.resolve(username).await {
            Ok(image) => {
                tracing::info!(username = %username, bytes = image.len(), "Skin served");
                ResponseDescriptor::ok("image/png", image)
            }
            Err(e) => {
                tracing::info!(username = %username, error = %e, "Skin not resolved");
                ResponseDescriptor::status(StatusCode::NOT_FOUND)
            }
        }
    }

    async fn resolve(&self, username: &str) -> Result<bytes::Bytes, HandlerError> {
        let image = self.source.fetch_skin(username).await?;
        Ok(skin_to_legacy(&image)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_username_from_all_conventions() {
        assert_eq!(username_from_path("/skin/Notch.png"), Some("Notch"));
        assert_eq!(username_from_path("/MinecraftSkins/Notch.png"), Some("Notch"));
        assert_eq!(username_from_path("/MinecraftSkins/jeb_"), Some("jeb_"));
    }

    #[test]
    fn rejects_unusable_names() {
        assert_eq!(username_from_path("/skin/"), None);
        assert_eq!(username_from_path("/skin/.png"), None);
        assert_eq!(username_from_path("/skin/bad%20name.png"), None);
        assert_eq!(username_from_path("/skin/ThisNameIsWayTooLong.png"), None);
    }
}
