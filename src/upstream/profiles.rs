//! Username → skin image lookup through the profile services.
//!
//! ```text
//! profiles_url/{username} ──▶ id
//! sessions_url/{id}       ──▶ properties["textures"] (base64 JSON)
//!                         ──▶ textures.SKIN.url ──▶ image bytes
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;

use crate::upstream::client::{join_segment, UpstreamClient, UpstreamError, UpstreamResult};

#[derive(Debug, Deserialize)]
struct ProfileId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    properties: Vec<ProfileProperty>,
}

#[derive(Debug, Deserialize)]
struct ProfileProperty {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct TexturesPayload {
    textures: Textures,
}

#[derive(Debug, Deserialize)]
struct Textures {
    #[serde(rename = "SKIN")]
    skin: Option<TextureRef>,
}

#[derive(Debug, Deserialize)]
struct TextureRef {
    url: String,
}

/// Resolves player names to their current skin image.
#[derive(Debug, Clone)]
pub struct SkinSource {
    client: UpstreamClient,
    profiles_url: String,
    sessions_url: String,
}

impl SkinSource {
    pub fn new(
        client: UpstreamClient,
        profiles_url: impl Into<String>,
        sessions_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            profiles_url: profiles_url.into(),
            sessions_url: sessions_url.into(),
        }
    }

    /// Look up the profile id for `username`.
    pub async fn profile_id(&self, username: &str) -> UpstreamResult<String> {
        let url = join_segment(&self.profiles_url, username)?;
        let profile: ProfileId = self.client.fetch_json(&url).await?;
        Ok(profile.id)
    }

    /// Look up the skin texture URL for a profile id.
    pub async fn skin_url(&self, id: &str) -> UpstreamResult<String> {
        let url = join_segment(&self.sessions_url, id)?;
        let profile: Profile = self.client.fetch_json(&url).await?;
        decode_skin_url(&profile).map_err(|reason| UpstreamError::Decode { url, reason })
    }

    /// Resolve `username` all the way to the skin image bytes.
    pub async fn fetch_skin(&self, username: &str) -> UpstreamResult<Bytes> {
        let id = self.profile_id(username).await?;
        tracing::debug!(username = %username, profile_id = %id, "Resolved profile id");
        let skin_url = self.skin_url(&id).await?;
        self.client.fetch(&skin_url).await
    }
}

fn decode_skin_url(profile: &Profile) -> Result<String, String> {
    let property = profile
        .properties
        .iter()
        .find(|p| p.name == "textures")
        .ok_or_else(|| "profile has no textures property".to_string())?;

    let decoded = STANDARD
        .decode(property.value.trim())
        .map_err(|e| format!("textures property is not base64: {}", e))?;
    let payload: TexturesPayload =
        serde_json::from_slice(&decoded).map_err(|e| format!("textures payload: {}", e))?;

    payload
        .textures
        .skin
        .map(|s| s.url)
        .ok_or_else(|| "profile has no skin texture".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with(value: &str) -> Profile {
        Profile {
            properties: vec![ProfileProperty {
                name: "textures".into(),
                value: value.into(),
            }],
        }
    }

    #[test]
    fn decodes_skin_url_from_textures_property() {
        let json = r#"{"textures":{"SKIN":{"url":"http://textures.test/abc"}}}"#;
        let profile = profile_with(&STANDARD.encode(json));
        assert_eq!(decode_skin_url(&profile).unwrap(), "http://textures.test/abc");
    }

    #[test]
    fn missing_skin_or_property_is_error() {
        let no_skin = profile_with(&STANDARD.encode(r#"{"textures":{}}"#));
        assert!(decode_skin_url(&no_skin).is_err());
        assert!(decode_skin_url(&Profile { properties: vec![] }).is_err());
        assert!(decode_skin_url(&profile_with("%%%")).is_err());
    }
}
