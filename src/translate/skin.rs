//! Skin image validation for the legacy client.
//!
//! Old clients load skins as 64x32 PNGs. Modern skins are 64x64 with the
//! classic layout in the upper half, which old clients sample correctly, so
//! both sizes are accepted and passed through byte-for-byte. Anything that is
//! not a PNG of those dimensions is rejected.

use bytes::Bytes;

use crate::translate::TranslateError;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Width every legacy skin must have.
pub const SKIN_WIDTH: u32 = 64;

/// Heights the legacy client can render.
pub const SKIN_HEIGHTS: [u32; 2] = [32, 64];

/// Read `(width, height)` from a PNG's IHDR chunk.
pub fn png_dimensions(data: &[u8]) -> Result<(u32, u32), TranslateError> {
    if data.len() < 24 || &data[..8] != PNG_SIGNATURE {
        return Err(TranslateError::Image("not a PNG image".into()));
    }
    if &data[12..16] != b"IHDR" {
        return Err(TranslateError::Image("missing IHDR chunk".into()));
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Ok((width, height))
}

/// Validate a skin image and return the bytes the legacy client should receive.
pub fn skin_to_legacy(data: &[u8]) -> Result<Bytes, TranslateError> {
    let (width, height) = png_dimensions(data)?;
    if width != SKIN_WIDTH || !SKIN_HEIGHTS.contains(&height) {
        return Err(TranslateError::Image(format!(
            "unsupported skin dimensions {}x{}",
            width, height
        )));
    }
    Ok(Bytes::copy_from_slice(data))
}

#[cfg(test)]
pub(crate) fn fake_png(width: u32, height: u32) -> Vec<u8> {
    let mut png = PNG_SIGNATURE.to_vec();
    png.extend_from_slice(&13u32.to_be_bytes());
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&width.to_be_bytes());
    png.extend_from_slice(&height.to_be_bytes());
    png.extend_from_slice(&[8, 6, 0, 0, 0]);
    png.extend_from_slice(&[0, 0, 0, 0]);
    png
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_classic_and_modern_sizes() {
        let classic = fake_png(64, 32);
        assert_eq!(&skin_to_legacy(&classic).unwrap()[..], &classic[..]);
        assert!(skin_to_legacy(&fake_png(64, 64)).is_ok());
    }

    #[test]
    fn rejects_other_dimensions() {
        let err = skin_to_legacy(&fake_png(128, 128)).unwrap_err();
        assert!(err.to_string().contains("128x128"));
    }

    #[test]
    fn rejects_non_png() {
        assert!(skin_to_legacy(b"GIF89a....................").is_err());
        assert!(skin_to_legacy(&[]).is_err());
    }
}
