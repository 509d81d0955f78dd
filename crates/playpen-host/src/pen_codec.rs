//! Compact, URL-safe pen tokens.
//!
//! A token is `base64url(brotli(json(pen)))` without padding, small enough
//! to live in a URL fragment and reversible without loss.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::{debug, warn};
use url::Url;

use playpen_common::{Pen, PenCodecError, PlaygroundError};

use crate::storage::Storage;

/// Storage key the current pen is kept under.
pub const PEN_KEY: &str = "pen";

/// Largest decompressed pen a token may expand to.
pub const MAX_PEN_BYTES: u64 = 1024 * 1024;

const BUFFER_SIZE: usize = 4096;
const QUALITY: u32 = 9;
const WINDOW_BITS: u32 = 22;

/// Encode a pen into a token.
///
/// # Errors
///
/// Returns an error if the pen cannot be serialized or compressed.
pub fn encode(pen: &Pen) -> Result<String, PenCodecError> {
    let json = serde_json::to_vec(pen)?;

    let mut writer = brotli::CompressorWriter::new(Vec::new(), BUFFER_SIZE, QUALITY, WINDOW_BITS);
    writer.write_all(&json)?;
    let compressed = writer.into_inner();

    Ok(URL_SAFE_NO_PAD.encode(compressed))
}

/// Decode a token back into a pen.
///
/// Anything that is not a valid token, or that expands past
/// [`MAX_PEN_BYTES`], yields `None`.
pub fn decode(token: &str) -> Option<Pen> {
    let token = token.trim().trim_start_matches('#');
    if token.is_empty() {
        return None;
    }

    let compressed = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| debug!(error = %e, "Pen token is not base64"))
        .ok()?;

    let mut json = Vec::new();
    brotli::Decompressor::new(compressed.as_slice(), BUFFER_SIZE)
        .take(MAX_PEN_BYTES + 1)
        .read_to_end(&mut json)
        .map_err(|e| debug!(error = %e, "Pen token does not decompress"))
        .ok()?;
    if json.len() as u64 > MAX_PEN_BYTES {
        warn!(limit = MAX_PEN_BYTES, "Pen token expands past the size limit");
        return None;
    }

    serde_json::from_slice(&json)
        .map_err(|e| debug!(error = %e, "Pen token is not a pen"))
        .ok()
}

/// Build a share URL: `base` with the pen token as its fragment.
///
/// # Errors
///
/// Returns an error if the pen cannot be encoded.
pub fn share_url(base: &Url, pen: &Pen) -> Result<Url, PenCodecError> {
    let mut url = base.clone();
    url.set_fragment(Some(&encode(pen)?));
    Ok(url)
}

/// Extract the pen from a URL fragment, if one is present and valid.
pub fn from_url(url: &Url) -> Option<Pen> {
    url.fragment().and_then(decode)
}

/// Read the stored pen, if one is present and valid.
pub fn load_stored(storage: &dyn Storage) -> Option<Pen> {
    match storage.get(PEN_KEY) {
        Ok(token) => token.as_deref().and_then(decode),
        Err(e) => {
            warn!(error = %e, "Failed to read stored pen");
            None
        }
    }
}

/// Store `pen` as a token.
///
/// # Errors
///
/// Returns an error if the pen cannot be encoded or written.
pub fn store(storage: &dyn Storage, pen: &Pen) -> Result<(), PlaygroundError> {
    storage.set(PEN_KEY, &encode(pen)?)?;
    Ok(())
}
