//! URL normalization and data URI decoding

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use mime::Mime;
use reqwest::Url;

use super::error::{DownloadError, Result};

pub fn is_data_uri(reference: &str) -> bool {
    reference.starts_with("data:")
}

/// Resolves `reference` against `base` into the absolute cache key form.
///
/// The fragment is dropped; scheme and host are lower-cased by the URL parser.
pub fn normalize(base: &Url, reference: &str) -> Result<Url> {
    let mut url = base
        .join(reference.trim())
        .map_err(|e| DownloadError::InvalidUrl(format!("{reference}: {e}")))?;
    url.set_fragment(None);
    Ok(url)
}

/// Resolves a reference found inside `base_ref` (e.g. a texture path inside a
/// material file) relative to it.
///
/// Absolute URLs, data URIs and root-relative paths are returned as-is.
pub fn resolve_relative(base_ref: &str, reference: &str) -> String {
    if is_data_uri(reference) || reference.starts_with('/') || Url::parse(reference).is_ok() {
        return reference.to_string();
    }

    if let Ok(base) = Url::parse(base_ref) {
        if let Ok(joined) = base.join(reference) {
            return joined.to_string();
        }
    }

    let dir = match base_ref.rfind('/') {
        Some(pos) => &base_ref[..=pos],
        None => "",
    };

    let mut segments: Vec<&str> = dir.split('/').collect();
    // drop the empty tail after the trailing slash
    segments.pop();
    for part in reference.split('/') {
        match part {
            "." => {}
            ".." => {
                if matches!(segments.last(), Some(s) if !s.is_empty() && *s != "..") {
                    segments.pop();
                } else if !dir.starts_with('/') {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Decodes `data:[<mime>][;base64],<payload>`.
pub fn decode_data_uri(uri: &str) -> Result<(Mime, Bytes)> {
    let invalid = |reason: &str| DownloadError::Decode {
        url: truncate(uri),
        reason: reason.to_string(),
    };

    let rest = uri.strip_prefix("data:").ok_or_else(|| invalid("missing data: prefix"))?;
    let (header, payload) = rest.split_once(',').ok_or_else(|| invalid("missing ','"))?;

    let (media, is_base64) = match header.strip_suffix(";base64") {
        Some(media) => (media, true),
        None => (header, false),
    };

    let mime = if media.is_empty() {
        mime::TEXT_PLAIN_UTF_8
    } else {
        media.parse::<Mime>().map_err(|_| invalid("invalid media type"))?
    };

    let body = if is_base64 {
        STANDARD
            .decode(payload)
            .map_err(|e| invalid(&e.to_string()))?
    } else {
        percent_decode(payload).ok_or_else(|| invalid("invalid percent-encoding"))?
    };

    Ok((mime, Bytes::from(body)))
}

fn percent_decode(input: &str) -> Option<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Some(out)
}

fn truncate(uri: &str) -> String {
    uri.chars().take(48).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://origin/app/").unwrap()
    }

    #[test]
    fn test_normalize_relative_and_absolute_collide() {
        let a = normalize(&base(), "a.png").unwrap();
        let b = normalize(&base(), "http://origin/app/a.png").unwrap();
        let c = normalize(&base(), "./a.png#frag").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.as_str(), "http://origin/app/a.png");
    }

    #[test]
    fn test_normalize_root_relative() {
        let url = normalize(&base(), "/assets/b.json").unwrap();
        assert_eq!(url.as_str(), "http://origin/assets/b.json");
    }

    #[test]
    fn test_resolve_relative_to_url() {
        assert_eq!(
            resolve_relative("http://host/models/cube.mtl", "../textures/a.png"),
            "http://host/textures/a.png"
        );
    }

    #[test]
    fn test_resolve_relative_to_path() {
        assert_eq!(resolve_relative("/models/cube.mtl", "a.png"), "/models/a.png");
        assert_eq!(resolve_relative("/models/cube.mtl", "../tex/a.png"), "/tex/a.png");
        assert_eq!(resolve_relative("models/cube.mtl", "./a.png"), "models/a.png");
        assert_eq!(resolve_relative("cube.mtl", "a.png"), "a.png");
        assert_eq!(resolve_relative("cube.mtl", "/abs.png"), "/abs.png");
    }

    #[test]
    fn test_decode_base64_data_uri() {
        let (mime, body) = decode_data_uri("data:application/json;base64,eyJhIjoxfQ==").unwrap();
        assert_eq!(mime.essence_str(), "application/json");
        assert_eq!(&body[..], br#"{"a":1}"#);
    }

    #[test]
    fn test_decode_plain_data_uri() {
        let (mime, body) = decode_data_uri("data:,hello%20world").unwrap();
        assert_eq!(mime.type_(), mime::TEXT);
        assert_eq!(&body[..], b"hello world");
    }

    #[test]
    fn test_decode_invalid_data_uri() {
        assert!(decode_data_uri("data:text/plain").is_err());
        assert!(decode_data_uri("data:text/plain;base64,@@@").is_err());
        assert!(decode_data_uri("data:,%zz").is_err());
        assert!(decode_data_uri("data:,%+1").is_err());
        assert!(decode_data_uri("data:,%-1").is_err());
        assert!(decode_data_uri("data:,%4").is_err());
    }
}
