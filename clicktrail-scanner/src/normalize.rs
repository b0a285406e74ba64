use sha2::{Digest, Sha256};
use url::{Origin, Url};

/// Resolve `raw_href` against `base_url` and return the canonical, fragment-free
/// URL when it stays on `origin`.
///
/// Returns `None` for anything that is not a discoverable page: empty hrefs,
/// fragment-only hrefs, `mailto:`/`tel:`/`javascript:` links, non-http(s)
/// schemes and off-origin URLs.
pub fn normalize(raw_href: &str, base_url: &Url, origin: &Origin) -> Option<String> {
    let href = raw_href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("javascript:")
    {
        return None;
    }

    let mut resolved = base_url.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    if &resolved.origin() != origin {
        return None;
    }

    resolved.set_fragment(None);
    Some(resolved.to_string())
}

/// String convenience wrapper over [`normalize`].
pub fn normalize_str(raw_href: &str, base_url: &str, origin_url: &str) -> Option<String> {
    let base = Url::parse(base_url).ok()?;
    let origin = Url::parse(origin_url).ok()?.origin();
    normalize(raw_href, &base, &origin)
}

/// Scheme, host and port are identical.
pub fn is_same_origin(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => false,
    }
}

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Filesystem-safe slug for a page URL, used to name screenshots: a readable
/// path part followed by a short hash of the full URL.
pub fn page_slug(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| match u.query() {
            Some(q) => format!("{}-{}", u.path(), q),
            None => u.path().to_string(),
        })
        .unwrap_or_else(|_| url.to_string());

    let slug: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let readable: String = if slug.is_empty() {
        "home".to_string()
    } else {
        slug.chars().take(80).collect()
    };

    // Distinct URLs can share a readable part, the digest keeps files apart
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    format!("{}-{}", readable, &digest[..8])
}
