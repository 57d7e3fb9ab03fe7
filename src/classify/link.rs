//! URL resolution, scheme exclusion and filename derivation.

use url::Url;

/// Schemes that never produce a resource: no stable, downloadable identity.
const EXCLUDED_SCHEMES: &[&str] = &["data:", "blob:", "javascript:", "about:"];

/// Returns true when `raw` uses a scheme excluded at the detector boundary.
#[must_use]
pub fn is_excluded_scheme(raw: &str) -> bool {
    let trimmed = raw.trim_start();
    EXCLUDED_SCHEMES.iter().any(|scheme| {
        trimmed
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Resolves a raw attribute or CSS value against `base`.
///
/// Returns `None` for empty values, fragment-only references, excluded
/// schemes, unparseable references and anything that does not end up as
/// `http`/`https`.
#[must_use]
pub fn resolve_url(raw: &str, base: &Url) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || is_excluded_scheme(trimmed) {
        return None;
    }

    let resolved = base.join(trimmed).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

/// Derives a filename from the last path segment of `url`.
///
/// The query string is dropped and percent-encoding decoded. Falls back to
/// the host name, then to `"download"`.
#[must_use]
pub fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if let Some(name) = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
        {
            return decode_segment(name);
        }
        if let Some(host) = parsed.host_str() {
            return host.to_string();
        }
        return "download".to_string();
    }

    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map_or_else(|| "download".to_string(), decode_segment)
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment).map_or_else(|_| segment.to_string(), |decoded| decoded.into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/gallery/page.html").unwrap()
    }

    #[test]
    fn test_is_excluded_scheme() {
        assert!(is_excluded_scheme("data:image/png;base64,AAAA"));
        assert!(is_excluded_scheme("  DATA:image/png;base64,AAAA"));
        assert!(is_excluded_scheme("blob:https://example.com/uuid"));
        assert!(is_excluded_scheme("javascript:void(0)"));
        assert!(!is_excluded_scheme("https://example.com/a.png"));
        assert!(!is_excluded_scheme("database.png"));
    }

    #[test]
    fn test_resolve_url_relative_against_base() {
        let resolved = resolve_url("img/a.png", &base()).unwrap();
        assert_eq!(resolved.as_str(), "https://example.com/gallery/img/a.png");

        let rooted = resolve_url("/static/b.jpg", &base()).unwrap();
        assert_eq!(rooted.as_str(), "https://example.com/static/b.jpg");

        let protocol_relative = resolve_url("//cdn.example.net/c.gif", &base()).unwrap();
        assert_eq!(protocol_relative.as_str(), "https://cdn.example.net/c.gif");
    }

    #[test]
    fn test_resolve_url_rejects_excluded_and_junk() {
        assert!(resolve_url("data:image/gif;base64,R0lGOD", &base()).is_none());
        assert!(resolve_url("blob:https://example.com/1234", &base()).is_none());
        assert!(resolve_url("", &base()).is_none());
        assert!(resolve_url("#anchor", &base()).is_none());
        assert!(resolve_url("mailto:someone@example.com", &base()).is_none());
    }

    #[test]
    fn test_filename_from_url_decodes_and_strips_query() {
        assert_eq!(
            filename_from_url("https://example.com/a/b/summer%20trip.jpg?w=100"),
            "summer trip.jpg"
        );
        assert_eq!(filename_from_url("https://example.com/"), "example.com");
        assert_eq!(filename_from_url("not a url/clip.mp4?x=1"), "clip.mp4");
    }
}
