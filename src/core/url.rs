//! URL path type and site URL helpers.
//!
//! - Internal representation: always decoded, always relative to the site root
//! - Request boundary: decode on input, add host/subdirectory on output

use std::borrow::Borrow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Decoded, site-relative URL path
///
/// Invariants:
/// - Always decoded (no percent-encoding)
/// - Always starts with `/`
/// - Always ends with `/` (every resource URL is a page URL)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UrlPath(Arc<str>);

impl UrlPath {
    /// Create from a request path (decode percent-encoding, strip query string).
    pub fn from_browser(encoded: &str) -> Self {
        use percent_encoding::percent_decode_str;
        let path = encoded.split(['?', '#']).next().unwrap_or(encoded);
        let decoded = percent_decode_str(path)
            .decode_utf8()
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| path.to_string());
        Self::from_page(&decoded)
    }

    /// Create page URL (with trailing slash). Normalizes leading/trailing slashes
    /// and collapses repeated slashes.
    pub fn from_page(decoded: &str) -> Self {
        let trimmed = decoded.trim();
        let path = trimmed.split(['?', '#']).next().unwrap_or(trimmed);

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Self(Arc::from("/"));
        }

        Self(Arc::from(format!("/{}/", segments.join("/"))))
    }

    /// Get the decoded URL path as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode for browser (percent-encode non-ASCII and special characters).
    pub fn to_encoded(&self) -> String {
        use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
        self.0
            .split('/')
            .map(|segment| utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Path segments without the surrounding slashes.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Check if path starts with the given prefix.
    #[inline]
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    /// Check if this is the site root.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.as_ref() == "/"
    }
}

impl std::fmt::Display for UrlPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for UrlPath {
    fn default() -> Self {
        Self::from_page("/")
    }
}

impl AsRef<str> for UrlPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for UrlPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for UrlPath {
    fn from(s: String) -> Self {
        Self::from_page(&s)
    }
}

impl From<&str> for UrlPath {
    fn from(s: &str) -> Self {
        Self::from_page(s)
    }
}

impl PartialEq<str> for UrlPath {
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for UrlPath {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl Serialize for UrlPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UrlPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_page(&s))
    }
}

// ============================================================================
// Site URL helpers
// ============================================================================

/// Join URL parts with single slashes, preserving a `scheme://` prefix.
///
/// ```ignore
/// url_join(&["/blog/", "/page/", ":page/"]) -> "/blog/page/:page/"
/// url_join(&["https://example.com/", "/404/"]) -> "https://example.com/404/"
/// ```
pub fn url_join(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/");

    let (scheme, rest) = match joined.find("://") {
        Some(idx) => joined.split_at(idx + 3),
        None => ("", joined.as_str()),
    };

    let mut out = String::with_capacity(joined.len());
    out.push_str(scheme);
    let mut prev_slash = false;
    for c in rest.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}

/// Site URL context: origin and subdirectory.
///
/// Relative URLs stored in the url table never contain the subdirectory;
/// it is added only when a caller asks for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlUtils {
    /// Origin without trailing slash (e.g., `https://example.com`)
    origin: String,
    /// Subdirectory without trailing slash (e.g., `/blog`), empty at root
    subdir: String,
}

impl UrlUtils {
    /// Parse a site URL like `https://example.com/blog/`.
    pub fn new(site_url: &str) -> Result<Self, url::ParseError> {
        let parsed = url::Url::parse(site_url)?;
        let origin = parsed.origin().ascii_serialization();
        let path = parsed.path().trim_matches('/');
        let subdir = if path.is_empty() {
            String::new()
        } else {
            format!("/{path}")
        };
        Ok(Self { origin, subdir })
    }

    /// Site origin (scheme, host, port).
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Subdirectory the site is mounted at, empty at root.
    pub fn subdir(&self) -> &str {
        &self.subdir
    }

    /// Absolute site URL with trailing slash.
    pub fn site_url(&self) -> String {
        format!("{}{}/", self.origin, self.subdir)
    }

    /// Turn a site-relative path into a servable URL.
    ///
    /// `absolute` adds origin and subdirectory, otherwise only the
    /// subdirectory is prepended.
    pub fn create_url(&self, path: &str, absolute: bool) -> String {
        if absolute {
            url_join(&[&self.origin, &self.subdir, path])
        } else {
            url_join(&["/", &self.subdir, path])
        }
    }
}

impl Default for UrlUtils {
    fn default() -> Self {
        Self {
            origin: "http://localhost:2368".to_string(),
            subdir: String::new(),
        }
    }
}
