//! Pens and bundle hostnames.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest slug kept from a pen name, leaving room for version and epoch
/// inside a 63-byte DNS label.
const MAX_SLUG_LEN: usize = 40;

/// Slug used when a name has no usable characters.
const FALLBACK_SLUG: &str = "pen";

/// The shareable unit of a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pen {
    /// Display name of the program.
    pub name: String,
    /// Program source text.
    pub source: String,
}

impl Pen {
    /// Create a new pen.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// Unique per-build identity of a bundle.
///
/// Formatted as `{slug}-{version}-{epoch}`, where `epoch` identifies the
/// controller instance, so two builds never share a hostname even across
/// playground instances running side by side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hostname(String);

impl Hostname {
    /// Derive a hostname from a pen name, build version and session epoch.
    pub fn derive(name: &str, version: u64, epoch: &str) -> Self {
        Self(format!("{}-{version}-{epoch}", slugify(name)))
    }

    /// Get the hostname as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The slug part derived from the pen name.
    pub fn slug(&self) -> &str {
        // The slug may itself contain dashes; version and epoch never do.
        let mut parts = self.0.rsplitn(3, '-');
        let _epoch = parts.next();
        let _version = parts.next();
        parts.next().unwrap_or(&self.0)
    }

    /// The build version encoded in the hostname.
    pub fn version(&self) -> Option<u64> {
        self.0.rsplitn(3, '-').nth(1)?.parse().ok()
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Hostname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reduce a pen name to a DNS-label-safe slug.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len().min(MAX_SLUG_LEN));
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }

        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_reflects_name_and_version() {
        let hostname = Hostname::derive("Foo", 3, "a1b2c3d4");
        assert_eq!(hostname.as_str(), "foo-3-a1b2c3d4");
        assert_eq!(hostname.slug(), "foo");
        assert_eq!(hostname.version(), Some(3));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  --My   Pen--  "), "my-pen");
        assert_eq!(slugify("日本語"), "pen");
        assert_eq!(slugify(""), "pen");
        assert_eq!(slugify(&"x".repeat(100)).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn test_multi_dash_slug_round_trip() {
        let hostname = Hostname::derive("my cool pen", 12, "ff00ff00");
        assert_eq!(hostname.slug(), "my-cool-pen");
        assert_eq!(hostname.version(), Some(12));
    }

    #[test]
    fn test_distinct_versions_distinct_hostnames() {
        let a = Hostname::derive("Foo", 1, "epoch");
        let b = Hostname::derive("Foo", 2, "epoch");
        let c = Hostname::derive("Foo", 1, "other");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
