//! Cache key definitions.
//!
//! A `BaseKey` fingerprints a cacheable unit independently of time. Appending
//! the owning resource's current version turns it into a `VersionedKey`, the
//! string actually written to the backend. Bumping the version changes every
//! versioned key of that resource at once, which is how entries are retired.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::types::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Query,
    Pagination,
    Response,
}

impl KeyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyKind::Query => "query",
            KeyKind::Pagination => "pagination",
            KeyKind::Response => "response",
        }
    }
}

/// Version-independent fingerprint of a cacheable unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseKey {
    kind: KeyKind,
    digest: String,
}

#[derive(Serialize)]
struct QueryFingerprint<'a> {
    resource: &'a str,
    filters: &'a BTreeMap<String, String>,
    ordering: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_size: Option<u64>,
}

#[derive(Serialize)]
struct ResponseFingerprint<'a> {
    path: &'a str,
    method: &'a str,
    query: Vec<(&'a str, &'a str)>,
    view: &'a str,
}

impl BaseKey {
    /// Fingerprint of an unpaginated query result.
    ///
    /// Filters are canonicalised through their sorted map; ordering is kept
    /// as given because it changes the result.
    pub fn query(
        resource: Resource,
        filters: &BTreeMap<String, String>,
        ordering: &[String],
    ) -> Self {
        Self::from_fingerprint(
            KeyKind::Query,
            &QueryFingerprint {
                resource: resource.as_str(),
                filters,
                ordering,
                page: None,
                page_size: None,
            },
        )
    }

    pub fn page(
        resource: Resource,
        filters: &BTreeMap<String, String>,
        ordering: &[String],
        page: u64,
        page_size: u64,
    ) -> Self {
        Self::from_fingerprint(
            KeyKind::Pagination,
            &QueryFingerprint {
                resource: resource.as_str(),
                filters,
                ordering,
                page: Some(page),
                page_size: Some(page_size),
            },
        )
    }

    /// Fingerprint of a full HTTP response.
    ///
    /// `query` is sorted before hashing, so parameter order in the request
    /// line does not matter.
    pub fn response(path: &str, method: &str, query: &[(String, String)], view: &str) -> Self {
        let mut query: Vec<(&str, &str)> = query
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        query.sort_unstable();

        Self::from_fingerprint(
            KeyKind::Response,
            &ResponseFingerprint {
                path,
                method,
                query,
                view,
            },
        )
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    fn from_fingerprint<T: Serialize>(kind: KeyKind, fingerprint: &T) -> Self {
        // Serializing borrowed strings, sorted maps and vectors cannot fail.
        let canonical = serde_json::to_vec(fingerprint).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(&canonical);
        Self {
            kind,
            digest: hex::encode(hasher.finalize()),
        }
    }
}

/// Backend key for a base fingerprint at a specific resource version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionedKey {
    kind: KeyKind,
    version: u64,
    rendered: String,
}

impl VersionedKey {
    pub fn new(prefix: &str, base: &BaseKey, version: u64) -> Self {
        Self {
            kind: base.kind,
            version,
            rendered: format!(
                "{prefix}:{}_{}_v{version}",
                base.kind.as_str(),
                base.digest
            ),
        }
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for VersionedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// Backend key of a resource's version counter.
pub fn version_counter_key(prefix: &str, resource: Resource) -> String {
    format!("{prefix}:version:{}", resource.as_str())
}
