//! Deterministic cache keys.
//!
//! A key is the resource family followed by the view it caches:
//!
//! - `produtores:all`
//! - `produtores:active`
//! - `produtores:item-5`
//! - `produtores:search?ativo=true&termo=milho`
//!
//! Query parameters are percent-encoded and sorted, so two logically identical
//! requests always produce the same key regardless of parameter order.

use std::fmt;

/// Cache key for one view of a resource family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for the full list.
    pub fn all(resource: &str) -> Self {
        Self(format!("{}:all", resource))
    }

    /// Key for the active-only list.
    pub fn active(resource: &str) -> Self {
        Self(format!("{}:active", resource))
    }

    /// Key for a single item.
    pub fn item(resource: &str, id: &str) -> Self {
        Self(format!("{}:item-{}", resource, id))
    }

    /// Key for a search result page.
    pub fn search<I, K, V>(resource: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let query = canonical_query(params);
        if query.is_empty() {
            Self(Self::search_prefix(resource))
        } else {
            Self(format!("{}?{}", Self::search_prefix(resource), query))
        }
    }

    /// Prefix shared by every search key of a resource family.
    pub fn search_prefix(resource: &str) -> String {
        format!("{}:search", resource)
    }

    /// Prefix shared by every key of a resource family.
    pub fn family_prefix(resource: &str) -> String {
        format!("{}:", resource)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Serialize parameters in a stable order: sorted by name, then by value.
pub fn canonical_query<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(String, String)> = params
        .into_iter()
        .map(|(k, v)| {
            (
                urlencoding::encode(k.as_ref()).into_owned(),
                urlencoding::encode(v.as_ref()).into_owned(),
            )
        })
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}
