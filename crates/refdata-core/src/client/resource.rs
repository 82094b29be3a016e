//! Resource descriptors and per-call types.

use crate::cancel::CancellationToken;
use crate::config::SearchDefaults;
use crate::network::{ConcurrencyToken, RetryConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identity of one reference resource: a configuration value, not a type.
///
/// # Example
///
/// ```
/// use refdata_core::ResourceDescriptor;
/// use std::time::Duration;
///
/// let produtores = ResourceDescriptor::new("Produtor", "/produtores")
///     .with_cache_ttl(Duration::from_secs(60));
/// assert_eq!(produtores.item_path("5"), "/produtores/5");
/// assert_eq!(produtores.cache_namespace(), "produtores");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Entity name used in logs and errors.
    pub name: String,
    /// Collection path below the transport's base URL.
    pub base_path: String,
    /// TTL for this resource's cache entries; falls back to the cache default.
    pub cache_ttl: Option<Duration>,
}

impl ResourceDescriptor {
    pub fn new(name: impl Into<String>, base_path: impl Into<String>) -> Self {
        let base_path = base_path.into();
        let base_path = format!("/{}", base_path.trim_matches('/'));
        Self {
            name: name.into(),
            base_path,
            cache_ttl: None,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Prefix of every cache key for this resource.
    pub fn cache_namespace(&self) -> &str {
        self.base_path.trim_start_matches('/')
    }

    pub fn collection_path(&self) -> String {
        self.base_path.clone()
    }

    pub fn active_path(&self) -> String {
        format!("{}/ativos", self.base_path)
    }

    pub fn search_path(&self) -> String {
        format!("{}/buscar", self.base_path)
    }

    pub fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.base_path, urlencoding::encode(id))
    }

    pub fn activate_path(&self, id: &str) -> String {
        format!("{}/ativar", self.item_path(id))
    }

    pub fn deactivate_path(&self, id: &str) -> String {
        format!("{}/desativar", self.item_path(id))
    }
}

/// Kind of logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Read,
    Create,
    Update,
    Delete,
    Search,
}

impl OperationKind {
    /// Reads may be retried; writes never are.
    pub fn is_read(&self) -> bool {
        matches!(self, OperationKind::Read | OperationKind::Search)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Read => "read",
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Search => "search",
        };
        f.write_str(name)
    }
}

/// Per-call context, used for logging and error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    pub entity_name: String,
    pub operation: OperationKind,
    /// 0-indexed attempt number.
    pub attempt: u32,
}

impl OperationContext {
    pub fn new(entity_name: impl Into<String>, operation: OperationKind) -> Self {
        Self {
            entity_name: entity_name.into(),
            operation,
            attempt: 0,
        }
    }

    pub fn at_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }
}

impl fmt::Display for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (attempt {})",
            self.operation,
            self.entity_name,
            self.attempt + 1
        )
    }
}

/// Options for a single call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Token scoped to this logical operation.
    pub cancel: Option<CancellationToken>,
    /// Overrides the client's read retry config. Ignored by writes.
    pub retry: Option<RetryConfig>,
    /// Skip the cache probe and rewrite the entry.
    pub refresh: bool,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn refresh(mut self) -> Self {
        self.refresh = true;
        self
    }
}

/// Search criteria for `GET {base}/buscar`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub term: Option<String>,
    pub active: Option<bool>,
    /// Zero-based page index.
    pub page: u32,
    pub page_size: u32,
    pub sort: Option<String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            term: None,
            active: None,
            page: 0,
            page_size: SearchDefaults::PAGE_SIZE,
            sort: None,
        }
    }
}

impl SearchQuery {
    pub fn term(term: impl Into<String>) -> Self {
        Self {
            term: Some(term.into()),
            ..Self::default()
        }
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Wire parameters. Blank terms and sorts are omitted.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(5);
        if let Some(term) = self.term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            params.push(("termo".to_string(), term.to_string()));
        }
        if let Some(active) = self.active {
            params.push(("ativo".to_string(), active.to_string()));
        }
        params.push(("pagina".to_string(), self.page.to_string()));
        params.push(("tamanhoPagina".to_string(), self.page_size.to_string()));
        if let Some(sort) = self.sort.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            params.push(("ordenacao".to_string(), sort.to_string()));
        }
        params
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// An entity together with the version token the server sent for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Option<ConcurrencyToken>,
}
