//! Reference client: cached, retried reads and guarded writes.
//!
//! Reads (`get_all`, `get_active`, `get_by_id`, `search`) probe the cache,
//! fall back to the transport under the read retry policy and store the
//! result with a fresh TTL. Writes (`create`, `update`, `delete`, `activate`,
//! `deactivate`) go straight to the transport exactly once and, on success,
//! invalidate every cached view of the resource family.

mod resource;
pub mod search;

pub use resource::{
    CallOptions, OperationContext, OperationKind, ResourceDescriptor, SearchPage, SearchQuery,
    Versioned,
};

use crate::cache::{
    CacheConfig, CacheInvalidator, CacheKey, CacheStats, CacheStore, InvalidationPattern,
};
use crate::cancel::CancellationToken;
use crate::error::{RefDataError, Result};
use crate::network::{
    retry_async, ConcurrencyGuard, ConcurrencyToken, ErrorClassification, RetryConfig, RetryError,
    Transport, TransportFailure, TransportRequest, TransportResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Construction options for a [`ReferenceClient`].
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub cache: CacheConfig,
    /// Retry policy for reads. Writes always run with [`RetryConfig::no_retry`].
    pub read_retry: RetryConfig,
}

/// What the cache holds for one key.
#[derive(Debug, Clone)]
enum Cached<T> {
    List(Vec<T>),
    Item(T),
    Page(SearchPage<T>),
}

struct ClientInner<T> {
    descriptor: ResourceDescriptor,
    transport: Arc<dyn Transport>,
    cache: CacheStore<Cached<T>>,
    invalidator: CacheInvalidator,
    read_retry: RetryConfig,
    /// Cancelled on shutdown; every in-flight call watches it.
    lifetime: CancellationToken,
    /// Bumped by every write that may have reached the backend. A read only
    /// stores its result if no write happened while it was in flight. The
    /// lock spans the compare-and-store and the bump-and-invalidate.
    generation: Mutex<u64>,
}

/// Why a transport call did not produce a success response.
enum CallFailure {
    Failed {
        failure: TransportFailure,
        classification: ErrorClassification,
        attempts: u32,
    },
    Cancelled,
    Shutdown,
}

impl CallFailure {
    fn into_error(self, ctx: &OperationContext) -> RefDataError {
        match self {
            CallFailure::Failed {
                failure,
                classification,
                attempts,
            } => RefDataError::Request {
                entity: ctx.entity_name.clone(),
                operation: ctx.operation,
                classification,
                status: failure.status(),
                message: failure.message().to_string(),
                attempts,
            },
            CallFailure::Cancelled => RefDataError::Cancelled {
                entity: ctx.entity_name.clone(),
                operation: ctx.operation,
            },
            CallFailure::Shutdown => RefDataError::ClientShutdown {
                entity: ctx.entity_name.clone(),
            },
        }
    }
}

/// Generic client for one reference resource.
///
/// `T` is the entity read back from the backend, `C` the create payload and
/// `U` the update payload. The client is a cheap handle: clones share the
/// cache, the transport and the shutdown signal.
///
/// # Example
///
/// ```rust,ignore
/// use refdata_core::{CallOptions, HttpTransport, ReferenceClient, ResourceDescriptor};
/// use std::sync::Arc;
///
/// let transport = Arc::new(HttpTransport::new("https://api.agro.example")?);
/// let produtores: ReferenceClient<Produtor, NovoProdutor> = ReferenceClient::new(
///     ResourceDescriptor::new("Produtor", "/produtores"),
///     transport,
///     Default::default(),
/// );
///
/// let ativos = produtores.get_active(&CallOptions::default()).await?;
/// produtores.shutdown();
/// ```
pub struct ReferenceClient<T, C = T, U = C> {
    inner: Arc<ClientInner<T>>,
    _payloads: PhantomData<fn(&C, &U)>,
}

impl<T, C, U> Clone for ReferenceClient<T, C, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _payloads: PhantomData,
        }
    }
}

impl<T, C, U> ReferenceClient<T, C, U>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    C: Serialize,
    U: Serialize,
{
    /// Create a client. Call [`shutdown`](Self::shutdown) to release it.
    pub fn new(
        descriptor: ResourceDescriptor,
        transport: Arc<dyn Transport>,
        options: ClientOptions,
    ) -> Self {
        let invalidator = CacheInvalidator::new(descriptor.cache_namespace());
        Self {
            inner: Arc::new(ClientInner {
                descriptor,
                transport,
                cache: CacheStore::new(options.cache),
                invalidator,
                read_retry: options.read_retry,
                lifetime: CancellationToken::new(),
                generation: Mutex::new(0),
            }),
            _payloads: PhantomData,
        }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.inner.descriptor
    }

    /// Fetch the full list (`GET {base}`).
    #[doc(alias = "obterTodos")]
    pub async fn get_all(&self, opts: &CallOptions) -> Result<Vec<T>> {
        let d = &self.inner.descriptor;
        self.read(
            OperationKind::Read,
            CacheKey::all(d.cache_namespace()),
            TransportRequest::get(d.collection_path()),
            opts,
            Cached::List,
            |cached| match cached {
                Cached::List(items) => Some(items),
                _ => None,
            },
        )
        .await
    }

    /// Fetch the active-only list (`GET {base}/ativos`).
    #[doc(alias = "obterAtivos")]
    pub async fn get_active(&self, opts: &CallOptions) -> Result<Vec<T>> {
        let d = &self.inner.descriptor;
        self.read(
            OperationKind::Read,
            CacheKey::active(d.cache_namespace()),
            TransportRequest::get(d.active_path()),
            opts,
            Cached::List,
            |cached| match cached {
                Cached::List(items) => Some(items),
                _ => None,
            },
        )
        .await
    }

    /// Fetch one item (`GET {base}/{id}`).
    #[doc(alias = "obterPorId")]
    pub async fn get_by_id(&self, id: impl Display, opts: &CallOptions) -> Result<T> {
        let id = id.to_string();
        let d = &self.inner.descriptor;
        self.read(
            OperationKind::Read,
            CacheKey::item(d.cache_namespace(), &id),
            TransportRequest::get(d.item_path(&id)),
            opts,
            Cached::Item,
            |cached| match cached {
                Cached::Item(item) => Some(item),
                _ => None,
            },
        )
        .await
    }

    /// Fetch one item together with its version token.
    ///
    /// Always goes to the transport, since the cache does not keep versions.
    /// The fresh value still replaces the cached item.
    pub async fn get_by_id_versioned(&self, id: impl Display, opts: &CallOptions) -> Result<Versioned<T>> {
        self.ensure_running()?;
        let id = id.to_string();
        let d = &self.inner.descriptor;
        let ctx = self.context(OperationKind::Read);
        let retry = opts.retry.as_ref().unwrap_or(&self.inner.read_retry);
        let generation = self.generation();

        let response = self
            .execute(&ctx, TransportRequest::get(d.item_path(&id)), retry, opts)
            .await
            .map_err(|f| f.into_error(&ctx))?;
        let value: T = self.decode(&response)?;
        let version = ConcurrencyToken::from_response(&response);

        self.store_if_current(
            generation,
            CacheKey::item(d.cache_namespace(), &id),
            Cached::Item(value.clone()),
        );
        Ok(Versioned { value, version })
    }

    /// Search (`GET {base}/buscar?termo&ativo&pagina&tamanhoPagina&ordenacao`).
    #[doc(alias = "buscar")]
    pub async fn search(&self, query: &SearchQuery, opts: &CallOptions) -> Result<SearchPage<T>> {
        let d = &self.inner.descriptor;
        let params = query.to_params();
        let key = CacheKey::search(d.cache_namespace(), params.iter().map(|(k, v)| (k, v)));
        self.read(
            OperationKind::Search,
            key,
            TransportRequest::get(d.search_path()).with_query(params),
            opts,
            Cached::Page,
            |cached| match cached {
                Cached::Page(page) => Some(page),
                _ => None,
            },
        )
        .await
    }

    /// Create an item (`POST {base}`) and return the server's representation.
    #[doc(alias = "criar")]
    pub async fn create(&self, payload: &C, opts: &CallOptions) -> Result<T> {
        let body = serde_json::to_value(payload)?;
        let request = TransportRequest::post(self.inner.descriptor.collection_path(), body.clone());
        let response = self
            .write(OperationKind::Create, request, None, body, None, opts)
            .await?;
        self.decode(&response)
    }

    /// Update an item (`PUT {base}/{id}`).
    ///
    /// With a `version`, the write is conditional: a mismatch surfaces as
    /// [`RefDataError::VersionConflict`] and is never retried.
    #[doc(alias = "atualizar")]
    pub async fn update(
        &self,
        id: impl Display,
        payload: &U,
        version: Option<&ConcurrencyToken>,
        opts: &CallOptions,
    ) -> Result<T> {
        let id = id.to_string();
        let body = serde_json::to_value(payload)?;
        let request = TransportRequest::put(self.inner.descriptor.item_path(&id), body.clone());
        let response = self
            .write(OperationKind::Update, request, Some(id), body, version, opts)
            .await?;
        self.decode(&response)
    }

    /// Delete an item (`DELETE {base}/{id}`).
    #[doc(alias = "remover")]
    pub async fn delete(&self, id: impl Display, opts: &CallOptions) -> Result<()> {
        let id = id.to_string();
        let request = TransportRequest::delete(self.inner.descriptor.item_path(&id));
        self.write(OperationKind::Delete, request, Some(id), serde_json::Value::Null, None, opts)
            .await
            .map(|_| ())
    }

    /// Mark an item active (`PATCH {base}/{id}/ativar`).
    #[doc(alias = "ativar")]
    pub async fn activate(&self, id: impl Display, opts: &CallOptions) -> Result<()> {
        let id = id.to_string();
        let request = TransportRequest::patch(self.inner.descriptor.activate_path(&id));
        self.write(OperationKind::Update, request, Some(id), serde_json::Value::Null, None, opts)
            .await
            .map(|_| ())
    }

    /// Mark an item inactive (`PATCH {base}/{id}/desativar`).
    #[doc(alias = "desativar")]
    pub async fn deactivate(&self, id: impl Display, opts: &CallOptions) -> Result<()> {
        let id = id.to_string();
        let request = TransportRequest::patch(self.inner.descriptor.deactivate_path(&id));
        self.write(OperationKind::Update, request, Some(id), serde_json::Value::Null, None, opts)
            .await
            .map(|_| ())
    }

    /// Drop every cached view of this resource.
    pub fn invalidate_cache(&self) -> usize {
        self.inner.invalidator.invalidate_family(&self.inner.cache)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Cancel in-flight calls, clear the cache and refuse further calls.
    pub fn shutdown(&self) {
        if self.inner.lifetime.is_cancelled() {
            return;
        }
        self.inner.lifetime.cancel();
        self.inner.cache.clear();
        info!("Reference client for {} shut down", self.inner.descriptor.name);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lifetime.is_cancelled()
    }

    // Internal methods

    async fn read<R>(
        &self,
        operation: OperationKind,
        key: CacheKey,
        request: TransportRequest,
        opts: &CallOptions,
        wrap: fn(R) -> Cached<T>,
        unwrap: fn(Cached<T>) -> Option<R>,
    ) -> Result<R>
    where
        R: DeserializeOwned + Clone,
    {
        self.ensure_running()?;

        if opts.refresh {
            debug!("Cache refresh requested for {}", key);
        } else if let Some(hit) = self.inner.cache.get(key.as_str()).and_then(unwrap) {
            debug!("Cache hit for {}", key);
            return Ok(hit);
        } else {
            debug!("Cache miss for {}", key);
        }

        let ctx = self.context(operation);
        let retry = opts.retry.as_ref().unwrap_or(&self.inner.read_retry);
        let generation = self.generation();
        let response = self
            .execute(&ctx, request, retry, opts)
            .await
            .map_err(|f| f.into_error(&ctx))?;

        let value: R = self.decode(&response)?;
        self.store_if_current(generation, key, wrap(value.clone()));
        Ok(value)
    }

    async fn write(
        &self,
        operation: OperationKind,
        request: TransportRequest,
        id: Option<String>,
        submitted: serde_json::Value,
        version: Option<&ConcurrencyToken>,
        opts: &CallOptions,
    ) -> Result<TransportResponse> {
        self.ensure_running()?;

        let ctx = self.context(operation);
        let guard = ConcurrencyGuard::new(version);
        let request = guard.attach(request);

        match self.execute(&ctx, request, &RetryConfig::no_retry(), opts).await {
            Ok(response) => {
                self.mark_written(id.as_deref());
                info!("{} {} succeeded", ctx.operation, self.describe(id.as_deref()));
                Ok(response)
            }
            Err(CallFailure::Failed {
                failure,
                classification,
                attempts,
            }) => {
                if let Some(conflict) = guard.interpret_failure(&failure, &submitted) {
                    warn!(
                        "Version conflict on {} (submitted {:?}, current {:?})",
                        self.describe(id.as_deref()),
                        conflict.submitted_version,
                        conflict.current_version
                    );
                    // The cached copy is known to be stale now.
                    if let Some(id) = id.as_deref() {
                        self.inner.cache.invalidate(&InvalidationPattern::Exact(
                            CacheKey::item(self.inner.descriptor.cache_namespace(), id).into(),
                        ));
                    }
                    return Err(RefDataError::VersionConflict {
                        entity: ctx.entity_name.clone(),
                        id: id.unwrap_or_default(),
                        submitted_version: conflict.submitted_version,
                        current_version: conflict.current_version,
                        submitted: conflict.submitted,
                        message: conflict.message,
                    });
                }
                Err(CallFailure::Failed {
                    failure,
                    classification,
                    attempts,
                }
                .into_error(&ctx))
            }
            Err(other) => {
                // The request may have been applied before we stopped waiting.
                self.mark_written(id.as_deref());
                Err(other.into_error(&ctx))
            }
        }
    }

    fn generation(&self) -> u64 {
        *self.lock_generation()
    }

    fn lock_generation(&self) -> std::sync::MutexGuard<'_, u64> {
        self.inner
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a write and drop every cached view it may have staled.
    fn mark_written(&self, id: Option<&str>) {
        let mut generation = self.lock_generation();
        *generation = generation.wrapping_add(1);
        self.inner.invalidator.after_write(&self.inner.cache, id);
    }

    /// Cache a read result unless a write landed while it was in flight.
    fn store_if_current(&self, generation: u64, key: CacheKey, value: Cached<T>) {
        let current = self.lock_generation();
        if *current != generation {
            debug!("Not caching {}: a write completed during the read", key);
            return;
        }
        self.inner.cache.set(key, value, self.ttl());
    }

    /// Run one logical call under `retry`, honoring the caller's token and shutdown.
    async fn execute(
        &self,
        ctx: &OperationContext,
        request: TransportRequest,
        retry: &RetryConfig,
        opts: &CallOptions,
    ) -> std::result::Result<TransportResponse, CallFailure> {
        let scope = opts.cancel.clone().unwrap_or_default();
        let transport = &self.inner.transport;
        let request = &request;

        let run = retry_async(
            retry,
            &scope,
            |attempt| {
                let attempt_ctx = ctx.at_attempt(attempt);
                async move {
                    debug!("{}: {} {}", attempt_ctx, request.method, request.path);
                    match transport.send(request.clone()).await {
                        Ok(response) if response.is_success() => Ok(response),
                        Ok(response) => Err(TransportFailure::from_response(response)),
                        Err(failure) => Err(failure),
                    }
                }
            },
            |failure: &TransportFailure| retry.classify(failure),
        );

        let (result, stats) = tokio::select! {
            biased;
            _ = self.inner.lifetime.cancelled() => return Err(CallFailure::Shutdown),
            outcome = run => outcome,
        };

        match result {
            Ok(response) => Ok(response),
            Err(RetryError::Cancelled) => {
                debug!("{} cancelled after {} attempt(s)", ctx, stats.attempts);
                Err(CallFailure::Cancelled)
            }
            Err(RetryError::Exhausted {
                error,
                classification,
            }) => Err(CallFailure::Failed {
                failure: error,
                classification,
                attempts: stats.attempts,
            }),
        }
    }

    fn decode<R: DeserializeOwned>(&self, response: &TransportResponse) -> Result<R> {
        response
            .json()
            .map_err(|e| RefDataError::decode(&self.inner.descriptor.name, e))
    }

    fn ensure_running(&self) -> Result<()> {
        if self.inner.lifetime.is_cancelled() {
            return Err(RefDataError::ClientShutdown {
                entity: self.inner.descriptor.name.clone(),
            });
        }
        Ok(())
    }

    fn context(&self, operation: OperationKind) -> OperationContext {
        OperationContext::new(self.inner.descriptor.name.clone(), operation)
    }

    fn ttl(&self) -> Duration {
        self.inner
            .descriptor
            .cache_ttl
            .unwrap_or(self.inner.cache.config().default_ttl)
    }

    fn describe(&self, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{} {}", self.inner.descriptor.name, id),
            None => self.inner.descriptor.name.clone(),
        }
    }
}
