//! Integration tests for the HTTP transport and reference client.
//!
//! Each test starts an in-process axum backend on an ephemeral port that
//! mimics the reference-data REST conventions.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use refdata_core::{
    CallOptions, ClientOptions, ConcurrencyToken, Credential, ErrorKind, HttpTransport,
    RefDataError, ReferenceClient, ResourceDescriptor, RetryConfig, SearchQuery, Transport,
    TransportRequest,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Backend {
    list_hits: AtomicUsize,
    flaky_hits: AtomicUsize,
    version: Mutex<u32>,
    nome: Mutex<String>,
}

type Shared = Arc<Backend>;

fn etag(version: u32) -> String {
    format!("\"v{}\"", version)
}

async fn list(State(backend): State<Shared>) -> Json<Value> {
    backend.list_hits.fetch_add(1, Ordering::SeqCst);
    Json(json!([
        {"id": 1, "nome": "Sítio Boa Vista", "ativo": true},
        {"id": 2, "nome": "Fazenda Esperança", "ativo": false}
    ]))
}

async fn item(State(backend): State<Shared>, Path(id): Path<u32>) -> Response {
    if id != 5 {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"mensagem": format!("Produtor {} não encontrado", id)})),
        )
            .into_response();
    }
    let version = *backend.version.lock().unwrap();
    let nome = backend.nome.lock().unwrap().clone();
    (
        [("ETag", etag(version))],
        Json(json!({"id": 5, "nome": nome, "ativo": true})),
    )
        .into_response()
}

async fn replace(
    State(backend): State<Shared>,
    Path(id): Path<u32>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut version = backend.version.lock().unwrap();
    let current = etag(*version);
    if let Some(if_match) = headers.get("if-match").and_then(|v| v.to_str().ok()) {
        if if_match != current {
            return (
                StatusCode::PRECONDITION_FAILED,
                [("ETag", current)],
                Json(json!({"message": "Registro alterado por outro usuário"})),
            )
                .into_response();
        }
    }
    *version += 1;
    let nome = body["nome"].as_str().unwrap_or_default().to_string();
    *backend.nome.lock().unwrap() = nome.clone();
    (
        [("ETag", etag(*version))],
        Json(json!({"id": id, "nome": nome, "ativo": true})),
    )
        .into_response()
}

async fn search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let termo = params.get("termo").cloned().unwrap_or_default();
    let pagina = params.get("pagina").cloned().unwrap_or_default();
    let tamanho = params.get("tamanhoPagina").cloned().unwrap_or_default();
    Json(json!({
        "items": [{"id": 9, "nome": format!("{} p{} t{}", termo, pagina, tamanho), "ativo": true}],
        "total": 41
    }))
}

async fn secured(headers: HeaderMap) -> Response {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some("Bearer segredo") => Json(json!([{"id": 1}])).into_response(),
        _ => (StatusCode::UNAUTHORIZED, "token ausente").into_response(),
    }
}

async fn flaky(State(backend): State<Shared>) -> Response {
    let hit = backend.flaky_hits.fetch_add(1, Ordering::SeqCst);
    if hit < 2 {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    } else {
        Json(json!([{"id": 3}])).into_response()
    }
}

async fn start_backend() -> (String, Shared) {
    let backend = Arc::new(Backend {
        nome: Mutex::new("Sítio Boa Vista".to_string()),
        version: Mutex::new(1),
        ..Default::default()
    });
    let app = Router::new()
        .route("/produtores", get(list))
        .route("/produtores/buscar", get(search))
        .route("/produtores/:id", get(item).put(replace))
        .route("/seguros", get(secured))
        .route("/instaveis", get(flaky))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), backend)
}

fn client(transport: Arc<HttpTransport>, name: &str, path: &str) -> ReferenceClient<Value> {
    ReferenceClient::new(
        ResourceDescriptor::new(name, path),
        transport,
        ClientOptions {
            read_retry: RetryConfig::new().with_base_delay(Duration::from_millis(10)),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_list_is_cached_across_calls() {
    let (base_url, backend) = start_backend().await;
    let transport = Arc::new(HttpTransport::new(&base_url).unwrap());
    let produtores = client(transport, "Produtor", "/produtores");

    let first = produtores.get_all(&CallOptions::default()).await.unwrap();
    let second = produtores.get_all(&CallOptions::default()).await.unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(backend.list_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_reads_are_not_coalesced() {
    let (base_url, backend) = start_backend().await;
    let transport = Arc::new(HttpTransport::new(&base_url).unwrap());
    let produtores = client(transport, "Produtor", "/produtores");
    let opts = CallOptions::default();

    let results = futures::future::join_all((0..3).map(|_| produtores.get_all(&opts))).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(backend.list_hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_not_found_message_reaches_caller() {
    let (base_url, _backend) = start_backend().await;
    let transport = Arc::new(HttpTransport::new(&base_url).unwrap());
    let produtores = client(transport, "Produtor", "/produtores");

    let err = produtores
        .get_by_id(77, &CallOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.attempts(), 1);
    assert!(err.to_string().contains("Produtor 77 não encontrado"));
}

#[tokio::test]
async fn test_conditional_update_round_trip() {
    let (base_url, _backend) = start_backend().await;
    let transport = Arc::new(HttpTransport::new(&base_url).unwrap());
    let produtores = client(transport, "Produtor", "/produtores");
    let opts = CallOptions::default();

    let versioned = produtores.get_by_id_versioned(5, &opts).await.unwrap();
    assert_eq!(versioned.version, Some(ConcurrencyToken::new("\"v1\"")));

    let updated = produtores
        .update(5, &json!({"nome": "Sítio Novo"}), versioned.version.as_ref(), &opts)
        .await
        .unwrap();
    assert_eq!(updated["nome"], "Sítio Novo");

    // The same token is stale now.
    let err = produtores
        .update(5, &json!({"nome": "Atrasado"}), versioned.version.as_ref(), &opts)
        .await
        .unwrap_err();
    match err {
        RefDataError::VersionConflict {
            current_version,
            submitted,
            message,
            ..
        } => {
            assert_eq!(current_version.as_deref(), Some("\"v2\""));
            assert_eq!(submitted, json!({"nome": "Atrasado"}));
            assert_eq!(message, "Registro alterado por outro usuário");
        }
        other => panic!("expected version conflict, got {:?}", other),
    }

    let fresh = produtores.get_by_id(5, &opts).await.unwrap();
    assert_eq!(fresh["nome"], "Sítio Novo");
}

#[tokio::test]
async fn test_search_sends_query_parameters() {
    let (base_url, _backend) = start_backend().await;
    let transport = Arc::new(HttpTransport::new(&base_url).unwrap());
    let produtores = client(transport, "Produtor", "/produtores");

    let page = produtores
        .search(&SearchQuery::term("milho").with_page(2, 15), &CallOptions::default())
        .await
        .unwrap();

    assert_eq!(page.total, 41);
    assert_eq!(page.items[0]["nome"], "milho p2 t15");
}

#[tokio::test]
async fn test_bearer_credential_is_sent() {
    let (base_url, _backend) = start_backend().await;
    let transport = Arc::new(HttpTransport::new(&base_url).unwrap());
    let seguros = client(transport.clone(), "Seguro", "/seguros");

    let err = seguros.get_all(&CallOptions::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(err.to_string().contains("token ausente"));

    transport.set_credential(Some(Credential::Bearer("segredo".to_string())));
    let items = seguros.get_all(&CallOptions::default()).await.unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn test_transient_unavailability_is_retried() {
    let (base_url, backend) = start_backend().await;
    let transport = Arc::new(HttpTransport::new(&base_url).unwrap());
    let instaveis = client(transport, "Instavel", "/instaveis");

    let items = instaveis.get_all(&CallOptions::default()).await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(backend.flaky_hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::with_timeout(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
    let failure = transport
        .send(TransportRequest::get("/produtores"))
        .await
        .unwrap_err();

    assert_eq!(failure.status(), None);
    assert_eq!(refdata_core::network::classify(&failure).kind, ErrorKind::Network);
}
