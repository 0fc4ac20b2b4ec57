//! End-to-end tests: the relay router resolving artifacts against a stub
//! OCI registry bound on a loopback port.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use condarelay::config::Config;
use condarelay::{create_router, AppState};

// ---------------------------------------------------------------------------
// Stub registry
// ---------------------------------------------------------------------------

/// Requests the stub registry has served, for assertions.
#[derive(Default)]
struct StubLog {
    /// Raw query strings of token requests.
    token_queries: Vec<String>,
    /// URI paths of manifest requests.
    manifest_paths: Vec<String>,
    /// (decoded repository, digest) of blob requests.
    blob_requests: Vec<(String, String)>,
}

#[derive(Clone)]
struct StubState {
    log: Arc<Mutex<StubLog>>,
    /// Manifest served for every tag; `Null` makes the endpoint answer 404.
    manifest: Arc<Value>,
    redirect_location: String,
}

async fn stub_token(State(stub): State<StubState>, RawQuery(query): RawQuery) -> Json<Value> {
    stub.log
        .lock()
        .unwrap()
        .token_queries
        .push(query.unwrap_or_default());
    Json(json!({ "token": "stub-pull-token" }))
}

async fn stub_manifest(
    State(stub): State<StubState>,
    Path((org, channel, subdir, package, tag)): Path<(String, String, String, String, String)>,
) -> Response {
    stub.log
        .lock()
        .unwrap()
        .manifest_paths
        .push(format!("/v2/{org}/{channel}/{subdir}/{package}/manifests/{tag}"));
    if stub.manifest.is_null() {
        return (StatusCode::NOT_FOUND, "manifest unknown").into_response();
    }
    Json(stub.manifest.as_ref().clone()).into_response()
}

async fn stub_blob(
    State(stub): State<StubState>,
    Path((_org, repo, digest)): Path<(String, String, String)>,
) -> Response {
    stub.log.lock().unwrap().blob_requests.push((repo, digest));

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    response.headers_mut().insert(
        header::LOCATION,
        HeaderValue::from_str(&stub.redirect_location).unwrap(),
    );
    response
        .headers_mut()
        .insert("x-stub-upstream", HeaderValue::from_static("1"));
    response
}

async fn spawn_stub(manifest: Value, redirect_location: &str) -> (SocketAddr, Arc<Mutex<StubLog>>) {
    let log = Arc::new(Mutex::new(StubLog::default()));
    let state = StubState {
        log: Arc::clone(&log),
        manifest: Arc::new(manifest),
        redirect_location: redirect_location.to_string(),
    };
    let app = Router::new()
        .route("/token", get(stub_token))
        .route(
            "/v2/{org}/{channel}/{subdir}/{package}/manifests/{tag}",
            get(stub_manifest),
        )
        // The relay percent-encodes the repository path into one segment.
        .route("/v2/{org}/{repo}/blobs/{digest}", get(stub_blob))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, log)
}

// ---------------------------------------------------------------------------
// Relay under test
// ---------------------------------------------------------------------------

fn relay_router(stub_addr: SocketAddr) -> Router {
    let mut config = Config::default();
    config.registry.url = format!("http://{stub_addr}");
    let state = AppState::new(config).expect("failed to build app state");
    create_router(Arc::new(state))
}

async fn get_artifact(router: &Router, uri: &str) -> Response {
    router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

fn package_manifest() -> Value {
    json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "layers": [
            { "mediaType": "application/vnd.conda.info.v1+json", "digest": "sha256:info", "size": 10 },
            { "mediaType": "application/vnd.conda.package.v2", "digest": "sha256:abc", "size": 100 }
        ]
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn relays_package_download_as_redirect() {
    let (addr, log) = spawn_stub(package_manifest(), "https://objects.example/sha256:abc").await;
    let router = relay_router(addr);

    let response =
        get_artifact(&router, "/conda-forge/linux-64/numpy-1.26.4-py311h_0.conda").await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://objects.example/sha256:abc"
    );
    // Upstream redirect headers are forwarded to the caller.
    assert_eq!(response.headers().get("x-stub-upstream").unwrap(), "1");

    let log = log.lock().unwrap();
    assert_eq!(
        log.manifest_paths,
        vec!["/v2/channel-mirrors/conda-forge/linux-64/numpy/manifests/1.26.4-py311h_0"]
    );
    assert_eq!(
        log.blob_requests,
        vec![(
            "conda-forge/linux-64/numpy".to_string(),
            "sha256:abc".to_string()
        )]
    );
    assert_eq!(log.token_queries.len(), 1);
    assert!(
        log.token_queries[0].contains("conda-forge%2Flinux-64%2Fnumpy:pull"),
        "unexpected token scope: {}",
        log.token_queries[0]
    );
}

#[tokio::test]
async fn repodata_requests_use_the_latest_tag() {
    let manifest = json!({
        "schemaVersion": 2,
        "layers": [
            { "mediaType": "application/vnd.conda.repodata.v1+json", "digest": "sha256:plain", "size": 5 },
            { "mediaType": "application/vnd.conda.repodata.v1+json+zst", "digest": "sha256:zst", "size": 5 }
        ]
    });
    let (addr, log) = spawn_stub(manifest, "https://objects.example/repodata").await;
    let router = relay_router(addr);

    let response = get_artifact(&router, "/conda-forge/linux-64/repodata.json.zst").await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let log = log.lock().unwrap();
    assert_eq!(
        log.manifest_paths,
        vec!["/v2/channel-mirrors/conda-forge/linux-64/repodata.json/manifests/latest"]
    );
    // The zst media type picks the compressed layer.
    assert_eq!(log.blob_requests[0].1, "sha256:zst");
}

#[tokio::test]
async fn missing_layer_is_surfaced_not_redirected() {
    // Manifest has no .tar.bz2 (v1) layer.
    let (addr, _log) = spawn_stub(package_manifest(), "https://objects.example/x").await;
    let router = relay_router(addr);

    let response = get_artifact(&router, "/conda-forge/linux-64/numpy-1.26.4-py311h_0.tar.bz2").await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("no layer"), "unexpected body: {body}");
}

#[tokio::test]
async fn malformed_artifact_name_is_a_client_error() {
    let (addr, log) = spawn_stub(package_manifest(), "https://objects.example/x").await;
    let router = relay_router(addr);

    let response = get_artifact(&router, "/conda-forge/linux-64/numpy-1.26.4.zip").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Parsing fails before any upstream call is made.
    assert!(log.lock().unwrap().token_queries.is_empty());
}

#[tokio::test]
async fn unknown_package_manifest_is_a_bad_gateway() {
    let (addr, _log) = spawn_stub(Value::Null, "https://objects.example/x").await;
    let router = relay_router(addr);

    let response = get_artifact(&router, "/conda-forge/linux-64/nosuch-1.0-0.conda").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn pull_token_is_reused_across_requests() {
    let (addr, log) = spawn_stub(package_manifest(), "https://objects.example/x").await;
    let router = relay_router(addr);

    for _ in 0..3 {
        let response =
            get_artifact(&router, "/conda-forge/linux-64/numpy-1.26.4-py311h_0.conda").await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    }

    // One token fetch serves all three downloads.
    assert_eq!(log.lock().unwrap().token_queries.len(), 1);
}
