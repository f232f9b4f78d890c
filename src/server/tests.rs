use super::*;
use crate::auth::UserStore;
use crate::embeddings::{EMBEDDING_DIMENSION, EmbeddingClient};
use crate::llm::LlmClient;
use crate::scrape::PageExtractor;
use crate::store::VectorStore;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request as WireRequest, Respond, ResponseTemplate};

struct NoPages;

#[async_trait]
impl PageExtractor for NoPages {
    async fn extract(&self, _url: &str) -> Option<String> {
        None
    }
}

struct ConstantEmbeddings;

impl Respond for ConstantEmbeddings {
    fn respond(&self, request: &WireRequest) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let count = body["texts"].as_array().unwrap().len();
        let embeddings: Vec<Vec<f32>> =
            (0..count).map(|_| vec![0.1; EMBEDDING_DIMENSION]).collect();
        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

async fn test_state(server: &MockServer, api_key: Option<&str>) -> (AppState, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let store = Arc::new(
        VectorStore::open(&temp_dir.path().join("vectors"))
            .await
            .expect("should open vector store"),
    );
    let embeddings =
        EmbeddingClient::new(&format!("{}/get_embeddings", server.uri()), 32).unwrap();
    let llm = LlmClient::new(&server.uri(), vec!["key-test".to_string()]).unwrap();
    let rag = Arc::new(RagService::new(store, embeddings, llm, Arc::new(NoPages)));

    let user_store = UserStore::open(&temp_dir.path().join("users.db"))
        .await
        .expect("should open user store");
    let auth = Arc::new(AuthService::new(user_store, None, None));

    let state = AppState {
        rag,
        auth,
        api_key: api_key.map(String::from),
    };
    (state, temp_dir)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok_without_auth() {
    let server = MockServer::start().await;
    // Bearer key configured, but /health stays open.
    let (state, _temp_dir) = test_state(&server, Some("sekrit")).await;
    let app = build_app(state);

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn analyze_with_no_urls_is_a_bad_request() {
    let server = MockServer::start().await;
    let (state, _temp_dir) = test_state(&server, None).await;
    let app = build_app(state);

    let response = app
        .oneshot(post_json("/analyze", json!({ "urls": [] })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Invalid request: No URLs provided.");
}

#[tokio::test]
async fn configured_api_key_rejects_missing_and_wrong_bearers() {
    let server = MockServer::start().await;
    let (state, _temp_dir) = test_state(&server, Some("sekrit")).await;
    let app = build_app(state);

    let request = post_json(
        "/ask",
        json!({ "index_name": "webindex-deadbeef", "question": "revenue?" }),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = post_json(
        "/ask",
        json!({ "index_name": "webindex-deadbeef", "question": "revenue?" }),
    );
    request
        .headers_mut()
        .insert(AUTHORIZATION, "Bearer wrong".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_bearer_passes_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/get_embeddings"))
        .respond_with(ConstantEmbeddings)
        .mount(&server)
        .await;
    let (state, _temp_dir) = test_state(&server, Some("sekrit")).await;
    let app = build_app(state);

    let mut request = post_json(
        "/ask",
        json!({ "index_name": "webindex-deadbeef", "question": "revenue?" }),
    );
    request
        .headers_mut()
        .insert(AUTHORIZATION, "Bearer sekrit".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body["answer"],
        "This information is not available in the indexed documents."
    );
}

#[tokio::test]
async fn unconfigured_api_key_means_open_access() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/get_embeddings"))
        .respond_with(ConstantEmbeddings)
        .mount(&server)
        .await;
    let (state, _temp_dir) = test_state(&server, None).await;
    let app = build_app(state);

    let request = post_json(
        "/ask",
        json!({ "index_name": "webindex-deadbeef", "question": "revenue?" }),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ask_without_an_index_name_is_a_bad_request() {
    let server = MockServer::start().await;
    let (state, _temp_dir) = test_state(&server, None).await;
    let app = build_app(state);

    let response = app
        .oneshot(post_json(
            "/ask",
            json!({ "index_name": "", "question": "revenue?" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_reports_missing_email_service() {
    let server = MockServer::start().await;
    let (state, _temp_dir) = test_state(&server, None).await;
    let app = build_app(state);

    let response = app
        .oneshot(post_json(
            "/register",
            json!({ "username": "casey", "email": "casey@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Email service unavailable.");
}

#[tokio::test]
async fn login_against_an_empty_store_is_rejected() {
    let server = MockServer::start().await;
    let (state, _temp_dir) = test_state(&server, None).await;
    let app = build_app(state);

    let response = app
        .oneshot(post_json(
            "/login",
            json!({ "identifier": "casey", "password": "hunter2!" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Invalid credentials");
}
