//! Integration tests for the session engine and response classifier
//! against a local mock server.

use converse_core::config::Auth;
use converse_core::http::{
    Error, Method, Multipart, Network, Part, Request, Session, WriteCallback,
};
use serde_json::json;
use std::io::Write;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn auth() -> Auth {
    init_tracing();
    Auth::new("sk-test").unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn request_carries_authorization_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(header("OpenAI-Organization", "org-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let auth = Auth::new("sk-test").unwrap().with_organization("org-42");
    let network = Network::new(server.uri());
    let response = network
        .request(&auth, Request::new(Method::Get, "/models"))
        .await
        .unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(response["data"], json!([]));
}

#[tokio::test]
async fn structured_api_error_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
        })))
        .mount(&server)
        .await;

    let network = Network::new(server.uri());
    let request = Request::new(Method::Post, "/chat/completions")
        .with_content_type("application/json")
        .with_body("{}");
    let err = network.request(&auth(), request).await.unwrap_err();
    match err {
        Error::Api { ref message, .. } => assert_eq!(message, "Incorrect API key provided"),
        other => panic!("expected ApiError, got {other}"),
    }
}

#[tokio::test]
async fn rate_limit_fails_even_with_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let network = Network::new(server.uri());
    let err = network
        .request(&auth(), Request::new(Method::Get, "/models"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RateLimited { .. }), "{err}");
}

#[tokio::test]
async fn invalid_url_is_a_connection_error() {
    let mut session = Session::new("not a url");
    session.set_timeout(std::time::Duration::from_secs(1));
    let err = session.get().await.unwrap_err();
    assert!(matches!(err, Error::Connection { .. }), "{err}");
}

#[tokio::test]
async fn write_callback_receives_streamed_body() {
    let server = MockServer::start().await;
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"chunked\"}}]}\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let mut seen = String::new();
    let mut session = Session::new(format!("{}/chat/completions", server.uri()));
    session.set_body("{}");
    session.set_write_callback(WriteCallback::new(|chunk: &str| {
        seen.push_str(chunk);
        true
    }));
    let transfer = session.post().await.unwrap();

    assert_eq!(transfer.status_code, 200);
    // The body went to the sink, not the buffer.
    assert!(transfer.content.is_empty());
    assert_eq!(seen, body);
}

#[tokio::test]
async fn multipart_file_part_streams_from_disk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .and(body_string_contains("fine-tune"))
        .and(body_string_contains("{\"prompt\":\"p\"}"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut upload = tempfile::NamedTempFile::new().unwrap();
    writeln!(upload, "{{\"prompt\":\"p\"}}").unwrap();
    upload.flush().unwrap();

    let multipart = Multipart::new()
        .part(Part::text("purpose", "fine-tune"))
        .part(Part::file("file", upload.path()));
    let request = Request::new(Method::Post, "/files").with_multipart(multipart);
    let response = Network::new(server.uri())
        .request(&auth(), request)
        .await
        .unwrap();
    assert_eq!(response["id"], "file-1");
}

#[tokio::test]
async fn empty_upload_file_fails_before_any_request() {
    let server = MockServer::start().await;
    // Deliberately no mock mounted; the request must never be issued.

    let empty = tempfile::NamedTempFile::new().unwrap();
    let request = Request::new(Method::Post, "/files")
        .with_multipart(Multipart::new().part(Part::file("file", empty.path())));
    let err = Network::new(server.uri())
        .request(&auth(), request)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::File { .. }), "{err}");
}

#[tokio::test]
async fn download_writes_body_to_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/file-1/content"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("line one\nline two\n", "text/plain"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("download.jsonl");
    let mut file = tokio::fs::File::create(&target).await.unwrap();

    let session = Session::new(format!("{}/files/file-1/content", server.uri()));
    let transfer = session.download(&mut file).await.unwrap();

    assert_eq!(transfer.status_code, 200);
    assert!(transfer.content.is_empty());
    let written = std::fs::read_to_string(&target).unwrap();
    assert_eq!(written, "line one\nline two\n");
}

#[tokio::test]
async fn spawned_request_runs_on_its_own_task() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "gpt-4"}]})))
        .mount(&server)
        .await;

    let network = Network::new(server.uri());
    let handle = network.request_spawned(auth(), Request::new(Method::Get, "/models"));
    let response = handle.await.unwrap().unwrap();
    assert_eq!(response["data"][0]["id"], "gpt-4");
}
