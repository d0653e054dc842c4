use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;
use tracing::{Instrument, debug, error, info, trace};

use super::FixtureState;
use crate::content_type::guess_content_type;
use crate::rules::{FailRule, RedirectRule, RouteBehavior, Rule, SuccessRule};
use crate::throttle::{ThrottleRate, write_throttled};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Fallback handler behind every fixture route.
pub(crate) async fn serve_fixture(
    State(state): State<Arc<FixtureState>>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let route = request_route(&uri);
    let Some(path) = state.routes.resolve(&route) else {
        debug!(route = %route, "No fixture registered for route");
        return StatusCode::NOT_FOUND.into_response();
    };

    match state.rules.resolve(&route) {
        RouteBehavior::ServeFile => serve_file(&path, HeaderMap::new()).await,
        RouteBehavior::Rule(Rule::Fail(rule)) => {
            debug!(route = %route, status = %rule.status, "Failing request");
            fail_response(rule)
        }
        RouteBehavior::Rule(Rule::Redirect(rule)) => {
            debug!(route = %route, location = ?rule.location, "Redirecting request");
            redirect_response(rule)
        }
        RouteBehavior::Rule(Rule::Succeed(SuccessRule {
            headers,
            throttle: Some(rate),
        })) => serve_throttled(&route, &path, headers, rate).await,
        RouteBehavior::Rule(Rule::Succeed(SuccessRule {
            headers,
            throttle: None,
        })) => serve_file(&path, headers).await,
    }
}

fn request_route(uri: &Uri) -> String {
    let path = uri.path();
    urlencoding::decode(path)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

async fn serve_file(path: &Path, headers: HeaderMap) -> Response {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) => return read_failure(path, e),
    };
    let len = match file.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(e) => return read_failure(path, e),
    };

    let stream = ReaderStream::with_capacity(file, READ_CHUNK_SIZE);
    let mut response = Response::new(Body::from_stream(stream));
    *response.headers_mut() = success_headers(path, headers, len);
    response
}

async fn serve_throttled(
    route: &str,
    path: &Path,
    headers: HeaderMap,
    rate: ThrottleRate,
) -> Response {
    let data = match tokio::fs::read(path).await {
        Ok(data) => Bytes::from(data),
        Err(e) => return read_failure(path, e),
    };
    let len = data.len() as u64;
    let bytes_per_second = rate.bytes_per_second(data.len());
    info!(route, bytes = len, bytes_per_second, "Serving throttled response");

    let (mut tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(1);
    let span = tracing::debug_span!("throttle", route = %route);
    tokio::spawn(
        async move {
            match write_throttled(data, &mut tx, bytes_per_second).await {
                Ok(()) => trace!("Throttled response complete"),
                Err(e) => debug!(error = %e, "Throttled response aborted"),
            }
        }
        .instrument(span),
    );

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    *response.headers_mut() = success_headers(path, headers, len);
    response
}

/// Rule headers first, then a guessed `Content-Type` and the body length
/// unless the rule already set them.
fn success_headers(path: &Path, mut headers: HeaderMap, len: u64) -> HeaderMap {
    headers
        .entry(CONTENT_TYPE)
        .or_insert_with(|| HeaderValue::from_static(guess_content_type(path)));
    headers.entry(CONTENT_LENGTH).or_insert_with(|| HeaderValue::from(len));
    headers
}

fn fail_response(rule: FailRule) -> Response {
    let body = rule.body.map(Body::from).unwrap_or_else(Body::empty);
    let mut response = Response::new(body);
    *response.status_mut() = rule.status;
    *response.headers_mut() = rule.headers;
    if let Some(reason) = rule.reason {
        response.extensions_mut().insert(reason);
    }
    response
}

fn redirect_response(rule: RedirectRule) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = rule.status;
    *response.headers_mut() = rule.headers;
    response.headers_mut().insert(LOCATION, rule.location);
    response
}

fn read_failure(path: &Path, e: std::io::Error) -> Response {
    error!(path = %path.display(), error = %e, "Failed to read fixture file");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::time::{Duration, Instant};

    use axum::body::{Body, to_bytes};
    use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use bytes::Bytes;
    use hyper::ext::ReasonPhrase;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::FixtureServerConfig;
    use crate::rules::{FailRules, RedirectRules, SuccessRules};
    use crate::server::FixtureServer;

    fn fixture_server() -> (TempDir, FixtureServer) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("live/v0")).unwrap();
        fs::write(dir.path().join("file1.txt"), "file1 contents").unwrap();
        fs::write(dir.path().join("live/v0/0.ts"), vec![0x47u8; 188 * 4]).unwrap();
        fs::write(dir.path().join("with space.txt"), "spaced").unwrap();
        let server = FixtureServer::load(FixtureServerConfig::new(dir.path())).unwrap();
        (dir, server)
    }

    async fn send(server: &FixtureServer, method: Method, uri: &str) -> Response {
        server
            .router()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn get(server: &FixtureServer, uri: &str) -> Response {
        send(server, Method::GET, uri).await
    }

    async fn body_bytes(response: Response) -> Bytes {
        to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    #[tokio::test]
    async fn serves_files_with_guessed_content_type() {
        let (_dir, server) = fixture_server();

        let response = get(&server, "/file1.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.headers()[CONTENT_LENGTH], "14");
        assert_eq!(body_bytes(response).await, "file1 contents");

        let response = get(&server, "/live/v0/0.ts").await;
        assert_eq!(response.headers()[CONTENT_TYPE], "video/mp2t");
        assert_eq!(body_bytes(response).await.len(), 188 * 4);
    }

    #[tokio::test]
    async fn percent_encoded_paths_are_decoded() {
        let (_dir, server) = fixture_server();
        let response = get(&server, "/with%20space.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, "spaced");
    }

    #[tokio::test]
    async fn unknown_routes_and_methods_are_rejected() {
        let (_dir, server) = fixture_server();
        assert_eq!(get(&server, "/missing.ts").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            send(&server, Method::POST, "/file1.txt").await.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn head_reports_headers() {
        let (_dir, server) = fixture_server();
        let response = send(&server, Method::HEAD, "/file1.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "14");
    }

    #[tokio::test]
    async fn fail_rule_replaces_the_file() {
        let (_dir, server) = fixture_server();
        server
            .request_fails("/file1.txt", FailRules::default())
            .unwrap();

        let response = get(&server, "/file1.txt").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn fail_rule_with_message_headers_and_body() {
        let (_dir, server) = fixture_server();
        server
            .request_fails(
                "/live/v0/0.ts",
                FailRules {
                    status_code: 404,
                    status_message: Some("Segment Gone".into()),
                    headers: BTreeMap::from([("x-cdn".to_string(), "edge".to_string())]),
                    error_body: Some(Bytes::from_static(b"nope")),
                },
            )
            .unwrap();

        let response = get(&server, "/live/v0/0.ts").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-cdn"], "edge");
        assert_eq!(
            response.extensions().get::<ReasonPhrase>().unwrap().as_bytes(),
            b"Segment Gone"
        );
        assert_eq!(body_bytes(response).await, "nope");
    }

    #[tokio::test]
    async fn redirect_rule_sets_location() {
        let (_dir, server) = fixture_server();
        server
            .request_redirects(
                "/file1.txt",
                RedirectRules {
                    location: "b.ts".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        let response = get(&server, "/file1.txt").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/b.ts");
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn latest_rule_wins_and_removal_restores_the_file() {
        let (_dir, server) = fixture_server();
        server.request_fails("/file1.txt", FailRules::default()).unwrap();
        server
            .request_redirects(
                "/file1.txt",
                RedirectRules {
                    code: Some(301),
                    location: "http://cdn.example.com/file1.txt".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        let response = get(&server, "/file1.txt").await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[LOCATION], "http://cdn.example.com/file1.txt");

        assert!(server.remove_rules("/file1.txt"));
        let response = get(&server, "/file1.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, "file1 contents");
    }

    #[tokio::test]
    async fn success_rule_headers_override_defaults() {
        let (_dir, server) = fixture_server();
        server
            .request_succeeds(
                "/file1.txt",
                SuccessRules {
                    headers: BTreeMap::from([
                        ("Content-Type".to_string(), "application/x-custom".to_string()),
                        ("Cache-Control".to_string(), "no-store".to_string()),
                    ]),
                    ..Default::default()
                },
            )
            .unwrap();

        let response = get(&server, "/file1.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/x-custom");
        assert_eq!(response.headers()["cache-control"], "no-store");
        assert_eq!(body_bytes(response).await, "file1 contents");
    }

    #[tokio::test]
    async fn throttled_response_delivers_the_whole_file() {
        let (_dir, server) = fixture_server();
        server
            .request_succeeds(
                "/file1.txt",
                SuccessRules {
                    response_time_ms: Some(300),
                    ..Default::default()
                },
            )
            .unwrap();

        let started = Instant::now();
        let response = get(&server, "/file1.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "14");
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(body_bytes(response).await, "file1 contents");
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn unreadable_file_is_a_server_error() {
        let (dir, server) = fixture_server();
        fs::remove_file(dir.path().join("file1.txt")).unwrap();
        assert_eq!(
            get(&server, "/file1.txt").await.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn unreadable_throttled_file_is_a_server_error() {
        let (dir, server) = fixture_server();
        server
            .request_succeeds(
                "/live/v0/0.ts",
                SuccessRules {
                    response_bits_per_sec: Some(64_000),
                    ..Default::default()
                },
            )
            .unwrap();
        fs::remove_file(dir.path().join("live/v0/0.ts")).unwrap();

        let response = get(&server, "/live/v0/0.ts").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn redirect_rule_writes_configured_headers() {
        let (_dir, server) = fixture_server();
        server
            .request_redirects(
                "/live/v0/0.ts",
                RedirectRules {
                    code: Some(307),
                    headers: BTreeMap::from([("x-redirect-by".to_string(), "edge".to_string())]),
                    location: "//cdn.example.com/live/v0/0.ts".into(),
                },
            )
            .unwrap();

        let response = get(&server, "/live/v0/0.ts").await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()["x-redirect-by"], "edge");
        assert_eq!(response.headers()[LOCATION], "//cdn.example.com/live/v0/0.ts");
    }
}
