//! Tests for the proxy module.
//!
//! These drive [`ProxyEngine`] directly against in-process mock backends, so
//! every step of the request pipeline runs except the listener.

use super::client::create_http_client;
use super::handler::{Outcome, ProxyEngine};
use crate::config::Config;
use crate::fault::FaultState;
use crate::routing::Backend;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Nothing listens here; connections are refused.
const DEAD_BACKEND: &str = "http://127.0.0.1:9/";

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path_and_query: String,
    headers: HeaderMap,
    body: Bytes,
}

/// Backend that records every request and answers with a fixed reply.
struct MockBackend {
    addr: SocketAddr,
    hits: Arc<Mutex<Vec<Recorded>>>,
}

impl MockBackend {
    async fn start(status: StatusCode, reply: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let recorded = Arc::clone(&recorded);
                        async move {
                            let (parts, incoming) = req.into_parts();
                            let body = incoming.collect().await?.to_bytes();
                            recorded.lock().push(Recorded {
                                method: parts.method,
                                path_and_query: parts
                                    .uri
                                    .path_and_query()
                                    .map(|pq| pq.to_string())
                                    .unwrap_or_default(),
                                headers: parts.headers,
                                body,
                            });

                            let mut response = Response::new(Full::new(Bytes::from_static(
                                reply.as_bytes(),
                            )));
                            *response.status_mut() = status;
                            let headers = response.headers_mut();
                            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                            headers.insert("x-backend", HeaderValue::from_static("mock"));
                            headers.insert("connection", HeaderValue::from_static("keep-alive"));
                            Ok::<_, hyper::Error>(response)
                        }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, hits }
    }

    fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    fn hits(&self) -> Vec<Recorded> {
        self.hits.lock().clone()
    }
}

/// Accepts connections and never answers. Returns its URL and how many
/// connections it has accepted.
async fn start_silent_backend() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    (format!("http://{addr}/"), accepted)
}

fn engine_for(primary: &str, routing: &str, state: Arc<FaultState>) -> ProxyEngine {
    engine_with_timeout(primary, routing, state, 2_000)
}

fn engine_with_timeout(
    primary: &str,
    routing: &str,
    state: Arc<FaultState>,
    timeout_ms: u64,
) -> ProxyEngine {
    let mut config = Config::default();
    config.backends.primary = primary.to_string();
    config.backends.routing_service = routing.to_string();
    config.forwarding.timeout_ms = timeout_ms;
    config.forwarding.max_body_bytes = 1024;
    let client = create_http_client(&config).unwrap();
    ProxyEngine::new(&config, state, client).unwrap()
}

fn json_request(method: Method, uri: &str, body: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header("x-api-key", "secret")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn empty_request(method: Method, uri: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

async fn body_json(response: Response<Full<Bytes>>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[cfg(test)]
mod fault_tests {
    use super::*;

    #[tokio::test]
    async fn test_faulted_request_never_reaches_backend() {
        let primary = MockBackend::start(StatusCode::OK, r#"{"ok":true}"#).await;
        let state = Arc::new(FaultState::new());
        state.set_status(500).unwrap();
        let engine = engine_for(&primary.url(), DEAD_BACKEND, state);

        let handled = engine
            .process(json_request(Method::POST, "/v1/routes/visits/", r#"{"id":1}"#))
            .await;

        assert_eq!(
            handled.outcome,
            Outcome::Faulted {
                status: 500,
                rule_id: "visits-create".to_string()
            }
        );
        assert_eq!(handled.response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            handled.response.headers()["x-hookfault-fault"],
            HeaderValue::from_static("error")
        );
        assert_eq!(
            handled.response.headers()["x-hookfault-rule-id"],
            HeaderValue::from_static("visits-create")
        );
        assert_eq!(
            body_json(handled.response).await,
            json!({
                "mensaje": "Simulated mock with status 500",
                "ruta": "/v1/routes/visits/"
            })
        );
        assert!(primary.hits().is_empty());
    }

    #[tokio::test]
    async fn test_query_string_keeps_rule_from_matching() {
        let primary = MockBackend::start(StatusCode::OK, r#"{"ok":true}"#).await;
        let state = Arc::new(FaultState::new());
        state.set_status(500).unwrap();
        let engine = engine_for(&primary.url(), DEAD_BACKEND, state);

        let handled = engine
            .process(json_request(Method::POST, "/v1/routes/visits/?x=1", r#"{"id":1}"#))
            .await;

        assert_eq!(
            handled.outcome,
            Outcome::Responded {
                backend: Backend::Primary,
                status: 200
            }
        );
        let hits = primary.hits();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path_and_query, "/v1/routes/visits/?x=1");
    }

    #[tokio::test]
    async fn test_query_string_still_routes_add_visit() {
        let routing = MockBackend::start(StatusCode::OK, "{}").await;
        let state = Arc::new(FaultState::new());
        state.set_status(404).unwrap();
        let engine = engine_for(DEAD_BACKEND, &routing.url(), state);

        let handled = engine
            .process(json_request(Method::POST, "/routes/abc/add/?notify=1", "{}"))
            .await;

        assert_eq!(
            handled.outcome,
            Outcome::Responded {
                backend: Backend::RoutingService,
                status: 200
            }
        );
        assert_eq!(routing.hits()[0].path_and_query, "/routes/abc/add/?notify=1");
    }

    #[tokio::test]
    async fn test_unmatched_request_is_forwarded_despite_error_status() {
        let primary = MockBackend::start(StatusCode::OK, r#"{"items":[]}"#).await;
        let state = Arc::new(FaultState::new());
        state.set_status(503).unwrap();
        let engine = engine_for(&primary.url(), DEAD_BACKEND, state);

        let handled = engine.process(empty_request(Method::GET, "/v1/unrelated")).await;

        assert_eq!(
            handled.outcome,
            Outcome::Responded {
                backend: Backend::Primary,
                status: 200
            }
        );
        assert_eq!(body_json(handled.response).await, json!({"items": []}));
        let hits = primary.hits();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].method, Method::GET);
        assert_eq!(hits[0].path_and_query, "/v1/unrelated");
    }

    #[tokio::test]
    async fn test_ineligible_code_is_forwarded() {
        // visits-create does not list 404.
        let primary = MockBackend::start(StatusCode::CREATED, r#"{"id":7}"#).await;
        let state = Arc::new(FaultState::new());
        state.set_status(404).unwrap();
        let engine = engine_for(&primary.url(), DEAD_BACKEND, state);

        let handled = engine
            .process(json_request(Method::POST, "/v1/routes/visits/", r#"{"id":7}"#))
            .await;

        assert_eq!(handled.response.status(), StatusCode::CREATED);
        assert_eq!(primary.hits().len(), 1);
    }

    #[tokio::test]
    async fn test_rule_method_must_match() {
        let primary = MockBackend::start(StatusCode::OK, "{}").await;
        let state = Arc::new(FaultState::new());
        state.set_status(500).unwrap();
        let engine = engine_for(&primary.url(), DEAD_BACKEND, state);

        let handled = engine
            .process(empty_request(Method::GET, "/v1/routes/visits/"))
            .await;

        assert_eq!(handled.response.status(), StatusCode::OK);
        assert_eq!(primary.hits().len(), 1);
    }

    #[tokio::test]
    async fn test_route_add_fault_with_not_found() {
        let routing = MockBackend::start(StatusCode::OK, "{}").await;
        let state = Arc::new(FaultState::new());
        state.set_status(404).unwrap();
        let engine = engine_for(DEAD_BACKEND, &routing.url(), state);

        let handled = engine
            .process(json_request(Method::POST, "/routes/abc123/add/", r#"{"visit":1}"#))
            .await;

        assert_eq!(
            handled.outcome,
            Outcome::Faulted {
                status: 404,
                rule_id: "route-add-visit".to_string()
            }
        );
        assert!(routing.hits().is_empty());
    }
}

#[cfg(test)]
mod forwarding_tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn test_route_add_goes_to_routing_service() {
        let primary = MockBackend::start(StatusCode::OK, r#"{"from":"primary"}"#).await;
        let routing = MockBackend::start(StatusCode::OK, r#"{"from":"routing"}"#).await;
        let engine = engine_for(&primary.url(), &routing.url(), Arc::new(FaultState::new()));

        let handled = engine
            .process(json_request(Method::POST, "/routes/abc123/add/", r#"{"visit":1}"#))
            .await;

        assert_eq!(
            handled.outcome,
            Outcome::Responded {
                backend: Backend::RoutingService,
                status: 200
            }
        );
        assert_eq!(body_json(handled.response).await, json!({"from": "routing"}));
        assert!(primary.hits().is_empty());

        let hits = routing.hits();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path_and_query, "/routes/abc123/add/");
        let forwarded: Value = serde_json::from_slice(&hits[0].body).unwrap();
        assert_eq!(forwarded, json!({"visit": 1}));
    }

    #[tokio::test]
    async fn test_forwarded_request_headers_and_body() {
        let primary = MockBackend::start(StatusCode::OK, "{}").await;
        let engine = engine_for(&primary.url(), DEAD_BACKEND, Arc::new(FaultState::new()));

        let handled = engine
            .process(json_request(
                Method::PUT,
                "/v1/routes/visits/42/?token=abc",
                r#"{ "title" : "x" }"#,
            ))
            .await;
        assert_eq!(handled.response.status(), StatusCode::OK);

        let hits = primary.hits();
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.method, Method::PUT);
        assert_eq!(hit.path_and_query, "/v1/routes/visits/42/?token=abc");
        assert_eq!(hit.headers["x-api-key"], "secret");
        assert_eq!(hit.headers[CONTENT_TYPE], "application/json");
        // Host comes from the target, not the inbound request.
        assert_eq!(hit.headers["host"], primary.addr.to_string().as_str());
        assert_eq!(hit.body, Bytes::from_static(br#"{"title":"x"}"#));
    }

    #[tokio::test]
    async fn test_get_is_forwarded_without_body() {
        let primary = MockBackend::start(StatusCode::OK, "{}").await;
        let engine = engine_for(&primary.url(), DEAD_BACKEND, Arc::new(FaultState::new()));

        engine
            .process(json_request(Method::GET, "/v1/drivers", r#"{"ignored":true}"#))
            .await;

        let hits = primary.hits();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_backend_status_and_headers_relayed() {
        let primary = MockBackend::start(StatusCode::UNPROCESSABLE_ENTITY, r#"{"error": "bad"}"#).await;
        let engine = engine_for(&primary.url(), DEAD_BACKEND, Arc::new(FaultState::new()));

        let handled = engine
            .process(json_request(Method::POST, "/v1/other/", "{}"))
            .await;

        let response = handled.response;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.headers()["x-backend"], "mock");
        assert!(response.headers().get("connection").is_none());
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[CONTENT_LENGTH], "15");
        assert_eq!(body_json(response).await, json!({"error": "bad"}));
    }

    #[tokio::test]
    async fn test_forward_failure_returns_500() {
        let engine = engine_for(DEAD_BACKEND, DEAD_BACKEND, Arc::new(FaultState::new()));

        let handled = engine.process(empty_request(Method::GET, "/v1/anything")).await;

        assert_eq!(
            handled.outcome,
            Outcome::ForwardFailed {
                backend: Backend::Primary
            }
        );
        assert_eq!(handled.response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(handled.response).await,
            json!({"error": "Failed to forward request"})
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_forward_failure_is_logged() {
        let engine = engine_for(DEAD_BACKEND, DEAD_BACKEND, Arc::new(FaultState::new()));

        engine.process(empty_request(Method::DELETE, "/v1/visits/3")).await;

        assert!(logs_contain("Forwarding to: http://127.0.0.1:9/v1/visits/3"));
        assert!(logs_contain("Failed to forward DELETE /v1/visits/3"));
    }

    #[tokio::test]
    async fn test_silent_backend_times_out_once() {
        let (silent, accepted) = start_silent_backend().await;
        let engine = engine_with_timeout(&silent, DEAD_BACKEND, Arc::new(FaultState::new()), 100);

        let handled = tokio::time::timeout(
            Duration::from_secs(5),
            engine.process(json_request(Method::POST, "/v1/routes/visits/", "{}")),
        )
        .await
        .expect("outbound timeout did not fire");

        assert_eq!(
            handled.outcome,
            Outcome::ForwardFailed {
                backend: Backend::Primary
            }
        );
        assert!(handled.elapsed >= Duration::from_millis(100));
        assert_eq!(handled.response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(handled.response).await,
            json!({"error": "Failed to forward request"})
        );

        // Single attempt: no second connection after the timeout.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_json_backend_reply_is_forward_failure() {
        let primary = MockBackend::start(StatusCode::OK, "<html>oops</html>").await;
        let engine = engine_for(&primary.url(), DEAD_BACKEND, Arc::new(FaultState::new()));

        let handled = engine.process(empty_request(Method::GET, "/v1/page")).await;

        assert_eq!(handled.response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(primary.hits().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_rejected_before_forwarding() {
        let primary = MockBackend::start(StatusCode::OK, "{}").await;
        let engine = engine_for(&primary.url(), DEAD_BACKEND, Arc::new(FaultState::new()));

        let handled = engine
            .process(json_request(Method::POST, "/v1/routes/visits/", "{\"id\":"))
            .await;
        assert_eq!(handled.outcome, Outcome::Rejected);
        assert_eq!(handled.response.status(), StatusCode::BAD_REQUEST);

        let handled = engine
            .process(json_request(Method::POST, "/v1/routes/visits/", "\"abc\""))
            .await;
        assert_eq!(handled.outcome, Outcome::Rejected);
        assert_eq!(
            body_json(handled.response).await,
            json!({"error": "Invalid JSON body"})
        );

        let oversized = format!(r#"{{"pad":"{}"}}"#, "x".repeat(2048));
        let handled = engine
            .process(json_request(Method::POST, "/v1/routes/visits/", &oversized))
            .await;
        assert_eq!(handled.response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        assert!(primary.hits().is_empty());
    }
}

#[cfg(test)]
mod delay_tests {
    use super::*;

    #[tokio::test]
    async fn test_delay_applied_before_fault() {
        let state = Arc::new(FaultState::new());
        state.set_status(502).unwrap();
        state.set_delay(50).unwrap();
        let engine = engine_for(DEAD_BACKEND, DEAD_BACKEND, state);

        let handled = engine
            .process(json_request(Method::POST, "/v1/routes/visits/", "{}"))
            .await;

        assert_eq!(handled.response.status(), StatusCode::BAD_GATEWAY);
        assert!(handled.elapsed >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_control_requests_are_not_delayed() {
        let state = Arc::new(FaultState::new());
        state.set_delay(10_000).unwrap();
        let engine = engine_for(DEAD_BACKEND, DEAD_BACKEND, Arc::clone(&state));

        let handled = tokio::time::timeout(
            Duration::from_secs(1),
            engine.process(empty_request(Method::POST, "/set-delay/0")),
        )
        .await
        .expect("control request waited out the delay");

        assert_eq!(handled.outcome, Outcome::Control);
        assert_eq!(state.snapshot().delay_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_change_during_delay_applies() {
        let state = Arc::new(FaultState::new());
        state.set_delay(1_000).unwrap();
        let engine = Arc::new(engine_for(DEAD_BACKEND, DEAD_BACKEND, Arc::clone(&state)));

        let task = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move {
                engine
                    .process(json_request(Method::POST, "/v1/routes/visits/", r#"{"id":1}"#))
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        state.set_status(503).unwrap();

        let handled = task.await.unwrap();
        assert_eq!(
            handled.outcome,
            Outcome::Faulted {
                status: 503,
                rule_id: "visits-create".to_string()
            }
        );
    }
}

#[cfg(test)]
mod control_tests {
    use super::*;
    use crate::fault::ERROR_CODES;

    #[tokio::test]
    async fn test_set_status_then_fault() {
        let state = Arc::new(FaultState::new());
        let engine = engine_for(DEAD_BACKEND, DEAD_BACKEND, Arc::clone(&state));

        let handled = engine.process(empty_request(Method::POST, "/set-status/429")).await;
        assert_eq!(handled.response.status(), StatusCode::OK);
        assert_eq!(
            body_json(handled.response).await,
            json!({"mensaje": "Simulated status updated to 429"})
        );

        let handled = engine
            .process(json_request(Method::POST, "/v1/routes/visits/upsert/", "{}"))
            .await;
        assert_eq!(handled.response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_every_error_code_can_be_simulated() {
        let state = Arc::new(FaultState::new());
        let engine = engine_for(DEAD_BACKEND, DEAD_BACKEND, Arc::clone(&state));

        for code in ERROR_CODES {
            let handled = engine
                .process(empty_request(Method::POST, &format!("/set-status/{code}")))
                .await;
            assert_eq!(handled.response.status(), StatusCode::OK);

            let handled = engine
                .process(json_request(Method::POST, "/routes/r-1/add/", "{}"))
                .await;
            assert_eq!(handled.response.status().as_u16(), code);
            assert_eq!(
                body_json(handled.response).await["ruta"],
                json!("/routes/r-1/add/")
            );
        }
    }

    #[tokio::test]
    async fn test_invalid_status_keeps_state() {
        let state = Arc::new(FaultState::new());
        state.set_status(503).unwrap();
        let engine = engine_for(DEAD_BACKEND, DEAD_BACKEND, Arc::clone(&state));

        for path in ["/set-status/999", "/set-status/abc", "/set-status/201"] {
            let handled = engine.process(empty_request(Method::POST, path)).await;
            assert_eq!(handled.response.status(), StatusCode::BAD_REQUEST, "{path}");
            assert_eq!(
                body_json(handled.response).await,
                json!({"error": "Status code not allowed"})
            );
        }
        assert_eq!(state.snapshot().status, 503);
    }

    #[tokio::test]
    async fn test_invalid_delay_keeps_state() {
        let state = Arc::new(FaultState::new());
        state.set_delay(250).unwrap();
        let engine = engine_for(DEAD_BACKEND, DEAD_BACKEND, Arc::clone(&state));

        for path in ["/set-delay/600001", "/set-delay/-5", "/set-delay/soon"] {
            let handled = engine.process(empty_request(Method::POST, path)).await;
            assert_eq!(handled.response.status(), StatusCode::BAD_REQUEST, "{path}");
        }
        assert_eq!(state.snapshot().delay_ms, 250);
    }

    #[tokio::test]
    async fn test_control_path_variants() {
        let state = Arc::new(FaultState::new());
        let engine = engine_for(DEAD_BACKEND, DEAD_BACKEND, Arc::clone(&state));

        let handled = engine.process(empty_request(Method::POST, "/SET-DELAY/75/")).await;
        assert_eq!(
            body_json(handled.response).await,
            json!({"mensaje": "Simulated delay updated to 75ms"})
        );
        assert_eq!(state.snapshot().delay_ms, 75);

        let handled = engine.process(empty_request(Method::POST, "/set-status/502abc")).await;
        assert_eq!(handled.response.status(), StatusCode::OK);
        assert_eq!(state.snapshot().status, 502);
    }

    #[tokio::test]
    async fn test_get_on_control_path_is_proxied() {
        let primary = MockBackend::start(StatusCode::OK, "{}").await;
        let state = Arc::new(FaultState::new());
        let engine = engine_for(&primary.url(), DEAD_BACKEND, Arc::clone(&state));

        let handled = engine.process(empty_request(Method::GET, "/set-status/500")).await;

        assert!(matches!(handled.outcome, Outcome::Responded { .. }));
        assert_eq!(state.snapshot().status, 200);
        assert_eq!(primary.hits()[0].path_and_query, "/set-status/500");
    }
}
