//! Per-request pipeline.
//!
//! Every inbound request goes through the same steps:
//! `Received -> DelayApplied -> FaultChecked`, then either `Faulted`, or
//! `Forwarding` followed by `Responded` / `ForwardFailed`.
//! Control requests are answered before the pipeline starts.

use super::body::read_json_body;
use super::client::HttpClient;
use super::control::{handle_control, ControlRoute};
use super::forwarding::RequestForwarder;
use super::headers::filter_relay_headers;
use crate::config::Config;
use crate::error::BodyError;
use crate::fault::{apply_delay, decide_fault, simulated_fault_response, FaultDecision, FaultState};
use crate::matcher::{path_only, RuleMatcher};
use crate::metrics;
use crate::response::{error_response, JsonResponseBuilder};
use crate::routing::{Backend, RouteResolver};
use anyhow::Context;
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Terminal state of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Control endpoint answered.
    Control,
    /// Body could not be decoded; nothing else ran.
    Rejected,
    Faulted { status: u16, rule_id: String },
    Responded { backend: Backend, status: u16 },
    ForwardFailed { backend: Backend },
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Control => "control",
            Outcome::Rejected => "rejected",
            Outcome::Faulted { .. } => "faulted",
            Outcome::Responded { .. } => "forwarded",
            Outcome::ForwardFailed { .. } => "forward_failed",
        }
    }
}

/// A finished request: the response to write plus what happened.
#[derive(Debug)]
pub struct Handled {
    pub response: Response<Full<Bytes>>,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

pub struct ProxyEngine {
    fault_state: Arc<FaultState>,
    rules: RuleMatcher,
    resolver: RouteResolver,
    forwarder: RequestForwarder,
    max_body_bytes: usize,
}

impl ProxyEngine {
    pub fn new(
        config: &Config,
        fault_state: Arc<FaultState>,
        http_client: HttpClient,
    ) -> Result<Self, anyhow::Error> {
        let rules = RuleMatcher::compile(&config.rules).context("Failed to compile fault rules")?;
        let resolver =
            RouteResolver::new(&config.backends).context("Failed to build route resolver")?;

        Ok(Self {
            fault_state,
            rules,
            resolver,
            forwarder: RequestForwarder::new(http_client, config.forwarding.timeout()),
            max_body_bytes: config.forwarding.max_body_bytes,
        })
    }

    pub fn fault_state(&self) -> &Arc<FaultState> {
        &self.fault_state
    }

    pub fn rules(&self) -> &RuleMatcher {
        &self.rules
    }

    pub fn resolver(&self) -> &RouteResolver {
        &self.resolver
    }

    /// Entry point used by the server: handles the request and records
    /// metrics for it.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let method = req.method().clone();
        let handled = self.process(req).await;

        let status = handled.response.status().as_u16();
        metrics::record_request(method.as_str(), status);
        metrics::record_proxy_duration(
            method.as_str(),
            handled.outcome.as_str(),
            handled.elapsed.as_secs_f64() * 1000.0,
        );
        handled.response
    }

    /// Run one request through the pipeline.
    pub async fn process<B>(&self, req: Request<B>) -> Handled
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        // Received
        let start = Instant::now();
        let (parts, body) = req.into_parts();
        let method = parts.method;
        let full_path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let path = path_only(&full_path);

        if let Some(route) = ControlRoute::parse(&method, path) {
            let response = handle_control(route, &self.fault_state);
            return finish(response, Outcome::Control, start);
        }

        info!("Request received: {} {}", method, full_path);

        let payload = match read_json_body(&parts.headers, body, self.max_body_bytes).await {
            Ok(value) => value,
            Err(e) => {
                debug!("Rejecting {} {}: {}", method, full_path, e);
                return finish(body_error_response(&e), Outcome::Rejected, start);
            }
        };
        debug!("Body: {}", payload);

        // DelayApplied
        let delay_ms = self.fault_state.snapshot().delay_ms;
        if delay_ms > 0 {
            info!("Waiting {}ms before responding", delay_ms);
            apply_delay(delay_ms).await;
            metrics::record_delay(delay_ms);
        }

        // FaultChecked: status is read after the delay, so a status change
        // made while this request waited applies to it.
        let status = self.fault_state.snapshot().status;
        // Rules are anchored on the whole request target, so a query string
        // keeps a request from matching.
        let rule = self.rules.find(method.as_str(), &full_path);
        if let FaultDecision::Error { status, rule_id } = decide_fault(status, rule) {
            info!(
                "Simulating error {} for {} {} (rule {})",
                status, method, full_path, rule_id
            );
            metrics::record_fault_injection(&rule_id, status);
            let response = simulated_fault_response(status, &full_path, &rule_id);
            return finish(response, Outcome::Faulted { status, rule_id }, start);
        }

        // Forwarding
        let (backend, target) = self.resolver.resolve(&full_path);
        if backend == Backend::RoutingService {
            info!("Redirecting this request to the routing service");
        }
        info!("Forwarding to: {}", target);

        let upstream_start = Instant::now();
        match self
            .forwarder
            .forward(&method, &target, &parts.headers, &payload)
            .await
        {
            Ok(backend_response) => {
                let status = backend_response.status.as_u16();
                metrics::record_upstream_duration(
                    backend.as_str(),
                    status,
                    upstream_start.elapsed().as_secs_f64() * 1000.0,
                );

                let response = JsonResponseBuilder::new(backend_response.status)
                    .merge_headers(filter_relay_headers(&backend_response.headers))
                    .build_bytes(backend_response.body);
                let handled = finish(response, Outcome::Responded { backend, status }, start);
                info!(
                    "Response time: {:.2} ms for {} {}",
                    handled.elapsed.as_secs_f64() * 1000.0,
                    method,
                    full_path
                );
                handled
            }
            Err(e) => {
                error!("Failed to forward {} {}: {}", method, full_path, e);
                metrics::record_forward_failure(backend.as_str());
                let response =
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to forward request");
                finish(response, Outcome::ForwardFailed { backend }, start)
            }
        }
    }
}

fn finish(response: Response<Full<Bytes>>, outcome: Outcome, start: Instant) -> Handled {
    Handled {
        response,
        outcome,
        elapsed: start.elapsed(),
    }
}

fn body_error_response(err: &BodyError) -> Response<Full<Bytes>> {
    match err {
        BodyError::TooLarge { .. } => {
            error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
        }
        BodyError::InvalidJson(_) | BodyError::NotContainer(_) => {
            error_response(StatusCode::BAD_REQUEST, "Invalid JSON body")
        }
        BodyError::Read(_) => error_response(StatusCode::BAD_REQUEST, "Failed to read request body"),
    }
}
