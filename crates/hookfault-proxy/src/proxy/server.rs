//! ProxyServer struct and main run loop.
//!
//! Accepts connections and hands every request to the shared
//! [`ProxyEngine`]. Requests are served concurrently; a delayed or slow
//! forward only holds up its own connection.

use super::client::create_http_client;
use super::handler::ProxyEngine;
use super::network::create_listener;
use crate::config::Config;
use crate::fault::FaultState;
use crate::metrics;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// The main proxy server struct.
pub struct ProxyServer {
    config: Arc<Config>,
    engine: Arc<ProxyEngine>,
}

impl ProxyServer {
    /// Create a new ProxyServer from configuration.
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        config.validate()?;
        let fault_state = Arc::new(FaultState::with_initial(
            config.fault.initial_status,
            config.fault.initial_delay_ms,
        )?);
        Self::with_fault_state(config, fault_state)
    }

    /// Create a ProxyServer around an existing fault state.
    pub fn with_fault_state(
        config: Config,
        fault_state: Arc<FaultState>,
    ) -> Result<Self, anyhow::Error> {
        let http_client = create_http_client(&config)?;
        let engine = ProxyEngine::new(&config, fault_state, http_client)?;

        let snapshot = engine.fault_state().snapshot();
        metrics::set_fault_state(snapshot.status, snapshot.delay_ms);

        Ok(Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
        })
    }

    pub fn engine(&self) -> &Arc<ProxyEngine> {
        &self.engine
    }

    pub fn fault_state(&self) -> Arc<FaultState> {
        Arc::clone(self.engine.fault_state())
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let addr = self.config.listen.socket_addr();
        let listener = create_listener(addr)?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// Shutdown only stops accepting; connections already being served run
    /// to completion.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        info!("Listening on http://{}", local_addr);
        info!(
            "Forwarding to {} (routing service: {})",
            self.config.backends.primary, self.config.backends.routing_service
        );
        info!(
            "Loaded {} fault rules, outbound timeout {}",
            self.engine.rules().len(),
            match self.config.forwarding.timeout() {
                Some(t) => format!("{}ms", t.as_millis()),
                None => "disabled".to_string(),
            }
        );

        if let Some(ref metrics_config) = self.config.metrics {
            let addr = SocketAddr::new(self.config.listen.host, metrics_config.port);
            let metrics_listener = create_listener(addr)?;
            info!("Metrics available on http://{}/metrics", addr);
            tokio::spawn(serve_metrics(metrics_listener));
        }

        let engine = self.engine;
        tokio::pin!(shutdown);

        loop {
            let (stream, remote_addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        error!("Failed to accept connection: {}", err);
                        continue;
                    }
                },
            };

            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let engine = Arc::clone(&engine);
                    async move { Ok::<_, Infallible>(engine.handle(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(
                        "Error serving HTTP connection from {}: {}",
                        remote_addr, err
                    );
                }
            });
        }

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C, running until killed: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Prometheus exposition: `GET /metrics`, 404 for anything else.
async fn serve_metrics(listener: TcpListener) {
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                error!("Metrics listener failed to accept: {}", err);
                continue;
            }
        };

        tokio::spawn(async move {
            let service = service_fn(|req: hyper::Request<hyper::body::Incoming>| async move {
                let response = if req.method() == Method::GET && req.uri().path() == "/metrics" {
                    let mut response = Response::new(Full::new(Bytes::from(metrics::collect_metrics())));
                    response.headers_mut().insert(
                        hyper::header::CONTENT_TYPE,
                        hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                    );
                    response
                } else {
                    let mut response = Response::new(Full::new(Bytes::new()));
                    *response.status_mut() = StatusCode::NOT_FOUND;
                    response
                };
                Ok::<_, Infallible>(response)
            });

            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                error!("Error serving metrics connection from {}: {}", remote_addr, err);
            }
        });
    }
}
