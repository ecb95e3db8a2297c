//! HTTP/JSON API (spec.md §4.11).
//!
//! A hand-rolled request pipeline over `tokio::net::TcpListener`/
//! `TcpStream`, not a web framework: the wire contract (manual `:param`
//! binding, header-then-bearer-then-query auth, exact CORS/OPTIONS
//! handling, `Connection: close` per request) is part of the interface
//! this crate exposes, so it is implemented directly rather than hidden
//! behind a router abstraction that would be free to reshape it.

mod auth;
mod handlers;
mod http;
mod json;
mod router;

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{info, instrument};

use crate::error::{NetPulseError, NetPulseResult};
use crate::runtime::Runtime;
use crate::storage::{HostGroupRepository, HostRepository, MetricsRepository};

pub use http::{Method, Request, Response};

/// Repositories the route handlers read and write.
pub struct ApiState {
    pub hosts: HostRepository,
    pub groups: HostGroupRepository,
    pub metrics: MetricsRepository,
}

pub struct ApiServer {
    runtime: Runtime,
    router: Arc<router::Router>,
    api_key: Arc<str>,
}

impl ApiServer {
    pub fn new(runtime: Runtime, state: Arc<ApiState>, api_key: String) -> Self {
        Self {
            runtime,
            router: Arc::new(handlers::build_router(state)),
            api_key: Arc::from(api_key),
        }
    }

    /// Binds `port` on all IPv4 interfaces and hands accepted connections
    /// to the runtime's accept loop (spec.md §6 Network listeners). Returns
    /// the bound port, which differs from `port` when `port == 0` (used by
    /// tests to grab an ephemeral port).
    #[instrument(skip(self))]
    pub async fn listen(&self, port: u16) -> NetPulseResult<u16> {
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|e| NetPulseError::Fatal(format!("cannot bind HTTP API on port {port}: {e}")))?;
        let bound_port = listener
            .local_addr()
            .map_err(|e| NetPulseError::Fatal(format!("cannot read bound address: {e}")))?
            .port();
        info!(port = bound_port, "HTTP API listening");

        let router = self.router.clone();
        let api_key = self.api_key.clone();
        self.runtime.accept_loop(listener, move |stream, _addr| {
            let router = router.clone();
            let api_key = api_key.clone();
            async move { serve_connection(stream, router, api_key).await }
        });
        Ok(bound_port)
    }

    pub fn stop(&self) {
        self.runtime.stop();
    }
}

async fn serve_connection(mut stream: TcpStream, router: Arc<router::Router>, api_key: Arc<str>) {
    let request = match http::read_request(&mut stream).await {
        Ok(Some(request)) => request,
        _ => return,
    };

    if request.method == Method::Options {
        let _ = http::write_response(&mut stream, Response::no_content(204)).await;
        return;
    }

    let response = dispatch(&router, &api_key, request).await;
    let _ = http::write_response(&mut stream, response).await;
}

/// Matches the route, enforces auth when a key is configured, and maps a
/// handler `Err` to its error's status code (spec.md §4.11 steps 4-6).
async fn dispatch(router: &router::Router, api_key: &str, mut request: Request) -> Response {
    let Some((route, params)) = router.find(request.method, &request.path) else {
        return Response::error(404, "Endpoint not found");
    };
    request.path_params = params;

    if route.requires_auth && !api_key.is_empty() && !auth::is_authorized(&request, api_key) {
        return Response::error(401, "Invalid or missing API key");
    }

    match (route.handler)(request).await {
        Ok(response) => response,
        Err(e) => Response::error(e.status_code(), e.to_string()),
    }
}
