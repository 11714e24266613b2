//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Forward requests to the upstream
//! - Hand textual responses to the rewrite pipeline
//! - Observability (metrics, correlation IDs)

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{validate_config, ConfigError, ProxyConfig, ValidationError};
use crate::http::request::{request_id, Upstream, UuidRequestId};
use crate::http::response::ProxyError;
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;
use crate::rewrite::{ResponseTransformer, RewriteRule};
use crate::security::headers::{append_forwarded_for, strip_hop_by_hop};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub upstream: Arc<Upstream>,
    pub client: Client<HttpConnector, Body>,
    pub transformer: Arc<ResponseTransformer>,
}

/// HTTP server for the rewriting proxy.
pub struct HttpServer {
    router: Router,
    config: Arc<ProxyConfig>,
}

impl HttpServer {
    /// Create a new HTTP server. The config is validated here as well, so a
    /// server can never run with an empty search literal.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let upstream = Upstream::parse(&config.upstream.url).map_err(|e| {
            ConfigError::Validation(vec![ValidationError::InvalidUpstream {
                url: config.upstream.url.clone(),
                reason: e.to_string(),
            }])
        })?;
        let rule = RewriteRule::new(config.rewrite.search.clone(), config.rewrite.replace.clone())
            .ok_or_else(|| ConfigError::Validation(vec![ValidationError::EmptySearch]))?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let config = Arc::new(config);
        let state = AppState {
            config: config.clone(),
            upstream: Arc::new(upstream),
            client,
            transformer: Arc::new(ResponseTransformer::new(rule)),
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(RequestBodyLimitLayer::new(config.limits.max_request_body_bytes))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.url,
            search = %self.config.rewrite.search,
            replace = %self.config.rewrite.replace,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Main proxy handler.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(&request).to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "Proxying request"
    );

    let response = match forward(&state, request, peer).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = e.status().as_u16(),
                error = %e,
                "Proxy request failed"
            );
            e.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}

/// Send `request` upstream and, for textual bodies, rewrite the response.
async fn forward(
    state: &AppState,
    request: Request<Body>,
    peer: SocketAddr,
) -> Result<Response, ProxyError> {
    let is_head = request.method() == Method::HEAD;

    let mut request = state.upstream.direct(request)?;
    strip_hop_by_hop(request.headers_mut());
    if state.config.upstream.forwarded_for {
        append_forwarded_for(request.headers_mut(), peer.ip());
    }

    let deadline = Duration::from_secs(state.config.timeouts.upstream_secs);
    let response = with_timeout(deadline, state.client.request(request)).await??;

    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);

    if is_head || !has_body(parts.status) || !state.transformer.is_rewritable(&parts.headers) {
        let response = Response::from_parts(parts, Body::new(body));
        return Ok(state.transformer.pass_through(response));
    }

    let limit = state.config.limits.max_response_body_bytes;
    let bytes = axum::body::to_bytes(Body::new(body), limit)
        .await
        .map_err(ProxyError::UpstreamBody)?;
    let buffered = Response::from_parts(parts, bytes);

    let transformer = state.transformer.clone();
    let rewritten = tokio::task::spawn_blocking(move || transformer.transform(buffered)).await??;

    Ok(rewritten.map(Body::from))
}

/// Responses to these statuses never carry a body.
fn has_body(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}
