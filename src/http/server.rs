//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with the faucet handlers
//! - Wire up middleware (request id, tracing, timeout, CORS, headers, per-IP limit)
//! - Serve with graceful shutdown

use axum::{
    extract::Request,
    middleware,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::chain::ConnectionManager;
use crate::config::FaucetConfig;
use crate::faucet::SubmissionPipeline;
use crate::http::handlers;
use crate::limiter::RateLimiter;
use crate::security::{headers, rate_limit};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SubmissionPipeline>,
    pub connection: Arc<ConnectionManager>,
    pub limiter: Arc<RateLimiter>,
    pub network_name: String,
}

/// HTTP server for the faucet.
pub struct FaucetServer {
    router: Router,
}

impl FaucetServer {
    pub fn new(config: &FaucetConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &FaucetConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/fund", get(handlers::fund))
            .route("/health", get(handlers::health))
            .with_state(state);

        if config.ip_rate_limit.enabled {
            let limiter = Arc::new(rate_limit::IpRateLimiter::new(&config.ip_rate_limit));
            router = router.layer(middleware::from_fn_with_state(
                limiter,
                rate_limit::rate_limit_middleware,
            ));
        }

        router = headers::apply(router);

        if config.server.cors_enabled {
            router = router.layer(CorsLayer::permissive());
        }

        router
            .layer(TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for driving the service without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
