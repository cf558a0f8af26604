use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    http::{Method, header},
    middleware,
    routing::get,
};
use tokio::task::JoinHandle;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    auth, handlers, metrics,
    middleware as app_middleware,
    routes::{API_BASE, api_router},
    state::AppState,
};

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_headers([header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
        ])
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;

    let api = api_router().layer(middleware::from_fn_with_state(
        state.clone(),
        auth::authenticate,
    ));

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics))
        .nest(API_BASE, api)
        .with_state(state)
        // Middleware stack, innermost first: metrics, cors, compression, trace, request id
        .layer(middleware::from_fn(metrics::track_metrics))
        .layer(cors_layer())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .headers()
                        .get(app_middleware::REQUEST_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    state: AppState,
    background: Vec<JoinHandle<()>>,
}

impl ServerBuilder {
    pub fn new(state: AppState) -> Self {
        Self {
            addr: state.config.addr(),
            state,
            background: Vec::new(),
        }
    }

    /// Tasks aborted when the server stops.
    pub fn with_background_task(mut self, task: JoinHandle<()>) -> Self {
        self.background.push(task);
        self
    }

    pub fn build(self) -> TormgrServer {
        TormgrServer {
            addr: self.addr,
            app: build_app(self.state.clone()),
            state: self.state,
            background: self.background,
        }
    }
}

pub struct TormgrServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    background: Vec<JoinHandle<()>>,
}

impl TormgrServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        for task in &self.background {
            task.abort();
        }
        self.state.storage.close().await;
        tracing::info!("server stopped");

        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
