use axum::{
    extract::State,
    http::Method,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod confirm;
pub mod error;
pub mod orders;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .route("/v1/bookings", post(orders::create_booking))
        .route("/v1/bookings/{order_reference}", get(orders::get_booking))
        .route("/v1/bookings/{order_reference}/cancel", post(orders::cancel_booking))
        .route(
            "/v1/bookings/{order_reference}/confirmation",
            post(confirm::open_confirmation).delete(confirm::close_confirmation),
        )
        .route(
            "/v1/bookings/{order_reference}/confirmation/stream",
            get(confirm::confirmation_stream),
        )
        .route(
            "/v1/bookings/{order_reference}/confirmation/decision",
            post(confirm::submit_decision),
        )
        .route("/healthz", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let ip = addr.ip().to_string();
    let key = format!("ratelimit:{}", ip);

    match state.redis.check_rate_limit(&key, state.rules.rate_limit_per_minute, 60).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err((axum::http::StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")),
        Err(_) => Ok(next.run(req).await), // Fail open
    }
}
