use fareflow_api::{app, AppState};
use fareflow_client::RemoteOrderClient;
use fareflow_order::confirmation::SessionRegistry;
use fareflow_store::{DbClient, EventProducer, PgBookingRepository, RedisClient};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fareflow_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = fareflow_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Fareflow API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url).await.expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let redis = Arc::new(
        RedisClient::new(&config.redis.url).await.expect("Failed to connect to Redis"),
    );

    let kafka = Arc::new(
        EventProducer::new(&config.kafka.brokers).expect("Failed to create Kafka producer"),
    );

    let distribution = Arc::new(
        RemoteOrderClient::new(
            config.distribution.base_url.clone(),
            config.distribution.api_key.clone(),
        )
        .expect("Failed to build distribution client"),
    );

    let app_state = AppState {
        redis: redis.clone(),
        kafka,
        distribution,
        bookings: Arc::new(PgBookingRepository::new(db.pool.clone())),
        store: redis,
        sessions: Arc::new(SessionRegistry::new()),
        pollers: Arc::new(Mutex::new(HashMap::new())),
        refresh_gates: Arc::new(Mutex::new(HashMap::new())),
        rules: config.business_rules.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind listener");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("Server error");
}
