use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use entrada_server::blob::{BlobStore, HttpBlobStore};
use entrada_server::config::Config;
use entrada_server::routes::create_routes;
use entrada_server::state::AppState;
use entrada_server::storage::{MarketplaceStore, PgStore};
use entrada_server::ticketing::{TicketGenerator, TicketPdfRenderer};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let store: Arc<dyn MarketplaceStore> = Arc::new(PgStore::new(pool));
    let blob: Arc<dyn BlobStore> = Arc::new(HttpBlobStore::new(
        config.storage_url,
        config.storage_service_key,
    ));
    let renderer = TicketPdfRenderer::new(blob.clone());
    let generator = Arc::new(TicketGenerator::new(store.clone(), blob, renderer));

    let app: Router = create_routes(AppState { store, generator });

    let addr = SocketAddr::from(([0, 0, 0, 0], 3001));
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
