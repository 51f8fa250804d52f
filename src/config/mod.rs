use std::env;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

/// Startup configuration. The object-storage settings are hard
/// requirements: the blob client cannot work without them, so their
/// absence aborts startup instead of failing per request.
pub struct Config {
    pub database_url: String,
    pub storage_url: String,
    pub storage_service_key: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            storage_url: env::var("STORAGE_URL").expect("STORAGE_URL must be set"),
            storage_service_key: env::var("STORAGE_SERVICE_KEY")
                .expect("STORAGE_SERVICE_KEY must be set"),
        }
    }
}
