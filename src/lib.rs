pub mod blob;
pub mod config;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod state;
pub mod storage;
pub mod ticketing;
pub mod utils;
