use std::sync::Arc;

use config::Config;
use routes::marker::MarkerService;

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod geocode;
pub mod middleware;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MarkerService>,
    pub config: Config,
}
