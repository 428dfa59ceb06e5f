// src/main.rs
mod advice;
mod api;
mod config;
mod db;
mod error;
mod market;
mod models;

use crate::config::Config;
use crate::db::Database;
use crate::market::MarketCache;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return;
        }
    };

    let db = match Database::open(&config.db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.static_dir) {
        error!(
            "Failed to create static directory {}: {}",
            config.static_dir.display(),
            e
        );
        return;
    }

    let market = Arc::new(MarketCache::new(&config.market_csv));
    match market.quotes().await {
        Ok(quotes) => info!("Market data ready with {} tickers.", quotes.len()),
        Err(e) => {
            error!("Failed to load market data: {}", e);
            return;
        }
    }

    let api = api::routes(db, market, config.pricing, config.static_dir.clone());

    info!("Server running on http://{}", config.listen_addr);
    warp::serve(api).run(config.listen_addr).await;
}
