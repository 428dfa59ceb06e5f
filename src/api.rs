// src/api.rs
use crate::advice::{analyze_portfolio, polish_advice};
use crate::config::Pricing;
use crate::db::Database;
use crate::error::{handle_rejection, AppError, CustomError};
use crate::market::MarketCache;
use crate::models::{AdviceResponse, Portfolio, QueryIn};
use log::{error, info};
use serde_json::json;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

pub const ADVICE_USAGE_KEY: &str = "advices_generated";
pub const PORTFOLIO_USAGE_KEY: &str = "portfolios_analyzed";
const ADVICE_BILL: &str = "advice";
const PORTFOLIO_BILL: &str = "portfolio_analysis";

pub fn routes(
    db: Arc<Database>,
    market: Arc<MarketCache>,
    pricing: Pricing,
    static_dir: PathBuf,
) -> impl Filter<Extract = impl Reply, Error = std::convert::Infallible> + Clone {
    let voice_query = warp::path!("api" / "voice-query")
        .and(warp::post())
        .and(with_db(db.clone()))
        .and(with_market(market.clone()))
        .and(with_pricing(pricing))
        .and(warp::body::json())
        .and_then(voice_query_handler);

    let add = warp::path!("api" / "portfolio")
        .and(warp::post())
        .and(with_db(db.clone()))
        .and(with_pricing(pricing))
        .and(warp::body::json())
        .and_then(add_portfolio_handler);

    let list = warp::path!("api" / "portfolios")
        .and(warp::get())
        .and(with_db(db.clone()))
        .and_then(list_portfolios_handler);

    let usage = warp::path!("api" / "usage")
        .and(warp::get())
        .and(with_db(db.clone()))
        .and_then(usage_handler);

    let bills = warp::path!("api" / "bills")
        .and(warp::get())
        .and(with_db(db))
        .and_then(bills_handler);

    let health = warp::path!("api" / "health")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({"ok": true, "note": "Portfolio advisor running."})));

    let refresh = warp::path!("api" / "market" / "refresh")
        .and(warp::post())
        .and(with_market(market))
        .and_then(refresh_market_handler);

    let static_files = warp::path("static").and(warp::fs::dir(static_dir.clone()));

    let index = warp::path::end()
        .and(warp::get())
        .and(warp::any().map(move || static_dir.join("index.html")))
        .and_then(index_handler);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec![
            "accept",
            "authorization",
            "content-type",
            "origin",
            "x-requested-with",
        ]);

    voice_query
        .or(add)
        .or(list)
        .or(usage)
        .or(bills)
        .or(health)
        .or(refresh)
        .or(static_files)
        .or(index)
        .with(cors)
        .recover(handle_rejection)
        .with(warp::log("portfolio_advisor::api"))
}

fn with_db(
    db: Arc<Database>,
) -> impl Filter<Extract = (Arc<Database>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || db.clone())
}

fn with_market(
    market: Arc<MarketCache>,
) -> impl Filter<Extract = (Arc<MarketCache>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || market.clone())
}

fn with_pricing(
    pricing: Pricing,
) -> impl Filter<Extract = (Pricing,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || pricing)
}

fn reject(context: &str, err: impl Into<CustomError>) -> Rejection {
    let err = err.into();
    error!("{}: {}", context, err);
    warp::reject::custom(err)
}

async fn voice_query_handler(
    db: Arc<Database>,
    market: Arc<MarketCache>,
    pricing: Pricing,
    query: QueryIn,
) -> Result<impl Reply, Rejection> {
    info!(
        "Advice requested for portfolio {:?} (voice: {}): {}",
        query.portfolio.name, query.voice, query.question
    );
    let quotes = market
        .quotes()
        .await
        .map_err(|e| reject("Failed to load market data", e))?;
    let analysis = analyze_portfolio(&query.portfolio, &quotes);
    let advice_text = polish_advice(&analysis.summary);

    let meta = format!("portfolio:{}", query.portfolio.name);
    db.run(move |db| db.record_charge(ADVICE_USAGE_KEY, ADVICE_BILL, pricing.advice, &meta))
        .await
        .map_err(|e| reject("Failed to record advice charge", e))?;

    Ok(warp::reply::json(&AdviceResponse {
        advice_text,
        analysis,
        billed: pricing.advice,
    }))
}

async fn add_portfolio_handler(
    db: Arc<Database>,
    pricing: Pricing,
    portfolio: Portfolio,
) -> Result<impl Reply, Rejection> {
    let name = portfolio.name.clone();
    let id = db
        .run(move |db| {
            let id = db.add_portfolio(&portfolio)?;
            db.record_charge(
                PORTFOLIO_USAGE_KEY,
                PORTFOLIO_BILL,
                pricing.portfolio,
                &format!("portfolio:{}", portfolio.name),
            )?;
            Ok(id)
        })
        .await
        .map_err(|e| reject("Failed to add portfolio", e))?;
    info!("Portfolio {:?} stored with id {}.", name, id);
    Ok(warp::reply::json(&json!({"ok": true})))
}

async fn list_portfolios_handler(db: Arc<Database>) -> Result<impl Reply, Rejection> {
    let portfolios = db
        .run(|db| db.list_portfolios())
        .await
        .map_err(|e| reject("Failed to list portfolios", e))?;
    Ok(warp::reply::json(&portfolios))
}

async fn usage_handler(db: Arc<Database>) -> Result<impl Reply, Rejection> {
    let usages = db
        .run(|db| db.get_usages())
        .await
        .map_err(|e| reject("Failed to read usage counters", e))?;
    Ok(warp::reply::json(&usages))
}

async fn bills_handler(db: Arc<Database>) -> Result<impl Reply, Rejection> {
    let bills = db
        .run(|db| db.list_bills())
        .await
        .map_err(|e| reject("Failed to read bills", e))?;
    Ok(warp::reply::json(&bills))
}

async fn refresh_market_handler(market: Arc<MarketCache>) -> Result<impl Reply, Rejection> {
    let quotes = market
        .refresh()
        .await
        .map_err(|e| reject("Failed to refresh market data", e))?;
    info!("Market data refreshed from {}.", market.path().display());
    Ok(warp::reply::json(&json!({"ok": true, "tickers": quotes.len()})))
}

async fn index_handler(index_path: PathBuf) -> Result<warp::reply::Response, Rejection> {
    match tokio::fs::read(&index_path).await {
        Ok(body) => Ok(
            warp::reply::with_header(body, "content-type", "text/html; charset=utf-8")
                .into_response(),
        ),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(warp::reply::json(
            &json!({"error": "index.html not found in static/ folder."}),
        )
        .into_response()),
        Err(e) => Err(reject("Failed to read index.html", AppError::from(e))),
    }
}
