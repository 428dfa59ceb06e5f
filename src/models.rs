// src/models.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of the mock market data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub ticker: String,
    pub price: f64,
    pub pe: Option<f64>,
    pub sector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub ticker: String,
    pub qty: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub name: String,
    pub items: Vec<PortfolioItem>,
}

/// Body of a voice/text advice request.
#[derive(Debug, Deserialize)]
pub struct QueryIn {
    pub portfolio: Portfolio,
    pub question: String,
    #[serde(default)]
    pub voice: bool,
}

/// Per-item row of an analysis. Unmatched tickers carry only a note.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HoldingDetail {
    Priced {
        ticker: String,
        price: f64,
        value: f64,
        pe: Option<f64>,
        sector: String,
    },
    Missing {
        ticker: String,
        note: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub summary: String,
    pub total_value: f64,
    pub details: Vec<HoldingDetail>,
    pub sector_value: BTreeMap<String, f64>,
    pub sector_pct: BTreeMap<String, f64>,
    pub not_found: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AdviceResponse {
    pub advice_text: String,
    pub analysis: Analysis,
    pub billed: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BillingEvent {
    pub id: i64,
    #[serde(rename = "type")]
    pub bill_type: String,
    pub amount: f64,
    pub ts: i64,
    pub meta: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredPortfolio {
    pub id: i64,
    pub name: String,
    pub items: Vec<PortfolioItem>,
    pub ts: i64,
}
