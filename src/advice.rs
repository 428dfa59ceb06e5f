// src/advice.rs
//! Rule-based portfolio commentary.
//!
//! Each priced holding gets exactly one remark: a concentration warning when
//! it is more than 40% of the portfolio, otherwise a valuation warning when
//! its P/E is above 40, otherwise a plain hold. A single diversification
//! warning is added when fewer than two sectors are present.
use crate::market::MarketData;
use crate::models::{Analysis, HoldingDetail, Portfolio};
use std::collections::BTreeMap;

pub const CONCENTRATION_PCT: f64 = 40.0;
pub const HIGH_PE: f64 = 40.0;
pub const MIN_SECTORS: usize = 2;
const MAX_ADVICES: usize = 4;

pub const NO_DATA_NOTE: &str = "No market data found.";
const BALANCED: &str = "No strong signals. Portfolio looks balanced based on available data.";

pub fn analyze_portfolio(portfolio: &Portfolio, market: &MarketData) -> Analysis {
    let mut total_value = 0.0;
    let mut sector_value: BTreeMap<String, f64> = BTreeMap::new();
    let mut details = Vec::with_capacity(portfolio.items.len());
    let mut not_found = Vec::new();

    for item in &portfolio.items {
        let ticker = item.ticker.trim().to_uppercase();
        let Some(quote) = market.get(&ticker) else {
            not_found.push(ticker.clone());
            details.push(HoldingDetail::Missing {
                ticker,
                note: NO_DATA_NOTE.to_string(),
            });
            continue;
        };
        let value = quote.price * item.qty as f64;
        total_value += value;
        *sector_value.entry(quote.sector.clone()).or_insert(0.0) += value;
        details.push(HoldingDetail::Priced {
            ticker,
            price: quote.price,
            value,
            pe: quote.pe,
            sector: quote.sector.clone(),
        });
    }

    let sector_pct = sector_value
        .iter()
        .map(|(sector, value)| {
            let pct = if total_value > 0.0 {
                round1(value / total_value * 100.0)
            } else {
                0.0
            };
            (sector.clone(), pct)
        })
        .collect::<BTreeMap<_, _>>();

    let mut advices = Vec::new();
    if total_value > 0.0 {
        for detail in &details {
            if let HoldingDetail::Priced {
                ticker, value, pe, ..
            } = detail
            {
                advices.push(holding_advice(ticker, value / total_value * 100.0, *pe));
            }
        }
    }
    if sector_pct.len() < MIN_SECTORS {
        advices.push(
            "Your portfolio is not diversified across sectors. Consider adding stocks from \
             other sectors such as Finance or Pharma."
                .to_string(),
        );
    }
    if !not_found.is_empty() {
        advices.push(format!(
            "Note: data for {} not found in data source.",
            not_found.join(", ")
        ));
    }

    let summary = if advices.is_empty() {
        BALANCED.to_string()
    } else {
        advices
            .iter()
            .take(MAX_ADVICES)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    };

    Analysis {
        summary,
        total_value,
        details,
        sector_value,
        sector_pct,
        not_found,
    }
}

fn holding_advice(ticker: &str, pct: f64, pe: Option<f64>) -> String {
    match pe {
        _ if pct > CONCENTRATION_PCT => format!(
            "You hold {} which is {:.0}% of portfolio. Concentration risk; consider reducing position.",
            ticker, pct
        ),
        Some(pe) if pe > HIGH_PE => format!(
            "{}'s P/E ({}) is high; consider trimming exposure.",
            ticker, pe
        ),
        _ => format!("{}: no immediate concern, hold.", ticker),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Hook for rephrasing the summary before it is returned. Currently a no-op.
pub fn polish_advice(summary: &str) -> String {
    summary.to_string()
}
