// src/config.rs
use crate::error::{AppError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const ADVICE_PRICE: f64 = 0.20;
pub const PORTFOLIO_PRICE: f64 = 0.50;

/// Flat per-call charges for the billable endpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub advice: f64,
    pub portfolio: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Pricing {
            advice: ADVICE_PRICE,
            portfolio: PORTFOLIO_PRICE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: PathBuf,
    pub market_csv: PathBuf,
    pub static_dir: PathBuf,
    pub pricing: Pricing,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let listen_addr = var("ADVISOR_LISTEN_ADDR", "127.0.0.1:8000")
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("ADVISOR_LISTEN_ADDR: {}", e)))?;

        let pricing = Pricing {
            advice: parse_price(&lookup, "ADVISOR_ADVICE_PRICE", ADVICE_PRICE)?,
            portfolio: parse_price(&lookup, "ADVISOR_PORTFOLIO_PRICE", PORTFOLIO_PRICE)?,
        };

        Ok(Config {
            listen_addr,
            db_path: PathBuf::from(var("ADVISOR_DB_PATH", "mvp.db")),
            market_csv: PathBuf::from(var("ADVISOR_MARKET_CSV", "pathway_mock.csv")),
            static_dir: PathBuf::from(var("ADVISOR_STATIC_DIR", "static")),
            pricing,
        })
    }
}

fn parse_price<F>(lookup: &F, key: &str, default: f64) -> Result<f64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(price) if price.is_finite() && price >= 0.0 => Ok(price),
            _ => Err(AppError::Config(format!("{}: invalid price {:?}", key, raw))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8000".parse().unwrap());
        assert_eq!(config.db_path, PathBuf::from("mvp.db"));
        assert_eq!(config.market_csv, PathBuf::from("pathway_mock.csv"));
        assert_eq!(config.static_dir, PathBuf::from("static"));
        assert_eq!(config.pricing, Pricing::default());
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup_from(&[
            ("ADVISOR_LISTEN_ADDR", "0.0.0.0:9000"),
            ("ADVISOR_ADVICE_PRICE", "1.5"),
            ("ADVISOR_DB_PATH", "/tmp/advisor.db"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.pricing.advice, 1.5);
        assert_eq!(config.pricing.portfolio, PORTFOLIO_PRICE);
        assert_eq!(config.db_path, PathBuf::from("/tmp/advisor.db"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_lookup(lookup_from(&[("ADVISOR_LISTEN_ADDR", "nope")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("ADVISOR_ADVICE_PRICE", "-1")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("ADVISOR_PORTFOLIO_PRICE", "abc")])).is_err());
    }
}
