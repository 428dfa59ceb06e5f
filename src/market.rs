// src/market.rs
use crate::error::Result;
use crate::models::MarketQuote;
use csv::{ReaderBuilder, Trim, Writer};
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

pub type MarketData = HashMap<String, MarketQuote>;

const SAMPLE_HEADER: [&str; 4] = ["ticker", "price", "pe", "sector"];
const SAMPLE_ROWS: [[&str; 4]; 4] = [
    ["TCS", "3300", "28", "IT"],
    ["INFY", "1550", "22", "IT"],
    ["HDFC", "2700", "18", "Finance"],
    ["RELIANCE", "2400", "30", "Energy"],
];
const DEFAULT_SECTOR: &str = "OTHER";

#[derive(Deserialize)]
struct RawQuote {
    ticker: String,
    price: String,
    pe: Option<String>,
    sector: Option<String>,
}

impl RawQuote {
    fn parse(self) -> Option<MarketQuote> {
        let ticker = self.ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return None;
        }
        let price = self.price.trim().parse::<f64>().ok()?;
        if !price.is_finite() || price < 0.0 {
            return None;
        }
        let pe = match self.pe.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<f64>().ok().filter(|pe| pe.is_finite())?),
        };
        let sector = match self.sector.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_SECTOR.to_string(),
            Some(sector) => sector.to_string(),
        };
        Some(MarketQuote {
            ticker,
            price,
            pe,
            sector,
        })
    }
}

/// Writes the four demo rows if `path` does not exist yet.
pub fn ensure_sample_file(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = Writer::from_path(path)?;
    writer.write_record(SAMPLE_HEADER)?;
    for row in SAMPLE_ROWS {
        writer.write_record(row)?;
    }
    writer.flush()?;
    info!("Created sample market data at {}", path.display());
    Ok(())
}

/// Reads the whole market file, keyed by uppercased ticker. Bad rows are dropped.
pub fn load_market_data(path: &Path) -> Result<MarketData> {
    ensure_sample_file(path)?;
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;

    let mut data = MarketData::new();
    for (line, row) in reader.deserialize::<RawQuote>().enumerate() {
        match row.ok().and_then(RawQuote::parse) {
            Some(quote) => {
                data.insert(quote.ticker.clone(), quote);
            }
            None => debug!("Skipping malformed market row {} in {}", line + 2, path.display()),
        }
    }
    Ok(data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let meta = fs::metadata(path)?;
    Ok(Fingerprint {
        modified: meta.modified().ok(),
        len: meta.len(),
    })
}

struct Snapshot {
    fingerprint: Fingerprint,
    quotes: Arc<MarketData>,
}

/// Parsed market data, reloaded only when the file on disk changes or on
/// an explicit refresh.
///
/// Changes are detected by modification time and length. A rewrite that
/// keeps the same length within one mtime tick is not noticed until
/// `refresh` is called.
pub struct MarketCache {
    path: PathBuf,
    state: RwLock<Option<Snapshot>>,
}

impl MarketCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MarketCache {
            path: path.into(),
            state: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn quotes(&self) -> Result<Arc<MarketData>> {
        ensure_sample_file(&self.path)?;
        let current = fingerprint(&self.path)?;
        {
            let state = self.state.read().await;
            if let Some(snapshot) = state.as_ref() {
                if snapshot.fingerprint == current {
                    return Ok(snapshot.quotes.clone());
                }
            }
        }
        self.reload(false).await
    }

    pub async fn refresh(&self) -> Result<Arc<MarketData>> {
        self.reload(true).await
    }

    async fn reload(&self, force: bool) -> Result<Arc<MarketData>> {
        let mut state = self.state.write().await;
        ensure_sample_file(&self.path)?;
        let fingerprint = fingerprint(&self.path)?;
        // Another caller may have reloaded while we waited for the lock.
        if !force {
            if let Some(snapshot) = state.as_ref() {
                if snapshot.fingerprint == fingerprint {
                    return Ok(snapshot.quotes.clone());
                }
            }
        }
        let quotes = Arc::new(load_market_data(&self.path)?);
        info!(
            "Loaded {} market quotes from {}",
            quotes.len(),
            self.path.display()
        );
        *state = Some(Snapshot {
            fingerprint,
            quotes: quotes.clone(),
        });
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_created_with_sample_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("mock.csv");

        let data = load_market_data(&path).unwrap();

        assert!(path.exists());
        assert_eq!(data.len(), 4);
        let tcs = &data["TCS"];
        assert_eq!(tcs.price, 3300.0);
        assert_eq!(tcs.pe, Some(28.0));
        assert_eq!(tcs.sector, "IT");
        assert_eq!(data["HDFC"].sector, "Finance");
        assert_eq!(data["RELIANCE"].sector, "Energy");
        assert_eq!(data["INFY"].price, 1550.0);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("ticker,price,pe,sector"));
    }

    #[test]
    fn malformed_rows_are_skipped_and_tickers_uppercased() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mock.csv");
        fs::write(
            &path,
            "ticker,price,pe,sector\n\
             aapl,190.5,31,Tech\n\
             BAD,notanumber,10,Tech\n\
             NEG,-5,10,Tech\n\
             WEIRDPE,10,abc,Tech\n\
             NOPE,120,,Pharma\n\
             SHORT,100\n",
        )
        .unwrap();

        let data = load_market_data(&path).unwrap();

        assert_eq!(data.len(), 3);
        assert_eq!(data["AAPL"].price, 190.5);
        assert_eq!(data["NOPE"].pe, None);
        assert_eq!(data["NOPE"].sector, "Pharma");
        assert_eq!(data["SHORT"].sector, "OTHER");
        assert!(!data.contains_key("BAD"));
        assert!(!data.contains_key("NEG"));
        assert!(!data.contains_key("WEIRDPE"));
    }

    #[tokio::test]
    async fn cache_reuses_snapshot_until_file_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mock.csv");
        let cache = MarketCache::new(&path);

        let first = cache.quotes().await.unwrap();
        let second = cache.quotes().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        fs::write(&path, "ticker,price,pe,sector\nWIPRO,450,19,IT\n").unwrap();
        let third = cache.quotes().await.unwrap();
        assert_eq!(third.len(), 1);
        assert!(third.contains_key("WIPRO"));
    }

    #[tokio::test]
    async fn refresh_forces_reload_and_recreates_deleted_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mock.csv");
        let cache = MarketCache::new(&path);

        let first = cache.quotes().await.unwrap();
        let refreshed = cache.refresh().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert_eq!(refreshed.len(), 4);

        fs::remove_file(&path).unwrap();
        let recreated = cache.quotes().await.unwrap();
        assert!(path.exists());
        assert_eq!(recreated.len(), 4);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mock.csv");
        let cache = MarketCache::new(&path);

        let first = cache.quotes().await.unwrap();
        // A caller that missed before the snapshot landed reuses it.
        let late = cache.reload(false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &late));

        let (a, b) = tokio::join!(cache.refresh(), cache.quotes());
        assert_eq!(a.unwrap().len(), 4);
        assert_eq!(b.unwrap().len(), 4);
    }
}
