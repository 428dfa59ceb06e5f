// src/db.rs
use crate::error::{AppError, Result};
use crate::models::{BillingEvent, Portfolio, PortfolioItem, StoredPortfolio};
use chrono::Utc;
use log::{error, info};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS usage (
    id INTEGER PRIMARY KEY,
    key TEXT NOT NULL UNIQUE,
    count INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS bills (
    id INTEGER PRIMARY KEY,
    type TEXT NOT NULL,
    amount REAL NOT NULL,
    ts INTEGER NOT NULL,
    meta TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS portfolios (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    data TEXT NOT NULL,
    ts INTEGER NOT NULL
);
"#;

/// Single shared SQLite connection. Every statement runs under the mutex.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database {
            conn: Mutex::new(Connection::open(path)?),
        };
        db.init_schema()?;
        info!("Opened database at {}", path.display());
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Database {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Runs `f` against the store on tokio's blocking pool.
    pub async fn run<T, F>(self: Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        task::spawn_blocking(move || f(&self)).await?
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            error!("Database mutex poisoned");
            AppError::LockPoisoned
        })
    }

    pub fn get_usages(&self) -> Result<BTreeMap<String, i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key, count FROM usage")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let usages = rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(usages)
    }

    /// Counts one use of `usage_key` and appends the matching bill atomically.
    pub fn record_charge(
        &self,
        usage_key: &str,
        bill_type: &str,
        amount: f64,
        meta: &str,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        inc_usage(&tx, usage_key, 1)?;
        add_bill(&tx, bill_type, amount, meta)?;
        tx.commit()?;
        Ok(())
    }

    /// Billing log, newest first.
    pub fn list_bills(&self) -> Result<Vec<BillingEvent>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, type, amount, ts, meta FROM bills ORDER BY ts DESC, id DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(BillingEvent {
                id: row.get(0)?,
                bill_type: row.get(1)?,
                amount: row.get(2)?,
                ts: row.get(3)?,
                meta: row.get(4)?,
            })
        })?;
        let bills = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bills)
    }

    /// Appends the portfolio; names are not unique.
    pub fn add_portfolio(&self, portfolio: &Portfolio) -> Result<i64> {
        let data = serde_json::to_string(&portfolio.items)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO portfolios (name, data, ts) VALUES (?1, ?2, ?3)",
            params![portfolio.name, data, now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_portfolios(&self) -> Result<Vec<StoredPortfolio>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, name, data, ts FROM portfolios ORDER BY ts DESC, id DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut portfolios = Vec::new();
        for row in rows {
            let (id, name, data, ts) = row?;
            let items: Vec<PortfolioItem> = serde_json::from_str(&data)?;
            portfolios.push(StoredPortfolio {
                id,
                name,
                items,
                ts,
            });
        }
        Ok(portfolios)
    }
}

/// Single-statement upsert, so concurrent increments cannot overwrite each other.
pub fn inc_usage(conn: &Connection, key: &str, amount: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO usage (key, count) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET count = count + excluded.count",
        params![key, amount],
    )?;
    Ok(())
}

pub fn add_bill(conn: &Connection, bill_type: &str, amount: f64, meta: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO bills (type, amount, ts, meta) VALUES (?1, ?2, ?3, ?4)",
        params![bill_type, amount, now(), meta],
    )?;
    Ok(())
}

fn now() -> i64 {
    Utc::now().timestamp()
}
