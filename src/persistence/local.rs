//! SQLite fallback store.
//!
//! A single append-only `readings` table.  The original columns are kept
//! as-is; optional sensors, phase and status were added later as nullable
//! columns, so [`migrate`] only ever adds columns.  Rows from before the
//! phase/status columns existed are skipped on read.
//!
//! Timestamps are stored as fixed-width UTC RFC 3339 text
//! (`2024-05-01T12:00:00.000000Z`) so string order is time order.  Older
//! rows with naive ISO timestamps are read as UTC.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use log::{debug, info};
use rusqlite::{Connection, Row, params};

use crate::app::ports::ReadingStore;
use crate::error::StoreError;
use crate::model::{GrowthPhase, Reading, Status};
use crate::persistence::ReadingId;

const CREATE_READINGS: &str = "
    CREATE TABLE IF NOT EXISTS readings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        device_id TEXT,
        temperature REAL,
        humidity REAL,
        co2 INTEGER,
        timestamp TEXT,
        server_timestamp TEXT
    )";

/// Columns added after the first schema; never removed or retyped.
const ADDED_COLUMNS: [(&str, &str); 4] = [
    ("light_intensity", "INTEGER"),
    ("water_level", "REAL"),
    ("growth_phase", "TEXT"),
    ("status", "TEXT"),
];

const CREATE_INDEX: &str = "
    CREATE INDEX IF NOT EXISTS idx_readings_device_server_ts
        ON readings (device_id, server_timestamp)";

const SELECT_COLUMNS: &str = "id, device_id, temperature, humidity, co2, light_intensity, \
     water_level, growth_phase, status, timestamp, server_timestamp";

/// CO2 assumed for legacy rows stored without a value.
const LEGACY_CO2_PPM: u32 = 400;

pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!("LocalStore: opened {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(CREATE_READINGS)?;
        migrate(&conn)?;
        conn.execute_batch(CREATE_INDEX)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".into()))
    }

    fn query(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Reading>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, StoredRow::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            let row = row?;
            let id = row.id;
            match row.into_reading() {
                Some(reading) => out.push(reading),
                None => debug!("LocalStore: skipping legacy row {id}"),
            }
        }
        Ok(out)
    }
}

/// Add any missing columns.  Safe to run on every start.
fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let existing = {
        let mut stmt = conn.prepare("PRAGMA table_info(readings)")?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        columns
    };
    for (column, ty) in ADDED_COLUMNS {
        if !existing.iter().any(|c| c == column) {
            conn.execute_batch(&format!("ALTER TABLE readings ADD COLUMN {column} {ty}"))?;
            info!("LocalStore: added column readings.{column}");
        }
    }
    Ok(())
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

/// Raw row, every column nullable as far as SQLite is concerned.
struct StoredRow {
    id: i64,
    device_id: Option<String>,
    temperature: Option<f64>,
    humidity: Option<f64>,
    co2: Option<i64>,
    light_intensity: Option<i64>,
    water_level: Option<f64>,
    growth_phase: Option<String>,
    status: Option<String>,
    timestamp: Option<String>,
    server_timestamp: Option<String>,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            device_id: row.get(1)?,
            temperature: row.get(2)?,
            humidity: row.get(3)?,
            co2: row.get(4)?,
            light_intensity: row.get(5)?,
            water_level: row.get(6)?,
            growth_phase: row.get(7)?,
            status: row.get(8)?,
            timestamp: row.get(9)?,
            server_timestamp: row.get(10)?,
        })
    }

    /// `None` for rows that predate phase/status or are otherwise incomplete.
    fn into_reading(self) -> Option<Reading> {
        let growth_phase = self.growth_phase?.parse::<GrowthPhase>().ok()?;
        let status = self.status?.parse::<Status>().ok()?;
        let server_timestamp = self.server_timestamp.as_deref().and_then(parse_timestamp)?;
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(server_timestamp);
        Some(Reading {
            device_id: self.device_id?,
            timestamp,
            server_timestamp: Some(server_timestamp),
            temperature: self.temperature? as f32,
            humidity: self.humidity? as f32,
            co2: self
                .co2
                .map_or(LEGACY_CO2_PPM, |c| c.clamp(0, i64::from(u32::MAX)) as u32),
            light_intensity: self.light_intensity.map(|l| l.clamp(0, 1000) as u16),
            water_level: self.water_level.map(|w| w as f32),
            growth_phase,
            status,
        })
    }
}

impl ReadingStore for LocalStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn insert(&self, r: &Reading) -> Result<ReadingId, StoreError> {
        let server_ts = r
            .server_timestamp
            .ok_or(StoreError::Invalid("reading has no server timestamp"))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO readings (device_id, temperature, humidity, co2, light_intensity, \
             water_level, growth_phase, status, timestamp, server_timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                r.device_id,
                f64::from(r.temperature),
                f64::from(r.humidity),
                i64::from(r.co2),
                r.light_intensity.map(i64::from),
                r.water_level.map(f64::from),
                r.growth_phase.as_str(),
                r.status.as_str(),
                format_timestamp(r.timestamp),
                format_timestamp(server_ts),
            ],
        )?;
        Ok(ReadingId::Local(conn.last_insert_rowid()))
    }

    fn latest(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM readings WHERE device_id = ?1 \
             ORDER BY server_timestamp DESC, id DESC LIMIT ?2"
        );
        self.query(&sql, params![device_id, limit as i64])
    }

    fn since(
        &self,
        device_id: &str,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM readings WHERE device_id = ?1 \
             AND server_timestamp >= ?2 ORDER BY server_timestamp DESC, id DESC LIMIT ?3"
        );
        self.query(&sql, params![device_id, format_timestamp(cutoff), limit as i64])
    }

    fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}
