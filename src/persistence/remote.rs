//! MongoDB primary store.
//!
//! Documents live in `<database>.<collection>` (default `sensor_db.readings`).
//! `server_timestamp` is a BSON date so range queries and sorting happen on
//! the server; `timestamp` keeps the sample time as ISO text.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use log::info;
use mongodb::bson::{DateTime as BsonDateTime, doc, oid::ObjectId};
use mongodb::options::FindOptions;
use mongodb::sync::{Client, Collection, Cursor};
use serde::{Deserialize, Serialize};

use crate::app::ports::ReadingStore;
use crate::error::StoreError;
use crate::model::{GrowthPhase, Reading, Status};
use crate::persistence::ReadingId;
use crate::persistence::local::{format_timestamp, parse_timestamp};

/// Stored document shape.  Optional fields tolerate documents written
/// before those sensors existed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ReadingDocument {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    device_id: String,
    temperature: f64,
    humidity: f64,
    co2: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    light_intensity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    water_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    growth_phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    timestamp: String,
    server_timestamp: BsonDateTime,
}

impl ReadingDocument {
    fn from_reading(r: &Reading, server_ts: DateTime<Utc>) -> Self {
        Self {
            id: None,
            device_id: r.device_id.clone(),
            temperature: f64::from(r.temperature),
            humidity: f64::from(r.humidity),
            co2: i64::from(r.co2),
            light_intensity: r.light_intensity.map(f64::from),
            water_level: r.water_level.map(f64::from),
            growth_phase: Some(r.growth_phase.as_str().to_string()),
            status: Some(r.status.as_str().to_string()),
            timestamp: format_timestamp(r.timestamp),
            server_timestamp: BsonDateTime::from_millis(server_ts.timestamp_millis()),
        }
    }

    /// `None` for documents missing phase or status.
    fn into_reading(self) -> Option<Reading> {
        let growth_phase = self.growth_phase?.parse::<GrowthPhase>().ok()?;
        let status = self.status?.parse::<Status>().ok()?;
        let server_timestamp = Utc
            .timestamp_millis_opt(self.server_timestamp.timestamp_millis())
            .single()?;
        Some(Reading {
            device_id: self.device_id,
            timestamp: parse_timestamp(&self.timestamp).unwrap_or(server_timestamp),
            server_timestamp: Some(server_timestamp),
            temperature: self.temperature as f32,
            humidity: self.humidity as f32,
            co2: self.co2.clamp(0, i64::from(u32::MAX)) as u32,
            light_intensity: self
                .light_intensity
                .map(|l| l.round().clamp(0.0, 1000.0) as u16),
            water_level: self.water_level.map(|w| w as f32),
            growth_phase,
            status,
        })
    }
}

/// Add the connect/selection timeouts to a connection string unless the
/// caller already set them.
pub fn with_timeouts(uri: &str, timeout: Duration) -> String {
    let ms = timeout.as_millis();
    let mut out = uri.to_string();
    for key in ["serverSelectionTimeoutMS", "connectTimeoutMS"] {
        if out.contains(&format!("{key}=")) {
            continue;
        }
        let sep = if out.contains('?') {
            "&"
        } else {
            let after_scheme = out.split_once("://").map_or(out.as_str(), |(_, rest)| rest);
            if after_scheme.contains('/') { "?" } else { "/?" }
        };
        out.push_str(&format!("{sep}{key}={ms}"));
    }
    out
}

/// Sort spec matching the SQLite store: server time, then insertion order.
fn newest_first() -> mongodb::bson::Document {
    doc! { "server_timestamp": -1, "_id": -1 }
}

pub struct RemoteStore {
    client: Client,
    collection: Collection<ReadingDocument>,
}

impl RemoteStore {
    /// Create the client.  Server discovery runs in the background; use
    /// [`ReadingStore::ping`] to check reachability.
    pub fn connect(
        uri: &str,
        database: &str,
        collection: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(with_timeouts(uri, timeout))?;
        let collection = client.database(database).collection(collection);
        info!("RemoteStore: client for {database}.{} created", collection.name());
        Ok(Self { client, collection })
    }

    fn find(
        &self,
        filter: mongodb::bson::Document,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError> {
        let options = FindOptions::builder()
            .sort(newest_first())
            .limit(limit as i64)
            .build();
        let cursor: Cursor<ReadingDocument> = self.collection.find(filter, options)?;
        let mut out = Vec::new();
        for document in cursor {
            let document = document.map_err(|e| StoreError::Decode(e.to_string()))?;
            if let Some(reading) = document.into_reading() {
                out.push(reading);
            }
        }
        Ok(out)
    }
}

impl ReadingStore for RemoteStore {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    fn insert(&self, r: &Reading) -> Result<ReadingId, StoreError> {
        let server_ts = r
            .server_timestamp
            .ok_or(StoreError::Invalid("reading has no server timestamp"))?;
        let result = self
            .collection
            .insert_one(ReadingDocument::from_reading(r, server_ts), None)?;
        let id = result
            .inserted_id
            .as_object_id()
            .map_or_else(|| result.inserted_id.to_string(), |oid| oid.to_hex());
        Ok(ReadingId::Remote(id))
    }

    fn latest(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError> {
        self.find(doc! { "device_id": device_id }, limit)
    }

    fn since(
        &self,
        device_id: &str,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError> {
        let cutoff = BsonDateTime::from_millis(cutoff.timestamp_millis());
        self.find(
            doc! { "device_id": device_id, "server_timestamp": { "$gte": cutoff } },
            limit,
        )
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)?;
        Ok(())
    }
}
