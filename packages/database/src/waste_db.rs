//! `DuckDB` waste storage.
//!
//! A single `DuckDB` file (by default `data/wastes.duckdb`) holds a
//! `wastes` table keyed by the feed id and an append-only `update_logs`
//! table. Timestamps are stored as UTC `TIMESTAMP` values with microsecond
//! precision.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use duckdb::Connection;
use tisza_map_waste_models::{
    RiverAssignment, UpdateLog, WasteCountry, WastePoint, WasteSize, WasteStatus, WasteType,
};

use crate::{DbError, WasteStore};

/// Maximum ids per `DELETE ... IN (...)` statement.
const DELETE_CHUNK_SIZE: usize = 1_000;

const SELECT_COLUMNS: &str = "id, latitude, longitude, country, locality, sublocality, \
     size, status, types, created_at::TEXT, updated_at::TEXT, image_url, note, hidden, river";

const UPSERT_SQL: &str = "INSERT INTO wastes (
        id, latitude, longitude, country, locality, sublocality, size, status,
        types, created_at, updated_at, image_url, note, hidden, river
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (id) DO UPDATE SET
        latitude = EXCLUDED.latitude,
        longitude = EXCLUDED.longitude,
        country = EXCLUDED.country,
        locality = EXCLUDED.locality,
        sublocality = EXCLUDED.sublocality,
        size = EXCLUDED.size,
        status = EXCLUDED.status,
        types = EXCLUDED.types,
        created_at = EXCLUDED.created_at,
        updated_at = EXCLUDED.updated_at,
        image_url = EXCLUDED.image_url,
        note = EXCLUDED.note,
        hidden = EXCLUDED.hidden,
        river = EXCLUDED.river";

/// [`WasteStore`] backed by a `DuckDB` connection.
pub struct DuckDbWasteStore {
    conn: Mutex<Connection>,
}

impl DuckDbWasteStore {
    /// Opens (or creates) a waste database and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;
        log::debug!("Opened waste database at {}", path.display());
        Self::from_connection(conn)
    }

    /// Opens a throwaway in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS wastes (
            id BIGINT NOT NULL PRIMARY KEY,
            latitude DOUBLE NOT NULL,
            longitude DOUBLE NOT NULL,
            country TEXT,
            locality TEXT,
            sublocality TEXT,
            size TEXT NOT NULL,
            status TEXT NOT NULL,
            types TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            image_url TEXT,
            note TEXT,
            hidden BOOLEAN NOT NULL DEFAULT FALSE,
            river TEXT
        );

        CREATE SEQUENCE IF NOT EXISTS update_logs_id_seq START 1;

        CREATE TABLE IF NOT EXISTS update_logs (
            id BIGINT NOT NULL PRIMARY KEY,
            update_time TIMESTAMP NOT NULL,
            update_count BIGINT NOT NULL,
            delete_count BIGINT NOT NULL,
            total_count BIGINT NOT NULL
        );",
    )?;

    Ok(())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Parses a `DuckDB` timestamp text representation into a UTC `DateTime`.
///
/// `DuckDB`'s `::TEXT` cast omits the fractional part when it is zero and
/// appends an offset for `TIMESTAMPTZ` columns, so all of these occur:
/// - `2024-01-15 10:30:00`
/// - `2024-01-15 10:30:00.123456`
/// - `2024-01-15 10:30:00+0000`
/// - `2024-01-15 10:30:00.123456+0000`
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    use chrono::NaiveDateTime;

    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }

    log::warn!("Failed to parse timestamp: {s:?}");
    None
}

fn encode_types(point: &WastePoint) -> String {
    point
        .types
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(",")
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Raw column values of one `wastes` row.
struct WasteRow {
    id: i64,
    latitude: f64,
    longitude: f64,
    country: Option<String>,
    locality: Option<String>,
    sublocality: Option<String>,
    size: String,
    status: String,
    types: String,
    created_at: String,
    updated_at: String,
    image_url: Option<String>,
    note: Option<String>,
    hidden: bool,
    river: Option<String>,
}

impl WasteRow {
    fn read(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            country: row.get(3)?,
            locality: row.get(4)?,
            sublocality: row.get(5)?,
            size: row.get(6)?,
            status: row.get(7)?,
            types: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            image_url: row.get(11)?,
            note: row.get(12)?,
            hidden: row.get(13)?,
            river: row.get(14)?,
        })
    }

    fn into_point(self) -> Result<WastePoint, DbError> {
        let id = self.id;
        let conversion = |field: &str, value: &str| DbError::Conversion {
            message: format!("waste {id}: invalid {field} {value:?}"),
        };

        let country = self
            .country
            .map(|c| WasteCountry::from_str(&c).map_err(|_| conversion("country", &c)))
            .transpose()?;
        let size = WasteSize::from_str(&self.size).map_err(|_| conversion("size", &self.size))?;
        let status =
            WasteStatus::from_str(&self.status).map_err(|_| conversion("status", &self.status))?;
        let types = self
            .types
            .split(',')
            .filter(|t| !t.is_empty())
            .map(|t| WasteType::from_str(t).map_err(|_| conversion("type", t)))
            .collect::<Result<_, _>>()?;
        let created_at = parse_timestamp(&self.created_at)
            .ok_or_else(|| conversion("created_at", &self.created_at))?;
        let updated_at = parse_timestamp(&self.updated_at)
            .ok_or_else(|| conversion("updated_at", &self.updated_at))?;

        Ok(WastePoint {
            id,
            latitude: self.latitude,
            longitude: self.longitude,
            country,
            locality: self.locality,
            sublocality: self.sublocality,
            size,
            status,
            types,
            created_at,
            updated_at,
            image_url: self.image_url,
            note: self.note,
            hidden: self.hidden,
            river: RiverAssignment::from_column(self.river),
        })
    }
}

fn query_points(
    conn: &Connection,
    filter: &str,
    params: &[&dyn duckdb::ToSql],
) -> Result<Vec<WastePoint>, DbError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM wastes {filter} ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, WasteRow::read)?;

    rows.map(|row| row.map_err(DbError::from).and_then(WasteRow::into_point))
        .collect()
}

fn upsert(conn: &Connection, point: &WastePoint) -> Result<(), DbError> {
    conn.execute(
        UPSERT_SQL,
        duckdb::params![
            point.id,
            point.latitude,
            point.longitude,
            point.country.as_ref().map(AsRef::<str>::as_ref),
            point.locality.as_deref(),
            point.sublocality.as_deref(),
            point.size.as_ref(),
            point.status.as_ref(),
            encode_types(point),
            format_timestamp(&point.created_at),
            format_timestamp(&point.updated_at),
            point.image_url.as_deref(),
            point.note.as_deref(),
            point.hidden,
            point.river.to_column(),
        ],
    )?;
    Ok(())
}

impl WasteStore for DuckDbWasteStore {
    fn get(&self, id: i64) -> Result<Option<WastePoint>, DbError> {
        let conn = self.conn()?;
        let mut points = query_points(&conn, "WHERE id = ?", duckdb::params![id])?;
        Ok(points.pop())
    }

    fn save(&self, point: &WastePoint) -> Result<(), DbError> {
        let conn = self.conn()?;
        upsert(&conn, point)
    }

    fn save_all(&self, points: &[WastePoint]) -> Result<u64, DbError> {
        if points.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for point in points {
            upsert(&tx, point)?;
        }
        tx.commit()?;

        Ok(points.len() as u64)
    }

    fn delete(&self, id: i64) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM wastes WHERE id = ?", duckdb::params![id])?;
        Ok(rows > 0)
    }

    fn delete_many(&self, ids: &[i64]) -> Result<u64, DbError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let conn = self.conn()?;
        let mut total = 0u64;

        for chunk in ids.chunks(DELETE_CHUNK_SIZE) {
            let placeholders: String = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let sql = format!("DELETE FROM wastes WHERE id IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;

            for (i, id) in chunk.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, id)?;
            }

            let rows = stmt.raw_execute()?;
            total += u64::try_from(rows).unwrap_or(0);
        }

        Ok(total)
    }

    fn find_all(&self) -> Result<Vec<WastePoint>, DbError> {
        let conn = self.conn()?;
        query_points(&conn, "", duckdb::params![])
    }

    fn find_unenriched(&self) -> Result<Vec<WastePoint>, DbError> {
        let conn = self.conn()?;
        query_points(&conn, "WHERE river IS NULL", duckdb::params![])
    }

    fn find_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<WastePoint>, DbError> {
        let conn = self.conn()?;
        query_points(
            &conn,
            "WHERE updated_at < CAST(? AS TIMESTAMP)",
            duckdb::params![format_timestamp(&cutoff)],
        )
    }

    fn count(&self) -> Result<u64, DbError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM wastes", [], |row| row.get(0))?;
        Ok(to_u64(count))
    }

    fn record_update_log(&self, log: &UpdateLog) -> Result<UpdateLog, DbError> {
        let conn = self.conn()?;
        let id: i64 = conn.query_row("SELECT nextval('update_logs_id_seq')", [], |row| {
            row.get(0)
        })?;

        conn.execute(
            "INSERT INTO update_logs (id, update_time, update_count, delete_count, total_count)
             VALUES (?, ?, ?, ?, ?)",
            duckdb::params![
                id,
                format_timestamp(&log.update_time),
                to_i64(log.update_count),
                to_i64(log.delete_count),
                to_i64(log.total_count),
            ],
        )?;

        Ok(UpdateLog {
            id: Some(id),
            ..log.clone()
        })
    }

    fn recent_update_logs(&self, limit: usize) -> Result<Vec<UpdateLog>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, update_time::TEXT, update_count, delete_count, total_count
             FROM update_logs
             ORDER BY update_time DESC, id DESC
             LIMIT ?",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(duckdb::params![limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        rows.map(|row| -> Result<UpdateLog, DbError> {
            let (id, update_time, update_count, delete_count, total_count) = row?;
            let update_time = parse_timestamp(&update_time).ok_or_else(|| DbError::Conversion {
                message: format!("update log {id}: invalid update_time {update_time:?}"),
            })?;

            Ok(UpdateLog {
                id: Some(id),
                update_time,
                update_count: to_u64(update_count),
                delete_count: to_u64(delete_count),
                total_count: to_u64(total_count),
            })
        })
        .collect()
    }
}
