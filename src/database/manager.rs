use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use duckdb::Connection;
use log::{error, info};

use super::schema::DatabaseSchema;
use crate::error::StoreError;
use crate::types::{format_timestamp, Reading, Sample, StoreRecord};

type RawRow = (i64, f64, f64, f64, String);

pub struct DatabaseManager {
    conn: Connection,
}

impl DatabaseManager {
    pub fn open<P: AsRef<Path>>(path: P, auto_create_dir: bool) -> Result<Self, StoreError> {
        let path = path.as_ref();

        // 确保数据目录存在
        if auto_create_dir {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(e) = fs::create_dir_all(parent) {
                    error!("Failed to create data directory {}: {}", parent.display(), e);
                }
            }
        }

        let conn = Connection::open(path)?;
        info!("Database connection established at: {}", path.display());

        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        DatabaseSchema::create_tables(&conn)?;
        Ok(Self { conn })
    }

    pub fn append(&self, sample: &Sample) -> Result<i64, StoreError> {
        let id: i64 = self
            .conn
            .query_row("SELECT nextval('imu_data_seq')", [], |row| row.get(0))?;

        self.conn.execute(
            "INSERT INTO imu_data (id, ax, ay, az, magnitude, \"timestamp\") VALUES (?, ?, ?, ?, ?, ?)",
            duckdb::params![
                id,
                sample.ax(),
                sample.ay(),
                sample.az(),
                sample.magnitude(),
                format_timestamp(sample.timestamp()),
            ],
        )?;

        Ok(id)
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<StoreRecord>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, ax, ay, az, \"timestamp\" FROM imu_data ORDER BY id DESC LIMIT {}",
            limit
        );
        self.load_records(&sql)
    }

    pub fn all(&self) -> Result<Vec<StoreRecord>, StoreError> {
        self.load_records("SELECT id, ax, ay, az, \"timestamp\" FROM imu_data ORDER BY id")
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM imu_data", [], |row| row.get::<_, i64>(0))?;
        Ok(count as usize)
    }

    fn load_records(&self, sql: &str) -> Result<Vec<StoreRecord>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(into_record(row?)?);
        }

        Ok(records)
    }
}

fn into_record((id, ax, ay, az, timestamp): RawRow) -> Result<StoreRecord, StoreError> {
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| StoreError::CorruptRecord {
            id,
            reason: format!("bad timestamp '{}': {}", timestamp, e),
        })?
        .with_timezone(&Utc);

    Ok(StoreRecord {
        id,
        sample: Sample::new(Reading::new(ax, ay, az), timestamp),
    })
}
