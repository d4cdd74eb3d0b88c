// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Spool history storage using SQLite.

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of spools kept before the oldest are pruned.
pub const DEFAULT_MAX_ENTRIES: u32 = 10_000;

/// One written spool.
#[derive(Debug, Clone, PartialEq)]
pub struct SpoolRecord {
    pub id: i64,
    pub serial: String,
    pub material_id: String,
    pub material_name: String,
    pub length_m: u16,
    pub weight_grams: u32,
    /// RGB hex without `#`.
    pub color: String,
    /// Encoded 48-character tag record.
    pub record: String,
    pub written_at: DateTime<Utc>,
}

impl SpoolRecord {
    /// A record stamped with the current time, not yet stored.
    pub fn new(
        serial: impl Into<String>,
        material_id: impl Into<String>,
        material_name: impl Into<String>,
        length_m: u16,
        weight_grams: u32,
        color: impl Into<String>,
        record: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            serial: serial.into(),
            material_id: material_id.into(),
            material_name: material_name.into(),
            length_m,
            weight_grams,
            color: color.into(),
            record: record.into(),
            written_at: Utc::now(),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let written_at: i64 = row.get(8)?;
        Ok(Self {
            id: row.get(0)?,
            serial: row.get(1)?,
            material_id: row.get(2)?,
            material_name: row.get(3)?,
            length_m: row.get(4)?,
            weight_grams: row.get(5)?,
            color: row.get(6)?,
            record: row.get(7)?,
            written_at: DateTime::from_timestamp(written_at, 0).unwrap_or_default(),
        })
    }
}

const COLUMNS: &str =
    "id, serial, material_id, material_name, length_m, weight_grams, color, record, written_at";

/// Spool history database.
#[derive(Clone)]
pub struct SpoolHistory {
    conn: Arc<Mutex<Connection>>,
    max_entries: u32,
}

impl SpoolHistory {
    /// Create or open `spools.db` in the data directory.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("spools.db");
        info!("Opening spool history: {:?}", db_path);

        Self::with_connection(Connection::open(&db_path)?)
    }

    /// History that lives only as long as the process.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS spools (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                serial TEXT NOT NULL,
                material_id TEXT NOT NULL,
                material_name TEXT NOT NULL,
                length_m INTEGER NOT NULL,
                weight_grams INTEGER NOT NULL,
                color TEXT NOT NULL,
                record TEXT NOT NULL,
                written_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_spools_serial ON spools(serial)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_entries: DEFAULT_MAX_ENTRIES,
        })
    }

    /// Set maximum number of spools to keep.
    pub fn set_max_entries(&mut self, max: u32) {
        self.max_entries = max;
    }

    /// Store a written spool and prune the oldest beyond the limit.
    pub fn add_spool(&self, spool: &SpoolRecord) -> Result<i64> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO spools (serial, material_id, material_name, length_m, weight_grams, color, record, written_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                spool.serial,
                spool.material_id,
                spool.material_name,
                spool.length_m,
                spool.weight_grams,
                spool.color,
                spool.record,
                spool.written_at.timestamp(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Recorded spool {} (row {})", spool.serial, id);

        self.cleanup_old_entries(&conn)?;
        Ok(id)
    }

    /// Most recent spools first.
    pub fn recent(&self, limit: u32) -> Result<Vec<SpoolRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM spools ORDER BY written_at DESC, id DESC LIMIT ?1",
            COLUMNS
        ))?;

        let spools = stmt
            .query_map([limit], SpoolRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(spools)
    }

    /// Every write of a serial, newest first. Custom serials may repeat.
    pub fn find_by_serial(&self, serial: &str) -> Result<Vec<SpoolRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM spools WHERE serial = ?1 ORDER BY written_at DESC, id DESC",
            COLUMNS
        ))?;

        let spools = stmt
            .query_map([serial], SpoolRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(spools)
    }

    /// Total stored spools.
    pub fn count(&self) -> Result<u32> {
        let conn = self.conn.lock();
        let count: u32 = conn.query_row("SELECT COUNT(*) FROM spools", [], |row| row.get(0))?;
        Ok(count)
    }

    fn cleanup_old_entries(&self, conn: &Connection) -> Result<()> {
        let removed = conn.execute(
            "DELETE FROM spools WHERE id NOT IN (
                SELECT id FROM spools ORDER BY written_at DESC, id DESC LIMIT ?1
            )",
            [self.max_entries],
        )?;
        if removed > 0 {
            debug!("Pruned {} old spools", removed);
        }
        Ok(())
    }
}
