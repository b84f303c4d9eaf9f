//! SQLite storage for the playbook, prediction audit trail, and ledger.
//!
//! The connection is owned behind an async mutex; callers take the guard for
//! the duration of one read or one transaction. Ledger writes (see
//! `ledger.rs`) run inside explicit transactions on the same guard, which
//! serializes them process-wide.
//!
//! Prediction records, weather snapshots, and ledger entries are append-only
//! by convention: no DELETE or UPDATE is ever issued against those tables.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::types::{MsituError, Result};
use crate::weather::WeatherSnapshot;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS counties (
    name        TEXT PRIMARY KEY,
    latitude    REAL NOT NULL,
    longitude   REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS county_environments (
    county           TEXT PRIMARY KEY REFERENCES counties(name),
    rainfall_mm_min  REAL NOT NULL,
    rainfall_mm_max  REAL NOT NULL,
    temperature_c_min REAL NOT NULL,
    temperature_c_max REAL NOT NULL,
    altitude_m_min   REAL NOT NULL,
    altitude_m_max   REAL NOT NULL,
    soil_ph_min      REAL NOT NULL,
    soil_ph_max      REAL NOT NULL,
    soil_type        TEXT NOT NULL,
    climate_zone     TEXT NOT NULL,
    best_season      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS species (
    name               TEXT PRIMARY KEY,
    soil               TEXT NOT NULL,
    rainfall           TEXT NOT NULL,
    temperature        TEXT NOT NULL,
    care_level         TEXT NOT NULL,
    best_season        TEXT NOT NULL,
    planting_method    TEXT NOT NULL,
    water              TEXT NOT NULL,
    base_survival_rate REAL NOT NULL,
    planting_guide     TEXT NOT NULL,
    care_instructions  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS county_species (
    county                TEXT NOT NULL REFERENCES counties(name),
    species               TEXT NOT NULL REFERENCES species(name),
    survival_rate         REAL NOT NULL,
    species_rank          INTEGER NOT NULL,
    match_score           REAL NOT NULL,
    seasonal_performance  TEXT NOT NULL,
    recommendation_reason TEXT NOT NULL,
    PRIMARY KEY (county, species)
);

CREATE TABLE IF NOT EXISTS weather_snapshots (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    latitude     REAL NOT NULL,
    longitude    REAL NOT NULL,
    temperature_c REAL NOT NULL,
    humidity     REAL NOT NULL,
    rain_mm_hour REAL NOT NULL,
    wind_speed   REAL NOT NULL,
    source       TEXT NOT NULL,
    cached       INTEGER NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS predictions (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    user                TEXT,
    tree_species        TEXT NOT NULL,
    county              TEXT NOT NULL,
    planting_season     TEXT NOT NULL,
    planting_method     TEXT NOT NULL,
    care_level          TEXT NOT NULL,
    survival_percentage REAL NOT NULL,
    risk_level          TEXT NOT NULL,
    confidence_level    TEXT NOT NULL,
    model_version       TEXT NOT NULL,
    weather_snapshot_id INTEGER REFERENCES weather_snapshots(id),
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tree_plantings (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    planter         TEXT NOT NULL,
    title           TEXT NOT NULL,
    number_of_trees INTEGER NOT NULL,
    status          TEXT NOT NULL DEFAULT 'planned',
    awarded         INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS reports (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    reporter    TEXT NOT NULL,
    title       TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'new',
    awarded     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ledger_entries (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user        TEXT NOT NULL,
    kind        TEXT NOT NULL,
    amount      REAL NOT NULL,
    description TEXT NOT NULL,
    entity_kind TEXT,
    entity_id   INTEGER,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_user ON ledger_entries(user);

CREATE TABLE IF NOT EXISTS balances (
    user                TEXT PRIMARY KEY,
    points              INTEGER NOT NULL DEFAULT 0,
    total_points_earned INTEGER NOT NULL DEFAULT 0,
    badges              TEXT NOT NULL DEFAULT '[]',
    carbon_balance      REAL NOT NULL DEFAULT 0,
    total_carbon_earned REAL NOT NULL DEFAULT 0,
    carbon_value_kes    REAL NOT NULL DEFAULT 0
);
"#;

/// SQLite-backed store shared by the playbook, recorder, and ledger.
pub struct Database {
    conn: Mutex<Connection>,
}

/// Inputs and computed outputs persisted for one prediction.
#[derive(Debug, Clone)]
pub struct PredictionRecord {
    pub user: Option<String>,
    pub tree_species: String,
    pub county: String,
    pub planting_season: String,
    pub planting_method: String,
    pub care_level: String,
    pub survival_percentage: f64,
    pub risk_level: String,
    pub confidence_level: String,
    pub model_version: String,
}

impl Database {
    /// Open (or create) the database and apply the schema.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| MsituError::Database(format!("failed to open {path}: {e}")))?;
        conn.execute_batch(SCHEMA)?;
        info!(path, "Database ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Take the connection guard. Held for one read or one transaction.
    pub async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    /// Persist a weather snapshot. Best-effort: failures are logged and
    /// reported as `None` so the prediction response is unaffected.
    pub async fn record_snapshot(&self, snapshot: &WeatherSnapshot) -> Option<i64> {
        let conn = self.lock().await;
        let result = conn.execute(
            "INSERT INTO weather_snapshots
             (latitude, longitude, temperature_c, humidity, rain_mm_hour, wind_speed, source, cached, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                snapshot.latitude,
                snapshot.longitude,
                snapshot.temperature_c,
                snapshot.humidity,
                snapshot.rain_mm_hour,
                snapshot.wind_speed,
                snapshot.source,
                snapshot.cached as i64,
                Utc::now().to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Some(conn.last_insert_rowid()),
            Err(e) => {
                warn!(error = %e, "Failed to persist weather snapshot");
                None
            }
        }
    }

    /// Append one immutable prediction record, referencing the snapshot that
    /// informed it when there was one.
    pub async fn record_prediction(
        &self,
        record: &PredictionRecord,
        snapshot_id: Option<i64>,
    ) -> Result<i64> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO predictions
             (user, tree_species, county, planting_season, planting_method, care_level,
              survival_percentage, risk_level, confidence_level, model_version,
              weather_snapshot_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.user,
                record.tree_species,
                record.county,
                record.planting_season,
                record.planting_method,
                record.care_level,
                record.survival_percentage,
                record.risk_level,
                record.confidence_level,
                record.model_version,
                snapshot_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Count of persisted predictions, for tests and status reporting.
    pub async fn prediction_count(&self) -> Result<i64> {
        let conn = self.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Create a tree planting in the `planned` state, returning its id.
    pub async fn create_tree_planting(
        &self,
        planter: &str,
        title: &str,
        number_of_trees: u32,
    ) -> Result<i64> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO tree_plantings (planter, title, number_of_trees, status, created_at)
             VALUES (?1, ?2, ?3, 'planned', ?4)",
            params![planter, title, number_of_trees, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Create an environmental report in the `new` state, returning its id.
    pub async fn create_report(&self, reporter: &str, title: &str) -> Result<i64> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO reports (reporter, title, status, created_at)
             VALUES (?1, ?2, 'new', ?3)",
            params![reporter, title, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Mark a planned planting as planted. Verification goes through the
    /// ledger so the award stays atomic with the transition.
    pub async fn mark_planted(&self, tree_id: i64) -> Result<()> {
        let conn = self.lock().await;
        let changed = conn.execute(
            "UPDATE tree_plantings SET status = 'planted' WHERE id = ?1 AND status = 'planned'",
            params![tree_id],
        )?;
        if changed == 0 {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT id FROM tree_plantings WHERE id = ?1",
                    params![tree_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(MsituError::Database(format!(
                    "tree planting {tree_id} not found"
                )));
            }
        }
        Ok(())
    }

    /// Close out a verified report. Awards stay with verification; resolution
    /// is a plain transition and no-ops unless the report is verified.
    pub async fn resolve_report(&self, report_id: i64) -> Result<()> {
        let conn = self.lock().await;
        let changed = conn.execute(
            "UPDATE reports SET status = 'resolved' WHERE id = ?1 AND status = 'verified'",
            params![report_id],
        )?;
        if changed == 0 {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT id FROM reports WHERE id = ?1",
                    params![report_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(MsituError::Database(format!(
                    "report {report_id} not found"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open(":memory:").unwrap()
    }

    #[tokio::test]
    async fn test_prediction_record_roundtrip() {
        let db = test_db();
        let record = PredictionRecord {
            user: Some("amina".into()),
            tree_species: "Pine".into(),
            county: "Nyeri".into(),
            planting_season: "March-May".into(),
            planting_method: "Seedling".into(),
            care_level: "Medium".into(),
            survival_percentage: 85.0,
            risk_level: "Low".into(),
            confidence_level: "Low".into(),
            model_version: "v2.0.0".into(),
        };
        let id = db.record_prediction(&record, None).await.unwrap();
        assert!(id > 0);
        assert_eq!(db.prediction_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_precedes_prediction() {
        let db = test_db();
        let snapshot = WeatherSnapshot {
            latitude: -0.42,
            longitude: 36.95,
            temperature_c: 18.5,
            humidity: 70.0,
            rain_mm_hour: 0.4,
            wind_speed: 2.0,
            source: "openweather".into(),
            cached: false,
        };
        let snap_id = db.record_snapshot(&snapshot).await;
        assert!(snap_id.is_some());

        let record = PredictionRecord {
            user: None,
            tree_species: "Pine".into(),
            county: "Nyeri".into(),
            planting_season: "March-May".into(),
            planting_method: "Seedling".into(),
            care_level: "Medium".into(),
            survival_percentage: 85.0,
            risk_level: "Low".into(),
            confidence_level: "Medium".into(),
            model_version: "v2.0.0".into(),
        };
        db.record_prediction(&record, snap_id).await.unwrap();

        let conn = db.lock().await;
        let linked: Option<i64> = conn
            .query_row(
                "SELECT weather_snapshot_id FROM predictions LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(linked, snap_id);
    }

    #[tokio::test]
    async fn test_planting_lifecycle() {
        let db = test_db();
        let id = db.create_tree_planting("amina", "Hillside", 12).await.unwrap();
        db.mark_planted(id).await.unwrap();

        let conn = db.lock().await;
        let status: String = conn
            .query_row(
                "SELECT status FROM tree_plantings WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "planted");
    }
}
