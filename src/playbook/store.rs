//! Read-only playbook store backed by SQLite with an in-memory snapshot.
//!
//! The snapshot is rebuilt on load and on administrative reseed; concurrent
//! readers share it without coordination.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use tracing::info;

use crate::db::Database;
use crate::types::{MsituError, Result};

/// A county with its geographic centroid.
#[derive(Debug, Clone, Serialize)]
pub struct County {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Environmental profile of a county (1:1 with County).
#[derive(Debug, Clone, Serialize)]
pub struct CountyEnvironment {
    pub county: String,
    pub rainfall_mm_min: f64,
    pub rainfall_mm_max: f64,
    pub temperature_c_min: f64,
    pub temperature_c_max: f64,
    pub altitude_m_min: f64,
    pub altitude_m_max: f64,
    pub soil_ph_min: f64,
    pub soil_ph_max: f64,
    pub soil_type: String,
    pub climate_zone: String,
    pub best_season: String,
}

impl CountyEnvironment {
    pub fn avg_rainfall(&self) -> f64 {
        (self.rainfall_mm_min + self.rainfall_mm_max) / 2.0
    }

    pub fn avg_temperature(&self) -> f64 {
        (self.temperature_c_min + self.temperature_c_max) / 2.0
    }

    pub fn avg_altitude(&self) -> f64 {
        (self.altitude_m_min + self.altitude_m_max) / 2.0
    }
}

/// Qualitative species profile plus its planting/care guides.
#[derive(Debug, Clone, Serialize)]
pub struct Species {
    pub name: String,
    pub soil: String,
    pub rainfall: String,
    pub temperature: String,
    pub care_level: String,
    pub best_season: String,
    pub planting_method: String,
    pub water: String,
    pub base_survival_rate: f64,
    pub planting_guide: Vec<String>,
    pub care_instructions: Vec<String>,
}

/// Per-(county, species) compatibility record.
///
/// `seasonal_performance` keeps its curated order: the first key whose months
/// overlap the requested season supplies the bonus.
#[derive(Debug, Clone, Serialize)]
pub struct Compatibility {
    pub county: String,
    pub species: String,
    pub survival_rate: f64,
    pub species_rank: i64,
    pub match_score: f64,
    pub seasonal_performance: Vec<(String, f64)>,
    pub recommendation_reason: String,
}

#[derive(Default)]
struct Snapshot {
    counties: Vec<County>,
    environments: HashMap<String, CountyEnvironment>,
    species: HashMap<String, Species>,
    compatibility: HashMap<(String, String), Compatibility>,
}

/// In-memory view over the seeded playbook tables.
pub struct PlaybookStore {
    snapshot: RwLock<Snapshot>,
}

impl PlaybookStore {
    /// Build the store from the database, loading the full snapshot.
    pub async fn load(db: &Database) -> Result<Self> {
        let store = PlaybookStore {
            snapshot: RwLock::new(Snapshot::default()),
        };
        store.reload(db).await?;
        Ok(store)
    }

    /// Rebuild the in-memory snapshot (called after an administrative reseed).
    pub async fn reload(&self, db: &Database) -> Result<()> {
        let conn = db.lock().await;

        let mut counties = Vec::new();
        {
            let mut stmt = conn.prepare("SELECT name, latitude, longitude FROM counties")?;
            let rows = stmt.query_map([], |row| {
                Ok(County {
                    name: row.get(0)?,
                    latitude: row.get(1)?,
                    longitude: row.get(2)?,
                })
            })?;
            for row in rows {
                counties.push(row?);
            }
        }

        let mut environments = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT county, rainfall_mm_min, rainfall_mm_max, temperature_c_min,
                        temperature_c_max, altitude_m_min, altitude_m_max, soil_ph_min,
                        soil_ph_max, soil_type, climate_zone, best_season
                 FROM county_environments",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(CountyEnvironment {
                    county: row.get(0)?,
                    rainfall_mm_min: row.get(1)?,
                    rainfall_mm_max: row.get(2)?,
                    temperature_c_min: row.get(3)?,
                    temperature_c_max: row.get(4)?,
                    altitude_m_min: row.get(5)?,
                    altitude_m_max: row.get(6)?,
                    soil_ph_min: row.get(7)?,
                    soil_ph_max: row.get(8)?,
                    soil_type: row.get(9)?,
                    climate_zone: row.get(10)?,
                    best_season: row.get(11)?,
                })
            })?;
            for row in rows {
                let env = row?;
                environments.insert(env.county.clone(), env);
            }
        }

        let mut species = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT name, soil, rainfall, temperature, care_level, best_season,
                        planting_method, water, base_survival_rate, planting_guide,
                        care_instructions
                 FROM species",
            )?;
            let rows = stmt.query_map([], |row| {
                let guide_json: String = row.get(9)?;
                let care_json: String = row.get(10)?;
                Ok(Species {
                    name: row.get(0)?,
                    soil: row.get(1)?,
                    rainfall: row.get(2)?,
                    temperature: row.get(3)?,
                    care_level: row.get(4)?,
                    best_season: row.get(5)?,
                    planting_method: row.get(6)?,
                    water: row.get(7)?,
                    base_survival_rate: row.get(8)?,
                    planting_guide: serde_json::from_str(&guide_json).unwrap_or_default(),
                    care_instructions: serde_json::from_str(&care_json).unwrap_or_default(),
                })
            })?;
            for row in rows {
                let sp = row?;
                species.insert(sp.name.clone(), sp);
            }
        }

        let mut compatibility = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT county, species, survival_rate, species_rank, match_score,
                        seasonal_performance, recommendation_reason
                 FROM county_species",
            )?;
            let rows = stmt.query_map([], |row| {
                let seasonal_json: String = row.get(5)?;
                Ok(Compatibility {
                    county: row.get(0)?,
                    species: row.get(1)?,
                    survival_rate: row.get(2)?,
                    species_rank: row.get(3)?,
                    match_score: row.get(4)?,
                    seasonal_performance: serde_json::from_str(&seasonal_json)
                        .unwrap_or_default(),
                    recommendation_reason: row.get(6)?,
                })
            })?;
            for row in rows {
                let compat = row?;
                compatibility.insert((compat.county.clone(), compat.species.clone()), compat);
            }
        }

        info!(
            counties = counties.len(),
            species = species.len(),
            compatibility = compatibility.len(),
            "Playbook snapshot loaded"
        );

        let mut snapshot = self.snapshot.write().expect("playbook lock poisoned");
        *snapshot = Snapshot {
            counties,
            environments,
            species,
            compatibility,
        };
        Ok(())
    }

    pub fn get_environment(&self, county: &str) -> Result<CountyEnvironment> {
        let snapshot = self.snapshot.read().expect("playbook lock poisoned");
        snapshot
            .environments
            .get(county.trim())
            .cloned()
            .ok_or_else(|| MsituError::CountyNotFound(county.trim().to_string()))
    }

    pub fn get_species(&self, name: &str) -> Result<Species> {
        let snapshot = self.snapshot.read().expect("playbook lock poisoned");
        snapshot
            .species
            .get(name.trim())
            .cloned()
            .ok_or_else(|| MsituError::SpeciesNotFound(name.trim().to_string()))
    }

    pub fn get_compatibility(&self, county: &str, species: &str) -> Result<Compatibility> {
        let snapshot = self.snapshot.read().expect("playbook lock poisoned");
        snapshot
            .compatibility
            .get(&(county.trim().to_string(), species.trim().to_string()))
            .cloned()
            .ok_or_else(|| MsituError::NotRecommended {
                species: species.trim().to_string(),
                county: county.trim().to_string(),
            })
    }

    /// Compatibility records for a county at or above `min_survival`,
    /// descending by survival rate.
    pub fn list_compatible(&self, county: &str, min_survival: f64) -> Vec<Compatibility> {
        let snapshot = self.snapshot.read().expect("playbook lock poisoned");
        let mut matches: Vec<Compatibility> = snapshot
            .compatibility
            .values()
            .filter(|c| c.county == county.trim() && c.survival_rate >= min_survival)
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.survival_rate
                .partial_cmp(&a.survival_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.species.cmp(&b.species))
        });
        matches
    }

    /// A county with its centroid.
    pub fn get_county(&self, name: &str) -> Result<County> {
        let snapshot = self.snapshot.read().expect("playbook lock poisoned");
        snapshot
            .counties
            .iter()
            .find(|c| c.name == name.trim())
            .cloned()
            .ok_or_else(|| MsituError::CountyNotFound(name.trim().to_string()))
    }

    /// All seeded counties with centroids.
    pub fn counties(&self) -> Vec<County> {
        let snapshot = self.snapshot.read().expect("playbook lock poisoned");
        snapshot.counties.clone()
    }
}
