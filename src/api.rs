//! Core API surface: request/response DTOs, validation, and the composition
//! root that owns every component.
//!
//! The HTTP/HTML layer is a thin adapter elsewhere; everything here is plain
//! values in and plain values out.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classifier::Classifier;
use crate::config::Config;
use crate::db::Database;
use crate::engine::{Engine, Prediction, PredictionInput};
use crate::ledger::{Actor, Ledger, TransactionResult, TransactionType, UserBalances, VerificationResult};
use crate::llm::LlmClient;
use crate::playbook::{self, PlaybookStore};
use crate::types::{CareLevel, MsituError, Result, RiskLevel};
use crate::weather::WeatherService;

/// Prediction request, all fields required.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionRequest {
    pub tree_species: Option<String>,
    pub county: Option<String>,
    pub planting_season: Option<String>,
    pub planting_method: Option<String>,
    pub care_level: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub success: bool,
    #[serde(flatten)]
    pub prediction: Prediction,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountyDetectionResponse {
    pub success: bool,
    pub county: String,
    pub note: String,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// One ranked entry in a species recommendation.
#[derive(Debug, Clone, Serialize)]
pub struct SpeciesScore {
    pub species: String,
    pub survival_rate: f64,
    pub risk_level: String,
}

/// Planting guide surfaced per recommended species.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybookGuide {
    pub planting_guide: Vec<String>,
    pub best_month: String,
    pub soil: String,
    pub rainfall_mm: String,
    pub temperature_c: String,
    pub care_instructions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeciesRecommendationResponse {
    pub success: bool,
    pub species: Vec<SpeciesScore>,
    pub playbook: BTreeMap<String, PlaybookGuide>,
}

/// Top-level composition root. Construction is fallible; optional providers
/// (weather, classifier, LLM) capture their failures as
/// permanently-unavailable flags instead of erroring.
pub struct AppState {
    pub playbook: Arc<PlaybookStore>,
    pub engine: Engine,
    pub ledger: Ledger,
    pub db: Arc<Database>,
}

impl AppState {
    pub async fn new(config: &Config) -> Result<Self> {
        let db = Arc::new(Database::open(&config.database_path)?);
        let playbook = Arc::new(PlaybookStore::load(&db).await?);
        let weather = Arc::new(WeatherService::new(
            config.weather_api_key.clone(),
            config.weather_api_url.clone(),
            config.weather_cache_ttl_s,
        ));
        let classifier = Arc::new(Classifier::load(&config.model_path));
        let llm = Arc::new(LlmClient::new(
            config.llm_api_key.clone(),
            config.llm_api_url.clone(),
            config.llm_model.clone(),
            config.llm_timeout_ms,
        ));

        info!(
            ml_available = classifier.available(),
            llm_enabled = llm.enabled(),
            weather_enabled = config.weather_api_key.is_some(),
            "Engine components constructed"
        );

        let engine = Engine::new(
            Arc::clone(&playbook),
            weather,
            classifier,
            llm,
            Arc::clone(&db),
            config.model_version.clone(),
        );
        let ledger = Ledger::new(Arc::clone(&db));

        Ok(AppState {
            playbook,
            engine,
            ledger,
            db,
        })
    }

    /// Load (or refresh) the playbook seed and rebuild the store snapshot.
    pub async fn seed(&self) -> Result<()> {
        playbook::seed(&self.db).await?;
        self.playbook.reload(&self.db).await
    }

    /// Predict survival for a planting proposal.
    pub async fn predict_survival(&self, request: &PredictionRequest) -> Result<PredictionResponse> {
        let input = validate(request)?;
        let prediction = self.engine.predict(&input).await?;
        Ok(PredictionResponse {
            success: true,
            prediction,
        })
    }

    /// Ranked species for a county, with their playbook guides.
    pub fn recommend_species(
        &self,
        county: &str,
        min_survival: f64,
    ) -> Result<SpeciesRecommendationResponse> {
        // Resolve the county first so an unknown name is a clear error.
        self.playbook.get_environment(county)?;

        let compatible = self.playbook.list_compatible(county, min_survival);
        let mut species = Vec::new();
        let mut guides = BTreeMap::new();
        for compat in &compatible {
            species.push(SpeciesScore {
                species: compat.species.clone(),
                survival_rate: compat.survival_rate,
                risk_level: RiskLevel::from_survival(compat.survival_rate)
                    .as_str()
                    .to_string(),
            });
            if let Ok(profile) = self.playbook.get_species(&compat.species) {
                guides.insert(
                    compat.species.clone(),
                    PlaybookGuide {
                        planting_guide: profile.planting_guide,
                        best_month: profile.best_season,
                        soil: profile.soil,
                        rainfall_mm: profile.rainfall,
                        temperature_c: profile.temperature,
                        care_instructions: profile.care_instructions,
                    },
                );
            }
        }

        Ok(SpeciesRecommendationResponse {
            success: true,
            species,
            playbook: guides,
        })
    }

    /// Nearest county by centroid distance.
    pub fn detect_county(&self, lat: f64, lon: f64) -> Result<CountyDetectionResponse> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(MsituError::Validation(format!(
                "coordinates out of range: {lat}, {lon}"
            )));
        }

        let counties = self.playbook.counties();
        let nearest = counties
            .iter()
            .min_by(|a, b| {
                let da = haversine_km(lat, lon, a.latitude, a.longitude);
                let db = haversine_km(lat, lon, b.latitude, b.longitude);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or_else(|| MsituError::Validation("no counties seeded".to_string()))?;

        Ok(CountyDetectionResponse {
            success: true,
            county: nearest.name.clone(),
            note: "Suggested county based on approximate location. Please confirm.".to_string(),
            coordinates: Coordinates { lat, lon },
        })
    }

    pub async fn verify_tree(&self, tree_id: i64, actor: &Actor) -> Result<VerificationResult> {
        self.ledger.verify_tree(tree_id, actor).await
    }

    pub async fn verify_report(&self, report_id: i64, actor: &Actor) -> Result<VerificationResult> {
        self.ledger.verify_report(report_id, actor).await
    }

    pub async fn marketplace_transact(
        &self,
        user: &str,
        kind: TransactionType,
        amount: f64,
    ) -> Result<TransactionResult> {
        self.ledger.transact(user, kind, amount).await
    }

    pub async fn balances(&self, user: &str) -> Result<UserBalances> {
        self.ledger.balances(user).await
    }
}

fn validate(request: &PredictionRequest) -> Result<PredictionInput> {
    let tree_species = required(&request.tree_species, "tree_species")?;
    let county = required(&request.county, "county")?;
    let planting_season = required(&request.planting_season, "planting_season")?;
    let planting_method = required(&request.planting_method, "planting_method")?;
    let care_raw = required(&request.care_level, "care_level")?;
    let care_level = CareLevel::parse(&care_raw)?;

    Ok(PredictionInput {
        tree_species,
        county,
        planting_season,
        planting_method,
        care_level,
        user: request.user.clone(),
    })
}

fn required(field: &Option<String>, name: &str) -> Result<String> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(MsituError::Validation(format!("missing field '{name}'"))),
    }
}

/// Great-circle distance between two coordinates, in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // Nairobi to Mombasa is roughly 440 km
        let d = haversine_km(-1.2921, 36.8219, -4.0435, 39.6682);
        assert!((400.0..500.0).contains(&d), "got {d}");
        assert_eq!(haversine_km(0.0, 0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let request = PredictionRequest {
            tree_species: Some("Pine".into()),
            county: None,
            planting_season: Some("March-May".into()),
            planting_method: Some("Seedling".into()),
            care_level: Some("Medium".into()),
            user: None,
        };
        assert!(matches!(
            validate(&request),
            Err(MsituError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_trims_and_parses() {
        let request = PredictionRequest {
            tree_species: Some(" Pine ".into()),
            county: Some("Nyeri".into()),
            planting_season: Some("March-May".into()),
            planting_method: Some("Seedling".into()),
            care_level: Some("high".into()),
            user: Some("amina".into()),
        };
        let input = validate(&request).unwrap();
        assert_eq!(input.tree_species, "Pine");
        assert_eq!(input.care_level, CareLevel::High);
    }
}
