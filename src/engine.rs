//! Fusion engine: combines the playbook, the classifier, live weather, and
//! the language model into one survival prediction.
//!
//! The engine is the only component that knows all three predictors. Each
//! optional source degrades independently; its absence flips a response flag
//! and lowers the confidence tier, never fails the prediction.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::careplan::{self, Alternative};
use crate::classifier::{Classifier, FeatureInput};
use crate::db::{Database, PredictionRecord};
use crate::llm::{AdjustmentContext, ExplainContext, LlmClient};
use crate::playbook::{Compatibility, CountyEnvironment, PlaybookStore};
use crate::types::{CareLevel, ConfidenceLevel, Result, RiskLevel};
use crate::weather::{normalize_rainfall, WeatherService};

/// Validated prediction inputs.
#[derive(Debug, Clone)]
pub struct PredictionInput {
    pub tree_species: String,
    pub county: String,
    pub planting_season: String,
    pub planting_method: String,
    pub care_level: CareLevel,
    pub user: Option<String>,
}

/// Contribution of each signal source to the final number.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionSources {
    pub ml_prediction: Option<f64>,
    pub playbook_prediction: f64,
    pub experience_bonus: f64,
    pub final_prediction: f64,
}

/// Complete prediction result.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub survival_percentage: f64,
    pub survival_probability: f64,
    pub confidence_level: String,
    pub prediction: String,
    pub risk_level: String,
    pub risks: Vec<String>,
    pub reasons: Vec<String>,
    pub after_care: Vec<String>,
    pub explanation: String,
    pub species_rank: i64,
    pub match_score: f64,
    pub recommendation_reason: String,
    pub alternative_species: Vec<String>,
    pub weather_used: bool,
    pub ml_used: bool,
    pub ai_used: bool,
    pub prediction_sources: PredictionSources,
    pub model_version: String,
}

/// Fixed per-species variance factor applied to the blended score.
fn species_variance(species: &str) -> f64 {
    match species {
        "Grevillea" => 1.00,
        "Pine" => 0.92,
        "Cypress" => 0.88,
        "Neem" => 0.95,
        "Indigenous Mix" => 1.05,
        "Eucalyptus" => 0.90,
        _ => 0.90,
    }
}

const MONTH_ALIASES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Extract the month set mentioned by a free-form season label. When the
/// label names exactly two months joined by a dash, the inclusive range is
/// expanded (wrapping across the year end).
fn season_months(label: &str) -> Vec<usize> {
    let normalized = label
        .to_ascii_lowercase()
        .replace('\u{2013}', "-")
        .replace('\u{2014}', "-");

    let mut mentioned: Vec<usize> = Vec::new();
    // Scan in text order so a two-month span expands in the stated direction.
    let mut positions: Vec<(usize, usize)> = Vec::new();
    for (month, alias) in MONTH_ALIASES.iter().enumerate() {
        if let Some(pos) = normalized.find(alias) {
            positions.push((pos, month + 1));
        }
    }
    positions.sort();
    for (_, month) in positions {
        if !mentioned.contains(&month) {
            mentioned.push(month);
        }
    }

    if mentioned.len() == 2 && normalized.contains('-') {
        let (start, end) = (mentioned[0], mentioned[1]);
        let mut months = vec![start];
        let mut m = start;
        while m != end {
            m = if m == 12 { 1 } else { m + 1 };
            months.push(m);
        }
        return months;
    }
    mentioned
}

/// First seasonal-performance entry whose months overlap the requested
/// season supplies the bonus; no overlap means 0.
pub fn seasonal_bonus(compat: &Compatibility, season_label: &str) -> f64 {
    let requested = season_months(season_label);
    if requested.is_empty() {
        return 0.0;
    }
    for (key, bonus) in &compat.seasonal_performance {
        let key_months = season_months(key);
        if key_months.iter().any(|m| requested.contains(m)) {
            return *bonus;
        }
    }
    0.0
}

/// Species-specific environmental matching applied to the playbook base.
fn species_environment_adjustment(species: &str, env: &CountyEnvironment) -> f64 {
    let altitude = env.avg_altitude();
    let temperature = env.avg_temperature();
    let mut adjustment = 0.0;

    match species {
        "Pine" | "Cypress" => {
            adjustment += if altitude > 1500.0 { 15.0 } else { -20.0 };
            adjustment += temperature_rule(temperature, 10.0, 22.0, true);
        }
        "Grevillea" => {
            adjustment += if altitude > 1500.0 { 8.0 } else { -10.0 };
            adjustment += temperature_rule(temperature, 15.0, 28.0, true);
        }
        "Neem" => {
            if altitude > 1500.0 {
                adjustment -= 15.0;
            }
            if altitude < 1000.0 {
                adjustment += 15.0;
            }
            adjustment += temperature_rule(temperature, 24.0, 34.0, true);
        }
        "Indigenous Mix" => {
            adjustment += 10.0;
            adjustment += temperature_rule(temperature, 12.0, 26.0, false);
        }
        "Eucalyptus" => {
            adjustment += 5.0;
            adjustment += temperature_rule(temperature, 18.0, 32.0, false);
        }
        _ => {}
    }
    adjustment
}

fn temperature_rule(temperature: f64, low: f64, high: f64, penalize: bool) -> f64 {
    if (low..=high).contains(&temperature) {
        8.0
    } else if penalize && (temperature < low - 5.0 || temperature > high + 5.0) {
        -12.0
    } else {
        0.0
    }
}

/// The decision engine's wiring: the only place all predictors meet.
pub struct Engine {
    playbook: Arc<PlaybookStore>,
    weather: Arc<WeatherService>,
    classifier: Arc<Classifier>,
    llm: Arc<LlmClient>,
    db: Arc<Database>,
    model_version: String,
}

impl Engine {
    pub fn new(
        playbook: Arc<PlaybookStore>,
        weather: Arc<WeatherService>,
        classifier: Arc<Classifier>,
        llm: Arc<LlmClient>,
        db: Arc<Database>,
        model_version: String,
    ) -> Self {
        Engine {
            playbook,
            weather,
            classifier,
            llm,
            db,
            model_version,
        }
    }

    /// Run the full fusion pipeline and persist the result.
    pub async fn predict(&self, input: &PredictionInput) -> Result<Prediction> {
        // Resolution: county, species, and the pair's compatibility record.
        let env = self.playbook.get_environment(&input.county)?;
        let species = self.playbook.get_species(&input.tree_species)?;
        let compat = self
            .playbook
            .get_compatibility(&input.county, &input.tree_species)?;
        let county = self.playbook.get_county(&input.county)?;

        let season_bonus = seasonal_bonus(&compat, &input.planting_season);

        // Opportunistic live weather for the county centroid.
        let weather = self
            .weather
            .get_weather(county.latitude, county.longitude)
            .await;
        let weather_used = weather.is_some();

        // ML branch: environment midpoints, overridden by live weather.
        let (rainfall_mm, temperature_c) = match &weather {
            Some(snapshot) => {
                let (daily_rain, _) = normalize_rainfall(snapshot.rain_mm_hour);
                (daily_rain, snapshot.temperature_c)
            }
            None => (env.avg_rainfall(), env.avg_temperature()),
        };
        let features = FeatureInput {
            tree_species: input.tree_species.clone(),
            region: env.climate_zone.clone(),
            county: input.county.clone(),
            soil_type: env.soil_type.clone(),
            rainfall_mm,
            temperature_c,
            altitude_m: env.avg_altitude(),
            soil_ph: 6.5,
            planting_season: input.planting_season.clone(),
            planting_method: input.planting_method.clone(),
            care_level: input.care_level.as_str().to_string(),
            water_source: "Rain-fed".to_string(),
            tree_age_months: 12.0,
        };
        let ml_prediction = self.classifier.predict(&features).map(|p| p * 100.0);
        let ml_used = ml_prediction.is_some();

        // Playbook branch.
        let mut playbook_prediction = compat.survival_rate;
        playbook_prediction += species_environment_adjustment(&species.name, &env);
        playbook_prediction += season_bonus;
        playbook_prediction += input.care_level.playbook_adjustment();
        playbook_prediction = playbook_prediction.clamp(15.0, 95.0);

        // Blend; playbook-only predictions carry a confidence penalty.
        let base_prediction = match ml_prediction {
            Some(ml) => 0.5 * ml + 0.5 * playbook_prediction,
            None => 0.85 * playbook_prediction,
        };

        let experience_bonus = input.care_level.experience_bonus();

        let adjustment = self
            .llm
            .score_adjustment(&AdjustmentContext {
                species: species.name.clone(),
                county: input.county.clone(),
                season: input.planting_season.clone(),
                base_prediction,
                ml_prediction,
                playbook_prediction,
                seasonal_bonus: season_bonus,
                care_level: input.care_level.as_str().to_string(),
                species_best_season: species.best_season.clone(),
            })
            .await;

        let variance = species_variance(&species.name);
        let final_rate = ((base_prediction + experience_bonus + adjustment.value as f64)
            * variance)
            .clamp(5.0, 95.0);
        let final_rate = (final_rate * 10.0).round() / 10.0;

        debug!(
            species = %species.name,
            county = %input.county,
            playbook = playbook_prediction,
            ml = ?ml_prediction,
            seasonal = season_bonus,
            adjustment = adjustment.value,
            variance,
            final_rate,
            "Fused prediction"
        );

        let risk = RiskLevel::from_survival(final_rate);
        let confidence = ConfidenceLevel::from_sources(weather_used, ml_used);

        // Alternatives only when the outlook is below the medium threshold.
        let alternatives = if final_rate < 65.0 {
            self.find_alternatives(&input.county, &species.name, &input.planting_season, final_rate)
        } else {
            Vec::new()
        };

        let explanation_outcome = self
            .llm
            .explain(&ExplainContext {
                species: species.name.clone(),
                county: input.county.clone(),
                season: input.planting_season.clone(),
                survival_rate: final_rate,
                risk_level: risk.as_str().to_string(),
                reason: compat.recommendation_reason.clone(),
            })
            .await;

        let care_plan = careplan::generate(
            &self.llm,
            &species,
            alternatives.first(),
            final_rate,
            risk.as_str(),
            &input.county,
            &input.planting_season,
        )
        .await;

        let (risks, reasons) = assess_factors(
            &species.name,
            &input.county,
            &input.planting_season,
            input.care_level,
            final_rate,
        );

        let prediction = Prediction {
            survival_percentage: final_rate,
            survival_probability: final_rate,
            confidence_level: confidence.as_str().to_string(),
            prediction: if final_rate >= 60.0 {
                "Likely to Survive".to_string()
            } else {
                "Challenging Conditions".to_string()
            },
            risk_level: RiskLevel::descriptive_label(final_rate).to_string(),
            risks,
            reasons,
            after_care: care_plan.steps,
            explanation: explanation_outcome.value,
            species_rank: compat.species_rank,
            match_score: compat.match_score,
            recommendation_reason: compat.recommendation_reason.clone(),
            alternative_species: alternatives.iter().map(|a| a.name.clone()).collect(),
            weather_used,
            ml_used,
            ai_used: adjustment.ai_used || explanation_outcome.ai_used || care_plan.ai_used,
            prediction_sources: PredictionSources {
                ml_prediction,
                playbook_prediction,
                experience_bonus,
                final_prediction: final_rate,
            },
            model_version: self.model_version.clone(),
        };

        // Audit trail: snapshot row first, then the record referencing it.
        let snapshot_id = match &weather {
            Some(snapshot) => self.db.record_snapshot(snapshot).await,
            None => None,
        };
        self.db
            .record_prediction(
                &PredictionRecord {
                    user: input.user.clone(),
                    tree_species: species.name.clone(),
                    county: input.county.clone(),
                    planting_season: input.planting_season.clone(),
                    planting_method: input.planting_method.clone(),
                    care_level: input.care_level.as_str().to_string(),
                    survival_percentage: final_rate,
                    risk_level: risk.as_str().to_string(),
                    confidence_level: confidence.as_str().to_string(),
                    model_version: self.model_version.clone(),
                },
                snapshot_id,
            )
            .await?;

        info!(
            species = %species.name,
            county = %input.county,
            survival = final_rate,
            risk = risk.as_str(),
            confidence = confidence.as_str(),
            "Prediction recorded"
        );
        Ok(prediction)
    }

    /// Alternatives: at least 70% base survival, in season, and meaningfully
    /// better than the prediction they would replace. Top two by survival.
    fn find_alternatives(
        &self,
        county: &str,
        exclude_species: &str,
        season: &str,
        final_rate: f64,
    ) -> Vec<Alternative> {
        self.playbook
            .list_compatible(county, 70.0)
            .into_iter()
            .filter(|c| c.species != exclude_species)
            .filter(|c| seasonal_bonus(c, season) >= 0.0)
            .filter(|c| c.survival_rate >= final_rate + 15.0)
            .take(2)
            .map(|c| {
                let care = self
                    .playbook
                    .get_species(&c.species)
                    .map(|s| s.care_instructions)
                    .unwrap_or_default();
                Alternative {
                    name: c.species,
                    survival_rate: c.survival_rate,
                    care_instructions: care,
                }
            })
            .collect()
    }
}

/// Species/county factor assessment shown as `risks[]` / `reasons[]`.
fn assess_factors(
    species: &str,
    county: &str,
    season: &str,
    care_level: CareLevel,
    final_rate: f64,
) -> (Vec<String>, Vec<String>) {
    let mut risks = Vec::new();
    let mut reasons = Vec::new();

    match species {
        "Pine" | "Cypress" => {
            if matches!(county, "Mombasa" | "Kilifi" | "Garissa" | "Turkana") {
                risks.push("Highland species struggle in hot coastal/arid conditions".to_string());
            } else {
                reasons.push("Highland species thrive in cool, moist conditions".to_string());
            }
        }
        "Neem" => {
            if matches!(county, "Nyeri" | "Meru" | "Nakuru") {
                risks.push("Lowland species may not tolerate highland cold".to_string());
            } else {
                reasons.push("Excellent drought and heat tolerance".to_string());
            }
        }
        "Grevillea" => {
            reasons.push("Good adaptation to highland agroforestry".to_string());
        }
        "Indigenous Mix" => {
            reasons.push("Native species naturally adapted to local conditions".to_string());
        }
        _ => {}
    }

    if season.to_ascii_lowercase().contains("dry") && species != "Neem" {
        risks.push("Dry season planting increases water stress".to_string());
    }

    match care_level {
        CareLevel::High => {
            reasons.push("High care level improves survival chances".to_string());
        }
        CareLevel::Low if final_rate < 70.0 => {
            risks.push("Low care may reduce survival in challenging conditions".to_string());
        }
        _ => {}
    }

    if final_rate >= 80.0 {
        reasons.push("Optimal environmental match for this species".to_string());
    }

    (risks, reasons)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compat_with(seasonal: &[(&str, f64)]) -> Compatibility {
        Compatibility {
            county: "Meru".into(),
            species: "Pine".into(),
            survival_rate: 82.0,
            species_rank: 2,
            match_score: 88.0,
            seasonal_performance: seasonal
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            recommendation_reason: "test".into(),
        }
    }

    fn env(altitude: (f64, f64), temperature: (f64, f64)) -> CountyEnvironment {
        CountyEnvironment {
            county: "test".into(),
            rainfall_mm_min: 600.0,
            rainfall_mm_max: 1500.0,
            temperature_c_min: temperature.0,
            temperature_c_max: temperature.1,
            altitude_m_min: altitude.0,
            altitude_m_max: altitude.1,
            soil_ph_min: 6.0,
            soil_ph_max: 7.5,
            soil_type: "Loam".into(),
            climate_zone: "Semi-Humid".into(),
            best_season: "March–May".into(),
        }
    }

    #[test]
    fn test_season_months_expands_ranges() {
        assert_eq!(season_months("March-May"), vec![3, 4, 5]);
        assert_eq!(season_months("Oct-Dec"), vec![10, 11, 12]);
        assert_eq!(season_months("October–December"), vec![10, 11, 12]);
        assert_eq!(season_months("Nov-Feb"), vec![11, 12, 1, 2]);
        assert_eq!(season_months("Irrigated"), Vec::<usize>::new());
    }

    #[test]
    fn test_seasonal_bonus_first_match_wins() {
        let compat = compat_with(&[("March-June", 10.0), ("Oct-Dec", 3.0)]);
        assert_eq!(seasonal_bonus(&compat, "March-May"), 10.0);
        assert_eq!(seasonal_bonus(&compat, "October-December"), 3.0);
        assert_eq!(seasonal_bonus(&compat, "Irrigated"), 0.0);
    }

    #[test]
    fn test_seasonal_bonus_no_overlap_defaults_zero() {
        let compat = compat_with(&[("June-Sept", -15.0)]);
        assert_eq!(seasonal_bonus(&compat, "Oct-Dec"), 0.0);
    }

    #[test]
    fn test_highland_species_rules() {
        let highland = env((1700.0, 2100.0), (12.0, 20.0));
        let coastal = env((0.0, 50.0), (24.0, 32.0));

        // Pine in the highlands: +15 altitude, +8 temperature (16C in [10,22])
        assert_eq!(species_environment_adjustment("Pine", &highland), 23.0);
        // Pine at the coast: -20 altitude, 28C is 6 over the window: -12
        assert_eq!(species_environment_adjustment("Pine", &coastal), -32.0);
    }

    #[test]
    fn test_neem_prefers_lowlands() {
        let lowland = env((300.0, 900.0), (28.0, 36.0));
        // +15 lowland, 32C in [24,34]: +8
        assert_eq!(species_environment_adjustment("Neem", &lowland), 23.0);

        let highland = env((1700.0, 2100.0), (12.0, 20.0));
        // -15 highland, 16C is 8 under the window: -12
        assert_eq!(species_environment_adjustment("Neem", &highland), -27.0);
    }

    #[test]
    fn test_adaptable_species_have_no_stress_penalty() {
        let arid = env((300.0, 900.0), (28.0, 36.0));
        // Indigenous Mix: +10 constant, 32C outside [12,26] but no penalty
        assert_eq!(species_environment_adjustment("Indigenous Mix", &arid), 10.0);
        // Eucalyptus: +5 constant, 32C inside [18,32]: +8
        assert_eq!(species_environment_adjustment("Eucalyptus", &arid), 13.0);
    }

    #[test]
    fn test_species_variance_table() {
        assert_eq!(species_variance("Grevillea"), 1.00);
        assert_eq!(species_variance("Indigenous Mix"), 1.05);
        assert_eq!(species_variance("Cypress"), 0.88);
        assert_eq!(species_variance("Baobab"), 0.90);
    }

    #[test]
    fn test_assess_factors() {
        let (risks, reasons) =
            assess_factors("Pine", "Mombasa", "Dry season", CareLevel::Low, 20.0);
        assert!(risks.iter().any(|r| r.contains("coastal")));
        assert!(risks.iter().any(|r| r.contains("Dry season")));
        assert!(risks.iter().any(|r| r.contains("Low care")));
        assert!(reasons.is_empty());

        let (risks, reasons) =
            assess_factors("Pine", "Nyeri", "March-May", CareLevel::High, 88.0);
        assert!(risks.is_empty());
        assert!(reasons.iter().any(|r| r.contains("Highland species")));
        assert!(reasons.iter().any(|r| r.contains("High care")));
        assert!(reasons.iter().any(|r| r.contains("Optimal environmental match")));
    }
}
