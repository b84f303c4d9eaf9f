//! Adapter over the pre-fitted gradient-boosted survival classifier.
//!
//! The training pipeline is out of scope; the model is consumed as a JSON
//! artifact bundling the ordered feature list, per-category encoder
//! vocabularies, standard-scaler parameters, and the boosted tree ensemble.
//! The artifact is loaded once at startup; any load failure leaves the
//! adapter permanently unavailable for the process lifetime and predictions
//! return `None`.

use std::collections::HashMap;
use std::fs;

use serde::Deserialize;
use tracing::{info, warn};

/// Feature map handed to the classifier. Categorical values are encoded
/// against the artifact vocabularies; unknown categories encode to 0.
#[derive(Debug, Clone)]
pub struct FeatureInput {
    pub tree_species: String,
    pub region: String,
    pub county: String,
    pub soil_type: String,
    pub rainfall_mm: f64,
    pub temperature_c: f64,
    pub altitude_m: f64,
    pub soil_ph: f64,
    pub planting_season: String,
    pub planting_method: String,
    pub care_level: String,
    pub water_source: String,
    pub tree_age_months: f64,
}

#[derive(Debug, Deserialize)]
struct TreeNode {
    /// Index into the feature vector; `None` marks a leaf.
    feature: Option<usize>,
    #[serde(default)]
    threshold: f64,
    #[serde(default)]
    left: usize,
    #[serde(default)]
    right: usize,
    #[serde(default)]
    value: f64,
}

#[derive(Debug, Deserialize)]
struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Walk from the root; samples with value <= threshold go left.
    fn evaluate(&self, features: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            let Some(node) = self.nodes.get(index) else {
                return 0.0;
            };
            match node.feature {
                None => return node.value,
                Some(feature) => {
                    let value = features.get(feature).copied().unwrap_or(0.0);
                    index = if value <= node.threshold {
                        node.left
                    } else {
                        node.right
                    };
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct Scaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct ModelArtifact {
    /// Ordered feature names matching the training columns.
    features: Vec<String>,
    /// Category vocabularies in training order.
    encoders: HashMap<String, Vec<String>>,
    scaler: Scaler,
    /// Additive bias applied before the link function.
    bias: f64,
    trees: Vec<DecisionTree>,
}

/// Loaded classifier, callable from any worker without locking.
pub struct Classifier {
    artifact: Option<ModelArtifact>,
}

impl Classifier {
    /// Load the artifact bundle from disk. Failure is captured, not raised.
    pub fn load(path: &str) -> Self {
        let artifact = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<ModelArtifact>(&raw) {
                Ok(artifact) => {
                    info!(
                        path,
                        features = artifact.features.len(),
                        trees = artifact.trees.len(),
                        "Classifier artifact loaded"
                    );
                    Some(artifact)
                }
                Err(e) => {
                    warn!(path, error = %e, "Classifier artifact failed to parse; running without ML");
                    None
                }
            },
            Err(e) => {
                warn!(path, error = %e, "Classifier artifact not readable; running without ML");
                None
            }
        };
        Classifier { artifact }
    }

    /// Construct an unavailable classifier (used in tests and degraded mode).
    pub fn unavailable() -> Self {
        Classifier { artifact: None }
    }

    pub fn available(&self) -> bool {
        self.artifact.is_some()
    }

    /// Survival probability in [0, 1], or `None` when the model is absent.
    pub fn predict(&self, input: &FeatureInput) -> Option<f64> {
        let artifact = self.artifact.as_ref()?;

        let raw: Vec<f64> = artifact
            .features
            .iter()
            .map(|name| Self::feature_value(artifact, name, input))
            .collect();

        let scaled: Vec<f64> = raw
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let mean = artifact.scaler.mean.get(i).copied().unwrap_or(0.0);
                let scale = artifact.scaler.scale.get(i).copied().unwrap_or(1.0);
                if scale.abs() < f64::EPSILON {
                    0.0
                } else {
                    (value - mean) / scale
                }
            })
            .collect();

        let score: f64 = artifact.bias
            + artifact
                .trees
                .iter()
                .map(|tree| tree.evaluate(&scaled))
                .sum::<f64>();

        Some(sigmoid(score))
    }

    fn feature_value(artifact: &ModelArtifact, name: &str, input: &FeatureInput) -> f64 {
        match name {
            "tree_species_encoded" => encode(artifact, "species", &input.tree_species),
            "region_encoded" => encode(artifact, "region", &input.region),
            "county_encoded" => encode(artifact, "county", &input.county),
            "soil_type_encoded" => encode(artifact, "soil_type", &input.soil_type),
            "planting_season_encoded" => encode(artifact, "planting_season", &input.planting_season),
            "planting_method_encoded" => encode(artifact, "planting_method", &input.planting_method),
            "care_level_encoded" => encode(artifact, "care_level", &input.care_level),
            "water_source_encoded" => encode(artifact, "water_source", &input.water_source),
            "rainfall_mm" => input.rainfall_mm,
            "temperature_c" => input.temperature_c,
            "altitude_m" => input.altitude_m,
            "soil_ph" => input.soil_ph,
            "tree_age_months" => input.tree_age_months,
            "water_balance" => input.rainfall_mm - input.temperature_c * 20.0,
            "is_high_altitude" => {
                if input.altitude_m > 1500.0 {
                    1.0
                } else {
                    0.0
                }
            }
            "soil_acidity" => {
                if input.soil_ph < 6.5 {
                    1.0
                } else {
                    0.0
                }
            }
            unknown => {
                warn!(feature = unknown, "Unknown feature in artifact, using 0");
                0.0
            }
        }
    }
}

/// Unknown category values decode to 0, never an error.
fn encode(artifact: &ModelArtifact, encoder: &str, value: &str) -> f64 {
    artifact
        .encoders
        .get(encoder)
        .and_then(|vocab| vocab.iter().position(|v| v == value))
        .unwrap_or(0) as f64
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
