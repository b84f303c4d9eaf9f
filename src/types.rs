//! Shared types and the caller-visible error taxonomy.
//!
//! Degraded signal sources (weather, classifier, LLM) are never errors:
//! they surface as `None` values and flipped flags on the response, and the
//! confidence tier drops accordingly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to callers of the core API.
#[derive(Debug, Error)]
pub enum MsituError {
    /// Missing or malformed request field
    #[error("Invalid request: {0}")]
    Validation(String),

    /// County not present in the playbook
    #[error("County '{0}' not found")]
    CountyNotFound(String),

    /// Species not present in the playbook
    #[error("Species '{0}' not found")]
    SpeciesNotFound(String),

    /// No compatibility record for this (county, species) pair
    #[error("'{species}' is not recommended for '{county}'")]
    NotRecommended { species: String, county: String },

    /// Marketplace debit exceeds the available balance
    #[error("Insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: f64, available: f64 },

    /// State transition attempted by a non-authorized actor
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Underlying SQLite failure
    #[error("Database error: {0}")]
    Database(String),

    /// Model artifact could not be read or parsed
    #[error("Artifact error: {0}")]
    Artifact(String),
}

impl From<rusqlite::Error> for MsituError {
    fn from(e: rusqlite::Error) -> Self {
        MsituError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MsituError>;

/// Care level the planter commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CareLevel {
    Low,
    Medium,
    High,
}

impl CareLevel {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(CareLevel::Low),
            "medium" => Ok(CareLevel::Medium),
            "high" => Ok(CareLevel::High),
            other => Err(MsituError::Validation(format!(
                "unknown care level '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CareLevel::Low => "Low",
            CareLevel::Medium => "Medium",
            CareLevel::High => "High",
        }
    }

    /// Additive playbook adjustment for the committed care level.
    pub fn playbook_adjustment(&self) -> f64 {
        match self {
            CareLevel::High => 8.0,
            CareLevel::Medium => 0.0,
            CareLevel::Low => -5.0,
        }
    }

    /// Planter experience bonus applied after blending.
    pub fn experience_bonus(&self) -> f64 {
        match self {
            CareLevel::High => 15.0,
            CareLevel::Medium => 8.0,
            CareLevel::Low => 0.0,
        }
    }
}

/// Risk tier derived from the final survival percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub fn from_survival(pct: f64) -> Self {
        if pct >= 80.0 {
            RiskLevel::Low
        } else if pct >= 65.0 {
            RiskLevel::Medium
        } else if pct >= 45.0 {
            RiskLevel::High
        } else {
            RiskLevel::VeryHigh
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::VeryHigh => "Very High",
        }
    }

    /// Human-friendly label shown alongside the tier.
    pub fn descriptive_label(pct: f64) -> &'static str {
        if pct >= 75.0 {
            "Low Risk – Good Conditions"
        } else if pct >= 60.0 {
            "Moderate Risk – Extra Care Needed"
        } else {
            "High Risk – Challenging Conditions"
        }
    }
}

/// Confidence tier derived from which optional signal sources contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_sources(has_live_weather: bool, used_ml: bool) -> Self {
        if has_live_weather && used_ml {
            ConfidenceLevel::High
        } else if used_ml {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "High",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::Low => "Low",
        }
    }
}
