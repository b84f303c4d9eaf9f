//! Care-plan generation calibrated to predicted risk.
//!
//! The static policy table is the authoritative fallback; when the hosted
//! model is reachable its sanitized output replaces the static plan.

use crate::llm::{CareContext, LlmClient};
use crate::playbook::Species;

/// An alternative species offered when risk is high.
#[derive(Debug, Clone)]
pub struct Alternative {
    pub name: String,
    pub survival_rate: f64,
    pub care_instructions: Vec<String>,
}

/// Generated plan plus whether the hosted model authored it.
#[derive(Debug, Clone)]
pub struct CarePlan {
    pub steps: Vec<String>,
    pub ai_used: bool,
}

/// Build the care plan for a prediction.
pub async fn generate(
    llm: &LlmClient,
    species: &Species,
    best_alternative: Option<&Alternative>,
    survival_rate: f64,
    risk_label: &str,
    county: &str,
    season: &str,
) -> CarePlan {
    let static_plan = static_plan(species, best_alternative, survival_rate);

    let outcome = llm
        .care_steps(&CareContext {
            species: species.name.clone(),
            county: county.to_string(),
            season: season.to_string(),
            survival_rate,
            risk_level: risk_label.to_string(),
            base_care: static_plan.clone(),
        })
        .await;

    if outcome.ai_used {
        CarePlan {
            steps: outcome.value,
            ai_used: true,
        }
    } else {
        CarePlan {
            steps: static_plan,
            ai_used: false,
        }
    }
}

fn static_plan(
    species: &Species,
    best_alternative: Option<&Alternative>,
    survival_rate: f64,
) -> Vec<String> {
    let base_care = if species.care_instructions.is_empty() {
        vec!["Follow standard tree care practices".to_string()]
    } else {
        species.care_instructions.clone()
    };

    if survival_rate >= 80.0 {
        return base_care;
    }

    if survival_rate >= 65.0 {
        let mut steps = vec!["Follow the care instructions closely to maximize success".to_string()];
        steps.extend(base_care);
        return steps;
    }

    // High and Very High risk share the structure; wording strengthens below 45.
    let urgent = survival_rate < 45.0;
    match best_alternative {
        Some(alt) => {
            let lead = if urgent {
                format!(
                    "Strongly recommended: plant {} instead (much better survival rate)",
                    alt.name
                )
            } else {
                format!("Recommended: plant {} instead (better survival rate)", alt.name)
            };
            let mut steps = vec![lead];
            steps.extend(alt.care_instructions.clone());
            steps
        }
        None => {
            let lead = if urgent {
                format!(
                    "Strongly recommended: wait for {} before planting",
                    species.best_season
                )
            } else {
                format!("Recommended: wait for {} for optimal conditions", species.best_season)
            };
            vec![
                lead,
                "Prepare planting site with compost and proper drainage".to_string(),
                "Source quality seedlings before the season".to_string(),
                "Consider soil testing and improvement".to_string(),
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn species() -> Species {
        Species {
            name: "Pine".into(),
            soil: "Red soil".into(),
            rainfall: "800–1800mm".into(),
            temperature: "10–22°C".into(),
            care_level: "Medium".into(),
            best_season: "March–June".into(),
            planting_method: "Seedling".into(),
            water: "Weekly for 2 months".into(),
            base_survival_rate: 80.0,
            planting_guide: vec![],
            care_instructions: vec!["Remove weeds regularly".into(), "Mulch during dry season".into()],
        }
    }

    #[test]
    fn test_low_risk_uses_species_plan_as_is() {
        let steps = static_plan(&species(), None, 85.0);
        assert_eq!(steps, species().care_instructions);
    }

    #[test]
    fn test_medium_risk_prefixes_follow_closely() {
        let steps = static_plan(&species(), None, 70.0);
        assert!(steps[0].contains("closely"));
        assert_eq!(steps.len(), 3);
    }

    #[test]
    fn test_high_risk_leads_with_alternative() {
        let alt = Alternative {
            name: "Neem".into(),
            survival_rate: 78.0,
            care_instructions: vec!["Minimal care required".into()],
        };
        let steps = static_plan(&species(), Some(&alt), 50.0);
        assert!(steps[0].contains("Neem"));
        assert_eq!(steps[1], "Minimal care required");
    }

    #[test]
    fn test_very_high_risk_without_alternative_waits_for_season() {
        let steps = static_plan(&species(), None, 30.0);
        assert!(steps[0].contains("Strongly recommended"));
        assert!(steps[0].contains("March–June"));
        assert_eq!(steps.len(), 4);
    }
}
