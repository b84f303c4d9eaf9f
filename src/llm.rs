//! Hosted language model adapter.
//!
//! Three pure operations: a bounded numeric score adjustment, a short
//! explanation, and a care-step list. The model is an unreliable oracle:
//! when the provider is unconfigured, times out, or returns junk, each
//! operation falls back to deterministic rules with the same shape, so
//! callers never observe a difference beyond the `ai_used` flag.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

/// Result of one adapter call plus whether the hosted model produced it.
#[derive(Debug, Clone)]
pub struct LlmOutcome<T> {
    pub value: T,
    pub ai_used: bool,
}

/// Context for the score-adjustment operation.
#[derive(Debug, Clone)]
pub struct AdjustmentContext {
    pub species: String,
    pub county: String,
    pub season: String,
    pub base_prediction: f64,
    pub ml_prediction: Option<f64>,
    pub playbook_prediction: f64,
    pub seasonal_bonus: f64,
    pub care_level: String,
    pub species_best_season: String,
}

/// Context for the explanation operation.
#[derive(Debug, Clone)]
pub struct ExplainContext {
    pub species: String,
    pub county: String,
    pub season: String,
    pub survival_rate: f64,
    pub risk_level: String,
    pub reason: String,
}

/// Context for the care-step operation.
#[derive(Debug, Clone)]
pub struct CareContext {
    pub species: String,
    pub county: String,
    pub season: String,
    pub survival_rate: f64,
    pub risk_level: String,
    pub base_care: Vec<String>,
}

const ADJUSTMENT_MIN: i32 = -15;
const ADJUSTMENT_MAX: i32 = 12;

/// Chat-completions client with deterministic fallbacks.
pub struct LlmClient {
    api_key: Option<String>,
    api_url: String,
    model: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: Option<String>, api_url: String, model: String, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();
        LlmClient {
            api_key,
            api_url,
            model,
            client,
        }
    }

    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Bounded prediction adjustment in [-15, +12].
    pub async fn score_adjustment(&self, ctx: &AdjustmentContext) -> LlmOutcome<i32> {
        if self.enabled() {
            let prompt = format!(
                "You are a Kenyan forestry expert. A survival prediction for {species} in \
                 {county} during {season} currently stands at {base:.1}% \
                 (playbook {playbook:.1}%, model {ml}). The species does best in {best}. \
                 Reply with ONLY one signed integer between {min} and {max}: your adjustment \
                 to the prediction.",
                species = ctx.species,
                county = ctx.county,
                season = ctx.season,
                base = ctx.base_prediction,
                playbook = ctx.playbook_prediction,
                ml = ctx
                    .ml_prediction
                    .map(|p| format!("{p:.1}%"))
                    .unwrap_or_else(|| "unavailable".to_string()),
                best = ctx.species_best_season,
                min = ADJUSTMENT_MIN,
                max = ADJUSTMENT_MAX,
            );
            if let Some(content) = self.complete(&prompt, 12).await {
                if let Some(n) = parse_first_int(&content) {
                    return LlmOutcome {
                        value: n.clamp(ADJUSTMENT_MIN, ADJUSTMENT_MAX),
                        ai_used: true,
                    };
                }
                warn!(content, "Adjustment response had no integer, using fallback");
            }
        }
        LlmOutcome {
            value: fallback_adjustment(ctx),
            ai_used: false,
        }
    }

    /// Single-line rationale, at most 80 words.
    pub async fn explain(&self, ctx: &ExplainContext) -> LlmOutcome<String> {
        if self.enabled() {
            let prompt = format!(
                "You are an expert Kenyan forestry advisor. Explain in plain text, under 80 \
                 words, why {species} planted in {county} County during {season} has a \
                 {rate:.1}% survival outlook ({risk} risk). Base reason: {reason}. Focus on \
                 rainfall, soil and temperature. No markdown, no quotes, no word counts.",
                species = ctx.species,
                county = ctx.county,
                season = ctx.season,
                rate = ctx.survival_rate,
                risk = ctx.risk_level,
                reason = ctx.reason,
            );
            if let Some(content) = self.complete(&prompt, 150).await {
                let cleaned = truncate_words(&sanitize(&content), 80);
                if !cleaned.is_empty() {
                    return LlmOutcome {
                        value: cleaned,
                        ai_used: true,
                    };
                }
            }
        }
        LlmOutcome {
            value: fallback_explanation(ctx),
            ai_used: false,
        }
    }

    /// Ordered care steps; the hosted output is only accepted when it still
    /// contains 4-6 complete steps after sanitization.
    pub async fn care_steps(&self, ctx: &CareContext) -> LlmOutcome<Vec<String>> {
        if self.enabled() {
            let base = if ctx.base_care.is_empty() {
                "Standard tree care".to_string()
            } else {
                ctx.base_care.join("; ")
            };
            let prompt = format!(
                "You are an expert Kenyan forestry advisor. Adapt these care instructions for \
                 {species} in {county} County, planted during {season} with a {rate:.1}% \
                 survival outlook ({risk} risk): {base}. Return 4 to 6 short steps, one per \
                 line, each a complete sentence under 100 characters. Plain text only.",
                species = ctx.species,
                county = ctx.county,
                season = ctx.season,
                rate = ctx.survival_rate,
                risk = ctx.risk_level,
                base = base,
            );
            if let Some(content) = self.complete(&prompt, 220).await {
                let steps = parse_care_steps(&content);
                if (4..=6).contains(&steps.len()) {
                    return LlmOutcome {
                        value: steps,
                        ai_used: true,
                    };
                }
                debug!(count = steps.len(), "Care-step response rejected, using fallback");
            }
        }
        LlmOutcome {
            value: fallback_care_steps(ctx),
            ai_used: false,
        }
    }

    /// One chat completion. Retries once after a short backoff on rate
    /// limiting; every other failure degrades to `None`.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Option<String> {
        let api_key = self.api_key.as_ref()?;
        for attempt in 0..2 {
            let response = self
                .client
                .post(&self.api_url)
                .bearer_auth(api_key)
                .json(&json!({
                    "model": self.model,
                    "messages": [{ "role": "user", "content": prompt }],
                    "max_tokens": max_tokens,
                    "temperature": 0.3,
                }))
                .send()
                .await;

            match response {
                Ok(r) if r.status().as_u16() == 429 && attempt == 0 => {
                    debug!("LLM rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }
                Ok(r) if r.status().is_success() => {
                    let body: serde_json::Value = r.json().await.ok()?;
                    return body["choices"][0]["message"]["content"]
                        .as_str()
                        .map(|s| s.to_string());
                }
                Ok(r) => {
                    warn!(status = %r.status(), "LLM provider returned an error");
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "LLM request failed");
                    return None;
                }
            }
        }
        None
    }
}

/// Rule-based adjustment mirroring curated species/county affinities.
fn fallback_adjustment(ctx: &AdjustmentContext) -> i32 {
    let mut adjustment = 0i32;

    if ctx.seasonal_bonus > 5.0 {
        adjustment += 5;
    } else if ctx.seasonal_bonus < -5.0 {
        adjustment -= 3;
    }

    let species = ctx.species.as_str();
    let county = ctx.county.as_str();
    let highland = matches!(county, "Meru" | "Nyeri" | "Kiambu");
    let arid = matches!(county, "Mombasa" | "Kilifi" | "Garissa" | "Turkana");

    if species == "Indigenous Mix" && highland {
        adjustment += 12;
    } else if matches!(species, "Pine" | "Cypress") && highland {
        adjustment += 8;
    } else if species == "Neem" && arid {
        adjustment += 10;
    } else if species == "Eucalyptus" {
        adjustment += 3;
    } else if matches!(species, "Pine" | "Cypress") && matches!(county, "Mombasa" | "Kilifi") {
        adjustment -= 12;
    } else if species == "Neem" && matches!(county, "Meru" | "Nyeri") {
        adjustment -= 8;
    }

    adjustment.clamp(ADJUSTMENT_MIN, ADJUSTMENT_MAX)
}

fn fallback_explanation(ctx: &ExplainContext) -> String {
    if ctx.survival_rate >= 80.0 {
        format!(
            "{} grows excellently in {}'s environmental conditions. {}. Your chosen season \
             ({}) provides optimal growing conditions with good rainfall and temperature.",
            ctx.species, ctx.county, ctx.reason, ctx.season
        )
    } else if ctx.survival_rate >= 65.0 {
        format!(
            "{} performs well in {} with proper care. {}. Planting in {} is suitable, though \
             following care instructions closely will maximize success.",
            ctx.species, ctx.county, ctx.reason, ctx.season
        )
    } else {
        format!(
            "{} faces challenges in {} during {}. {}. Consider alternative species or wait \
             for the optimal planting season for better results.",
            ctx.species, ctx.county, ctx.season, ctx.reason
        )
    }
}

fn fallback_care_steps(ctx: &CareContext) -> Vec<String> {
    if ctx.survival_rate >= 80.0 {
        if ctx.base_care.is_empty() {
            vec![
                "Water regularly for first month".to_string(),
                "Apply mulch around base".to_string(),
                "Protect from livestock".to_string(),
                "Monitor for pests monthly".to_string(),
            ]
        } else {
            ctx.base_care.clone()
        }
    } else if ctx.survival_rate >= 65.0 {
        let mut steps = vec!["CRITICAL: Follow all care steps closely".to_string()];
        steps.extend(ctx.base_care.clone());
        steps.push("Check soil moisture weekly".to_string());
        steps.truncate(6);
        steps
    } else {
        vec![
            "Consider alternative species for this season".to_string(),
            "If proceeding: water daily for first 2 months".to_string(),
            "Apply organic fertilizer monthly".to_string(),
            "Provide shade during hot periods".to_string(),
            "Monitor daily for stress signs".to_string(),
        ]
    }
}

/// Strip markdown emphasis, quotes, and "word count" annotations.
pub fn sanitize(raw: &str) -> String {
    let mut text = raw.replace("**", "").replace('*', "").replace('"', "");
    text = text
        .trim_matches(|c| c == '\'' || c == '`' || char::is_whitespace(c))
        .to_string();

    // Drop parentheticals that announce a word count, e.g. "(Word count: 74)"
    // or "(74 words)"; leave other parentheticals alone.
    let mut search_from = 0;
    while let Some(open_rel) = text[search_from..].find('(') {
        let open = search_from + open_rel;
        let Some(close_rel) = text[open..].find(')') else {
            break;
        };
        let close = open + close_rel;
        let inner = text[open + 1..close].to_ascii_lowercase();
        if inner.contains("word") {
            text.replace_range(open..=close, "");
            search_from = open;
        } else {
            search_from = close + 1;
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        words.join(" ")
    } else {
        words[..max_words].join(" ")
    }
}

fn parse_first_int(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_digit() || ((c == '-' || c == '+') && i + 1 < bytes.len() && (bytes[i + 1] as char).is_ascii_digit()) {
            let start = i;
            i += 1;
            while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                i += 1;
            }
            return text[start..i].parse().ok();
        }
        i += 1;
    }
    None
}

fn parse_care_steps(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| {
            let cleaned = sanitize(line);
            cleaned
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-' || c == ')' || c == ' ')
                .trim()
                .to_string()
        })
        .filter(|step| {
            step.len() > 10
                && !step.ends_with("with")
                && !step.ends_with("using")
                && !step.ends_with("to")
                && !step.ends_with("for")
                && !step.ends_with("and")
                && !step.ends_with("or")
        })
        .take(6)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjustment_ctx(species: &str, county: &str, seasonal_bonus: f64) -> AdjustmentContext {
        AdjustmentContext {
            species: species.to_string(),
            county: county.to_string(),
            season: "March-May".to_string(),
            base_prediction: 70.0,
            ml_prediction: None,
            playbook_prediction: 80.0,
            seasonal_bonus,
            care_level: "Medium".to_string(),
            species_best_season: "March-May".to_string(),
        }
    }

    #[test]
    fn test_fallback_adjustment_bounds() {
        // Neem in Turkana with a strong seasonal bonus: +10 +5 clamps to +12
        let ctx = adjustment_ctx("Neem", "Turkana", 8.0);
        assert_eq!(fallback_adjustment(&ctx), 12);

        // Pine in Mombasa with an off-season penalty: -12 -3 = -15
        let ctx = adjustment_ctx("Pine", "Mombasa", -20.0);
        assert_eq!(fallback_adjustment(&ctx), -15);

        // Neutral pairing, neutral season
        let ctx = adjustment_ctx("Grevillea", "Machakos", 0.0);
        assert_eq!(fallback_adjustment(&ctx), 0);
    }

    #[test]
    fn test_fallback_adjustment_is_deterministic() {
        let ctx = adjustment_ctx("Indigenous Mix", "Meru", 8.0);
        assert_eq!(fallback_adjustment(&ctx), fallback_adjustment(&ctx));
    }

    #[test]
    fn test_sanitize_strips_markup_and_word_counts() {
        assert_eq!(
            sanitize("**Pine thrives** in \"cool\" highlands (Word count: 5)"),
            "Pine thrives in cool highlands"
        );
        assert_eq!(sanitize("Plant early. (42 words)"), "Plant early.");
        assert_eq!(
            sanitize("Keep mulch (not plastic) around the base"),
            "Keep mulch (not plastic) around the base"
        );
    }

    #[test]
    fn test_parse_first_int() {
        assert_eq!(parse_first_int("Adjustment: -8"), Some(-8));
        assert_eq!(parse_first_int("+5 because rains"), Some(5));
        assert_eq!(parse_first_int("12"), Some(12));
        assert_eq!(parse_first_int("no numbers here"), None);
    }

    #[test]
    fn test_parse_care_steps_strips_numbering() {
        let content = "1. Water the seedling twice weekly\n2) Mulch around the base deeply\n- Protect from livestock at all times\n3. Remove weeds every month\nok";
        let steps = parse_care_steps(content);
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0], "Water the seedling twice weekly");
        assert_eq!(steps[1], "Mulch around the base deeply");
    }

    #[test]
    fn test_fallback_care_steps_by_tier() {
        let base = vec!["Weed monthly".to_string(), "Mulch".to_string()];
        let low_risk = CareContext {
            species: "Pine".into(),
            county: "Nyeri".into(),
            season: "March-May".into(),
            survival_rate: 85.0,
            risk_level: "Low".into(),
            base_care: base.clone(),
        };
        assert_eq!(fallback_care_steps(&low_risk), base);

        let medium = CareContext {
            survival_rate: 70.0,
            ..low_risk.clone()
        };
        let steps = fallback_care_steps(&medium);
        assert!(steps[0].starts_with("CRITICAL"));
        assert!(steps.len() <= 6);

        let high = CareContext {
            survival_rate: 30.0,
            ..low_risk
        };
        assert_eq!(fallback_care_steps(&high).len(), 5);
    }

    #[tokio::test]
    async fn test_disabled_client_uses_fallbacks() {
        let client = LlmClient::new(None, "http://localhost:1".into(), "m".into(), 1000);
        assert!(!client.enabled());

        let outcome = client
            .score_adjustment(&adjustment_ctx("Eucalyptus", "Embu", 0.0))
            .await;
        assert!(!outcome.ai_used);
        assert_eq!(outcome.value, 3);

        let explain = client
            .explain(&ExplainContext {
                species: "Pine".into(),
                county: "Nyeri".into(),
                season: "March-May".into(),
                survival_rate: 85.0,
                risk_level: "Low".into(),
                reason: "Cool highland climate".into(),
            })
            .await;
        assert!(!explain.ai_used);
        assert!(explain.value.contains("Pine"));
    }
}
