//! Configuration for the msitu engine
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;

/// Msitu - tree survival decision engine and reward ledger
#[derive(Parser, Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    #[arg(long, env = "DATABASE_PATH", default_value = "msitu.db")]
    pub database_path: String,

    /// Path to the pre-fitted classifier artifact (JSON bundle)
    #[arg(long, env = "MODEL_PATH", default_value = "models/tree_survival.json")]
    pub model_path: String,

    /// Version tag recorded with every prediction
    #[arg(long, env = "MODEL_VERSION", default_value = "v2.0.0")]
    pub model_version: String,

    /// OpenWeather API key; weather degrades to unavailable when unset
    #[arg(long, env = "WEATHER_API_KEY")]
    pub weather_api_key: Option<String>,

    /// Weather provider current-weather endpoint
    #[arg(
        long,
        env = "WEATHER_API_URL",
        default_value = "https://api.openweathermap.org/data/2.5/weather"
    )]
    pub weather_api_url: String,

    /// Weather cache TTL in seconds
    #[arg(long, env = "WEATHER_CACHE_TTL_S", default_value = "3600")]
    pub weather_cache_ttl_s: u64,

    /// LLM API key; the adapter falls back to deterministic rules when unset
    #[arg(long, env = "LLM_API_KEY")]
    pub llm_api_key: Option<String>,

    /// LLM chat-completions endpoint
    #[arg(
        long,
        env = "LLM_API_URL",
        default_value = "https://api.mistral.ai/v1/chat/completions"
    )]
    pub llm_api_url: String,

    /// LLM model identifier
    #[arg(long, env = "LLM_MODEL", default_value = "mistral-small")]
    pub llm_model: String,

    /// Per-call LLM timeout in milliseconds
    #[arg(long, env = "LLM_TIMEOUT_MS", default_value = "10000")]
    pub llm_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.weather_cache_ttl_s == 0 {
            return Err("WEATHER_CACHE_TTL_S must be greater than zero".to_string());
        }
        if self.llm_timeout_ms == 0 {
            return Err("LLM_TIMEOUT_MS must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Defaults suitable for tests: in-memory database, no external providers.
    pub fn for_tests(database_path: &str) -> Self {
        Config {
            database_path: database_path.to_string(),
            model_path: "models/tree_survival.json".to_string(),
            model_version: "v2.0.0".to_string(),
            weather_api_key: None,
            weather_api_url: "https://api.openweathermap.org/data/2.5/weather".to_string(),
            weather_cache_ttl_s: 3600,
            llm_api_key: None,
            llm_api_url: "https://api.mistral.ai/v1/chat/completions".to_string(),
            llm_model: "mistral-small".to_string(),
            llm_timeout_ms: 10_000,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::for_tests(":memory:");
        assert!(config.validate().is_ok());
        assert_eq!(config.weather_cache_ttl_s, 3600);
        assert_eq!(config.llm_timeout_ms, 10_000);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = Config::for_tests(":memory:");
        config.weather_cache_ttl_s = 0;
        assert!(config.validate().is_err());
    }
}
