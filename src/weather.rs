//! Per-coordinate weather retrieval with a process-local TTL cache.
//!
//! Entries within the TTL are served directly; a miss triggers one bounded
//! HTTP call to the provider. Any failure (missing key, timeout, non-2xx,
//! malformed body) degrades to `None`; weather is never an error to the
//! caller. Concurrent fills of the same key race last-writer-wins; within
//! the TTL the entries are equivalent.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Immutable captured weather record, persisted alongside predictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub latitude: f64,
    pub longitude: f64,
    pub temperature_c: f64,
    pub humidity: f64,
    pub rain_mm_hour: f64,
    pub wind_speed: f64,
    pub source: String,
    pub cached: bool,
}

/// Daily rainfall classification used by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RainStatus {
    Dry,
    Optimal,
    Excess,
}

/// Convert the provider's hourly rainfall into a daily estimate and class.
pub fn normalize_rainfall(rain_mm_hour: f64) -> (f64, RainStatus) {
    let daily = rain_mm_hour * 24.0;
    let status = if daily < 2.0 {
        RainStatus::Dry
    } else if daily <= 10.0 {
        RainStatus::Optimal
    } else {
        RainStatus::Excess
    };
    (daily, status)
}

struct CachedEntry {
    snapshot: WeatherSnapshot,
    fetched_at: Instant,
}

/// Weather provider client with per-coordinate caching.
pub struct WeatherService {
    api_key: Option<String>,
    api_url: String,
    ttl: Duration,
    client: reqwest::Client,
    cache: DashMap<(i64, i64), CachedEntry>,
}

impl WeatherService {
    pub fn new(api_key: Option<String>, api_url: String, ttl_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        WeatherService {
            api_key,
            api_url,
            ttl: Duration::from_secs(ttl_seconds),
            client,
            cache: DashMap::new(),
        }
    }

    /// Coordinates rounded to ~100 m so nearby requests share an entry.
    fn cache_key(lat: f64, lon: f64) -> (i64, i64) {
        ((lat * 1000.0).round() as i64, (lon * 1000.0).round() as i64)
    }

    /// Current weather for the coordinates, or `None` when unavailable.
    pub async fn get_weather(&self, lat: f64, lon: f64) -> Option<WeatherSnapshot> {
        let key = Self::cache_key(lat, lon);

        if let Some(entry) = self.cache.get(&key) {
            if entry.fetched_at.elapsed() < self.ttl {
                debug!(lat, lon, "Serving cached weather");
                let mut snapshot = entry.snapshot.clone();
                snapshot.cached = true;
                return Some(snapshot);
            }
        }

        let api_key = self.api_key.as_ref()?;

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("units", "metric".to_string()),
                ("appid", api_key.clone()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = %r.status(), "Weather provider returned an error");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Weather request failed");
                return None;
            }
        };

        let body: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Weather response was not valid JSON");
                return None;
            }
        };

        let snapshot = Self::parse_snapshot(lat, lon, &body);
        debug!(
            lat,
            lon,
            temperature = snapshot.temperature_c,
            humidity = snapshot.humidity,
            "Fetched live weather"
        );

        self.cache.insert(
            key,
            CachedEntry {
                snapshot: snapshot.clone(),
                fetched_at: Instant::now(),
            },
        );
        Some(snapshot)
    }

    fn parse_snapshot(lat: f64, lon: f64, body: &serde_json::Value) -> WeatherSnapshot {
        let main = &body["main"];
        WeatherSnapshot {
            latitude: lat,
            longitude: lon,
            temperature_c: main["temp"].as_f64().unwrap_or(20.0),
            humidity: main["humidity"].as_f64().unwrap_or(65.0),
            rain_mm_hour: body["rain"]["1h"].as_f64().unwrap_or(0.0),
            wind_speed: body["wind"]["speed"].as_f64().unwrap_or(2.0),
            source: "openweather".to_string(),
            cached: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rainfall_classification() {
        assert_eq!(normalize_rainfall(0.0).1, RainStatus::Dry);
        let (daily, status) = normalize_rainfall(0.05);
        assert!((daily - 1.2).abs() < 1e-9);
        assert_eq!(status, RainStatus::Dry);
        assert_eq!(normalize_rainfall(0.2).1, RainStatus::Optimal);
        assert_eq!(normalize_rainfall(0.5).1, RainStatus::Excess);
    }

    #[test]
    fn test_cache_key_rounds_nearby_coords_together() {
        assert_eq!(
            WeatherService::cache_key(-0.41672, 36.95001),
            WeatherService::cache_key(-0.41669, 36.94999)
        );
        assert_ne!(
            WeatherService::cache_key(-0.41, 36.95),
            WeatherService::cache_key(-0.42, 36.95)
        );
    }

    #[test]
    fn test_parse_snapshot_defaults() {
        let body = serde_json::json!({ "main": {}, "wind": {} });
        let snap = WeatherService::parse_snapshot(1.0, 2.0, &body);
        assert_eq!(snap.temperature_c, 20.0);
        assert_eq!(snap.humidity, 65.0);
        assert_eq!(snap.rain_mm_hour, 0.0);
        assert_eq!(snap.wind_speed, 2.0);
        assert!(!snap.cached);
    }

    #[tokio::test]
    async fn test_missing_key_degrades_to_none() {
        let service = WeatherService::new(None, "http://localhost:1".into(), 3600);
        assert!(service.get_weather(-0.42, 36.95).await.is_none());
    }
}
