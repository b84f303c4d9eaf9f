//! Declarative playbook seed: the curated county/species knowledge base.
//!
//! Loaded once into SQLite at provisioning; `seed` is idempotent and can be
//! re-run to refresh records (administrative reseed).

use rusqlite::params;
use tracing::info;

use crate::db::Database;
use crate::types::Result;

struct CountySeed {
    name: &'static str,
    latitude: f64,
    longitude: f64,
    rainfall_mm: (f64, f64),
    temperature_c: (f64, f64),
    altitude_m: (f64, f64),
    soil_ph: (f64, f64),
    soil_type: &'static str,
    climate_zone: &'static str,
    best_season: &'static str,
}

struct SpeciesSeed {
    name: &'static str,
    soil: &'static str,
    rainfall: &'static str,
    temperature: &'static str,
    care_level: &'static str,
    best_season: &'static str,
    planting_method: &'static str,
    water: &'static str,
    base_survival_rate: f64,
    planting_guide: &'static [&'static str],
    care_instructions: &'static [&'static str],
}

struct CompatSeed {
    county: &'static str,
    species: &'static str,
    survival_rate: f64,
    rank: i64,
    match_score: f64,
    // Ordered: the first key whose months overlap the requested season wins.
    seasonal_bonus: &'static [(&'static str, f64)],
    reason: &'static str,
}

const COUNTIES: &[CountySeed] = &[
    CountySeed {
        name: "Meru",
        latitude: -0.0469,
        longitude: 37.6556,
        rainfall_mm: (600.0, 1500.0),
        temperature_c: (15.0, 25.0),
        altitude_m: (1200.0, 2000.0),
        soil_ph: (6.0, 7.5),
        soil_type: "Clay / Loam",
        climate_zone: "Semi-Humid",
        best_season: "March–May, Oct–Dec",
    },
    CountySeed {
        name: "Nakuru",
        latitude: -0.3031,
        longitude: 36.08,
        rainfall_mm: (800.0, 1400.0),
        temperature_c: (12.0, 22.0),
        altitude_m: (1600.0, 2100.0),
        soil_ph: (5.5, 6.8),
        soil_type: "Volcanic / Loam",
        climate_zone: "Sub-Humid",
        best_season: "March–June, Oct–Dec",
    },
    CountySeed {
        name: "Machakos",
        latitude: -1.5177,
        longitude: 37.2634,
        rainfall_mm: (500.0, 1100.0),
        temperature_c: (18.0, 27.0),
        altitude_m: (1000.0, 1600.0),
        soil_ph: (6.0, 7.4),
        soil_type: "Red Soil / Clay",
        climate_zone: "Semi-Arid",
        best_season: "March–May",
    },
    CountySeed {
        name: "Turkana",
        latitude: 3.1167,
        longitude: 35.5833,
        rainfall_mm: (100.0, 300.0),
        temperature_c: (28.0, 36.0),
        altitude_m: (300.0, 900.0),
        soil_ph: (7.5, 8.5),
        soil_type: "Rocky / Sandy",
        climate_zone: "Extremely Arid",
        best_season: "Any (if irrigated)",
    },
    CountySeed {
        name: "Garissa",
        latitude: -0.4569,
        longitude: 39.6582,
        rainfall_mm: (250.0, 350.0),
        temperature_c: (26.0, 34.0),
        altitude_m: (150.0, 400.0),
        soil_ph: (6.0, 7.0),
        soil_type: "Red Soil",
        climate_zone: "Arid",
        best_season: "March–May",
    },
    CountySeed {
        name: "Mombasa",
        latitude: -4.0435,
        longitude: 39.6682,
        rainfall_mm: (1000.0, 1200.0),
        temperature_c: (24.0, 32.0),
        altitude_m: (0.0, 50.0),
        soil_ph: (6.5, 7.8),
        soil_type: "Sandy / Coral",
        climate_zone: "Coastal Humid",
        best_season: "April–June",
    },
    CountySeed {
        name: "Nyeri",
        latitude: -0.4167,
        longitude: 36.95,
        rainfall_mm: (900.0, 1600.0),
        temperature_c: (12.0, 20.0),
        altitude_m: (1700.0, 2100.0),
        soil_ph: (6.0, 7.0),
        soil_type: "Volcanic / Clay",
        climate_zone: "Sub-Humid",
        best_season: "March–May, October–December",
    },
    CountySeed {
        name: "Kiambu",
        latitude: -1.1714,
        longitude: 36.8356,
        rainfall_mm: (800.0, 1400.0),
        temperature_c: (14.0, 22.0),
        altitude_m: (1500.0, 1900.0),
        soil_ph: (6.2, 7.2),
        soil_type: "Clay / Loam",
        climate_zone: "Sub-Humid",
        best_season: "March–May, October–December",
    },
    CountySeed {
        name: "Embu",
        latitude: -0.5314,
        longitude: 37.457,
        rainfall_mm: (500.0, 1500.0),
        temperature_c: (18.0, 28.0),
        altitude_m: (1200.0, 1800.0),
        soil_ph: (6.0, 7.3),
        soil_type: "Red Soil / Clay",
        climate_zone: "Semi-Humid",
        best_season: "March–May, October–December",
    },
];

const SPECIES: &[SpeciesSeed] = &[
    SpeciesSeed {
        name: "Grevillea",
        soil: "Loam / Clay-loam",
        rainfall: "600–1800mm",
        temperature: "15–28°C",
        care_level: "Low",
        best_season: "March–May, October–December",
        planting_method: "Seedling",
        water: "Weekly watering for the first 4 weeks",
        base_survival_rate: 75.0,
        planting_guide: &[
            "Dig a hole 2x2 ft",
            "Mix soil with compost/manure",
            "Place seedling upright",
            "Mulch to retain moisture",
            "Water immediately after planting",
        ],
        care_instructions: &[
            "Mulch every 2–3 months",
            "Protect from goats/livestock",
            "Remove weeds monthly",
            "Water during long dry periods",
        ],
    },
    SpeciesSeed {
        name: "Cypress",
        soil: "Clay / Volcanic",
        rainfall: "700–1500mm",
        temperature: "12–22°C",
        care_level: "Medium",
        best_season: "March–June",
        planting_method: "Cutting or Seedling",
        water: "2x per week for first month",
        base_survival_rate: 78.0,
        planting_guide: &[
            "Dig deep hole (3x3 ft)",
            "Add compost and topsoil",
            "Stake if area is windy",
            "Water deeply after planting",
        ],
        care_instructions: &[
            "Weed monthly",
            "Apply manure annually",
            "Prune to shape",
            "Protect from frost in high areas",
        ],
    },
    SpeciesSeed {
        name: "Pine",
        soil: "Red soil / Clay / Sandy-loam",
        rainfall: "800–1800mm",
        temperature: "10–22°C",
        care_level: "Medium",
        best_season: "March–June",
        planting_method: "Seedling",
        water: "Weekly for 2 months",
        base_survival_rate: 80.0,
        planting_guide: &[
            "Prepare hole 2x2 ft",
            "Apply compost",
            "Water thoroughly",
            "Ensure spacing of 1.5–3m",
        ],
        care_instructions: &[
            "Remove weeds regularly",
            "Mulch during dry season",
            "Protect from livestock",
            "Check for pests annually",
        ],
    },
    SpeciesSeed {
        name: "Neem",
        soil: "Red soil / Sandy soil",
        rainfall: "200–600mm",
        temperature: "24–34°C",
        care_level: "Low",
        best_season: "March–April",
        planting_method: "Seedling or Direct Seeding",
        water: "Little water (can survive drought)",
        base_survival_rate: 70.0,
        planting_guide: &[
            "Dig 2x2 ft hole",
            "Mix soil with little manure",
            "Plant the seedling",
            "Water lightly",
        ],
        care_instructions: &[
            "Minimal care required",
            "Keep area weed-free",
            "Water once every 10–14 days during drought",
            "Protect from termites",
        ],
    },
    SpeciesSeed {
        name: "Eucalyptus",
        soil: "Sandy / Loam",
        rainfall: "400–1200mm",
        temperature: "18–32°C",
        care_level: "Low",
        best_season: "March–May",
        planting_method: "Seedling",
        water: "Weekly for 4 weeks",
        base_survival_rate: 72.0,
        planting_guide: &[
            "Dig hole 2 ft deep",
            "Fill with manure and topsoil",
            "Plant straight and firm",
            "Mulch lightly",
        ],
        care_instructions: &[
            "Weed around base",
            "Avoid planting near rivers (drinks a lot)",
            "Prune after 1 year",
        ],
    },
    SpeciesSeed {
        name: "Indigenous Mix",
        soil: "Loam / Clay / Volcanic",
        rainfall: "600–1800mm",
        temperature: "12–26°C",
        care_level: "Medium",
        best_season: "March–May",
        planting_method: "Seedling",
        water: "Weekly for 1 month",
        base_survival_rate: 85.0,
        planting_guide: &["Dig hole 2x2 ft", "Fill with compost", "Water well", "Mulch"],
        care_instructions: &[
            "Weed regularly",
            "Apply mulch",
            "Protect from livestock",
            "Prune lightly after 1 year",
        ],
    },
];

const COMPATIBILITY: &[CompatSeed] = &[
    // Meru
    CompatSeed {
        county: "Meru",
        species: "Indigenous Mix",
        survival_rate: 85.0,
        rank: 1,
        match_score: 98.0,
        seasonal_bonus: &[("March-May", 8.0), ("Oct-Dec", 5.0), ("June-Sept", -15.0)],
        reason: "Native highland species - perfectly adapted to Meru's climate and soil",
    },
    CompatSeed {
        county: "Meru",
        species: "Grevillea",
        survival_rate: 78.0,
        rank: 2,
        match_score: 85.0,
        seasonal_bonus: &[("Oct-Dec", 12.0), ("March-May", 6.0), ("June-Sept", -18.0)],
        reason: "Thrives in Meru's highland conditions, especially during short rains (Oct-Dec)",
    },
    CompatSeed {
        county: "Meru",
        species: "Pine",
        survival_rate: 82.0,
        rank: 2,
        match_score: 88.0,
        seasonal_bonus: &[("March-June", 10.0), ("July-Sept", -8.0), ("Oct-Dec", 3.0)],
        reason: "Excellent for Meru highlands - cool temperatures and good rainfall",
    },
    CompatSeed {
        county: "Meru",
        species: "Cypress",
        survival_rate: 75.0,
        rank: 3,
        match_score: 80.0,
        seasonal_bonus: &[("March-June", 8.0), ("July-Sept", -12.0), ("Oct-Dec", 2.0)],
        reason: "Good highland species but needs consistent moisture",
    },
    // Nakuru
    CompatSeed {
        county: "Nakuru",
        species: "Pine",
        survival_rate: 88.0,
        rank: 1,
        match_score: 96.0,
        seasonal_bonus: &[("March-June", 7.0), ("July-Sept", -5.0), ("Oct-Dec", 4.0)],
        reason: "Perfect conditions - Nakuru's volcanic soil and cool climate ideal for Pine",
    },
    CompatSeed {
        county: "Nakuru",
        species: "Cypress",
        survival_rate: 85.0,
        rank: 2,
        match_score: 92.0,
        seasonal_bonus: &[("March-June", 6.0), ("July-Sept", -8.0), ("Oct-Dec", 3.0)],
        reason: "Excellent highland climate, volcanic soil perfect for Cypress",
    },
    CompatSeed {
        county: "Nakuru",
        species: "Indigenous Mix",
        survival_rate: 83.0,
        rank: 3,
        match_score: 90.0,
        seasonal_bonus: &[("March-May", 5.0), ("Oct-Dec", 4.0), ("June-Sept", -12.0)],
        reason: "Native highland species adapted to Nakuru's conditions",
    },
    // Machakos
    CompatSeed {
        county: "Machakos",
        species: "Indigenous Mix",
        survival_rate: 80.0,
        rank: 1,
        match_score: 92.0,
        seasonal_bonus: &[("March-May", 10.0), ("June-Sept", -8.0), ("Oct-Dec", 5.0)],
        reason: "Native dryland species - perfectly adapted to Machakos semi-arid conditions",
    },
    CompatSeed {
        county: "Machakos",
        species: "Neem",
        survival_rate: 76.0,
        rank: 2,
        match_score: 88.0,
        seasonal_bonus: &[("March-May", 12.0), ("June-Sept", -5.0), ("Oct-Dec", 3.0)],
        reason: "Excellent drought tolerance - thrives in Machakos dry conditions",
    },
    CompatSeed {
        county: "Machakos",
        species: "Grevillea",
        survival_rate: 65.0,
        rank: 3,
        match_score: 70.0,
        seasonal_bonus: &[("March-May", 15.0), ("June-Sept", -20.0), ("Oct-Dec", 5.0)],
        reason: "Challenging but possible with extra care during wet season only",
    },
    // Turkana
    CompatSeed {
        county: "Turkana",
        species: "Neem",
        survival_rate: 82.0,
        rank: 1,
        match_score: 95.0,
        seasonal_bonus: &[("March-April", 8.0), ("Irrigated", 15.0), ("June-Sept", -25.0)],
        reason: "Perfect for Turkana - exceptional drought and heat tolerance",
    },
    CompatSeed {
        county: "Turkana",
        species: "Indigenous Mix",
        survival_rate: 75.0,
        rank: 2,
        match_score: 85.0,
        seasonal_bonus: &[("March-May", 10.0), ("Irrigated", 12.0), ("June-Sept", -20.0)],
        reason: "Native dryland acacias adapted to extreme arid conditions",
    },
    CompatSeed {
        county: "Turkana",
        species: "Eucalyptus",
        survival_rate: 55.0,
        rank: 3,
        match_score: 60.0,
        seasonal_bonus: &[("March-May", 15.0), ("Irrigated", 20.0), ("June-Sept", -30.0)],
        reason: "High risk - only with irrigation and intensive care",
    },
    // Garissa
    CompatSeed {
        county: "Garissa",
        species: "Neem",
        survival_rate: 76.0,
        rank: 1,
        match_score: 91.0,
        seasonal_bonus: &[("March-May", 8.0), ("Irrigated", 12.0), ("Dry", -18.0)],
        reason: "Best species for arid conditions, minimal water needs",
    },
    // Mombasa
    CompatSeed {
        county: "Mombasa",
        species: "Neem",
        survival_rate: 78.0,
        rank: 1,
        match_score: 85.0,
        seasonal_bonus: &[("April-June", 8.0), ("July-Sept", 2.0), ("Oct-Dec", 3.0)],
        reason: "Good heat tolerance for Mombasa's hot coastal climate",
    },
    CompatSeed {
        county: "Mombasa",
        species: "Indigenous Mix",
        survival_rate: 72.0,
        rank: 2,
        match_score: 80.0,
        seasonal_bonus: &[("April-June", 10.0), ("July-Sept", -5.0), ("Oct-Dec", 5.0)],
        reason: "Native coastal species adapted to Mombasa conditions",
    },
    CompatSeed {
        county: "Mombasa",
        species: "Grevillea",
        survival_rate: 58.0,
        rank: 3,
        match_score: 65.0,
        seasonal_bonus: &[("April-June", 15.0), ("July-Sept", -15.0), ("Oct-Dec", 5.0)],
        reason: "Challenging - needs intensive care and optimal timing",
    },
    CompatSeed {
        county: "Mombasa",
        species: "Pine",
        survival_rate: 35.0,
        rank: 4,
        match_score: 40.0,
        seasonal_bonus: &[("April-June", 10.0), ("July-Sept", -20.0), ("Oct-Dec", 5.0)],
        reason: "Very high risk - coastal heat unsuitable for highland Pine",
    },
    // Nyeri
    CompatSeed {
        county: "Nyeri",
        species: "Pine",
        survival_rate: 92.0,
        rank: 1,
        match_score: 98.0,
        seasonal_bonus: &[("March-June", 5.0), ("July-Sept", -3.0), ("Oct-Dec", 4.0)],
        reason: "Absolute best conditions - Nyeri's cool highland climate perfect for Pine",
    },
    CompatSeed {
        county: "Nyeri",
        species: "Indigenous Mix",
        survival_rate: 90.0,
        rank: 2,
        match_score: 96.0,
        seasonal_bonus: &[("March-May", 6.0), ("Oct-Dec", 5.0), ("June-Sept", -8.0)],
        reason: "Native highland species - excellent adaptation to Nyeri conditions",
    },
    CompatSeed {
        county: "Nyeri",
        species: "Cypress",
        survival_rate: 87.0,
        rank: 3,
        match_score: 92.0,
        seasonal_bonus: &[("March-June", 4.0), ("July-Sept", -6.0), ("Oct-Dec", 3.0)],
        reason: "Excellent highland species for Nyeri's cool climate",
    },
    CompatSeed {
        county: "Nyeri",
        species: "Grevillea",
        survival_rate: 84.0,
        rank: 4,
        match_score: 88.0,
        seasonal_bonus: &[("March-May", 6.0), ("Oct-Dec", 8.0), ("June-Sept", -10.0)],
        reason: "Good highland adaptation, thrives in Nyeri's conditions",
    },
    // Kiambu
    CompatSeed {
        county: "Kiambu",
        species: "Grevillea",
        survival_rate: 87.0,
        rank: 1,
        match_score: 94.0,
        seasonal_bonus: &[("March-May", 6.0), ("Oct-Dec", 4.0), ("June-Sept", -8.0)],
        reason: "Excellent highland adaptation, perfect for coffee agroforestry",
    },
    CompatSeed {
        county: "Kiambu",
        species: "Cypress",
        survival_rate: 83.0,
        rank: 2,
        match_score: 90.0,
        seasonal_bonus: &[("March-June", 3.0), ("July-Sept", -8.0), ("Oct-Dec", 1.0)],
        reason: "Good highland species, suitable climate and altitude",
    },
    // Embu
    CompatSeed {
        county: "Embu",
        species: "Grevillea",
        survival_rate: 81.0,
        rank: 1,
        match_score: 87.0,
        seasonal_bonus: &[("March-May", 5.0), ("Oct-Dec", 3.0), ("June-Sept", -10.0)],
        reason: "Good highland adaptation, excellent for agroforestry",
    },
    CompatSeed {
        county: "Embu",
        species: "Cypress",
        survival_rate: 81.0,
        rank: 2,
        match_score: 86.0,
        seasonal_bonus: &[("March-June", 3.0), ("July-Sept", -10.0), ("Oct-Dec", 1.0)],
        reason: "Highland species, good timber potential",
    },
    CompatSeed {
        county: "Embu",
        species: "Indigenous Mix",
        survival_rate: 87.0,
        rank: 1,
        match_score: 94.0,
        seasonal_bonus: &[("March-May", 5.0), ("Oct-Dec", 3.0), ("June-Sept", -8.0)],
        reason: "Native species perfectly adapted to eastern highlands",
    },
];

/// Load the playbook into the database. Idempotent: existing rows are
/// replaced, so a reseed refreshes every record in place.
pub async fn seed(db: &Database) -> Result<()> {
    let conn = db.lock().await;

    for county in COUNTIES {
        conn.execute(
            "INSERT OR REPLACE INTO counties (name, latitude, longitude) VALUES (?1, ?2, ?3)",
            params![county.name, county.latitude, county.longitude],
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO county_environments
             (county, rainfall_mm_min, rainfall_mm_max, temperature_c_min, temperature_c_max,
              altitude_m_min, altitude_m_max, soil_ph_min, soil_ph_max,
              soil_type, climate_zone, best_season)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                county.name,
                county.rainfall_mm.0,
                county.rainfall_mm.1,
                county.temperature_c.0,
                county.temperature_c.1,
                county.altitude_m.0,
                county.altitude_m.1,
                county.soil_ph.0,
                county.soil_ph.1,
                county.soil_type,
                county.climate_zone,
                county.best_season,
            ],
        )?;
    }

    for sp in SPECIES {
        conn.execute(
            "INSERT OR REPLACE INTO species
             (name, soil, rainfall, temperature, care_level, best_season, planting_method,
              water, base_survival_rate, planting_guide, care_instructions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                sp.name,
                sp.soil,
                sp.rainfall,
                sp.temperature,
                sp.care_level,
                sp.best_season,
                sp.planting_method,
                sp.water,
                sp.base_survival_rate,
                serde_json::to_string(sp.planting_guide).unwrap_or_else(|_| "[]".into()),
                serde_json::to_string(sp.care_instructions).unwrap_or_else(|_| "[]".into()),
            ],
        )?;
    }

    for compat in COMPATIBILITY {
        let seasonal: Vec<(String, f64)> = compat
            .seasonal_bonus
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        conn.execute(
            "INSERT OR REPLACE INTO county_species
             (county, species, survival_rate, species_rank, match_score,
              seasonal_performance, recommendation_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                compat.county,
                compat.species,
                compat.survival_rate,
                compat.rank,
                compat.match_score,
                serde_json::to_string(&seasonal).unwrap_or_else(|_| "[]".into()),
                compat.reason,
            ],
        )?;
    }

    info!(
        counties = COUNTIES.len(),
        species = SPECIES.len(),
        compatibility = COMPATIBILITY.len(),
        "Playbook seeded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_county_has_a_rank_one_species() {
        for county in COUNTIES {
            assert!(
                COMPATIBILITY
                    .iter()
                    .any(|c| c.county == county.name && c.rank == 1),
                "county {} has no rank-1 species",
                county.name
            );
        }
    }

    #[test]
    fn test_survival_rates_within_bounds() {
        for compat in COMPATIBILITY {
            assert!(
                (15.0..=95.0).contains(&compat.survival_rate),
                "{} / {} survival out of range",
                compat.county,
                compat.species
            );
            for (_, bonus) in compat.seasonal_bonus {
                assert!((-30.0..=15.0).contains(bonus));
            }
        }
        for sp in SPECIES {
            assert!((0.0..=100.0).contains(&sp.base_survival_rate));
        }
    }

    #[test]
    fn test_environment_ranges_ordered() {
        for county in COUNTIES {
            assert!(county.rainfall_mm.0 <= county.rainfall_mm.1);
            assert!(county.temperature_c.0 <= county.temperature_c.1);
            assert!(county.altitude_m.0 <= county.altitude_m.1);
            assert!(county.soil_ph.0 <= county.soil_ph.1);
        }
    }

    #[test]
    fn test_compatibility_references_resolve() {
        for compat in COMPATIBILITY {
            assert!(COUNTIES.iter().any(|c| c.name == compat.county));
            assert!(SPECIES.iter().any(|s| s.name == compat.species));
        }
    }
}
