//! msitu: CLI surface over the decision engine and ledger.
//!
//! Each subcommand is a thin adapter: parse arguments, call the core API,
//! print the JSON DTO.

use clap::{Parser, Subcommand};
use tracing::info;

use msitu::api::PredictionRequest;
use msitu::ledger::{Actor, TransactionType};
use msitu::{AppState, Config};

#[derive(Parser)]
#[command(name = "msitu")]
#[command(about = "Tree survival prediction and carbon ledger for Kenyan reforestation")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load or refresh the planting playbook seed
    Seed,

    /// Predict survival for a planting proposal
    Predict {
        #[arg(long)]
        species: String,
        #[arg(long)]
        county: String,
        #[arg(long)]
        season: String,
        #[arg(long, default_value = "Seedling")]
        method: String,
        #[arg(long, default_value = "Medium")]
        care: String,
        #[arg(long)]
        user: Option<String>,
    },

    /// Ranked species recommendations for a county
    Recommend {
        #[arg(long)]
        county: String,
        #[arg(long, default_value = "0")]
        min_survival: f64,
    },

    /// Detect the nearest county from GPS coordinates
    DetectCounty {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
    },

    /// Register a tree planting (starts in the planned state)
    PlantTree {
        #[arg(long)]
        planter: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        trees: u32,
    },

    /// Mark a planned planting as planted
    MarkPlanted {
        #[arg(long)]
        id: i64,
    },

    /// Verify a tree planting and award points, badges, and carbon credits
    VerifyTree {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        organization: bool,
    },

    /// File an environmental report
    FileReport {
        #[arg(long)]
        reporter: String,
        #[arg(long)]
        title: String,
    },

    /// Verify an environmental report
    VerifyReport {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        organization: bool,
    },

    /// Close out a verified environmental report
    ResolveReport {
        #[arg(long)]
        id: i64,
    },

    /// Sell carbon credits or fund a conservation project
    Transact {
        #[arg(long)]
        user: String,
        #[arg(long, value_parser = ["sell", "fund"])]
        kind: String,
        #[arg(long)]
        amount: f64,
    },

    /// Show a user's balances and badges
    Balances {
        #[arg(long)]
        user: String,
    },
}

fn verifier(name: &str, organization: bool) -> Actor {
    if organization {
        Actor::organization(name)
    } else {
        Actor::admin(name)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!("msitu={}", cli.config.log_level))
            }),
        )
        .init();

    cli.config.validate().map_err(anyhow::Error::msg)?;
    let state = AppState::new(&cli.config).await?;

    match cli.command {
        Command::Seed => {
            state.seed().await?;
            info!("Playbook seeded");
        }
        Command::Predict {
            species,
            county,
            season,
            method,
            care,
            user,
        } => {
            let response = state
                .predict_survival(&PredictionRequest {
                    tree_species: Some(species),
                    county: Some(county),
                    planting_season: Some(season),
                    planting_method: Some(method),
                    care_level: Some(care),
                    user,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Recommend {
            county,
            min_survival,
        } => {
            let response = state.recommend_species(&county, min_survival)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::DetectCounty { lat, lon } => {
            let response = state.detect_county(lat, lon)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::PlantTree {
            planter,
            title,
            trees,
        } => {
            let id = state.db.create_tree_planting(&planter, &title, trees).await?;
            println!("{{\"success\": true, \"id\": {id}}}");
        }
        Command::MarkPlanted { id } => {
            state.db.mark_planted(id).await?;
            println!("{{\"success\": true, \"id\": {id}}}");
        }
        Command::VerifyTree {
            id,
            actor,
            organization,
        } => {
            let result = state.verify_tree(id, &verifier(&actor, organization)).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::FileReport { reporter, title } => {
            let id = state.db.create_report(&reporter, &title).await?;
            println!("{{\"success\": true, \"id\": {id}}}");
        }
        Command::VerifyReport {
            id,
            actor,
            organization,
        } => {
            let result = state
                .verify_report(id, &verifier(&actor, organization))
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::ResolveReport { id } => {
            state.db.resolve_report(id).await?;
            println!("{{\"success\": true, \"id\": {id}}}");
        }
        Command::Transact { user, kind, amount } => {
            let kind = if kind == "sell" {
                TransactionType::Sell
            } else {
                TransactionType::Fund
            };
            let result = state.marketplace_transact(&user, kind, amount).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Balances { user } => {
            let balances = state.balances(&user).await?;
            println!("{}", serde_json::to_string_pretty(&balances)?);
        }
    }

    Ok(())
}
