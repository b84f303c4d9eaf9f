//! Msitu - tree survival decision engine and reward ledger
//!
//! Core of a community environmental-protection portal for Kenya:
//!
//! - **Playbook**: curated county/species compatibility knowledge base
//! - **Weather**: per-coordinate provider cache with graceful degradation
//! - **Classifier**: pre-fitted gradient-boosted survival model
//! - **LLM**: bounded adjustment/explanation/care oracle with fallbacks
//! - **Engine**: the fusion of all signal sources into one prediction
//! - **Ledger**: atomic point, badge, and carbon-credit awards
//!
//! The HTTP/HTML surface, sessions, and file storage are thin adapters that
//! live outside this crate.

pub mod api;
pub mod careplan;
pub mod classifier;
pub mod config;
pub mod db;
pub mod engine;
pub mod ledger;
pub mod llm;
pub mod playbook;
pub mod types;
pub mod weather;

pub use api::AppState;
pub use config::Config;
pub use types::{MsituError, Result};
