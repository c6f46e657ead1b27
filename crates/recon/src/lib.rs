//! `winegap-recon`: assortment reconciliation engine for two wine catalogs.
//!
//! Pure engine crate: receives pre-loaded raw tables, binds them to typed
//! records, joins them through normalized keys and returns an analysis report.
//! No CLI or IO dependencies.

pub mod config;
pub mod distribution;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod gaps;
pub mod model;
pub mod normalize;
pub mod outcome;
pub mod pricing;
pub mod producer;
pub mod profile;
pub mod region;
pub mod schema;

pub use config::RunConfig;
pub use engine::{run, AnalysisReport, ReconInput};
pub use error::ReconError;
pub use model::{CatalogTable, MatchTable, RawTable, Value};
pub use outcome::{Outcome, Warning};
