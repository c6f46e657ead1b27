//! `winegap normalize`: print the keys the joins compare.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;
use winegap_recon::config::ProducerVocabulary;
use winegap_recon::normalize::normalize_sku;
use winegap_recon::producer::ProducerNormalizer;
use winegap_recon::RunConfig;

use crate::CliError;

#[derive(Subcommand)]
pub enum NormalizeCommands {
    /// SKU / URL join key
    #[command(after_help = "\
Examples:
  winegap normalize sku 12345.0 '  77 ' nan")]
    Sku {
        #[arg(required = true)]
        values: Vec<String>,

        /// One JSON object per value
        #[arg(long)]
        json: bool,
    },

    /// Producer comparison key
    #[command(after_help = "\
Examples:
  winegap normalize producer 'Domaine Rouvinez' 'Antinori e Figli'
  winegap normalize producer 'Bodegas Torres' --config winegap.toml")]
    Producer {
        #[arg(required = true)]
        values: Vec<String>,

        /// Take the suffix and exclusion vocabulary from this run config
        #[arg(long)]
        config: Option<PathBuf>,

        /// One JSON object per value
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct KeyLine<'a> {
    input: &'a str,
    key: Option<String>,
}

pub fn cmd_normalize(cmd: NormalizeCommands) -> Result<(), CliError> {
    match cmd {
        NormalizeCommands::Sku { values, json } => {
            print_keys(&values, json, normalize_sku)
        }
        NormalizeCommands::Producer { values, config, json } => {
            let vocabulary = match config {
                Some(path) => load_vocabulary(&path)?,
                None => ProducerVocabulary::default(),
            };
            let normalizer =
                ProducerNormalizer::new(&vocabulary).map_err(|e| CliError::config(e.to_string()))?;
            print_keys(&values, json, |v| normalizer.key(Some(v)))
        }
    }
}

fn load_vocabulary(path: &Path) -> Result<ProducerVocabulary, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::runtime(format!("cannot read config {}: {e}", path.display())))?;
    let config = RunConfig::from_toml(&text).map_err(|e| CliError::config(e.to_string()))?;
    Ok(config.producers)
}

/// One key per line; a value without a key prints an empty line so that
/// output lines stay aligned with the inputs.
fn print_keys(
    values: &[String],
    json: bool,
    key: impl Fn(&str) -> Option<String>,
) -> Result<(), CliError> {
    for value in values {
        let k = key(value);
        if json {
            let line = serde_json::to_string(&KeyLine { input: value, key: k })
                .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;
            println!("{line}");
        } else {
            println!("{}", k.unwrap_or_default());
        }
    }
    Ok(())
}
