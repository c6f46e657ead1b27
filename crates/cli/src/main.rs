// WineGap CLI - catalog reconciliation and gap analysis
// Commands: enrich, gaps, report, validate, normalize

mod exit_codes;
mod normalize;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use winegap_config::{AccessContext, AccessError, Settings};

use exit_codes::*;
use normalize::NormalizeCommands;

#[derive(Parser)]
#[command(name = "winegap")]
#[command(author, version, long_version = long_version(), about = "Find the products one wine catalog carries and the other does not")]
#[command(after_help = "\
Examples:
  winegap validate winegap.toml
  winegap enrich winegap.toml --output matches_enriched.xlsx
  winegap gaps winegap.toml --max-price 30 --wine-type Rotwein
  winegap report winegap.toml --output report.json --strict
  winegap normalize sku 12345.0 ' 77 '")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Settings file (default: <config dir>/winegap/settings.toml)
    #[arg(long, global = true, env = "WINEGAP_SETTINGS")]
    settings: Option<PathBuf>,

    /// More log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Join supplier and sales columns onto the match table
    #[command(after_help = "\
Examples:
  winegap enrich winegap.toml
  winegap enrich winegap.toml --output matches_enriched.csv
  winegap enrich winegap.toml --json | jq '.[0]'")]
    Enrich {
        /// Run config (default: default_config from settings)
        config: Option<PathBuf>,

        /// Write the enriched table (.csv, .tsv or .xlsx)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Print the enriched table as JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// List primary catalog products without a real match
    #[command(after_help = "\
Examples:
  winegap gaps winegap.toml --output gaps.xlsx
  winegap gaps winegap.toml --min-price 15 --max-price 40
  winegap gaps winegap.toml --wine-type Rotwein --wine-type Weisswein --json")]
    Gaps {
        /// Run config (default: default_config from settings)
        config: Option<PathBuf>,

        /// Write the gap table (.csv, .tsv or .xlsx)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Print counts and gap rows as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Keep gaps priced at or above this
        #[arg(long, value_name = "N")]
        min_price: Option<f64>,

        /// Keep gaps priced at or below this
        #[arg(long, value_name = "N")]
        max_price: Option<f64>,

        /// Keep gaps of this wine type (repeatable)
        #[arg(long = "wine-type", value_name = "TYPE")]
        wine_types: Vec<String>,
    },

    /// Run the full analysis and emit the JSON report
    #[command(after_help = "\
Examples:
  winegap report winegap.toml > report.json
  winegap report winegap.toml --output report.json
  winegap report winegap.toml --vintage 2019 --vintage 2020 --strict")]
    Report {
        /// Run config (default: default_config from settings)
        config: Option<PathBuf>,

        /// Write the JSON report to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Restrict both catalogs to these vintages (repeatable)
        #[arg(long = "vintage", value_name = "YEAR")]
        vintages: Vec<i32>,

        /// Exit 5 when any section warned or failed
        #[arg(long)]
        strict: bool,
    },

    /// Check a run config and the columns of every input table
    #[command(after_help = "\
Examples:
  winegap validate winegap.toml")]
    Validate {
        /// Run config (default: default_config from settings)
        config: Option<PathBuf>,
    },

    /// Print normalized join keys
    #[command(subcommand)]
    Normalize(NormalizeCommands),
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  winegap-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  winegap-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn init_logging(verbose: u8, configured: Option<&str>) {
    let default_filter = match verbose {
        0 => configured.unwrap_or("warn"),
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn load_settings(path: Option<PathBuf>) -> Result<Settings, CliError> {
    let path = path.unwrap_or_else(Settings::config_path);
    Settings::load_from(&path).map_err(|e| CliError {
        code: EXIT_CONFIG,
        message: format!("invalid settings: {e}"),
        hint: None,
    })
}

fn authorize(settings: &Settings) -> Result<AccessContext, CliError> {
    AccessContext::authorize(settings).map_err(CliError::access)
}

fn dispatch(cli: Cli, settings: Settings) -> Result<(), CliError> {
    match cli.command {
        None => {
            // No subcommand = show help
            eprintln!("Usage: winegap <command> [options]");
            eprintln!("       winegap --help for more information");
            Ok(())
        }
        Some(Commands::Normalize(cmd)) => normalize::cmd_normalize(cmd),
        Some(Commands::Enrich { config, output, json }) => {
            let access = authorize(&settings)?;
            let config = run::resolve_config(config, &settings)?;
            run::cmd_enrich(&access, config, output, json)
        }
        Some(Commands::Gaps {
            config,
            output,
            json,
            min_price,
            max_price,
            wine_types,
        }) => {
            let access = authorize(&settings)?;
            let config = run::resolve_config(config, &settings)?;
            let filter = winegap_recon::gaps::GapFilter {
                min_price,
                max_price,
                wine_types,
            };
            run::cmd_gaps(&access, config, output, json, filter)
        }
        Some(Commands::Report {
            config,
            output,
            vintages,
            strict,
        }) => {
            let access = authorize(&settings)?;
            let config = run::resolve_config(config, &settings)?;
            run::cmd_report(&access, config, output, vintages, strict)
        }
        Some(Commands::Validate { config }) => {
            let access = authorize(&settings)?;
            let config = run::resolve_config(config, &settings)?;
            run::cmd_validate(&access, config)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = load_settings(cli.settings.clone()).and_then(|settings| {
        init_logging(cli.verbose, settings.log_level.as_deref());
        dispatch(cli, settings)
    });

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self { code: EXIT_RUNTIME, message: msg.into(), hint: None }
    }

    pub fn access(err: AccessError) -> Self {
        let hint = match err {
            AccessError::MissingKey | AccessError::Denied => Some(format!(
                "set {} to the key whose SHA-256 is configured in {}",
                winegap_config::access::ACCESS_KEY_ENV,
                Settings::config_path_display()
            )),
            AccessError::InvalidDigest => Some("re-create access_key_sha256 in settings.toml".to_string()),
        };
        let code = match err {
            AccessError::InvalidDigest => EXIT_CONFIG,
            _ => EXIT_ACCESS_DENIED,
        };
        Self { code, message: err.to_string(), hint }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
