//! Data commands: `enrich`, `gaps`, `report` and `validate`.
//!
//! Each command loads a run config, reads the input tables it needs through
//! `winegap-io`, binds them to their schemas and hands them to the engine.
//! Human summaries go to stderr; JSON goes to stdout or a file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;
use winegap_config::{AccessContext, Settings};
use winegap_io::json::{export as export_json, table_to_json};
use winegap_io::{read_table, write_table};
use winegap_recon::engine::enrich_all;
use winegap_recon::enrich::enriched_table;
use winegap_recon::gaps::{detect_gaps, GapFilter};
use winegap_recon::model::{CatalogRole, CatalogTable, MatchTable, RawTable};
use winegap_recon::outcome::{Outcome, OutcomeStatus, Warning};
use winegap_recon::producer::ProducerNormalizer;
use winegap_recon::region::RegionTables;
use winegap_recon::schema::{bind_catalog, bind_matches};
use winegap_recon::{AnalysisReport, ReconError, ReconInput, RunConfig};

use crate::exit_codes::EXIT_WARNINGS;
use crate::CliError;

/// A parsed run config and the directory its relative paths resolve against.
pub struct LoadedConfig {
    pub config: RunConfig,
    pub base_dir: PathBuf,
}

impl LoadedConfig {
    fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// `explicit`, else `<output.dir>/<stem>.<format>` when an output
    /// directory is configured.
    fn output_path(&self, explicit: Option<PathBuf>, stem: &str) -> Option<PathBuf> {
        explicit.or_else(|| {
            let dir = self.config.output.dir.as_deref()?;
            Some(
                self.resolve(dir)
                    .join(format!("{stem}.{}", self.config.output.format.extension())),
            )
        })
    }
}

pub fn resolve_config(path: Option<PathBuf>, settings: &Settings) -> Result<LoadedConfig, CliError> {
    let path = path
        .or_else(|| settings.default_config.clone())
        .ok_or_else(|| {
            CliError::usage("no run config given")
                .with_hint("pass a config path or set default_config in settings.toml")
        })?;

    let text = fs::read_to_string(&path)
        .map_err(|e| CliError::runtime(format!("cannot read config {}: {e}", path.display())))?;
    let config = RunConfig::from_toml(&text)
        .map_err(|e| CliError::config(format!("{}: {e}", path.display())))?;
    debug!("config '{}' from {}", config.name, path.display());

    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(LoadedConfig { config, base_dir })
}

// ============================================================================
// Loading
// ============================================================================

fn load_catalog(loaded: &LoadedConfig, role: CatalogRole) -> Outcome<CatalogTable> {
    let catalog = match role {
        CatalogRole::Primary => &loaded.config.primary,
        CatalogRole::Secondary => &loaded.config.secondary,
    };
    match read_table(&loaded.resolve(&catalog.file), catalog.sheet.as_deref()) {
        Ok(table) => bind_catalog(role, catalog, table),
        Err(e) => Outcome::Failure(ReconError::Io(e)),
    }
}

fn load_matches(loaded: &LoadedConfig) -> Outcome<MatchTable> {
    let matches = &loaded.config.matches;
    match read_table(&loaded.resolve(&matches.file), matches.sheet.as_deref()) {
        Ok(table) => bind_matches(matches, table),
        Err(e) => Outcome::Failure(ReconError::Io(e)),
    }
}

/// Lookup tables keyed by the output column of their pass.
fn load_lookups(loaded: &LoadedConfig) -> HashMap<String, Result<RawTable, String>> {
    loaded
        .config
        .enrich
        .iter()
        .map(|pass| {
            let table = read_table(&loaded.resolve(&pass.file), pass.sheet.as_deref());
            (pass.column.clone(), table)
        })
        .collect()
}

fn load_regions(loaded: &LoadedConfig) -> Result<RegionTables, CliError> {
    match &loaded.config.regions {
        Some(file) => {
            let path = loaded.resolve(file);
            let text = fs::read_to_string(&path).map_err(|e| {
                CliError::runtime(format!("cannot read region table {}: {e}", path.display()))
            })?;
            RegionTables::from_toml(&text)
                .map_err(|e| CliError::config(format!("{}: {e}", path.display())))
        }
        None => RegionTables::bundled().map_err(|e| CliError::config(e.to_string())),
    }
}

/// Value of an input the command cannot do without. Warnings are printed.
fn required<T>(outcome: Outcome<T>, what: &str) -> Result<T, CliError> {
    let (value, warnings) = outcome
        .into_parts()
        .map_err(|e| CliError::runtime(format!("{what}: {e}")))?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    Ok(value)
}

fn log_access(access: &AccessContext) {
    if access.is_restricted() {
        debug!("access granted via {}", access.source().as_str());
    }
}

// ============================================================================
// Output
// ============================================================================

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;
    println!("{json}");
    Ok(())
}

fn write_output(table: &RawTable, path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| CliError::runtime(format!("cannot create {}: {e}", parent.display())))?;
    }
    write_table(table, path).map_err(|e| CliError::runtime(format!("cannot write output: {e}")))?;
    eprintln!("wrote {} ({} rows)", path.display(), table.len());
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

pub fn cmd_enrich(
    access: &AccessContext,
    loaded: LoadedConfig,
    output: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    log_access(access);
    let matches = required(load_matches(&loaded), "match table")?;
    let lookups = load_lookups(&loaded);
    let columns = required(enrich_all(&matches, &loaded.config.enrich, &lookups), "enrichment")?;
    let table = enriched_table(&matches, &columns);

    if let Some(path) = loaded.output_path(output, "matches_enriched") {
        write_output(&table, &path)?;
    }
    if json {
        print_json(&table_to_json(&table))?;
    }

    for column in &columns {
        let d = &column.diagnostics;
        eprintln!(
            "{}: {} of {} row(s) filled, {} common key(s), {} duplicate lookup key(s)",
            d.column,
            d.filled_rows,
            matches.len(),
            d.common_keys,
            d.duplicate_keys,
        );
    }
    Ok(())
}

pub fn cmd_gaps(
    access: &AccessContext,
    loaded: LoadedConfig,
    output: Option<PathBuf>,
    json: bool,
    filter: GapFilter,
) -> Result<(), CliError> {
    log_access(access);
    let config = &loaded.config;
    let primary = required(load_catalog(&loaded, CatalogRole::Primary), "primary catalog")?
        .filter_vintages(&config.analysis.vintages);
    let matches = required(load_matches(&loaded), "match table")?;

    let report = detect_gaps(&primary, &matches).map_err(|e| CliError::runtime(e.to_string()))?;
    let report = if filter.is_empty() {
        report
    } else {
        report.filtered(&filter)
    };
    let table = report.gap_table();

    if let Some(path) = loaded.output_path(output, "gaps") {
        write_output(&table, &path)?;
    }
    if json {
        print_json(&serde_json::json!({
            "counts": report.counts,
            "gaps": table_to_json(&table),
        }))?;
    }

    let c = &report.counts;
    eprintln!(
        "{} of {} {} product(s) not carried by {} ({} distinct matched id(s), {} unknown)",
        c.num_gaps,
        c.num_primary_total,
        config.primary_label(),
        config.secondary_label(),
        c.num_distinct_matched_ids,
        c.num_matched_ids_unknown,
    );
    Ok(())
}

pub fn cmd_report(
    access: &AccessContext,
    mut loaded: LoadedConfig,
    output: Option<PathBuf>,
    vintages: Vec<i32>,
    strict: bool,
) -> Result<(), CliError> {
    log_access(access);
    if !vintages.is_empty() {
        loaded.config.analysis.vintages = vintages;
    }
    let regions = load_regions(&loaded)?;

    let input = ReconInput {
        primary: load_catalog(&loaded, CatalogRole::Primary),
        secondary: load_catalog(&loaded, CatalogRole::Secondary),
        matches: load_matches(&loaded),
        lookups: load_lookups(&loaded),
    };
    let report = winegap_recon::run(&loaded.config, &input, &regions);

    match &output {
        Some(path) => {
            export_json(&report, path)
                .map_err(|e| CliError::runtime(format!("cannot write output: {e}")))?;
            eprintln!("wrote {}", path.display());
        }
        None => print_json(&report)?,
    }
    write_report_tables(&loaded, &report)?;
    print_summary(&report);

    let s = &report.summary;
    if strict && (s.failed > 0 || !report.warnings().is_empty()) {
        return Err(CliError {
            code: EXIT_WARNINGS,
            message: format!(
                "--strict: {} section(s) with warnings, {} failed",
                s.warned, s.failed
            ),
            hint: None,
        });
    }
    Ok(())
}

/// Enriched match table and gap table next to the report, when an output
/// directory is configured.
fn write_report_tables(loaded: &LoadedConfig, report: &AnalysisReport) -> Result<(), CliError> {
    if let Some(table) = &report.enriched {
        if let Some(path) = loaded.output_path(None, "matches_enriched") {
            write_output(table, &path)?;
        }
    }
    if let Some(gaps) = &report.gap_report {
        if let Some(path) = loaded.output_path(None, "gaps") {
            write_output(&gaps.gap_table(), &path)?;
        }
    }
    Ok(())
}

fn print_summary(report: &AnalysisReport) {
    let s = &report.summary;
    eprintln!(
        "report '{}': {} section(s) ok, {} with warnings, {} failed",
        report.meta.config_name, s.succeeded, s.warned, s.failed,
    );

    let sections = [
        ("primary_profile", report.primary_profile.status(), report.primary_profile.error()),
        ("secondary_profile", report.secondary_profile.status(), report.secondary_profile.error()),
        ("enrichment", report.enrichment.status(), report.enrichment.error()),
        ("matching", report.matching.status(), report.matching.error()),
        ("prices", report.prices.status(), report.prices.error()),
        ("performance", report.performance.status(), report.performance.error()),
        ("sweet_spots", report.sweet_spots.status(), report.sweet_spots.error()),
        ("gaps", report.gaps.status(), report.gaps.error()),
    ];
    for (name, status, error) in sections {
        match (status, error) {
            (OutcomeStatus::Success, _) => {}
            (_, Some(e)) => eprintln!("  {name}: {status}: {e}"),
            (_, None) => eprintln!("  {name}: {status}"),
        }
    }

    if let Some(m) = report.matching.value() {
        eprintln!(
            "matches: {} of {} rows ({:.1}%)",
            m.matched, m.total, m.match_rate_pct
        );
    }
    if let Some(g) = report.gaps.value() {
        eprintln!(
            "gaps: {} of {} {} product(s)",
            g.counts.num_gaps, g.counts.num_primary_total, report.meta.primary_label
        );
    }
    for warning in report.warnings() {
        eprintln!("warning: {warning}");
    }
}

#[derive(Default)]
struct Tally {
    warned: usize,
    failed: usize,
}

impl Tally {
    fn check(&mut self, name: &str, outcome: Outcome<usize>) {
        match outcome {
            Outcome::Success(rows) => eprintln!("  {name}: ok ({rows} rows)"),
            Outcome::Warning(rows, warnings) => {
                self.warned += 1;
                eprintln!("  {name}: {rows} rows, {} warning(s)", warnings.len());
                for w in &warnings {
                    eprintln!("    - {w}");
                }
            }
            Outcome::Failure(e) => {
                self.failed += 1;
                eprintln!("  {name}: error: {e}");
            }
        }
    }
}

fn lookup_status(loaded: &LoadedConfig, pass: &winegap_recon::config::EnrichPass) -> Outcome<usize> {
    let table = match read_table(&loaded.resolve(&pass.file), pass.sheet.as_deref()) {
        Ok(table) => table,
        Err(e) => return Outcome::Failure(ReconError::Io(e)),
    };
    let missing = [&pass.key, &pass.value]
        .into_iter()
        .filter(|column| table.column(column).is_none())
        .map(|column| Warning::MissingColumn {
            table: pass.file.clone(),
            column: column.clone(),
        })
        .collect();
    Outcome::from_parts(table.len(), missing)
}

pub fn cmd_validate(access: &AccessContext, loaded: LoadedConfig) -> Result<(), CliError> {
    log_access(access);
    let config = &loaded.config;

    let regions = load_regions(&loaded)?;
    for (role, catalog) in [("primary", &config.primary), ("secondary", &config.secondary)] {
        regions
            .resolver(catalog.scheme_name(role), &catalog.region_delimiter)
            .map_err(|e| CliError::config(format!("{role}: {e}")))?;
    }
    ProducerNormalizer::new(&config.producers).map_err(|e| CliError::config(e.to_string()))?;

    eprintln!(
        "valid: '{}' with {} enrich pass(es)",
        config.name,
        config.enrich.len()
    );

    let mut tally = Tally::default();
    tally.check(
        &config.primary_label(),
        load_catalog(&loaded, CatalogRole::Primary).map(|t| t.len()),
    );
    tally.check(
        &config.secondary_label(),
        load_catalog(&loaded, CatalogRole::Secondary).map(|t| t.len()),
    );
    tally.check("matches", load_matches(&loaded).map(|t| t.len()));
    for pass in &config.enrich {
        tally.check(&pass.column, lookup_status(&loaded, pass));
    }

    if tally.failed > 0 {
        return Err(CliError::runtime(format!(
            "{} input table(s) unusable, {} with warnings",
            tally.failed, tally.warned
        )));
    }
    Ok(())
}
