//! Command implementations and console summaries.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use scenario_core::lint::check_reference_order;
use scenario_core::split::split_mega_csv;
use scenario_core::{
    CleanupEngine, CleanupReport, FactoryConfig, HandlerRegistry, RecordStore, Scenario,
    ScenarioMaterializer, ScenarioReport,
};
use tracing::info;

/// Opens a scenario given as a directory path or as a name under `data_dir`.
pub fn locate_scenario(data_dir: &Path, arg: &str) -> Result<Scenario> {
    let direct = PathBuf::from(arg);
    let path = if direct.is_dir() {
        direct
    } else {
        let named = data_dir.join(arg);
        if !named.is_dir() {
            bail!(
                "scenario '{}' not found; available in {}: {}",
                arg,
                data_dir.display(),
                available_scenarios(data_dir).join(", ")
            );
        }
        named
    };
    Scenario::open(&path).with_context(|| format!("failed to open scenario {}", path.display()))
}

fn available_scenarios(data_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(data_dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_dir())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    if names.is_empty() {
        names.push("(none)".to_string());
    }
    names
}

/// Materializes a scenario, optionally tearing down what it created.
///
/// The summary is printed even when the run aborts; teardown also runs
/// after an abort so a failed run leaves nothing behind.
pub fn run(
    store: &dyn RecordStore,
    handlers: &HandlerRegistry,
    config: FactoryConfig,
    scenario: &Scenario,
    teardown: bool,
) -> Result<()> {
    let mut materializer = ScenarioMaterializer::new(store, handlers, config.clone());
    let result = materializer.run(scenario);
    let report = match &result {
        Ok(report) => report,
        Err(failure) => &failure.report,
    };
    print!("{}", render_report(report));

    if teardown {
        let (_, journal) = materializer.into_parts();
        info!(records = journal.len(), "tearing down");
        let cleanup = CleanupEngine::new(store, handlers, config).cleanup_journal(&journal);
        print!("{}", render_cleanup(&cleanup));
    }

    result.map(|_| ()).map_err(anyhow::Error::from)
}

/// Deletes the records a scenario describes.
pub fn delete(
    store: &dyn RecordStore,
    handlers: &HandlerRegistry,
    config: FactoryConfig,
    scenario: &Scenario,
) -> Result<()> {
    let report = CleanupEngine::new(store, handlers, config).cleanup_scenario(scenario);
    print!("{}", render_cleanup(&report));
    ensure_clean(&report)
}

/// Deletes records of `object_type` whose Name matches `pattern`.
pub fn clean(
    store: &dyn RecordStore,
    handlers: &HandlerRegistry,
    config: FactoryConfig,
    object_type: &str,
    pattern: &str,
) -> Result<()> {
    let report = CleanupEngine::new(store, handlers, config).cleanup_pattern(object_type, pattern);
    print!("{}", render_cleanup(&report));
    ensure_clean(&report)
}

/// Splits a mega CSV into numbered scenario files.
pub fn split(input: &Path, out_dir: &Path) -> Result<()> {
    let outcome = split_mega_csv(input, out_dir)
        .with_context(|| format!("failed to split {}", input.display()))?;
    println!("{} data rows split into {} files:", outcome.rows, outcome.files.len());
    for file in &outcome.files {
        println!("  {}", file.display());
    }
    Ok(())
}

/// Reports references that cannot resolve in the current file order.
pub fn check(scenario: &Scenario, config: &FactoryConfig) -> Result<()> {
    let issues = check_reference_order(scenario, &config.alias_column)?;
    if issues.is_empty() {
        println!("{}: {} files, references in order", scenario.name(), scenario.files().len());
        return Ok(());
    }
    for issue in &issues {
        println!("  {}", issue);
    }
    bail!("{} reference(s) out of order in {}", issues.len(), scenario.name())
}

fn ensure_clean(report: &CleanupReport) -> Result<()> {
    if report.is_clean() {
        Ok(())
    } else {
        bail!("{} delete(s) failed", report.errors.len())
    }
}

/// One line per file plus its warnings.
pub fn render_report(report: &ScenarioReport) -> String {
    let mut out = String::new();
    for file in &report.files {
        let _ = writeln!(
            out,
            "{:<40} {:<26} {:<11} {:<9} created {:>3}  updated {:>3}  skipped {:>3}  failed {:>3}  warnings {:>3}",
            file.file,
            file.object_type,
            file.mode.to_string(),
            file.state.to_string(),
            file.created,
            file.updated,
            file.skipped,
            file.failed,
            file.warnings.len(),
        );
        for warning in &file.warnings {
            let _ = writeln!(out, "    warning: {}", warning);
        }
    }
    let _ = writeln!(
        out,
        "total: created {}, updated {}, failed {}, warnings {}",
        report.created(),
        report.updated(),
        report.failed(),
        report.warnings().count()
    );
    out
}

pub fn render_cleanup(report: &CleanupReport) -> String {
    let mut out = String::new();
    if report.deleted.is_empty() {
        let _ = writeln!(out, "no matching records");
    }
    for (object_type, count) in &report.deleted {
        let _ = writeln!(out, "deleted {:>4} {}", count, object_type);
    }
    if report.already_gone > 0 {
        let _ = writeln!(out, "already gone: {}", report.already_gone);
    }
    for error in &report.errors {
        let _ = writeln!(out, "error: {}", error);
    }
    out
}
