// src/bin/compare_csv.rs
use anyhow::{Context, Result};
use clap::Parser;
use hydrocsv::{
    compare::{compare_tables, ComparisonOutcome, ComparisonReport, ReportCaps, WarningKind},
    config::Settings,
    table::timestamp::format_timestamp,
    HeaderedTable,
};
use std::{path::PathBuf, process::ExitCode};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Compare a table against a reference within a relative tolerance
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Reference table
    #[arg(long = "ref")]
    reference: PathBuf,

    /// Table to check
    #[arg(long)]
    file: PathBuf,

    /// Relative tolerance (overrides the settings file)
    #[arg(long)]
    tolerance: Option<f64>,

    /// Print the full outcome as JSON instead of text
    #[arg(long)]
    json: bool,

    /// YAML settings file
    #[arg(long, env = "HYDROCSV_SETTINGS")]
    settings: Option<PathBuf>,
}

fn main() -> Result<ExitCode> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // ─── 2) args & settings ──────────────────────────────────────────
    let args = Args::parse();
    let settings = Settings::load(args.settings.as_deref()).context("loading settings")?;
    let mut options = settings.compare_options();
    if let Some(rtol) = args.tolerance {
        anyhow::ensure!(
            rtol.is_finite() && rtol >= 0.0,
            "--tolerance must be a finite, non-negative number"
        );
        options.tolerance.rtol = rtol;
    }

    // ─── 3) load both tables ─────────────────────────────────────────
    let reference = HeaderedTable::read_csv(&args.reference)
        .with_context(|| format!("reading reference {}", args.reference.display()))?;
    let candidate = HeaderedTable::read_csv(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;

    // ─── 4) compare & report ─────────────────────────────────────────
    let outcome = compare_tables(&reference, &candidate, &options);
    if args.json {
        let text = serde_json::to_string_pretty(&outcome).context("encoding report")?;
        println!("{text}");
    } else {
        print_outcome(&outcome, &settings.report);
    }

    if outcome.is_match() {
        info!("files match");
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("files do not match");
        Ok(ExitCode::from(1))
    }
}

fn print_outcome(outcome: &ComparisonOutcome, caps: &ReportCaps) {
    match outcome {
        ComparisonOutcome::NoCommonColumns {
            left_columns,
            right_columns,
            ..
        } => {
            println!(
                "No common columns ({left_columns} in reference, {right_columns} in file)."
            );
        }
        ComparisonOutcome::NoTimeOverlap {
            left_window,
            right_window,
            ..
        } => {
            println!(
                "No overlapping time window: reference {} → {}, file {} → {}.",
                format_timestamp(&left_window.start),
                format_timestamp(&left_window.end),
                format_timestamp(&right_window.start),
                format_timestamp(&right_window.end),
            );
        }
        ComparisonOutcome::Compared(report) => print_report(report, caps),
    }
}

fn print_report(report: &ComparisonReport, caps: &ReportCaps) {
    println!(
        "Columns: {} in reference, {} in file, {} common",
        report.left_columns,
        report.right_columns,
        report.overlap.common.len()
    );
    println!(
        "Window: {} → {} ({} / {} rows)",
        format_timestamp(&report.window.start),
        format_timestamp(&report.window.end),
        report.left_rows_in_window,
        report.right_rows_in_window
    );
    println!("Tolerance: rtol={}", report.tolerance.rtol);

    for w in &report.warnings {
        match &w.kind {
            WarningKind::Unparseable {
                side,
                count,
                first_timestamp,
                compared,
            } => println!(
                "warning: {} has {count} unparsable value(s) on the {side:?} side, first at {}{}",
                w.column_key,
                format_timestamp(first_timestamp),
                if *compared { "" } else { " (column skipped)" }
            ),
            WarningKind::DuplicateKey { side, position } => println!(
                "warning: {} repeats at column {position} on the {side:?} side (ignored)",
                w.column_key
            ),
        }
    }

    if report.is_match() {
        println!("\nAll {} compared columns match.", report.columns_compared);
        return;
    }

    println!(
        "\n{} mismatches in {} of {} compared columns:",
        report.total_mismatches(),
        report.columns_with_mismatches(),
        report.columns_compared
    );
    let detail = report.detailed(caps);
    for entry in &detail.entries {
        let diff = entry
            .abs_difference
            .map(|d| format!("{d}"))
            .unwrap_or_else(|| "n/a".to_string());
        let samples: Vec<String> = entry.sample_timestamps.iter().map(format_timestamp).collect();
        println!(
            "  {}: {} mismatch(es); first at {}: ref={} file={} |diff|={}; e.g. {}",
            entry.column_key,
            entry.mismatch_count,
            format_timestamp(&entry.first_timestamp),
            entry.left_value,
            entry.right_value,
            diff,
            samples.join(", ")
        );
    }
    if detail.remaining_columns > 0 {
        println!("  ... and {} more column(s)", detail.remaining_columns);
    }
}
