// src/main.rs
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use hydrocsv::{
    config::Settings,
    levels::{
        derive_level, list_part_c, map_c_to_b, write_summary, AllowList, DropRules,
        LevelFilterSpec,
    },
    HeaderedTable,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Drop columns whose part B matches a pattern
    #[value(name = "1")]
    Level1,
    /// Keep only the (C, B) pairs of an allow-list
    #[value(name = "2")]
    Level2,
    /// Print the unique part C values
    #[value(name = "listC")]
    ListC,
    /// Print every part C with its part B values
    #[value(name = "mapBC")]
    MapBC,
}

/// Derive Level 1 / Level 2 tables from a Level-0 export, or list its metadata
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    #[arg(value_enum)]
    mode: Mode,

    /// Input table (7 header rows, then timestamped values)
    input_csv: PathBuf,

    /// Output table; required for modes 1 and 2
    output_csv: Option<PathBuf>,

    /// Part-B regex to drop in mode 1 (repeatable; replaces the defaults)
    #[arg(long = "drop")]
    drop: Vec<String>,

    /// YAML allow-list `C: [B, ...]` for mode 2
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the mapBC listing to this text file instead of stdout
    #[arg(long)]
    mapfile: Option<PathBuf>,

    /// YAML settings file
    #[arg(long, env = "HYDROCSV_SETTINGS")]
    settings: Option<PathBuf>,
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) args & settings ──────────────────────────────────────────
    let args = Args::parse();
    let settings = Settings::load(args.settings.as_deref()).context("loading settings")?;

    // ─── 3) read input ───────────────────────────────────────────────
    let table = HeaderedTable::read_csv(&args.input_csv)
        .with_context(|| format!("reading {}", args.input_csv.display()))?;
    info!(
        columns = table.column_count(),
        rows = table.rows().len(),
        "loaded {}",
        args.input_csv.display()
    );

    // ─── 4) run mode ─────────────────────────────────────────────────
    let spec = match args.mode {
        Mode::ListC => {
            for c in list_part_c(table.metadata()) {
                println!("{c}");
            }
            return Ok(());
        }
        Mode::MapBC => {
            let summary = map_c_to_b(table.metadata());
            match args.mapfile.as_ref() {
                Some(path) => {
                    write_summary(&summary, path)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(groups = summary.part_c_count(), "wrote {}", path.display());
                }
                None => print!("{summary}"),
            }
            return Ok(());
        }
        Mode::Level1 => {
            let rules = if args.drop.is_empty() {
                settings.drop_rules()
            } else {
                DropRules::new(&args.drop)
            }
            .context("compiling drop patterns")?;
            LevelFilterSpec::Drop(rules)
        }
        Mode::Level2 => {
            let allow = AllowList::load(args.config.as_deref())
                .context("loading level 2 allow-list")?;
            info!(pairs = allow.len(), "allow-list loaded");
            LevelFilterSpec::Allow(allow)
        }
    };

    let Some(output) = args.output_csv.as_ref() else {
        bail!("mode {:?} needs an output path", args.mode);
    };
    let derived = derive_level(&table, &spec)?;
    derived
        .table
        .write_csv(output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(
        kept = derived.mask.kept_count(),
        of = derived.mask.len(),
        "wrote {}",
        output.display()
    );

    if matches!(args.mode, Mode::Level1) {
        println!(
            "Level 1 keeps {} series in {} part C groups:\n",
            derived.summary.series_count(),
            derived.summary.part_c_count()
        );
        print!("{}", derived.summary);
    }
    Ok(())
}
