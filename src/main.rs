use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use krowd_dash::cluster::{ClusterParams, HotspotOutcome};
use krowd_dash::config::PipelineConfig;
use krowd_dash::data::filter::HourRange;
use krowd_dash::ml::{Metric, TrainOutcome, TrainRequest};
use krowd_dash::pipeline::IngestCache;
use krowd_dash::state::Session;

/// Find activity hotspots and predict traffic across location extracts.
#[derive(Debug, Parser)]
#[command(name = "krowd-dash", version)]
struct Args {
    /// Directory of `.csv` / `.json` / `.parquet` extracts.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// JSON pipeline config; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep only these sources (repeatable).
    #[arg(long = "source")]
    sources: Vec<String>,

    /// Keep only these cities (repeatable).
    #[arg(long = "city")]
    cities: Vec<String>,

    /// Keep only these categories (repeatable).
    #[arg(long = "category")]
    categories: Vec<String>,

    /// Hour-of-day window, e.g. `8-18` or `22-3`.
    #[arg(long, value_parser = parse_hours)]
    hours: Option<HourRange>,

    /// Hotspot neighbourhood radius, in coordinate units.
    #[arg(long)]
    eps: Option<f64>,

    /// Points needed within `eps` for a hotspot core.
    #[arg(long)]
    min_pts: Option<usize>,

    /// Skip hotspot detection.
    #[arg(long)]
    no_hotspots: bool,

    /// Feature columns for the model, comma-separated.
    #[arg(long, value_delimiter = ',')]
    features: Vec<String>,

    /// Column to predict.
    #[arg(long)]
    target: Option<String>,

    /// Seed for synthesized traffic and the train/test split.
    #[arg(long)]
    seed: Option<u64>,

    /// Where to write the CSV outputs.
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,
}

fn parse_hours(s: &str) -> Result<HourRange, String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("expected LO-HI, got '{s}'"))?;
    let hour = |v: &str| {
        v.trim()
            .parse::<u8>()
            .ok()
            .filter(|h| *h < 24)
            .ok_or_else(|| format!("'{v}' is not an hour 0-23"))
    };
    Ok(HourRange::new(hour(start)?, hour(end)?))
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        let set = |values: &[String]| values.iter().cloned().collect::<BTreeSet<_>>();
        if !self.sources.is_empty() {
            config.filters.sources = set(&self.sources);
        }
        if !self.cities.is_empty() {
            config.filters.cities = set(&self.cities);
        }
        if !self.categories.is_empty() {
            config.filters.categories = set(&self.categories);
        }
        if self.hours.is_some() {
            config.filters.hour_range = self.hours;
        }

        if self.no_hotspots {
            config.cluster = None;
        } else if self.eps.is_some() || self.min_pts.is_some() {
            let params = config.cluster.get_or_insert_with(ClusterParams::default);
            params.eps = self.eps.unwrap_or(params.eps);
            params.min_pts = self.min_pts.unwrap_or(params.min_pts);
        }

        if !self.features.is_empty() || self.target.is_some() || self.seed.is_some() {
            let request = config.train.get_or_insert_with(TrainRequest::default);
            if !self.features.is_empty() {
                request.features = self.features.clone();
            }
            if let Some(target) = &self.target {
                request.target = target.clone();
            }
            if let Some(seed) = self.seed {
                request.params.seed = seed;
            }
        }
        if let Some(seed) = self.seed {
            config.enrich.seed = seed;
        }
        Ok(config)
    }
}

fn write_output(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    println!("  wrote {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = args.pipeline_config()?;

    let cache = IngestCache::new();
    let data = cache.get_or_load(&args.data_dir, &config.ingest, &config.enrich)?;
    for warning in &data.warnings {
        eprintln!("skipped {}: {}", warning.file.display(), warning.reason);
    }

    let session = Session::new(data, config)?;
    let output = session.output();

    println!(
        "{} rows loaded, {} after filters",
        session.data().table.len(),
        output.working.len()
    );
    if session.data().traffic_synthesized {
        println!("traffic_volume was missing and has been simulated");
    }
    if !session.data().hour_available {
        println!("no timestamps: hour filter unavailable");
    }

    match &output.hotspots {
        Some(HotspotOutcome::Labeled(hotspots)) => {
            println!(
                "{} hotspots, {} noise points",
                hotspots.summaries.len(),
                hotspots.noise
            );
            for s in hotspots.summaries.iter().take(10) {
                println!(
                    "  #{:<3} {:>5} points  centre ({:.5}, {:.5})  traffic {:.0}",
                    s.label, s.size, s.centroid[0], s.centroid[1], s.total_traffic
                );
            }
        }
        Some(HotspotOutcome::Unavailable) => println!("no location data found"),
        None => {}
    }

    match &output.prediction {
        Some(TrainOutcome::Trained(result)) => {
            match result.metric {
                Metric::Regression { mse, r2 } => match r2 {
                    Some(r2) => println!("model MSE {mse:.3}, R² {r2:.3}"),
                    None => println!("model MSE {mse:.3}"),
                },
                Metric::Classification { accuracy } => println!("model accuracy {accuracy:.3}"),
            }
            println!("  actual → predicted");
            for (a, p) in result.actual.iter().zip(&result.predicted).take(10) {
                println!("  {a} → {p}");
            }
        }
        Some(TrainOutcome::NoModel(reason)) => {
            println!("no model: {reason}");
            let choices = session.feature_choices();
            if !choices.is_empty() {
                println!("  available features: {}", choices.join(", "));
            }
        }
        None => {}
    }

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    write_output(&args.out_dir, "filtered.csv", &session.export_filtered()?)?;
    write_output(&args.out_dir, "summary.csv", &session.export_summary()?)?;
    if let Some(bytes) = session.export_hotspots()? {
        write_output(&args.out_dir, "hotspots.csv", &bytes)?;
    }
    if let Some(bytes) = session.export_predictions()? {
        write_output(&args.out_dir, "predictions.csv", &bytes)?;
    }
    Ok(())
}
