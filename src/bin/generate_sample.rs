use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

/// A city with a few busy spots that samples cluster around.
struct City {
    name: &'static str,
    hubs: &'static [(f64, f64)],
}

const CITIES: &[City] = &[
    City {
        name: "Austin",
        hubs: &[(30.2672, -97.7431), (30.2849, -97.7341)],
    },
    City {
        name: "Dallas",
        hubs: &[(32.7767, -96.7970), (32.7801, -96.8005)],
    },
];

const CATEGORIES: &[&str] = &["food", "nightlife", "retail", "transit"];

/// One sampled point of activity.
struct Sample {
    city: &'static str,
    category: &'static str,
    lat: f64,
    lon: f64,
    timestamp: String,
    hour: u32,
}

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

fn sample(rng: &mut StdRng) -> Sample {
    let city = &CITIES[rng.gen_range(0..CITIES.len())];
    let category = CATEGORIES[rng.gen_range(0..CATEGORIES.len())];

    // Three in four points sit near a hub, the rest are scattered.
    let (lat, lon) = if rng.gen_bool(0.75) {
        let (hub_lat, hub_lon) = city.hubs[rng.gen_range(0..city.hubs.len())];
        (gauss(rng, hub_lat, 0.002), gauss(rng, hub_lon, 0.002))
    } else {
        let (base_lat, base_lon) = city.hubs[0];
        (gauss(rng, base_lat, 0.1), gauss(rng, base_lon, 0.1))
    };

    let hour = rng.gen_range(0..24);
    let timestamp = format!(
        "2024-{:02}-{:02} {hour:02}:{:02}:00",
        rng.gen_range(1..=12),
        rng.gen_range(1..=28),
        rng.gen_range(0..60)
    );

    Sample {
        city: city.name,
        category,
        lat,
        lon,
        timestamp,
        hour,
    }
}

/// Reviews-style extract with canonical headers and no traffic column.
fn write_csv(path: &Path, rng: &mut StdRng, n: usize) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    writer.write_record(["City", "Category", "Latitude", "Longitude", "Timestamp", "rating", "price_level"])?;
    for _ in 0..n {
        let s = sample(rng);
        let rating = (rng.gen_range(10..=50) as f64) / 10.0;
        writer.write_record([
            s.city.to_string(),
            s.category.to_string(),
            format!("{:.6}", s.lat),
            format!("{:.6}", s.lon),
            s.timestamp,
            rating.to_string(),
            rng.gen_range(1..=4).to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Events-style extract with aliased headers and an attendance figure.
fn write_json(path: &Path, rng: &mut StdRng, n: usize) -> Result<()> {
    let records: Vec<_> = (0..n)
        .map(|_| {
            let s = sample(rng);
            let attendance = 50 + (s.hour as i64 % 12) * 40 + rng.gen_range(0..30);
            json!({
                "city": s.city,
                "type": s.category,
                "lat": s.lat,
                "lng": s.lon,
                "datetime": s.timestamp.replace(' ', "T"),
                "foot_traffic": attendance,
            })
        })
        .collect();
    let file = File::create(path).context("creating JSON")?;
    serde_json::to_writer_pretty(file, &records)?;
    Ok(())
}

/// Transit-style extract written as Parquet.
fn write_parquet(path: &Path, rng: &mut StdRng, n: usize) -> Result<()> {
    let samples: Vec<Sample> = (0..n).map(|_| sample(rng)).collect();
    let boardings: Vec<i64> = samples
        .iter()
        .map(|s| 20 + i64::from(s.hour.abs_diff(17) < 3) * 200 + rng.gen_range(0..50))
        .collect();

    let schema = Arc::new(Schema::new(vec![
        Field::new("City", DataType::Utf8, false),
        Field::new("Category", DataType::Utf8, false),
        Field::new("Latitude", DataType::Float64, false),
        Field::new("Longitude", DataType::Float64, false),
        Field::new("Timestamp", DataType::Utf8, false),
        Field::new("boardings", DataType::Int64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(samples.iter().map(|s| s.city).collect::<Vec<_>>())),
            Arc::new(StringArray::from(samples.iter().map(|s| s.category).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(samples.iter().map(|s| s.lat).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(samples.iter().map(|s| s.lon).collect::<Vec<_>>())),
            Arc::new(StringArray::from(
                samples.iter().map(|s| s.timestamp.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from(boardings)),
        ],
    )
    .context("building record batch")?;

    let file = File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir: PathBuf = std::env::args().nth(1).unwrap_or_else(|| "data".to_string()).into();
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = StdRng::seed_from_u64(42);
    write_csv(&out_dir.join("reviews_clean.csv"), &mut rng, 400)?;
    write_json(&out_dir.join("events_clean.json"), &mut rng, 300)?;
    write_parquet(&out_dir.join("transit_clean.parquet"), &mut rng, 300)?;

    // Unequal row lengths: ingestion skips this file with a warning.
    std::fs::write(out_dir.join("broken_clean.csv"), "City,Latitude\nAustin\n")?;

    println!("Wrote sample extracts to {}", out_dir.display());
    Ok(())
}
