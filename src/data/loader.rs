use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use arrow::util::display::array_value_to_string;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::model::{CellValue, Table, CATEGORY, CITY, LATITUDE, LONGITUDE, SOURCE, TIMESTAMP, TRAFFIC_VOLUME};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Stripped from file names to derive the `source` label.
    pub source_suffix: String,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            source_suffix: "_clean.csv".to_string(),
        }
    }
}

/// An extract that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestWarning {
    pub file: PathBuf,
    pub reason: String,
}

/// Best-effort result of ingesting a set of extracts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ingested {
    pub table: Table,
    pub warnings: Vec<IngestWarning>,
}

/// One parsed extract before it is tagged and merged.
#[derive(Debug, Clone, Default)]
pub struct RawExtract {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Tabular files in `dir`, sorted by file name.
///
/// This is the only ingestion step that fails: without a readable directory
/// there is no partial result to return.
pub fn list_extracts(dir: &Path) -> Result<Vec<PathBuf>> {
    let unreadable = |source| PipelineError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        if path.is_file() && is_extract(&path) {
            files.push(path);
        } else {
            log::debug!("Ignoring {}", path.display());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Enumerate `dir` and ingest every extract in it.
pub fn ingest_dir(dir: &Path, options: &IngestOptions) -> Result<Ingested> {
    let files = list_extracts(dir)?;
    log::info!("Found {} extracts in {}", files.len(), dir.display());
    Ok(ingest_files(&files, options))
}

/// Parse each file independently and concatenate them with a column union.
///
/// Files that fail to parse are skipped and reported in `warnings`.
pub fn ingest_files(files: &[PathBuf], options: &IngestOptions) -> Ingested {
    let mut columns = vec![SOURCE.to_string()];
    let mut positions: HashMap<String, usize> = HashMap::from([(SOURCE.to_string(), 0)]);
    let mut rows = Vec::new();
    let mut warnings = Vec::new();

    for path in files {
        let extract = match load_file(path) {
            Ok(extract) => extract,
            Err(e) => {
                let reason = format!("{e:#}");
                log::warn!("Skipping {}: {reason}", path.display());
                warnings.push(IngestWarning {
                    file: path.clone(),
                    reason,
                });
                continue;
            }
        };

        let label = source_label(path, &options.source_suffix);
        log::debug!(
            "Loaded {} rows from {} as source '{label}'",
            extract.rows.len(),
            path.display()
        );

        let targets: Vec<Option<usize>> = extract
            .columns
            .iter()
            .map(|name| {
                let name = canonical_column(name);
                if name == SOURCE || name.is_empty() {
                    return None;
                }
                let next = columns.len();
                let idx = *positions.entry(name.clone()).or_insert(next);
                if idx == next {
                    columns.push(name);
                }
                Some(idx)
            })
            .collect();

        for raw in extract.rows {
            let mut row = vec![CellValue::Null; columns.len()];
            row[0] = CellValue::String(label.clone());
            for (value, target) in raw.into_iter().zip(&targets) {
                if let Some(idx) = target {
                    row[*idx] = value;
                }
            }
            rows.push(row);
        }
    }

    let table = Table::new(columns, rows);
    log::info!(
        "Ingested {} rows, {} columns ({} files skipped)",
        table.len(),
        table.columns().len(),
        warnings.len()
    );
    Ingested { table, warnings }
}

/// Human-readable source label: the file name minus `suffix`, or the file
/// stem when the suffix does not apply. Never empty.
pub fn source_label(path: &Path, suffix: &str) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Some(stripped) = name.strip_suffix(suffix).filter(|s| !suffix.is_empty() && !s.is_empty()) {
        return stripped.to_string();
    }
    match path.file_stem().map(|s| s.to_string_lossy()) {
        Some(stem) if !stem.is_empty() => stem.into_owned(),
        _ if !name.is_empty() => name,
        _ => "unknown".to_string(),
    }
}

/// Map a raw header onto the canonical schema; unknown headers are kept
/// as-is (trimmed).
pub fn canonical_column(raw: &str) -> String {
    let trimmed = raw.trim();
    let canonical = match trimmed.to_ascii_lowercase().as_str() {
        "source" => SOURCE,
        "lat" | "latitude" => LATITUDE,
        "lon" | "lng" | "long" | "longitude" => LONGITUDE,
        "city" => CITY,
        "category" | "type" => CATEGORY,
        "timestamp" | "datetime" | "date_time" | "time" => TIMESTAMP,
        "foot_traffic" | "traffic" | "traffic_volume" => TRAFFIC_VOLUME,
        _ => trimmed,
    };
    canonical.to_string()
}

/// Load one extract. Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, comma-delimited
/// * `.json`    – `[{ "City": "...", "Latitude": 1.0, ... }, ...]`
/// * `.parquet` – flat primitive columns
pub fn load_file(path: &Path) -> anyhow::Result<RawExtract> {
    match extension(path).as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn is_extract(path: &Path) -> bool {
    matches!(extension(path).as_str(), "csv" | "json" | "parquet" | "pq")
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv(path: &Path) -> anyhow::Result<RawExtract> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let columns: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        rows.push(record.iter().map(guess_cell_type).collect());
    }

    Ok(RawExtract { columns, rows })
}

/// Infer a cell's type from its text, the same way for every source.
pub fn guess_cell_type(s: &str) -> CellValue {
    let s = s.trim();
    if s.is_empty() {
        return CellValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return CellValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return CellValue::Float(f);
    }
    if s == "true" || s == "false" {
        return CellValue::Bool(s == "true");
    }
    CellValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented JSON, the default `df.to_json(orient='records')`.
fn load_json(path: &Path) -> anyhow::Result<RawExtract> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut columns: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut rows = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let mut row = vec![CellValue::Null; columns.len()];
        for (key, val) in obj {
            let idx = *positions.entry(key.clone()).or_insert_with(|| {
                columns.push(key.clone());
                columns.len() - 1
            });
            if idx >= row.len() {
                row.resize(idx + 1, CellValue::Null);
            }
            row[idx] = json_to_cell(val);
        }
        rows.push(row);
    }

    Ok(RawExtract { columns, rows })
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`), as long as the columns are flat.
fn load_parquet(path: &Path) -> anyhow::Result<RawExtract> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for row in 0..batch.num_rows() {
            let cells = batch
                .columns()
                .iter()
                .map(|col| extract_cell_value(col, row))
                .collect::<anyhow::Result<Vec<_>>>()
                .with_context(|| format!("Row {row}"))?;
            rows.push(cells);
        }
    }

    Ok(RawExtract { columns, rows })
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell_value(col: &ArrayRef, row: usize) -> anyhow::Result<CellValue> {
    if col.is_null(row) {
        return Ok(CellValue::Null);
    }
    let value = match col.data_type() {
        DataType::Utf8 => CellValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => CellValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => CellValue::Integer(i64::from(col.as_primitive::<Int32Type>().value(row))),
        DataType::Int64 => CellValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::Float32 => CellValue::Float(f64::from(col.as_primitive::<Float32Type>().value(row))),
        DataType::Float64 => CellValue::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => CellValue::Bool(col.as_boolean().value(row)),
        DataType::List(_) | DataType::LargeList(_) | DataType::Struct(_) | DataType::Map(_, _) => {
            bail!("nested column type {:?} is not supported", col.data_type())
        }
        _ => CellValue::String(array_value_to_string(col, row)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_source_label_strips_suffix() {
        let suffix = "_clean.csv";
        assert_eq!(source_label(Path::new("data/yelp_clean.csv"), suffix), "yelp");
        assert_eq!(source_label(Path::new("data/events.json"), suffix), "events");
        assert_eq!(source_label(Path::new("data/_clean.csv"), suffix), "_clean");
    }

    #[test]
    fn test_canonical_column_aliases() {
        assert_eq!(canonical_column(" lat "), "Latitude");
        assert_eq!(canonical_column("LNG"), "Longitude");
        assert_eq!(canonical_column("foot_traffic"), "traffic_volume");
        assert_eq!(canonical_column("rating"), "rating");
    }

    #[test]
    fn test_guess_cell_type() {
        assert_eq!(guess_cell_type(""), CellValue::Null);
        assert_eq!(guess_cell_type("12"), CellValue::Integer(12));
        assert_eq!(guess_cell_type("1.5"), CellValue::Float(1.5));
        assert_eq!(guess_cell_type("true"), CellValue::Bool(true));
        assert_eq!(guess_cell_type("Austin"), CellValue::from("Austin"));
    }

    #[test]
    fn test_column_union_leaves_missing_cells_null() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a_clean.csv");
        let b = dir.path().join("b_clean.csv");
        fs::write(&a, "City,Latitude\nAustin,30.2\n").unwrap();
        fs::write(&b, "city,rating\nDallas,4\n").unwrap();

        let ingested = ingest_files(&[a, b], &IngestOptions::default());
        let table = &ingested.table;

        assert!(ingested.warnings.is_empty());
        assert_eq!(table.columns(), ["source", "City", "Latitude", "rating"]);
        assert_eq!(table.value(0, "source"), &CellValue::from("a"));
        assert!(table.value(0, "rating").is_null());
        assert!(table.value(1, "Latitude").is_null());
        assert_eq!(table.value(1, "City"), &CellValue::from("Dallas"));
    }

    #[test]
    fn test_broken_file_is_skipped_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good_clean.csv");
        let bad = dir.path().join("bad_clean.csv");
        fs::write(&good, "City\nAustin\n").unwrap();
        fs::write(&bad, "City,Category\nAustin,food\nDallas\n").unwrap();

        let ingested = ingest_files(&[bad.clone(), good], &IngestOptions::default());

        assert_eq!(ingested.table.len(), 1);
        assert_eq!(ingested.warnings.len(), 1);
        assert_eq!(ingested.warnings[0].file, bad);
        assert!(!ingested.table.has_column("Category"));
    }

    #[test]
    fn test_json_extract_overrides_source_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        fs::write(
            &path,
            r#"[{"source": "stale", "lat": 1.5, "City": "Austin"}, {"City": null}]"#,
        )
        .unwrap();

        let ingested = ingest_files(&[path], &IngestOptions::default());
        let table = &ingested.table;

        assert_eq!(table.len(), 2);
        assert_eq!(table.value(0, "source"), &CellValue::from("events"));
        assert_eq!(table.value(0, "Latitude"), &CellValue::Float(1.5));
        assert!(table.value(1, "City").is_null());
    }

    #[test]
    fn test_json_columns_keep_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        fs::write(&path, r#"[{"zeta": 1, "City": "Austin", "alpha": 2}]"#).unwrap();

        let ingested = ingest_files(&[path], &IngestOptions::default());
        assert_eq!(ingested.table.columns(), ["source", "zeta", "City", "alpha"]);
    }

    #[test]
    fn test_unreadable_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = ingest_dir(&missing, &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DirectoryUnreadable { .. }));
    }

    #[test]
    fn test_list_extracts_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.csv", "a.json", "notes.txt", "c.parquet"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let names: Vec<String> = list_extracts(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.json", "b.csv", "c.parquet"]);
    }
}
