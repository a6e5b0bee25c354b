use std::collections::{BTreeMap, HashMap};

use super::model::{CellValue, Table};

/// Header of the first column of a summary table.
pub const STATISTIC: &str = "statistic";

const TEXT_STATS: [&str; 3] = ["unique", "top", "freq"];
const NUMERIC_STATS: [&str; 7] = ["mean", "std", "min", "25%", "50%", "75%", "max"];

type ColumnStats = HashMap<&'static str, CellValue>;

/// Describe every column of `table`: one row per statistic, one column per
/// input column. Numeric columns get mean/std/min/quartiles/max, every other
/// column gets unique/top/freq; statistics that do not apply are null.
pub fn summarize(table: &Table) -> Table {
    let numeric = table.numeric_columns();
    let per_column: Vec<ColumnStats> = table
        .columns()
        .iter()
        .map(|name| {
            let cells = table.column(name).into_iter().flatten();
            if numeric.contains(name) {
                numeric_stats(cells)
            } else {
                text_stats(cells)
            }
        })
        .collect();

    let mut stats = vec!["count"];
    if numeric.len() < table.columns().len() {
        stats.extend(TEXT_STATS);
    }
    if !numeric.is_empty() {
        stats.extend(NUMERIC_STATS);
    }

    let mut columns = Vec::with_capacity(table.columns().len() + 1);
    columns.push(STATISTIC.to_string());
    columns.extend(table.columns().iter().cloned());

    let rows = stats
        .iter()
        .map(|stat| {
            let mut row = vec![CellValue::from(*stat)];
            row.extend(
                per_column
                    .iter()
                    .map(|s| s.get(stat).cloned().unwrap_or(CellValue::Null)),
            );
            row
        })
        .collect();
    Table::new(columns, rows)
}

fn text_stats<'a>(cells: impl Iterator<Item = &'a CellValue>) -> ColumnStats {
    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for cell in cells.filter(|c| !c.is_null()) {
        *counts.entry(cell.to_string()).or_default() += 1;
    }

    // Ties go to the smallest value.
    let mut top: Option<(&String, i64)> = None;
    for (value, &n) in &counts {
        if top.map_or(true, |(_, best)| n > best) {
            top = Some((value, n));
        }
    }

    let mut stats = ColumnStats::from([
        ("count", CellValue::Integer(counts.values().sum())),
        ("unique", CellValue::Integer(counts.len() as i64)),
    ]);
    if let Some((value, n)) = top {
        stats.insert("top", CellValue::String(value.clone()));
        stats.insert("freq", CellValue::Integer(n));
    }
    stats
}

fn numeric_stats<'a>(cells: impl Iterator<Item = &'a CellValue>) -> ColumnStats {
    let mut values: Vec<f64> = cells
        .filter_map(CellValue::as_f64)
        .filter(|v| !v.is_nan())
        .collect();
    values.sort_by(f64::total_cmp);

    let mut stats = ColumnStats::from([("count", CellValue::Integer(values.len() as i64))]);
    let (Some(&min), Some(&max)) = (values.first(), values.last()) else {
        return stats;
    };

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    stats.insert("mean", CellValue::Float(mean));
    // Sample standard deviation; undefined for a single value.
    if values.len() > 1 {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        stats.insert("std", CellValue::Float(variance.sqrt()));
    }
    stats.insert("min", CellValue::Float(min));
    for (name, q) in [("25%", 0.25), ("50%", 0.5), ("75%", 0.75)] {
        stats.insert(name, CellValue::Float(quantile(&values, q)));
    }
    stats.insert("max", CellValue::Float(max));
    stats
}

/// Linear interpolation between closest ranks of a non-empty sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::export::to_csv_bytes;

    fn table() -> Table {
        Table::new(
            vec!["source".into(), "City".into(), "rating".into()],
            vec![
                vec!["yelp".into(), "Austin".into(), 1i64.into()],
                vec!["yelp".into(), CellValue::Null, 2i64.into()],
                vec!["events".into(), "Dallas".into(), 3.0f64.into()],
                vec!["yelp".into(), "Austin".into(), 4i64.into()],
            ],
        )
    }

    fn stat<'a>(summary: &'a Table, name: &str, column: &str) -> &'a CellValue {
        let row = summary
            .records()
            .position(|r| r.get(STATISTIC).as_str() == Some(name))
            .unwrap();
        summary.value(row, column)
    }

    #[test]
    fn test_numeric_column_statistics() {
        let summary = summarize(&table());
        assert_eq!(stat(&summary, "count", "rating"), &CellValue::Integer(4));
        assert_eq!(stat(&summary, "mean", "rating"), &CellValue::Float(2.5));
        assert_eq!(stat(&summary, "min", "rating"), &CellValue::Float(1.0));
        assert_eq!(stat(&summary, "25%", "rating"), &CellValue::Float(1.75));
        assert_eq!(stat(&summary, "50%", "rating"), &CellValue::Float(2.5));
        assert_eq!(stat(&summary, "max", "rating"), &CellValue::Float(4.0));
        let std = stat(&summary, "std", "rating").as_f64().unwrap();
        assert!((std - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!(stat(&summary, "top", "rating").is_null());
    }

    #[test]
    fn test_text_column_statistics() {
        let summary = summarize(&table());
        assert_eq!(stat(&summary, "count", "City"), &CellValue::Integer(3));
        assert_eq!(stat(&summary, "unique", "City"), &CellValue::Integer(2));
        assert_eq!(stat(&summary, "top", "City"), &CellValue::from("Austin"));
        assert_eq!(stat(&summary, "freq", "City"), &CellValue::Integer(2));
        assert_eq!(stat(&summary, "top", "source"), &CellValue::from("yelp"));
        assert!(stat(&summary, "mean", "source").is_null());
    }

    #[test]
    fn test_empty_table_reports_zero_counts() {
        let summary = summarize(&Table::empty(vec!["source".into(), "rating".into()]));
        assert_eq!(summary.columns(), [STATISTIC, "source", "rating"]);
        assert_eq!(summary.len(), 1 + TEXT_STATS.len());
        assert_eq!(stat(&summary, "count", "rating"), &CellValue::Integer(0));
        assert!(stat(&summary, "top", "rating").is_null());
    }

    #[test]
    fn test_summary_exports_like_any_table() {
        let csv = String::from_utf8(to_csv_bytes(&summarize(&table())).unwrap()).unwrap();
        assert!(csv.starts_with("statistic,source,City,rating\ncount,4,3,4\n"));
        assert_eq!(csv.lines().count(), 1 + 1 + TEXT_STATS.len() + NUMERIC_STATS.len());
    }
}
