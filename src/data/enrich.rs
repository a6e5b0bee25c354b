use std::ops::RangeInclusive;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::model::{CellValue, Table, HOUR, TIMESTAMP, TRAFFIC_VOLUME};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichOptions {
    /// Seed for synthesized traffic volumes. The same seed always yields the
    /// same values for the same table.
    pub seed: u64,
    pub traffic_range: RangeInclusive<i64>,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            traffic_range: 50..=500,
        }
    }
}

/// An enriched table and which derived fields are usable.
#[derive(Debug, Clone, PartialEq)]
pub struct Enriched {
    pub table: Table,
    pub traffic_synthesized: bool,
    /// `false` when there is no hour column, so hour filters are pass-through.
    pub hour_available: bool,
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Fill in `traffic_volume` and `hour`, returning a new table.
pub fn enrich(table: &Table, options: &EnrichOptions) -> Enriched {
    let mut table = table.clone();

    let traffic_synthesized = !table.has_column(TRAFFIC_VOLUME);
    if traffic_synthesized {
        let values = synthesize_traffic(table.len(), options);
        log::info!(
            "traffic_volume missing, synthesized {} values in {:?} (seed {})",
            values.len(),
            options.traffic_range,
            options.seed
        );
        table = table.with_column(TRAFFIC_VOLUME, values);
    }

    let hours: Option<Vec<CellValue>> = table.column(TIMESTAMP).map(|timestamps| {
        timestamps
            .map(|ts| parse_hour(ts).map_or(CellValue::Null, |h| CellValue::Integer(i64::from(h))))
            .collect()
    });
    if let Some(hours) = hours {
        let unparsed = hours.iter().filter(|h| h.is_null()).count();
        if unparsed > 0 {
            log::debug!("{unparsed} timestamps could not be parsed, hour left null");
        }
        table = table.with_column(HOUR, hours);
    }

    let hour_available = table.has_column(HOUR);
    Enriched {
        table,
        traffic_synthesized,
        hour_available,
    }
}

/// Draw `n` volumes uniformly from the configured range with a seeded
/// generator.
pub fn synthesize_traffic(n: usize, options: &EnrichOptions) -> Vec<CellValue> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let (lo, hi) = (*options.traffic_range.start(), *options.traffic_range.end());
    let range = lo.min(hi)..=hi.max(lo);
    (0..n)
        .map(|_| CellValue::Integer(rng.gen_range(range.clone())))
        .collect()
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Hour of day (0–23) for a timestamp-like cell, `None` when unparsable.
pub fn parse_hour(value: &CellValue) -> Option<u8> {
    let text = match value {
        CellValue::String(s) => s.trim(),
        _ => return None,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.hour() as u8);
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    {
        return Some(dt.hour() as u8);
    }
    if NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok() {
        return Some(0);
    }
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
        .map(|t| t.hour() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_traffic() -> Table {
        Table::new(
            vec!["source".into(), "Timestamp".into()],
            vec![
                vec!["a".into(), "2024-03-01 18:45:00".into()],
                vec!["a".into(), "not a time".into()],
                vec!["b".into(), CellValue::Null],
            ],
        )
    }

    #[test]
    fn test_synthesized_traffic_is_reproducible() {
        let options = EnrichOptions::default();
        let first = enrich(&no_traffic(), &options);
        let second = enrich(&no_traffic(), &options);

        assert!(first.traffic_synthesized);
        assert_eq!(first.table, second.table);
        for volume in first.table.column(TRAFFIC_VOLUME).unwrap() {
            let v = volume.as_f64().unwrap();
            assert!((50.0..=500.0).contains(&v));
        }
    }

    #[test]
    fn test_existing_traffic_is_kept() {
        let table = Table::new(
            vec!["traffic_volume".into()],
            vec![vec![CellValue::Integer(7)], vec![CellValue::Null]],
        );
        let enriched = enrich(&table, &EnrichOptions::default());
        assert!(!enriched.traffic_synthesized);
        assert_eq!(enriched.table, table);
        assert!(!enriched.hour_available);
    }

    #[test]
    fn test_hour_is_derived_after_traffic_volume() {
        let enriched = enrich(&no_traffic(), &EnrichOptions::default());
        let table = &enriched.table;

        assert!(enriched.hour_available);
        assert_eq!(table.columns(), ["source", "Timestamp", "traffic_volume", "hour"]);
        assert_eq!(table.record(0).hour(), Some(18));
        assert!(table.value(1, HOUR).is_null());
        assert!(table.value(2, HOUR).is_null());
    }

    #[test]
    fn test_parse_hour_formats() {
        let hour = |s: &str| parse_hour(&CellValue::from(s));
        assert_eq!(hour("2024-03-01T07:05:00Z"), Some(7));
        assert_eq!(hour("2024-03-01T23:59:59.250"), Some(23));
        assert_eq!(hour("03/01/2024 09:30"), Some(9));
        assert_eq!(hour("2024-03-01"), Some(0));
        assert_eq!(hour("14:10"), Some(14));
        assert_eq!(hour("25:10"), None);
        assert_eq!(parse_hour(&CellValue::Integer(12)), None);
    }
}
