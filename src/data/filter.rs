use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::model::{RecordView, Table, CATEGORY, CITY, HOUR, SOURCE};

// ---------------------------------------------------------------------------
// Filter predicates
// ---------------------------------------------------------------------------

/// Inclusive hour-of-day window. `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawHourRange")]
pub struct HourRange {
    pub start: u8,
    pub end: u8,
}

/// Config-file form of [`HourRange`], clamped on the way in.
#[derive(Deserialize)]
struct RawHourRange {
    start: u8,
    end: u8,
}

impl From<RawHourRange> for HourRange {
    fn from(raw: RawHourRange) -> Self {
        HourRange::new(raw.start, raw.end)
    }
}

impl HourRange {
    /// Build a range, clamping both ends to 0–23.
    pub fn new(start: u8, end: u8) -> Self {
        Self {
            start: start.min(23),
            end: end.min(23),
        }
    }

    pub fn contains(&self, hour: u8) -> bool {
        if self.start <= self.end {
            (self.start..=self.end).contains(&hour)
        } else {
            hour >= self.start || hour <= self.end
        }
    }
}

/// Externally supplied predicates. An empty set or `None` means "no filter"
/// for that dimension; active predicates combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSet {
    pub sources: BTreeSet<String>,
    pub cities: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub hour_range: Option<HourRange>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
            && self.cities.is_empty()
            && self.categories.is_empty()
            && self.hour_range.is_none()
    }
}

/// The rows of a table that passed a [`FilterSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingSet {
    pub table: Table,
    pub filters: FilterSet,
    /// Row index in the input table for each row of `table`.
    pub source_indices: Vec<usize>,
}

impl WorkingSet {
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Apply `filters` to `table`, returning a new working set.
pub fn apply(table: &Table, filters: &FilterSet) -> WorkingSet {
    let source_indices = filtered_indices(table, filters);
    log::debug!(
        "Filters kept {} of {} rows",
        source_indices.len(),
        table.len()
    );
    WorkingSet {
        table: table.select_rows(&source_indices),
        filters: filters.clone(),
        source_indices,
    }
}

/// Return indices of rows that pass all active filters.
///
/// A predicate on a column the table does not have passes every row. When
/// the column exists, a null cell fails an active predicate.
pub fn filtered_indices(table: &Table, filters: &FilterSet) -> Vec<usize> {
    let set_filters = [
        (SOURCE, &filters.sources),
        (CITY, &filters.cities),
        (CATEGORY, &filters.categories),
    ];
    let active: Vec<(&str, &BTreeSet<String>)> = set_filters
        .into_iter()
        .filter(|(col, selected)| !selected.is_empty() && table.has_column(col))
        .collect();
    let hours = filters.hour_range.filter(|_| table.has_column(HOUR));

    table
        .records()
        .filter(|rec| {
            active
                .iter()
                .all(|(col, selected)| in_set(rec, col, selected))
        })
        .filter(|rec| match hours {
            Some(range) => rec.hour().is_some_and(|h| range.contains(h)),
            None => true,
        })
        .map(|rec| rec.index())
        .collect()
}

fn in_set(rec: &RecordView<'_>, column: &str, selected: &BTreeSet<String>) -> bool {
    let value = rec.get(column);
    !value.is_null() && selected.contains(&value.to_string())
}
