use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Canonical column names
// ---------------------------------------------------------------------------

pub const SOURCE: &str = "source";
pub const CITY: &str = "City";
pub const CATEGORY: &str = "Category";
pub const LATITUDE: &str = "Latitude";
pub const LONGITUDE: &str = "Longitude";
pub const TIMESTAMP: &str = "Timestamp";
pub const TRAFFIC_VOLUME: &str = "traffic_volume";
pub const HOUR: &str = "hour";
pub const HOTSPOT: &str = "hotspot";

// ---------------------------------------------------------------------------
// CellValue – a single cell of a table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell, typed per value rather than per column since
/// extracts from different sources disagree on column types.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

// -- Manual Eq/Ord so we can put CellValue in BTreeSet --

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::String(s) => s.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::Null => {}
        }
    }
}

/// Nulls render as an empty string, which is also what the exporter writes.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Integer(i)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl CellValue {
    /// Interpret the value as an `f64`. Only integer and float cells are numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Integer(_) | CellValue::Float(_))
    }
}

// ---------------------------------------------------------------------------
// Table – ordered columns, rows aligned to them
// ---------------------------------------------------------------------------

/// An immutable table. Every derivation returns a new table; the column
/// order is the order in which columns were first seen or added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Table {
    /// Build a table, padding short rows with nulls and truncating long ones.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Null);
                row
            })
            .collect();
        Table { columns, rows }
    }

    /// A table with the given header and no rows.
    pub fn empty(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// The cell at `(row, column)`; missing columns read as null.
    pub fn value(&self, row: usize, column: &str) -> &CellValue {
        const NULL: &CellValue = &CellValue::Null;
        self.column_index(column)
            .and_then(|idx| self.rows.get(row).map(|r| &r[idx]))
            .unwrap_or(NULL)
    }

    /// All cells of one column, or `None` when the column does not exist.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &CellValue> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    /// Typed view over one row.
    pub fn record(&self, row: usize) -> RecordView<'_> {
        RecordView { table: self, row }
    }

    pub fn records(&self) -> impl Iterator<Item = RecordView<'_>> + '_ {
        (0..self.len()).map(move |row| self.record(row))
    }

    /// A new table holding the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// A new table with `name` set to `values`. An existing column keeps its
    /// position; a new one is appended.
    pub fn with_column(&self, name: &str, values: Vec<CellValue>) -> Table {
        debug_assert_eq!(values.len(), self.len());
        let mut columns = self.columns.clone();
        let mut rows = self.rows.clone();
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                columns.push(name.to_string());
                let mut values = values.into_iter();
                for row in &mut rows {
                    row.push(values.next().unwrap_or(CellValue::Null));
                }
            }
        }
        Table { columns, rows }
    }

    /// Sorted distinct non-null values of a column (empty when absent).
    pub fn unique_values(&self, column: &str) -> BTreeSet<CellValue> {
        self.column(column)
            .map(|cells| cells.filter(|c| !c.is_null()).cloned().collect())
            .unwrap_or_default()
    }

    /// Columns with at least one value where every non-null value is numeric.
    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| {
                let mut seen = false;
                for row in &self.rows {
                    match &row[*idx] {
                        CellValue::Null => {}
                        v if v.is_numeric() => seen = true,
                        _ => return false,
                    }
                }
                seen
            })
            .map(|(_, name)| name.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// RecordView – typed access to canonical fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    table: &'a Table,
    row: usize,
}

impl<'a> RecordView<'a> {
    pub fn index(&self) -> usize {
        self.row
    }

    pub fn get(&self, column: &str) -> &'a CellValue {
        self.table.value(self.row, column)
    }

    pub fn source(&self) -> Option<&'a str> {
        self.get(SOURCE).as_str()
    }

    pub fn city(&self) -> Option<&'a str> {
        self.get(CITY).as_str()
    }

    pub fn category(&self) -> Option<&'a str> {
        self.get(CATEGORY).as_str()
    }

    pub fn latitude(&self) -> Option<f64> {
        self.get(LATITUDE).as_f64()
    }

    pub fn longitude(&self) -> Option<f64> {
        self.get(LONGITUDE).as_f64()
    }

    /// Both coordinates, when present and finite.
    pub fn coordinates(&self) -> Option<[f64; 2]> {
        let lat = self.latitude().filter(|v| v.is_finite())?;
        let lon = self.longitude().filter(|v| v.is_finite())?;
        Some([lat, lon])
    }

    pub fn hour(&self) -> Option<u8> {
        match self.get(HOUR) {
            CellValue::Integer(h) if (0..24).contains(h) => Some(*h as u8),
            _ => None,
        }
    }

    pub fn traffic_volume(&self) -> Option<f64> {
        self.get(TRAFFIC_VOLUME).as_f64()
    }
}
