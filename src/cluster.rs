//! Density-based hotspot detection (DBSCAN) over `(Latitude, Longitude)`.
//!
//! Neighbourhood queries go through an R-tree, so labelling is
//! `O(n log n)` for sparse data rather than all-pairs.

use std::collections::{BTreeMap, VecDeque};

use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};

use crate::data::model::{CellValue, Table, HOTSPOT, LATITUDE, LONGITUDE};
use crate::error::{PipelineError, Result};

/// Label given to points that belong to no hotspot.
pub const NOISE: i64 = -1;

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// DBSCAN parameters. Distances are Euclidean in raw coordinate units
/// (degrees for lat/lon), so the defaults depend on the data's scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    /// Neighbourhood radius.
    pub eps: f64,
    /// Points (including the point itself) within `eps` needed for a core point.
    pub min_pts: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            eps: 0.01,
            min_pts: 5,
        }
    }
}

impl ClusterParams {
    pub fn validate(&self) -> Result<()> {
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(PipelineError::InvalidParameter(format!(
                "eps must be a positive number, got {}",
                self.eps
            )));
        }
        if self.min_pts == 0 {
            return Err(PipelineError::InvalidParameter(
                "min_pts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cluster `points`, returning one label per point: `0..k` for hotspots,
/// [`NOISE`] otherwise.
///
/// Cluster ids are assigned in input order of each cluster's first core
/// point. A border point within reach of two clusters joins whichever
/// expands to it first. Fewer than two points are always noise.
pub fn dbscan(points: &[[f64; 2]], params: &ClusterParams) -> Result<Vec<i64>> {
    params.validate()?;
    if points.len() < 2 {
        return Ok(vec![NOISE; points.len()]);
    }

    let tree: RTree<IndexedPoint> = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new(*p, i))
            .collect(),
    );
    let eps_sq = params.eps * params.eps;
    let neighbourhoods: Vec<Vec<usize>> = points
        .iter()
        .map(|p| {
            let mut found: Vec<usize> = tree
                .locate_within_distance(*p, eps_sq)
                .map(|g| g.data)
                .collect();
            found.sort_unstable();
            found
        })
        .collect();
    let is_core: Vec<bool> = neighbourhoods
        .iter()
        .map(|n| n.len() >= params.min_pts)
        .collect();

    let mut labels: Vec<Option<i64>> = vec![None; points.len()];
    let mut next_label = 0;
    for start in 0..points.len() {
        if labels[start].is_some() || !is_core[start] {
            continue;
        }
        let label = next_label;
        next_label += 1;
        labels[start] = Some(label);

        let mut queue = VecDeque::from([start]);
        while let Some(p) = queue.pop_front() {
            if !is_core[p] {
                continue;
            }
            for &q in &neighbourhoods[p] {
                if labels[q].is_none() {
                    labels[q] = Some(label);
                    queue.push_back(q);
                }
            }
        }
    }

    log::debug!(
        "dbscan: {} points, {} clusters (eps {}, min_pts {})",
        points.len(),
        next_label,
        params.eps,
        params.min_pts
    );
    Ok(labels.into_iter().map(|l| l.unwrap_or(NOISE)).collect())
}

// ---------------------------------------------------------------------------
// Table-level labelling
// ---------------------------------------------------------------------------

/// Aggregate figures for one hotspot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotspotSummary {
    pub label: i64,
    pub size: usize,
    /// Mean `[latitude, longitude]`.
    pub centroid: [f64; 2],
    pub total_traffic: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hotspots {
    /// Input rows with a `hotspot` column appended. Rows without usable
    /// coordinates carry a null label.
    pub table: Table,
    /// Largest hotspot first.
    pub summaries: Vec<HotspotSummary>,
    pub noise: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HotspotOutcome {
    /// The table has no coordinate columns.
    Unavailable,
    Labeled(Hotspots),
}

/// Label every row of `table` with its hotspot.
pub fn label_hotspots(table: &Table, params: &ClusterParams) -> Result<HotspotOutcome> {
    params.validate()?;
    if !table.has_column(LATITUDE) || !table.has_column(LONGITUDE) {
        log::info!("No coordinate columns, hotspot detection unavailable");
        return Ok(HotspotOutcome::Unavailable);
    }

    let (rows, points): (Vec<usize>, Vec<[f64; 2]>) = table
        .records()
        .filter_map(|rec| rec.coordinates().map(|c| (rec.index(), c)))
        .unzip();
    let labels = dbscan(&points, params)?;

    let mut column = vec![CellValue::Null; table.len()];
    let mut groups: BTreeMap<i64, HotspotSummary> = BTreeMap::new();
    let mut noise = 0;
    for ((&row, point), &label) in rows.iter().zip(&points).zip(&labels) {
        column[row] = CellValue::Integer(label);
        if label == NOISE {
            noise += 1;
            continue;
        }
        let summary = groups.entry(label).or_insert(HotspotSummary {
            label,
            size: 0,
            centroid: [0.0, 0.0],
            total_traffic: 0.0,
        });
        summary.size += 1;
        summary.centroid[0] += point[0];
        summary.centroid[1] += point[1];
        summary.total_traffic += table.record(row).traffic_volume().unwrap_or(0.0);
    }

    let mut summaries: Vec<HotspotSummary> = groups
        .into_values()
        .map(|mut s| {
            s.centroid = [s.centroid[0] / s.size as f64, s.centroid[1] / s.size as f64];
            s
        })
        .collect();
    summaries.sort_by(|a, b| b.size.cmp(&a.size).then(a.label.cmp(&b.label)));

    log::info!(
        "Found {} hotspots, {noise} noise points, {} rows without coordinates",
        summaries.len(),
        table.len() - rows.len()
    );
    Ok(HotspotOutcome::Labeled(Hotspots {
        table: table.with_column(HOTSPOT, column),
        summaries,
        noise,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn params(eps: f64, min_pts: usize) -> ClusterParams {
        ClusterParams { eps, min_pts }
    }

    #[test]
    fn test_sparse_points_are_all_noise() {
        let points: Vec<[f64; 2]> = (0..10).map(|i| [i as f64, -(i as f64)]).collect();
        let labels = dbscan(&points, &params(0.5, 2)).unwrap();
        assert!(labels.iter().all(|&l| l == NOISE));
    }

    #[test]
    fn test_dense_group_among_isolated_points() {
        let mut points = vec![[5.0, 5.0]; 6];
        points.extend([[0.0, 0.0], [10.0, 10.0], [-10.0, 3.0]]);
        let labels = dbscan(&points, &params(0.01, 5)).unwrap();

        let dense: BTreeSet<i64> = labels[..6].iter().copied().collect();
        assert_eq!(dense.len(), 1);
        assert!(*dense.first().unwrap() >= 0);
        assert!(labels[6..].iter().all(|&l| l == NOISE));
    }

    #[test]
    fn test_zero_and_one_point() {
        assert!(dbscan(&[], &ClusterParams::default()).unwrap().is_empty());
        assert_eq!(dbscan(&[[1.0, 1.0]], &params(0.1, 1)).unwrap(), vec![NOISE]);
    }

    #[test]
    fn test_border_point_joins_cluster() {
        // Chain of core points with a border point reachable only from the end.
        let points = [[0.0, 0.0], [0.0, 0.5], [0.0, 1.0], [0.0, 1.9]];
        let labels = dbscan(&points, &params(1.0, 3)).unwrap();
        assert_eq!(labels, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_separate_clusters_get_distinct_labels() {
        let points = [[0.0, 0.0], [0.0, 0.001], [3.0, 3.0], [3.0, 3.001]];
        let labels = dbscan(&points, &params(0.01, 2)).unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_labels_stable_across_runs() {
        let points: Vec<[f64; 2]> = (0..50)
            .map(|i| [(i % 7) as f64 * 0.004, (i % 5) as f64 * 0.004])
            .collect();
        let p = params(0.005, 3);
        assert_eq!(dbscan(&points, &p).unwrap(), dbscan(&points, &p).unwrap());
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(dbscan(&[], &params(0.0, 5)).is_err());
        assert!(dbscan(&[], &params(f64::NAN, 5)).is_err());
        assert!(dbscan(&[], &params(0.1, 0)).is_err());
    }

    #[test]
    fn test_label_hotspots_scenario() {
        let table = Table::new(
            vec!["Latitude".into(), "Longitude".into(), "traffic_volume".into()],
            vec![
                vec![0.0f64.into(), 0.0f64.into(), 0i64.into()],
                vec![0.001f64.into(), 0.001f64.into(), 0i64.into()],
                vec![10.0f64.into(), 10.0f64.into(), 0i64.into()],
                vec![CellValue::Null, 1.0f64.into(), 0i64.into()],
            ],
        );
        let HotspotOutcome::Labeled(hotspots) = label_hotspots(&table, &params(0.01, 2)).unwrap()
        else {
            panic!("expected labels");
        };
        let t = &hotspots.table;

        assert_eq!(t.columns().last().map(String::as_str), Some("hotspot"));
        assert_eq!(t.value(0, HOTSPOT), t.value(1, HOTSPOT));
        assert!(t.value(0, HOTSPOT).as_f64().unwrap() >= 0.0);
        assert_eq!(t.value(2, HOTSPOT), &CellValue::Integer(NOISE));
        assert!(t.value(3, HOTSPOT).is_null());
        assert_eq!(hotspots.noise, 1);
        assert_eq!(hotspots.summaries.len(), 1);
        assert_eq!(hotspots.summaries[0].size, 2);
        assert!((hotspots.summaries[0].centroid[0] - 0.0005).abs() < 1e-12);
    }

    #[test]
    fn test_missing_coordinates_unavailable() {
        let table = Table::new(vec!["Latitude".into()], vec![vec![1.0f64.into()]]);
        assert_eq!(
            label_hotspots(&table, &ClusterParams::default()).unwrap(),
            HotspotOutcome::Unavailable
        );
    }

    #[test]
    fn test_empty_table_labels_nothing() {
        let table = Table::empty(vec!["Latitude".into(), "Longitude".into()]);
        let HotspotOutcome::Labeled(hotspots) =
            label_hotspots(&table, &ClusterParams::default()).unwrap()
        else {
            panic!("expected labels");
        };
        assert!(hotspots.table.is_empty());
        assert!(hotspots.table.has_column(HOTSPOT));
    }
}
