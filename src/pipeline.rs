//! One parametrized pipeline over the components:
//! ingest → enrich → filter → {cluster, train}.
//!
//! Ingestion is the only I/O-bound step, so [`IngestCache`] memoizes it per
//! directory snapshot. Everything downstream is recomputed on every call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::cluster::{label_hotspots, HotspotOutcome};
use crate::config::PipelineConfig;
use crate::data::enrich::{enrich, EnrichOptions};
use crate::data::filter::{apply, WorkingSet};
use crate::data::loader::{ingest_files, list_extracts, IngestOptions, IngestWarning};
use crate::data::model::Table;
use crate::error::Result;
use crate::ml::{train, TrainOutcome};

// ---------------------------------------------------------------------------
// Prepared data
// ---------------------------------------------------------------------------

/// The ingested and enriched table shared by every session. Never mutated
/// after construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prepared {
    pub table: Table,
    pub warnings: Vec<IngestWarning>,
    pub traffic_synthesized: bool,
    pub hour_available: bool,
}

/// Ingest an explicit list of extracts and enrich the result.
pub fn prepare(files: &[PathBuf], ingest: &IngestOptions, enrichment: &EnrichOptions) -> Prepared {
    let ingested = ingest_files(files, ingest);
    let enriched = enrich(&ingested.table, enrichment);
    Prepared {
        table: enriched.table,
        warnings: ingested.warnings,
        traffic_synthesized: enriched.traffic_synthesized,
        hour_available: enriched.hour_available,
    }
}

/// Ingest every extract in `dir` and enrich the result.
pub fn prepare_dir(dir: &Path, ingest: &IngestOptions, enrichment: &EnrichOptions) -> Result<Prepared> {
    let files = list_extracts(dir)?;
    Ok(prepare(&files, ingest, enrichment))
}

// ---------------------------------------------------------------------------
// Ingestion cache
// ---------------------------------------------------------------------------

/// `(file name, size, modified)` for each extract, in enumeration order.
type Fingerprint = Vec<(PathBuf, u64, Option<SystemTime>)>;

struct CacheEntry {
    fingerprint: Fingerprint,
    ingest: IngestOptions,
    enrich: EnrichOptions,
    prepared: Arc<Prepared>,
}

/// Memoizes [`prepare_dir`] per directory. A directory is re-read when any
/// extract is added, removed, resized or touched, or when the options change.
#[derive(Default)]
pub struct IngestCache {
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl IngestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(
        &self,
        dir: &Path,
        ingest: &IngestOptions,
        enrichment: &EnrichOptions,
    ) -> Result<Arc<Prepared>> {
        let files = list_extracts(dir)?;
        let fingerprint = fingerprint(&files);

        if let Some(entry) = self.entries.lock().get(dir) {
            if entry.fingerprint == fingerprint && &entry.ingest == ingest && &entry.enrich == enrichment {
                log::debug!("Ingestion cache hit for {}", dir.display());
                return Ok(Arc::clone(&entry.prepared));
            }
        }

        log::debug!("Ingestion cache miss for {}", dir.display());
        let prepared = Arc::new(prepare(&files, ingest, enrichment));
        self.entries.lock().insert(
            dir.to_path_buf(),
            CacheEntry {
                fingerprint,
                ingest: ingest.clone(),
                enrich: enrichment.clone(),
                prepared: Arc::clone(&prepared),
            },
        );
        Ok(prepared)
    }

    pub fn invalidate(&self, dir: &Path) {
        self.entries.lock().remove(dir);
    }
}

fn fingerprint(files: &[PathBuf]) -> Fingerprint {
    files
        .iter()
        .map(|path| {
            let meta = std::fs::metadata(path).ok();
            (
                path.clone(),
                meta.as_ref().map_or(0, std::fs::Metadata::len),
                meta.and_then(|m| m.modified().ok()),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Running the pipeline
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PipelineOutput {
    pub working: WorkingSet,
    /// `None` when clustering was not requested.
    pub hotspots: Option<HotspotOutcome>,
    /// `None` when training was not requested.
    pub prediction: Option<TrainOutcome>,
}

/// Filter `table`, then run whichever of clustering and training `config`
/// enables. `table` is left untouched.
pub fn run(table: &Table, config: &PipelineConfig) -> Result<PipelineOutput> {
    let working = apply(table, &config.filters);
    log::info!("Working set: {} of {} rows", working.len(), table.len());

    let hotspots = config
        .cluster
        .as_ref()
        .map(|params| label_hotspots(&working.table, params))
        .transpose()?;
    let prediction = config
        .train
        .as_ref()
        .map(|request| train(&working.table, request))
        .transpose()?;

    Ok(PipelineOutput {
        working,
        hotspots,
        prediction,
    })
}
