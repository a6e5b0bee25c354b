use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cluster::{ClusterParams, HotspotOutcome};
use crate::config::PipelineConfig;
use crate::data::export::to_csv_bytes;
use crate::data::filter::{FilterSet, HourRange};
use crate::data::model::{Table, CATEGORY, CITY, SOURCE};
use crate::data::summary::summarize;
use crate::error::Result;
use crate::ml::{candidate_features, TrainOutcome, TrainRequest};
use crate::pipeline::{run, PipelineOutput, Prepared};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// One caller's selections over a shared, read-only prepared table, plus the
/// outputs derived from them. Every setter recomputes the outputs; sessions
/// never share anything mutable.
pub struct Session {
    data: Arc<Prepared>,
    config: PipelineConfig,
    output: PipelineOutput,
}

impl Session {
    pub fn new(data: Arc<Prepared>, config: PipelineConfig) -> Result<Self> {
        let output = run(&data.table, &config)?;
        Ok(Self {
            data,
            config,
            output,
        })
    }

    pub fn data(&self) -> &Prepared {
        &self.data
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn output(&self) -> &PipelineOutput {
        &self.output
    }

    /// Recompute every output from the current selections.
    pub fn refresh(&mut self) -> Result<()> {
        self.output = run(&self.data.table, &self.config)?;
        Ok(())
    }

    /// Apply `change` to a copy of the selections and re-derive. Selections
    /// and outputs are replaced together, and only when the run succeeds.
    fn update(&mut self, change: impl FnOnce(&mut PipelineConfig)) -> Result<()> {
        let mut config = self.config.clone();
        change(&mut config);
        let output = run(&self.data.table, &config)?;
        self.config = config;
        self.output = output;
        Ok(())
    }

    // -- Choices for the caller's selection widgets --

    pub fn source_choices(&self) -> Vec<String> {
        self.choices(SOURCE)
    }

    pub fn city_choices(&self) -> Vec<String> {
        self.choices(CITY)
    }

    pub fn category_choices(&self) -> Vec<String> {
        self.choices(CATEGORY)
    }

    /// Numeric columns of the working set that can be used as features for
    /// the current target.
    pub fn feature_choices(&self) -> Vec<String> {
        let target = self.config.train.as_ref().map(|t| t.target.clone()).unwrap_or_default();
        candidate_features(&self.output.working.table, &target)
    }

    fn choices(&self, column: &str) -> Vec<String> {
        self.data
            .table
            .unique_values(column)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    // -- Selections --

    pub fn set_filters(&mut self, filters: FilterSet) -> Result<()> {
        self.update(|c| c.filters = filters)
    }

    pub fn set_sources(&mut self, sources: BTreeSet<String>) -> Result<()> {
        self.update(|c| c.filters.sources = sources)
    }

    pub fn set_cities(&mut self, cities: BTreeSet<String>) -> Result<()> {
        self.update(|c| c.filters.cities = cities)
    }

    pub fn set_categories(&mut self, categories: BTreeSet<String>) -> Result<()> {
        self.update(|c| c.filters.categories = categories)
    }

    pub fn set_hour_range(&mut self, range: Option<HourRange>) -> Result<()> {
        self.update(|c| c.filters.hour_range = range)
    }

    /// `None` turns hotspot detection off.
    pub fn set_cluster_params(&mut self, params: Option<ClusterParams>) -> Result<()> {
        self.update(|c| c.cluster = params)
    }

    /// `None` turns prediction off.
    pub fn set_train_request(&mut self, request: Option<TrainRequest>) -> Result<()> {
        self.update(|c| c.train = request)
    }

    pub fn set_features(&mut self, features: Vec<String>) -> Result<()> {
        self.update(|c| c.train.get_or_insert_with(TrainRequest::default).features = features)
    }

    /// Per-column statistics of the working set.
    pub fn summary(&self) -> Table {
        summarize(&self.output.working.table)
    }

    // -- Downloads --

    pub fn export_summary(&self) -> Result<Vec<u8>> {
        to_csv_bytes(&self.summary())
    }

    pub fn export_filtered(&self) -> Result<Vec<u8>> {
        to_csv_bytes(&self.output.working.table)
    }

    /// `None` when clustering is off or unavailable.
    pub fn export_hotspots(&self) -> Result<Option<Vec<u8>>> {
        match &self.output.hotspots {
            Some(HotspotOutcome::Labeled(hotspots)) => to_csv_bytes(&hotspots.table).map(Some),
            _ => Ok(None),
        }
    }

    /// `None` until a model has been trained.
    pub fn export_predictions(&self) -> Result<Option<Vec<u8>>> {
        self.prediction_table().map(to_csv_bytes).transpose()
    }

    fn prediction_table(&self) -> Option<&Table> {
        match &self.output.prediction {
            Some(TrainOutcome::Trained(result)) => Some(&result.table),
            _ => None,
        }
    }
}
