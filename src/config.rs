use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterParams;
use crate::data::enrich::EnrichOptions;
use crate::data::filter::FilterSet;
use crate::data::loader::IngestOptions;
use crate::error::Result;
use crate::ml::TrainRequest;

/// Everything one pipeline run needs. Every field has a default, so a
/// config file only has to name what it changes:
///
/// ```json
/// { "filters": { "cities": ["Austin"] }, "cluster": { "eps": 0.02 } }
/// ```
///
/// `cluster` and `train` set to `null` skip those stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ingest: IngestOptions,
    pub enrich: EnrichOptions,
    pub filters: FilterSet,
    pub cluster: Option<ClusterParams>,
    pub train: Option<TrainRequest>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ingest: IngestOptions::default(),
            enrich: EnrichOptions::default(),
            filters: FilterSet::default(),
            cluster: Some(ClusterParams::default()),
            train: Some(TrainRequest::default()),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}
