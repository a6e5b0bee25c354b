//! Supervised prediction of a target column from numeric features with
//! seeded random forests.

pub mod split;
pub mod trainer;

pub use trainer::{
    candidate_features, train, Metric, NoModelReason, PredictionResult, TaskKind, TrainOutcome,
    TrainParams, TrainRequest, TrainedModel,
};
