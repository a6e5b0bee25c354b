use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::metrics::{accuracy, mean_squared_error, r2};

use super::split::train_test_split;
use crate::data::model::{CellValue, Table, TRAFFIC_VOLUME};
use crate::error::{PipelineError, Result};

pub const ACTUAL: &str = "actual";
pub const PREDICTED: &str = "predicted";

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Regression when every target value is numeric, classification otherwise.
    #[default]
    Auto,
    Regression,
    Classification,
}

/// Split and forest hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    pub test_fraction: f64,
    pub seed: u64,
    pub n_trees: u16,
    pub max_depth: Option<u16>,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    pub task: TaskKind,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            n_trees: 100,
            max_depth: None,
            min_samples_leaf: 1,
            min_samples_split: 2,
            task: TaskKind::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainRequest {
    /// Numeric feature columns; must not include `target`.
    pub features: Vec<String>,
    pub target: String,
    pub params: TrainParams,
}

impl Default for TrainRequest {
    fn default() -> Self {
        Self {
            features: Vec::new(),
            target: TRAFFIC_VOLUME.to_string(),
            params: TrainParams::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why no model was trained. None of these are faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoModelReason {
    NoFeatures,
    TargetUnavailable,
    InsufficientRows { usable: usize },
    SingleClass,
}

impl fmt::Display for NoModelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoModelReason::NoFeatures => write!(f, "no features selected"),
            NoModelReason::TargetUnavailable => write!(f, "target column not present"),
            NoModelReason::InsufficientRows { usable } => {
                write!(f, "{usable} complete rows, need at least 2")
            }
            NoModelReason::SingleClass => write!(f, "target has a single class"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// `r2` is `None` when the held-out targets are constant.
    Regression { mse: f64, r2: Option<f64> },
    Classification { accuracy: f64 },
}

enum Forest {
    Regressor(RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>),
    Classifier {
        model: RandomForestClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>,
        classes: Vec<String>,
    },
}

impl fmt::Debug for Forest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Forest::Regressor(_) => f.write_str("Forest::Regressor"),
            Forest::Classifier { classes, .. } => f
                .debug_struct("Forest::Classifier")
                .field("classes", classes)
                .finish_non_exhaustive(),
        }
    }
}

/// A fitted forest and the rows it was fitted and evaluated on.
#[derive(Debug)]
pub struct TrainedModel {
    forest: Forest,
    pub feature_names: Vec<String>,
    pub target: String,
    /// Input-table rows used for fitting.
    pub train_indices: Vec<usize>,
    /// Input-table rows held out for evaluation; disjoint from `train_indices`.
    pub test_indices: Vec<usize>,
}

#[derive(Debug)]
pub struct PredictionResult {
    pub model: TrainedModel,
    pub actual: Vec<CellValue>,
    pub predicted: Vec<CellValue>,
    pub metric: Metric,
    /// Held-out rows with `actual` and `predicted` appended.
    pub table: Table,
}

#[derive(Debug)]
pub enum TrainOutcome {
    NoModel(NoModelReason),
    Trained(Box<PredictionResult>),
}

impl TrainOutcome {
    pub fn result(&self) -> Option<&PredictionResult> {
        match self {
            TrainOutcome::Trained(result) => Some(result),
            TrainOutcome::NoModel(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Training
// ---------------------------------------------------------------------------

/// Numeric columns usable as features for `target`.
pub fn candidate_features(table: &Table, target: &str) -> Vec<String> {
    table
        .numeric_columns()
        .into_iter()
        .filter(|c| c != target)
        .collect()
}

/// Fit a random forest on a seeded split of `table` and score the held-out
/// rows. `table` is not modified.
pub fn train(table: &Table, request: &TrainRequest) -> Result<TrainOutcome> {
    let TrainRequest {
        features,
        target,
        params,
    } = request;

    if features.is_empty() {
        return Ok(TrainOutcome::NoModel(NoModelReason::NoFeatures));
    }
    if features.contains(target) {
        return Err(PipelineError::TargetInFeatures(target.clone()));
    }
    if let Some(missing) = features.iter().find(|f| !table.has_column(f)) {
        return Err(PipelineError::UnknownColumn(missing.clone()));
    }
    if params.n_trees == 0 {
        return Err(PipelineError::InvalidParameter(
            "n_trees must be at least 1".to_string(),
        ));
    }
    if !table.has_column(target) {
        return Ok(TrainOutcome::NoModel(NoModelReason::TargetUnavailable));
    }

    let task = resolve_task(table, target, params.task);

    // Listwise deletion: only rows with every feature and the target usable.
    let usable: Vec<(usize, Vec<f64>)> = table
        .records()
        .filter(|rec| match task {
            TaskKind::Classification => !rec.get(target).is_null(),
            _ => rec.get(target).as_f64().is_some_and(f64::is_finite),
        })
        .filter_map(|rec| {
            let row: Option<Vec<f64>> = features
                .iter()
                .map(|f| rec.get(f).as_f64().filter(|v| v.is_finite()))
                .collect();
            row.map(|r| (rec.index(), r))
        })
        .collect();

    if usable.len() < 2 {
        log::info!("Only {} complete rows, not training", usable.len());
        return Ok(TrainOutcome::NoModel(NoModelReason::InsufficientRows {
            usable: usable.len(),
        }));
    }

    let split = train_test_split(usable.len(), params.test_fraction, params.seed)?;
    let train_indices: Vec<usize> = split.train.iter().map(|&i| usable[i].0).collect();
    let test_indices: Vec<usize> = split.test.iter().map(|&i| usable[i].0).collect();
    let x_train = to_matrix(split.train.iter().map(|&i| usable[i].1.as_slice()), features.len());
    let x_test: Vec<Vec<f64>> = split.test.iter().map(|&i| usable[i].1.clone()).collect();

    let forest = match task {
        TaskKind::Classification => {
            // Classes come from the training rows; held-out values outside
            // them score as misses.
            let classes: Vec<String> = train_indices
                .iter()
                .map(|&row| table.value(row, target).to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if classes.len() < 2 {
                log::info!("Training rows hold a single class, not training");
                return Ok(TrainOutcome::NoModel(NoModelReason::SingleClass));
            }
            let y: Vec<i32> = train_indices
                .iter()
                .map(|&row| class_index(&classes, table.value(row, target)))
                .collect();
            let model = RandomForestClassifier::fit(&x_train, &y, classifier_params(params))
                .map_err(|e| PipelineError::Model(e.to_string()))?;
            Forest::Classifier { model, classes }
        }
        _ => {
            let y: Vec<f64> = train_indices
                .iter()
                .filter_map(|&row| table.value(row, target).as_f64())
                .collect();
            let model = RandomForestRegressor::fit(&x_train, &y, regressor_params(params))
                .map_err(|e| PipelineError::Model(e.to_string()))?;
            Forest::Regressor(model)
        }
    };

    let model = TrainedModel {
        forest,
        feature_names: features.clone(),
        target: target.clone(),
        train_indices,
        test_indices,
    };
    let predicted = model.predict(&x_test)?;
    let actual: Vec<CellValue> = model
        .test_indices
        .iter()
        .map(|&row| table.value(row, target).clone())
        .collect();
    let metric = evaluate(&model.forest, &actual, &predicted);

    log::info!(
        "Trained {} trees on {} rows, held out {}: {metric:?}",
        params.n_trees,
        model.train_indices.len(),
        model.test_indices.len()
    );

    let held_out = table
        .select_rows(&model.test_indices)
        .with_column(ACTUAL, actual.clone())
        .with_column(PREDICTED, predicted.clone());

    Ok(TrainOutcome::Trained(Box::new(PredictionResult {
        model,
        actual,
        predicted,
        metric,
        table: held_out,
    })))
}

impl TrainedModel {
    /// Predict for rows of feature values, in `feature_names` order.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<CellValue>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != self.feature_names.len()) {
            return Err(PipelineError::InvalidParameter(format!(
                "expected {} feature values, got {}",
                self.feature_names.len(),
                bad.len()
            )));
        }

        let x = to_matrix(rows.iter().map(Vec::as_slice), self.feature_names.len());
        let predicted = match &self.forest {
            Forest::Regressor(model) => model
                .predict(&x)
                .map_err(|e| PipelineError::Model(e.to_string()))?
                .into_iter()
                .map(CellValue::Float)
                .collect(),
            Forest::Classifier { model, classes } => model
                .predict(&x)
                .map_err(|e| PipelineError::Model(e.to_string()))?
                .into_iter()
                .map(|idx| {
                    usize::try_from(idx)
                        .ok()
                        .and_then(|i| classes.get(i))
                        .map_or(CellValue::Null, |c| CellValue::String(c.clone()))
                })
                .collect(),
        };
        Ok(predicted)
    }

    /// Score every row of `table`, appending a `predicted` column. Rows with a
    /// missing feature get a null prediction.
    pub fn predict_table(&self, table: &Table) -> Result<Table> {
        let mut complete = Vec::new();
        let mut rows = Vec::new();
        for rec in table.records() {
            let values: Option<Vec<f64>> = self
                .feature_names
                .iter()
                .map(|f| rec.get(f).as_f64().filter(|v| v.is_finite()))
                .collect();
            if let Some(values) = values {
                complete.push(rec.index());
                rows.push(values);
            }
        }

        let mut column = vec![CellValue::Null; table.len()];
        for (row, value) in complete.into_iter().zip(self.predict(&rows)?) {
            column[row] = value;
        }
        Ok(table.with_column(PREDICTED, column))
    }

    pub fn is_classifier(&self) -> bool {
        matches!(self.forest, Forest::Classifier { .. })
    }
}

fn resolve_task(table: &Table, target: &str, requested: TaskKind) -> TaskKind {
    match requested {
        TaskKind::Auto => {
            let numeric = table
                .column(target)
                .map(|mut cells| cells.all(|c| c.is_null() || c.is_numeric()))
                .unwrap_or(true);
            if numeric {
                TaskKind::Regression
            } else {
                TaskKind::Classification
            }
        }
        explicit => explicit,
    }
}

fn class_index(classes: &[String], value: &CellValue) -> i32 {
    let label = value.to_string();
    classes
        .binary_search(&label)
        .map_or(-1, |i| i32::try_from(i).unwrap_or(i32::MAX))
}

fn to_matrix<'a>(rows: impl Iterator<Item = &'a [f64]>, n_features: usize) -> DenseMatrix<f64> {
    let data: Vec<f64> = rows.flat_map(|r| r.iter().copied()).collect();
    let n_rows = data.len() / n_features.max(1);
    DenseMatrix::new(n_rows, n_features, data, false)
}

fn regressor_params(params: &TrainParams) -> RandomForestRegressorParameters {
    let mut p = RandomForestRegressorParameters::default()
        .with_n_trees(params.n_trees.into())
        .with_min_samples_leaf(params.min_samples_leaf)
        .with_min_samples_split(params.min_samples_split)
        .with_seed(params.seed);
    if let Some(depth) = params.max_depth {
        p = p.with_max_depth(depth);
    }
    p
}

fn classifier_params(params: &TrainParams) -> RandomForestClassifierParameters {
    let mut p = RandomForestClassifierParameters::default()
        .with_n_trees(params.n_trees.into())
        .with_min_samples_leaf(params.min_samples_leaf)
        .with_min_samples_split(params.min_samples_split)
        .with_seed(params.seed);
    if let Some(depth) = params.max_depth {
        p = p.with_max_depth(depth);
    }
    p
}

fn evaluate(forest: &Forest, actual: &[CellValue], predicted: &[CellValue]) -> Metric {
    match forest {
        Forest::Regressor(_) => {
            let y_true: Vec<f64> = actual.iter().filter_map(CellValue::as_f64).collect();
            let y_pred: Vec<f64> = predicted.iter().filter_map(CellValue::as_f64).collect();
            let varies = y_true.windows(2).any(|w| w[0] != w[1]);
            Metric::Regression {
                mse: mean_squared_error(&y_true, &y_pred),
                r2: varies.then(|| r2(&y_true, &y_pred)),
            }
        }
        Forest::Classifier { classes, .. } => {
            let y_true: Vec<i32> = actual.iter().map(|v| class_index(classes, v)).collect();
            let y_pred: Vec<i32> = predicted.iter().map(|v| class_index(classes, v)).collect();
            Metric::Classification {
                accuracy: accuracy(&y_true, &y_pred),
            }
        }
    }
}
