//! Editable settings of an ML task: features, algorithms, metric, split.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use super::json;
use super::split::SplitParamsHandler;
use super::task::MlTaskRef;
use crate::error::{LabError, LabResult};
use crate::transport::{Method, Transport};

/// Public algorithm names whose `modeling` key isn't just the lowercased name.
pub const PREDICTION_ALGORITHM_REMAP: &[(&str, &str)] = &[
    ("SVC_CLASSIFICATION", "svc_classifier"),
    ("SGD_CLASSIFICATION", "sgd_classifier"),
    ("SPARKLING_DEEP_LEARNING", "deep_learning_sparkling"),
    ("SPARKLING_GBM", "gbm_sparkling"),
    ("SPARKLING_RF", "rf_sparkling"),
    ("SPARKLING_GLM", "glm_sparkling"),
    ("SPARKLING_NB", "nb_sparkling"),
    ("XGBOOST_CLASSIFICATION", "xgboost"),
    ("XGBOOST_REGRESSION", "xgboost"),
    ("MLLIB_LOGISTIC_REGRESSION", "mllib_logit"),
    ("MLLIB_LINEAR_REGRESSION", "mllib_linreg"),
    ("MLLIB_RANDOM_FOREST", "mllib_rf"),
];

/// Clustering counterpart of [`PREDICTION_ALGORITHM_REMAP`].
pub const CLUSTERING_ALGORITHM_REMAP: &[(&str, &str)] = &[("DBSCAN", "db_scan_clustering")];

/// Kind of ML task, read from the `taskType` settings field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskType {
    Prediction,
    Clustering,
}

impl TaskType {
    /// Anything other than `PREDICTION` is treated as clustering.
    pub fn from_settings(settings: &Value) -> Self {
        match settings.get("taskType").and_then(Value::as_str) {
            Some("PREDICTION") => Self::Prediction,
            _ => Self::Clustering,
        }
    }

    pub fn algorithm_remap(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Prediction => PREDICTION_ALGORITHM_REMAP,
            Self::Clustering => CLUSTERING_ALGORITHM_REMAP,
        }
    }

    /// Key of `algorithm` inside the `modeling` section.
    pub fn modeling_key(self, algorithm: &str) -> String {
        self.algorithm_remap()
            .iter()
            .find(|(name, _)| *name == algorithm)
            .map(|(_, key)| (*key).to_string())
            .unwrap_or_else(|| algorithm.to_lowercase())
    }
}

/// Metric selection for [`MlTaskSettings::set_metric`].
///
/// One of `metric` or `custom_metric` must be set; custom code wins when
/// both are.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricSettings {
    /// Built-in metric name, e.g. `AUC` or `RMSE`.
    pub metric: Option<String>,
    /// Python code of a custom metric.
    pub custom_metric: Option<String>,
    /// Whether the custom metric is a score (`true`) or a loss.
    pub custom_metric_greater_is_better: bool,
    /// Whether the custom metric receives class probabilities.
    pub custom_metric_use_probas: bool,
}

impl Default for MetricSettings {
    fn default() -> Self {
        Self {
            metric: None,
            custom_metric: None,
            custom_metric_greater_is_better: true,
            custom_metric_use_probas: false,
        }
    }
}

impl MetricSettings {
    pub fn named(metric: impl Into<String>) -> Self {
        Self {
            metric: Some(metric.into()),
            ..Self::default()
        }
    }

    pub fn custom(code: impl Into<String>) -> Self {
        Self {
            custom_metric: Some(code.into()),
            ..Self::default()
        }
    }
}

/// Settings of an ML task as fetched from the server.
///
/// Setters mutate the local copy only; [`MlTaskSettings::save`] pushes the
/// whole mapping back.
pub struct MlTaskSettings {
    transport: Arc<dyn Transport>,
    task: MlTaskRef,
    task_type: TaskType,
    raw: Value,
}

impl fmt::Debug for MlTaskSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MlTaskSettings")
            .field("task", &self.task)
            .field("task_type", &self.task_type)
            .finish_non_exhaustive()
    }
}

impl MlTaskSettings {
    pub(crate) fn new(transport: Arc<dyn Transport>, task: MlTaskRef, raw: Value) -> Self {
        Self {
            transport,
            task,
            task_type: TaskType::from_settings(&raw),
            raw,
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// The settings mapping itself; edits are saved with [`Self::save`].
    pub fn raw_mut(&mut self) -> &mut Value {
        &mut self.raw
    }

    /// Editor for the train/test split.
    pub fn split_params(&mut self) -> SplitParamsHandler<'_> {
        SplitParamsHandler::new(&mut self.raw)
    }

    pub fn feature_preprocessing(&self, feature_name: &str) -> LabResult<&Value> {
        self.per_feature()?
            .get(feature_name)
            .ok_or_else(|| LabError::UnknownFeature(feature_name.to_string()))
    }

    pub fn feature_preprocessing_mut(&mut self, feature_name: &str) -> LabResult<&mut Value> {
        self.per_feature_mut()?
            .get_mut(feature_name)
            .ok_or_else(|| LabError::UnknownFeature(feature_name.to_string()))
    }

    /// Apply `transform` to every non-target feature, optionally only those of
    /// `only_of_type` (`CATEGORY`, `NUMERIC`, `TEXT`, `VECTOR`).
    ///
    /// The transform receives a copy of the feature's params and returns the
    /// replacement. Features it doesn't apply to keep their params.
    pub fn foreach_feature<F>(&mut self, mut transform: F, only_of_type: Option<&str>) -> LabResult<()>
    where
        F: FnMut(&str, Value) -> Value,
    {
        let per_feature = self.per_feature_mut()?;
        let rebuilt: Map<String, Value> = per_feature
            .iter()
            .map(|(name, params)| {
                let applies = field_str(params, "role") != Some("TARGET")
                    && only_of_type.is_none_or(|kind| field_str(params, "type") == Some(kind));
                let params = if applies {
                    transform(name, params.clone())
                } else {
                    params.clone()
                };
                (name.clone(), params)
            })
            .collect();
        *per_feature = rebuilt;
        Ok(())
    }

    /// Exclude a feature from training.
    pub fn reject_feature(&mut self, feature_name: &str) -> LabResult<()> {
        self.set_role(feature_name, "REJECT")
    }

    /// Use a feature as a training input.
    pub fn use_feature(&mut self, feature_name: &str) -> LabResult<()> {
        self.set_role(feature_name, "INPUT")
    }

    /// Use a feature as sample weight.
    ///
    /// Any previous weighting is removed first, even when `feature_name` turns
    /// out not to exist.
    pub fn use_sample_weighting(&mut self, feature_name: &str) -> LabResult<()> {
        self.remove_sample_weighting()?;
        if !self.per_feature()?.contains_key(feature_name) {
            return Err(LabError::UnknownFeature(feature_name.to_string()));
        }
        let weight = json::object_mut(&mut self.raw, &["weight"])?;
        weight.insert("weightMethod".into(), json!("SAMPLE_WEIGHT"));
        weight.insert("sampleWeightVariable".into(), json!(feature_name));
        self.set_role(feature_name, "WEIGHT")
    }

    /// Turn weighting off; a feature used as weight goes back to being an input.
    pub fn remove_sample_weighting(&mut self) -> LabResult<()> {
        json::object_mut(&mut self.raw, &["weight"])?
            .insert("weightMethod".into(), json!("NO_WEIGHTING"));
        for params in self.per_feature_mut()?.values_mut() {
            if field_str(params, "role") == Some("WEIGHT") {
                params["role"] = json!("INPUT");
            }
        }
        Ok(())
    }

    /// Training settings of one algorithm, by its public upper-case name.
    pub fn algorithm_settings(&self, algorithm_name: &str) -> LabResult<&Value> {
        let key = self.task_type.modeling_key(algorithm_name);
        json::object(&self.raw, &["modeling"])?
            .get(&key)
            .ok_or_else(|| LabError::UnknownAlgorithm(algorithm_name.to_string()))
    }

    pub fn algorithm_settings_mut(&mut self, algorithm_name: &str) -> LabResult<&mut Value> {
        let key = self.task_type.modeling_key(algorithm_name);
        json::object_mut(&mut self.raw, &["modeling"])?
            .get_mut(&key)
            .ok_or_else(|| LabError::UnknownAlgorithm(algorithm_name.to_string()))
    }

    pub fn set_algorithm_enabled(&mut self, algorithm_name: &str, enabled: bool) -> LabResult<()> {
        let settings = self.algorithm_settings_mut(algorithm_name)?;
        let settings = settings
            .as_object_mut()
            .ok_or_else(|| LabError::missing(format!("modeling.{algorithm_name} (object)")))?;
        settings.insert("enabled".into(), json!(enabled));
        Ok(())
    }

    /// Set the evaluation metric of a prediction task.
    pub fn set_metric(&mut self, metric: MetricSettings) -> LabResult<()> {
        let evaluation_metric = match (&metric.custom_metric, &metric.metric) {
            (Some(_), _) => "CUSTOM".to_string(),
            (None, Some(name)) => name.clone(),
            (None, None) => {
                return Err(LabError::Validation(
                    "Either metric or custom_metric must be defined".to_string(),
                ));
            }
        };
        let metrics = json::object_mut(&mut self.raw, &["modeling", "metrics"])?;
        metrics.insert("evaluationMetric".into(), json!(evaluation_metric));
        metrics.insert("customEvaluationMetricCode".into(), json!(metric.custom_metric));
        metrics.insert(
            "customEvaluationMetricGIB".into(),
            json!(metric.custom_metric_greater_is_better),
        );
        metrics.insert(
            "customEvaluationMetricNeedsProba".into(),
            json!(metric.custom_metric_use_probas),
        );
        Ok(())
    }

    /// Replace the task's settings on the server with this mapping.
    pub fn save(&self) -> LabResult<()> {
        let path = self.task.path().join("settings");
        self.transport
            .perform_empty(Method::Post, &path, Some(&self.raw))?;
        tracing::info!(task = %self.task, "Saved ML task settings");
        Ok(())
    }

    fn per_feature(&self) -> LabResult<&Map<String, Value>> {
        json::object(&self.raw, &["preprocessing", "per_feature"])
    }

    fn per_feature_mut(&mut self) -> LabResult<&mut Map<String, Value>> {
        json::object_mut(&mut self.raw, &["preprocessing", "per_feature"])
    }

    fn set_role(&mut self, feature_name: &str, role: &str) -> LabResult<()> {
        let params = self.feature_preprocessing_mut(feature_name)?;
        let params = params
            .as_object_mut()
            .ok_or_else(|| LabError::missing(format!("per_feature.{feature_name} (object)")))?;
        params.insert("role".into(), json!(role));
        Ok(())
    }
}

fn field_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}
