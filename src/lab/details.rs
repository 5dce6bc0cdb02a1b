//! Read-side views over a trained model's details and snippet.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde_json::Value;

use super::json;
use super::task::MlTaskRef;
use crate::error::{LabError, LabResult};
use crate::transport::{ApiPath, Method, Transport};

/// Snippet keys that are train-run bookkeeping rather than prediction metrics.
const PREDICTION_NON_METRIC_KEYS: &[&str] = &[
    "gridsearchData",
    "trainDate",
    "topImportance",
    "backendType",
    "userMeta",
    "sessionDate",
    "trainInfo",
    "fullModelId",
    "gridLength",
    "algorithm",
    "sessionId",
];

/// Snippet keys that are train-run bookkeeping rather than clustering metrics.
const CLUSTERING_NON_METRIC_KEYS: &[&str] = &[
    "fullModelId",
    "algorithm",
    "trainInfo",
    "userMeta",
    "backendType",
    "sessionId",
    "sessionDate",
    "facts",
];

/// Where a trained model lives, which decides where user metadata is saved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelOrigin {
    /// A model trained in an ML task of the lab.
    Lab { task: MlTaskRef, model_id: String },
    /// A version of a saved model deployed in the Flow.
    SavedModel {
        project_key: String,
        saved_model_id: String,
        version: String,
    },
}

impl ModelOrigin {
    fn user_meta_path(&self) -> ApiPath {
        match self {
            Self::Lab { task, model_id } => task.model_path(model_id).join("user-meta"),
            Self::SavedModel {
                project_key,
                saved_model_id,
                version,
            } => ApiPath::new([
                "projects",
                project_key.as_str(),
                "savedmodels",
                saved_model_id.as_str(),
                "versions",
                version.as_str(),
                "user-meta",
            ]),
        }
    }
}

/// Details shared by prediction and clustering models.
pub struct TrainedModelDetails {
    transport: Arc<dyn Transport>,
    origin: ModelOrigin,
    details: Value,
    snippet: Value,
}

impl fmt::Debug for TrainedModelDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedModelDetails")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl TrainedModelDetails {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        origin: ModelOrigin,
        details: Value,
        snippet: Value,
    ) -> Self {
        Self {
            transport,
            origin,
            details,
            snippet,
        }
    }

    pub fn origin(&self) -> &ModelOrigin {
        &self.origin
    }

    /// The full details payload.
    pub fn raw(&self) -> &Value {
        &self.details
    }

    /// The snippet, a lighter summary than the details.
    pub fn raw_snippet(&self) -> &Value {
        &self.snippet
    }

    /// Train set size, quick description and timing of the train run.
    pub fn train_info(&self) -> LabResult<&Value> {
        json::get(&self.details, &["trainInfo"])
    }

    /// Name, description, cluster labels, classification threshold.
    pub fn user_meta(&self) -> LabResult<&Value> {
        json::get(&self.details, &["userMeta"])
    }

    /// Editable user metadata; persist with [`Self::save_user_meta`].
    pub fn user_meta_mut(&mut self) -> LabResult<&mut Value> {
        json::get_mut(&mut self.details, &["userMeta"])
    }

    /// Write the user metadata back to the lab model or saved model version.
    pub fn save_user_meta(&self) -> LabResult<()> {
        let user_meta = self.user_meta()?;
        let path = self.origin.user_meta_path();
        self.transport
            .perform_empty(Method::Put, &path, Some(user_meta))?;
        tracing::info!(%path, "Saved model user metadata");
        Ok(())
    }

    /// Preprocessing settings used to train this model.
    pub fn preprocessing_settings(&self) -> LabResult<&Value> {
        json::get(&self.details, &["preprocessing"])
    }

    /// Modeling settings of this one model, not the task-wide algorithm list.
    pub fn modeling_settings(&self) -> LabResult<&Value> {
        json::get(&self.details, &["modeling"])
    }

    /// Parameters actually used after hyperparameter search; `resolved` holds them.
    pub fn actual_modeling_params(&self) -> LabResult<&Value> {
        json::get(&self.details, &["actualParams"])
    }
}

/// Details of a trained prediction model.
#[derive(Debug)]
pub struct PredictionModelDetails {
    common: TrainedModelDetails,
}

impl PredictionModelDetails {
    /// ROC curve data of a binary classifier.
    pub fn roc_curve_data(&self) -> LabResult<&Value> {
        match self
            .common
            .details
            .get("perf")
            .and_then(|perf| perf.get("rocVizData"))
        {
            Some(roc) if !roc.is_null() => Ok(roc),
            _ => Err(LabError::Validation(
                "This model does not have ROC visualization data".to_string(),
            )),
        }
    }

    /// Every performance metric of the model.
    ///
    /// Binary classifiers report threshold-dependent metrics at the optimal
    /// threshold found in training; per-threshold values live under
    /// `perf.perCutData` of the details. K-fold runs add `...std` variants.
    pub fn performance_metrics(&self) -> Value {
        json::without_keys(&self.common.snippet, PREDICTION_NON_METRIC_KEYS)
    }
}

impl Deref for PredictionModelDetails {
    type Target = TrainedModelDetails;

    fn deref(&self) -> &Self::Target {
        &self.common
    }
}

impl DerefMut for PredictionModelDetails {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.common
    }
}

/// Details of a trained clustering model.
#[derive(Debug)]
pub struct ClusteringModelDetails {
    common: TrainedModelDetails,
}

impl ClusteringModelDetails {
    /// "For cluster X, average of Y is Z times higher than average" data.
    pub fn facts(&self) -> LabResult<ClustersFacts> {
        json::get(&self.common.details, &["facts"]).map(|facts| ClustersFacts::new(facts.clone()))
    }

    pub fn performance_metrics(&self) -> Value {
        json::without_keys(&self.common.snippet, CLUSTERING_NON_METRIC_KEYS)
    }
}

impl Deref for ClusteringModelDetails {
    type Target = TrainedModelDetails;

    fn deref(&self) -> &Self::Target {
        &self.common
    }
}

impl DerefMut for ClusteringModelDetails {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.common
    }
}

/// A trained model, dispatched on whether its details carry cluster facts.
#[derive(Debug)]
pub enum TrainedModel {
    Prediction(PredictionModelDetails),
    Clustering(ClusteringModelDetails),
}

impl TrainedModel {
    pub(crate) fn from_payloads(
        transport: Arc<dyn Transport>,
        origin: ModelOrigin,
        details: Value,
        snippet: Value,
    ) -> Self {
        let clustering = details.get("facts").is_some();
        let common = TrainedModelDetails::new(transport, origin, details, snippet);
        if clustering {
            Self::Clustering(ClusteringModelDetails { common })
        } else {
            Self::Prediction(PredictionModelDetails { common })
        }
    }

    pub fn common(&self) -> &TrainedModelDetails {
        match self {
            Self::Prediction(details) => &details.common,
            Self::Clustering(details) => &details.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut TrainedModelDetails {
        match self {
            Self::Prediction(details) => &mut details.common,
            Self::Clustering(details) => &mut details.common,
        }
    }

    pub fn performance_metrics(&self) -> Value {
        match self {
            Self::Prediction(details) => details.performance_metrics(),
            Self::Clustering(details) => details.performance_metrics(),
        }
    }

    pub fn as_prediction(&self) -> Option<&PredictionModelDetails> {
        match self {
            Self::Prediction(details) => Some(details),
            Self::Clustering(_) => None,
        }
    }

    pub fn as_clustering(&self) -> Option<&ClusteringModelDetails> {
        match self {
            Self::Clustering(details) => Some(details),
            Self::Prediction(_) => None,
        }
    }
}

/// Per-cluster descriptive statistics, indexed by cluster position.
#[derive(Clone, Debug, PartialEq)]
pub struct ClustersFacts {
    raw: Value,
}

impl ClustersFacts {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn cluster_count(&self) -> LabResult<usize> {
        Ok(self.clusters()?.len())
    }

    pub fn cluster_size(&self, cluster_index: usize) -> LabResult<&Value> {
        let cluster = self.cluster(cluster_index)?;
        cluster
            .get("size")
            .ok_or_else(|| LabError::missing(format!("clusters[{cluster_index}].size")))
    }

    pub fn facts_for_cluster(&self, cluster_index: usize) -> LabResult<&[Value]> {
        self.cluster(cluster_index)?
            .get("facts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .ok_or_else(|| LabError::missing(format!("clusters[{cluster_index}].facts")))
    }

    /// Facts of a cluster about one feature, matched on `feature_label`.
    pub fn facts_for_cluster_and_feature(
        &self,
        cluster_index: usize,
        feature_name: &str,
    ) -> LabResult<Vec<&Value>> {
        Ok(self
            .facts_for_cluster(cluster_index)?
            .iter()
            .filter(|fact| fact.get("feature_label").and_then(Value::as_str) == Some(feature_name))
            .collect())
    }

    fn clusters(&self) -> LabResult<&Vec<Value>> {
        json::get(&self.raw, &["clusters"])?
            .as_array()
            .ok_or_else(|| LabError::missing("clusters (array)"))
    }

    fn cluster(&self, cluster_index: usize) -> LabResult<&Value> {
        self.clusters()?
            .get(cluster_index)
            .ok_or_else(|| LabError::missing(format!("clusters[{cluster_index}]")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::test_support::FakeTransport;
    use serde_json::json;

    fn lab_origin() -> ModelOrigin {
        ModelOrigin::Lab {
            task: MlTaskRef::new("PROJ", "an1", "mt1"),
            model_id: "m1".to_string(),
        }
    }

    fn prediction(transport: &Arc<FakeTransport>, details: Value, snippet: Value) -> TrainedModel {
        TrainedModel::from_payloads(transport.clone(), lab_origin(), details, snippet)
    }

    fn facts() -> Value {
        json!({"clusters": [
            {"size": 120, "facts": [
                {"feature_label": "age", "type": "numerical", "mean": 41.5},
                {"feature_label": "city", "type": "categorical", "category_value": "Paris"},
                {"feature_label": "age", "type": "numerical", "std": 3.0}
            ]},
            {"size": 80, "facts": []}
        ]})
    }

    #[test]
    fn roc_curve_data_requires_perf_block() {
        let transport = Arc::new(FakeTransport::default());
        let with_roc = prediction(
            &transport,
            json!({"perf": {"rocVizData": {"auc": 0.91}}}),
            json!({}),
        );
        let roc = with_roc.as_prediction().unwrap().roc_curve_data().unwrap();
        assert_eq!(roc["auc"], 0.91);

        for details in [json!({}), json!({"perf": {}}), json!({"perf": {"rocVizData": null}})] {
            let model = prediction(&transport, details, json!({}));
            assert!(matches!(
                model.as_prediction().unwrap().roc_curve_data(),
                Err(LabError::Validation(_))
            ));
        }
    }

    #[test]
    fn prediction_metrics_strip_bookkeeping() {
        let transport = Arc::new(FakeTransport::default());
        let snippet = json!({
            "auc": 0.9, "f1": 0.7, "algorithm": "XGBOOST_CLASSIFICATION",
            "sessionId": "s1", "trainInfo": {}, "userMeta": {}, "gridsearchData": {}
        });
        let model = prediction(&transport, json!({}), snippet.clone());
        assert_eq!(model.performance_metrics(), json!({"auc": 0.9, "f1": 0.7}));
        assert_eq!(model.common().raw_snippet(), &snippet);
    }

    #[test]
    fn clustering_metrics_strip_facts() {
        let transport = Arc::new(FakeTransport::default());
        let model = TrainedModel::from_payloads(
            transport.clone(),
            lab_origin(),
            json!({"facts": facts()}),
            json!({"silhouette": 0.4, "facts": {}, "algorithm": "KMEANS", "gridLength": 1}),
        );
        let clustering = model.as_clustering().unwrap();
        assert_eq!(
            clustering.performance_metrics(),
            json!({"silhouette": 0.4, "gridLength": 1})
        );
        assert!(model.as_prediction().is_none());
    }

    #[test]
    fn cluster_facts_index_by_position_and_feature() {
        let facts = ClustersFacts::new(facts());
        assert_eq!(facts.cluster_count().unwrap(), 2);
        assert_eq!(facts.cluster_size(0).unwrap(), 120);
        assert_eq!(facts.facts_for_cluster(0).unwrap().len(), 3);
        assert!(facts.facts_for_cluster(1).unwrap().is_empty());
        let age = facts.facts_for_cluster_and_feature(0, "age").unwrap();
        assert_eq!(age.len(), 2);
        assert!(age.iter().all(|fact| fact["feature_label"] == "age"));
        assert!(facts.facts_for_cluster_and_feature(0, "income").unwrap().is_empty());
        assert!(matches!(facts.cluster_size(2), Err(LabError::MissingKey(_))));
    }

    #[test]
    fn accessors_read_detail_sections() {
        let transport = Arc::new(FakeTransport::default());
        let model = prediction(
            &transport,
            json!({
                "trainInfo": {"trainRows": 1000},
                "preprocessing": {"per_feature": {}},
                "modeling": {"algorithm": "LOGISTIC_REGRESSION"},
                "actualParams": {"resolved": {"C": 0.5}}
            }),
            json!({}),
        );
        let common = model.common();
        assert_eq!(common.train_info().unwrap()["trainRows"], 1000);
        assert_eq!(common.preprocessing_settings().unwrap(), &json!({"per_feature": {}}));
        assert_eq!(common.modeling_settings().unwrap()["algorithm"], "LOGISTIC_REGRESSION");
        assert_eq!(common.actual_modeling_params().unwrap()["resolved"]["C"], 0.5);
        assert!(matches!(common.user_meta(), Err(LabError::MissingKey(_))));
    }

    #[test]
    fn lab_user_meta_saves_to_lab_endpoint() {
        let transport = Arc::new(FakeTransport::default());
        let mut model = prediction(
            &transport,
            json!({"userMeta": {"name": "v1", "labels": []}}),
            json!({}),
        );
        model.common_mut().user_meta_mut().unwrap()["name"] = json!("champion");
        model.common().save_user_meta().unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::Put);
        assert_eq!(calls[0].path, "/projects/PROJ/models/lab/an1/mt1/models/m1/user-meta");
        assert_eq!(calls[0].body, Some(json!({"name": "champion", "labels": []})));
    }

    #[test]
    fn saved_model_user_meta_saves_to_version_endpoint() {
        let transport = Arc::new(FakeTransport::default());
        let origin = ModelOrigin::SavedModel {
            project_key: "PROJ".to_string(),
            saved_model_id: "sm1".to_string(),
            version: "1700000000000".to_string(),
        };
        let model = TrainedModel::from_payloads(
            transport.clone(),
            origin,
            json!({"userMeta": {"name": "deployed"}}),
            json!({}),
        );
        if let TrainedModel::Prediction(details) = &model {
            details.save_user_meta().unwrap();
        } else {
            panic!("expected a prediction model");
        }
        assert_eq!(
            transport.calls()[0].path,
            "/projects/PROJ/savedmodels/sm1/versions/1700000000000/user-meta"
        );
    }
}
