//! Handle over one ML task of a visual analysis.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::details::{ModelOrigin, TrainedModel};
use super::json;
use super::settings::MlTaskSettings;
use super::wait::{WaitOptions, poll_until_false};
use crate::error::{LabError, LabResult};
use crate::transport::{ApiPath, Method, Transport};

/// Coordinates of an ML task: project, analysis and task identifiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MlTaskRef {
    pub project_key: String,
    pub analysis_id: String,
    pub mltask_id: String,
}

impl MlTaskRef {
    pub fn new(
        project_key: impl Into<String>,
        analysis_id: impl Into<String>,
        mltask_id: impl Into<String>,
    ) -> Self {
        Self {
            project_key: project_key.into(),
            analysis_id: analysis_id.into(),
            mltask_id: mltask_id.into(),
        }
    }

    /// `/projects/{project}/models/lab/{analysis}/{mltask}`
    pub fn path(&self) -> ApiPath {
        ApiPath::new([
            "projects",
            self.project_key.as_str(),
            "models",
            "lab",
            self.analysis_id.as_str(),
            self.mltask_id.as_str(),
        ])
    }

    pub(crate) fn model_path(&self, model_id: &str) -> ApiPath {
        self.path().join("models").join(model_id)
    }
}

impl fmt::Display for MlTaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project_key, self.analysis_id, self.mltask_id)
    }
}

/// Ensembling strategies understood by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnsembleMethod {
    Average,
    ProbaAverage,
    Median,
    Vote,
    LinearModel,
    LogisticModel,
}

/// Request to deploy a trained model to the Flow as a new saved model.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployToFlow {
    #[serde(skip)]
    pub model_id: String,
    pub model_name: String,
    /// Short name, or `PROJECT.name` for a shared dataset.
    #[serde(rename = "trainDatasetRef")]
    pub train_dataset: String,
    /// Prediction only. Without it the split is applied to the train set.
    #[serde(rename = "testDatasetRef")]
    pub test_dataset: Option<String>,
    /// Prediction only. Whether hyperparameter search runs again.
    pub redo_optimization: bool,
}

impl DeployToFlow {
    pub fn new(
        model_id: impl Into<String>,
        model_name: impl Into<String>,
        train_dataset: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            model_name: model_name.into(),
            train_dataset: train_dataset.into(),
            test_dataset: None,
            redo_optimization: true,
        }
    }
}

/// Request to push a trained model into an existing saved model.
///
/// At least one of `recipe_name` or `saved_model_id` is required.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeployToFlow {
    #[serde(skip)]
    pub model_id: String,
    pub recipe_name: Option<String>,
    pub saved_model_id: Option<String>,
    /// Whether the new version becomes the active one.
    pub activate: bool,
}

/// Outcome of [`MlTask::deploy_to_flow`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDeployment {
    pub saved_model_id: String,
    pub train_recipe_name: String,
}

/// Outcome of [`MlTask::redeploy_to_flow`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRedeployment {
    /// Whether the active version changed, impacting downstream recipes.
    #[serde(default)]
    pub impacts_downstream: bool,
}

/// A handle to interact with an ML task for prediction or clustering.
#[derive(Clone)]
pub struct MlTask {
    transport: Arc<dyn Transport>,
    task: MlTaskRef,
}

impl fmt::Debug for MlTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MlTask").field("task", &self.task).finish_non_exhaustive()
    }
}

impl MlTask {
    pub fn new(transport: Arc<dyn Transport>, task: MlTaskRef) -> Self {
        Self { transport, task }
    }

    pub fn task_ref(&self) -> &MlTaskRef {
        &self.task
    }

    pub fn status(&self) -> LabResult<Value> {
        self.get(self.task.path().join("status"))
    }

    /// Wait for the initial settings guess of a new task to finish.
    ///
    /// Call this right after creating a task, before reading settings or training.
    pub fn wait_guess_complete(&self, options: &WaitOptions) -> LabResult<Value> {
        tracing::debug!(task = %self.task, "Waiting for guess");
        poll_until_false(options, "guessing", || self.status())
    }

    /// Wait for the current train session (or ensembling) to finish.
    pub fn wait_train_complete(&self, options: &WaitOptions) -> LabResult<Value> {
        tracing::debug!(task = %self.task, "Waiting for training");
        poll_until_false(options, "training", || self.status())
    }

    pub fn settings(&self) -> LabResult<MlTaskSettings> {
        let raw = self.get(self.task.path().join("settings"))?;
        Ok(MlTaskSettings::new(self.transport.clone(), self.task.clone(), raw))
    }

    /// Start a train session and return right away; see [`Self::wait_train_complete`].
    pub fn start_train(
        &self,
        session_name: Option<&str>,
        session_description: Option<&str>,
    ) -> LabResult<Value> {
        let body = json!({
            "sessionName": session_name,
            "sessionDescription": session_description,
        });
        let ret = self.post(self.task.path().join("train"), &body)?;
        tracing::info!(task = %self.task, session = ?session_name, "Started training");
        Ok(ret)
    }

    /// Start ensembling `model_ids` and return the id of the ensemble model.
    pub fn start_ensembling(
        &self,
        model_ids: &[String],
        method: Option<EnsembleMethod>,
    ) -> LabResult<String> {
        let body = json!({
            "method": method,
            "modelsIds": model_ids,
        });
        let ret = self.post(self.task.path().join("ensemble"), &body)?;
        let id = json::get(&ret, &["id"])?
            .as_str()
            .ok_or_else(|| LabError::missing("id (string)"))?
            .to_string();
        tracing::info!(task = %self.task, ensemble = %id, members = model_ids.len(), "Started ensembling");
        Ok(id)
    }

    /// Identifiers of the trained models, optionally restricted to one session
    /// and/or one algorithm.
    ///
    /// The algorithm filter keeps models whose snippet `algorithm` equals it
    /// and costs one extra snippets request.
    pub fn trained_models_ids(
        &self,
        session_id: Option<&str>,
        algorithm: Option<&str>,
    ) -> LabResult<Vec<String>> {
        let status = self.status()?;
        let entries = json::get(&status, &["fullModelIds"])?
            .as_array()
            .ok_or_else(|| LabError::missing("fullModelIds (array)"))?;
        let mut ids = entries
            .iter()
            .filter(|entry| {
                session_id.is_none_or(|session| {
                    entry
                        .get("fullModelId")
                        .and_then(|full| full.get("sessionId"))
                        .and_then(Value::as_str)
                        == Some(session)
                })
            })
            .map(|entry| {
                entry
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| LabError::missing("fullModelIds[].id"))
            })
            .collect::<LabResult<Vec<_>>>()?;

        if let Some(algorithm) = algorithm
            && !ids.is_empty()
        {
            let snippets = self.trained_model_snippets(Some(ids.as_slice()))?;
            ids.retain(|id| {
                snippets
                    .get(id)
                    .and_then(|snippet| snippet.get("algorithm"))
                    .and_then(Value::as_str)
                    == Some(algorithm)
            });
        }
        Ok(ids)
    }

    /// Quick summary of one trained model. [`Self::trained_model_details`]
    /// returns the complete, structured view.
    pub fn trained_model_snippet(&self, id: &str) -> LabResult<Value> {
        let ids = [id.to_string()];
        let mut snippets = self.trained_model_snippets(Some(&ids[..]))?;
        snippets
            .remove(id)
            .ok_or_else(|| LabError::missing(format!("models-snippets.{id}")))
    }

    /// Snippets keyed by model id, for `ids` or for every trained model.
    pub fn trained_model_snippets(&self, ids: Option<&[String]>) -> LabResult<Map<String, Value>> {
        let body = match ids {
            Some(ids) => json!({ "modelsIds": ids }),
            None => json!({}),
        };
        let path = self.task.path().join("models-snippets");
        match self.transport.perform_json(Method::Get, &path, Some(&body))? {
            Value::Object(snippets) => Ok(snippets),
            _ => Err(LabError::Json(
                "models-snippets response is not an object".to_string(),
            )),
        }
    }

    /// Full details of a trained model, as a prediction or clustering view.
    pub fn trained_model_details(&self, id: &str) -> LabResult<TrainedModel> {
        let details = self.get(self.task.model_path(id).join("details"))?;
        let snippet = self.trained_model_snippet(id)?;
        let origin = ModelOrigin::Lab {
            task: self.task.clone(),
            model_id: id.to_string(),
        };
        Ok(TrainedModel::from_payloads(
            self.transport.clone(),
            origin,
            details,
            snippet,
        ))
    }

    /// Deploy a trained model to a new saved model plus train recipe in the Flow.
    pub fn deploy_to_flow(&self, request: &DeployToFlow) -> LabResult<FlowDeployment> {
        let path = self
            .task
            .model_path(&request.model_id)
            .join("actions")
            .join("deployToFlow");
        let ret = self.post(path, &to_body(request)?)?;
        let deployment: FlowDeployment =
            serde_json::from_value(ret).map_err(|err| LabError::Json(err.to_string()))?;
        tracing::info!(
            task = %self.task,
            model = %request.model_id,
            saved_model = %deployment.saved_model_id,
            "Deployed model to flow"
        );
        Ok(deployment)
    }

    /// Push a trained model as a new version of an existing saved model.
    pub fn redeploy_to_flow(&self, request: &RedeployToFlow) -> LabResult<FlowRedeployment> {
        if request.recipe_name.is_none() && request.saved_model_id.is_none() {
            return Err(LabError::Validation(
                "Either recipe_name or saved_model_id must be specified".to_string(),
            ));
        }
        let path = self
            .task
            .model_path(&request.model_id)
            .join("actions")
            .join("redeployToFlow");
        let ret = self.post(path, &to_body(request)?)?;
        let outcome: FlowRedeployment =
            serde_json::from_value(ret).map_err(|err| LabError::Json(err.to_string()))?;
        tracing::info!(
            task = %self.task,
            model = %request.model_id,
            impacts_downstream = outcome.impacts_downstream,
            "Redeployed model to flow"
        );
        Ok(outcome)
    }

    fn get(&self, path: ApiPath) -> LabResult<Value> {
        self.transport.perform_json(Method::Get, &path, None)
    }

    fn post(&self, path: ApiPath, body: &Value) -> LabResult<Value> {
        self.transport.perform_json(Method::Post, &path, Some(body))
    }
}

fn to_body<T: Serialize>(request: &T) -> LabResult<Value> {
    serde_json::to_value(request).map_err(|err| LabError::Json(err.to_string()))
}
