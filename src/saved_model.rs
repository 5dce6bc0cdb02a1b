//! Handle over a saved model deployed in the Flow.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{LabError, LabResult};
use crate::lab::{ModelOrigin, TrainedModel};
use crate::transport::{ApiPath, Method, Transport};

/// A versioned model deployed from the lab.
#[derive(Clone)]
pub struct SavedModel {
    transport: Arc<dyn Transport>,
    project_key: String,
    saved_model_id: String,
}

impl fmt::Debug for SavedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedModel")
            .field("project_key", &self.project_key)
            .field("saved_model_id", &self.saved_model_id)
            .finish_non_exhaustive()
    }
}

impl SavedModel {
    pub fn new(
        transport: Arc<dyn Transport>,
        project_key: impl Into<String>,
        saved_model_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            project_key: project_key.into(),
            saved_model_id: saved_model_id.into(),
        }
    }

    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    pub fn id(&self) -> &str {
        &self.saved_model_id
    }

    /// Summaries of every version of this saved model.
    pub fn list_versions(&self) -> LabResult<Vec<Value>> {
        match self.get(self.path().join("versions"))? {
            Value::Array(versions) => Ok(versions),
            _ => Err(LabError::Json("versions response is not an array".to_string())),
        }
    }

    /// Details of one version. Saving its user metadata targets this version.
    pub fn version_details(&self, version: &str) -> LabResult<TrainedModel> {
        let version_path = self.path().join("versions").join(version);
        let details = self.get(version_path.join("details"))?;
        let snippet = self.get(version_path.join("snippet"))?;
        let origin = ModelOrigin::SavedModel {
            project_key: self.project_key.clone(),
            saved_model_id: self.saved_model_id.clone(),
            version: version.to_string(),
        };
        Ok(TrainedModel::from_payloads(
            self.transport.clone(),
            origin,
            details,
            snippet,
        ))
    }

    fn path(&self) -> ApiPath {
        ApiPath::new([
            "projects",
            self.project_key.as_str(),
            "savedmodels",
            self.saved_model_id.as_str(),
        ])
    }

    fn get(&self, path: ApiPath) -> LabResult<Value> {
        self.transport.perform_json(Method::Get, &path, None)
    }
}
