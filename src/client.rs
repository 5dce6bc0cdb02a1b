//! Entry point handing out lab and saved-model handles.

use std::fmt;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::error::LabResult;
use crate::lab::{MlTask, MlTaskRef};
use crate::saved_model::SavedModel;
use crate::transport::{HttpTransport, Transport};

/// Shares one transport between every handle it creates.
#[derive(Clone)]
pub struct LabClient {
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for LabClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabClient").finish_non_exhaustive()
    }
}

impl LabClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Client talking HTTP to the platform described by `config`.
    pub fn from_config(config: &ClientConfig) -> LabResult<Self> {
        let transport = HttpTransport::new(config)?;
        tracing::debug!(base_url = %config.base_url, "Created lab client");
        Ok(Self::new(Arc::new(transport)))
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn mltask(
        &self,
        project_key: impl Into<String>,
        analysis_id: impl Into<String>,
        mltask_id: impl Into<String>,
    ) -> MlTask {
        MlTask::new(
            self.transport.clone(),
            MlTaskRef::new(project_key, analysis_id, mltask_id),
        )
    }

    pub fn saved_model(
        &self,
        project_key: impl Into<String>,
        saved_model_id: impl Into<String>,
    ) -> SavedModel {
        SavedModel::new(self.transport.clone(), project_key, saved_model_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::test_support::FakeTransport;
    use crate::transport::Method;
    use serde_json::json;

    #[test]
    fn handles_share_the_transport() {
        let transport = Arc::new(FakeTransport::default());
        transport.reply(
            Method::Get,
            "/projects/P/models/lab/a/m/status",
            json!({"training": false}),
        );
        let client = LabClient::new(transport.clone());
        let task = client.mltask("P", "a", "m");
        assert_eq!(task.task_ref(), &MlTaskRef::new("P", "a", "m"));
        task.status().unwrap();
        assert_eq!(client.saved_model("P", "sm").id(), "sm");
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn from_config_rejects_bad_urls() {
        let config = ClientConfig {
            base_url: "mailto:someone@example.com".to_string(),
            ..ClientConfig::default()
        };
        assert!(LabClient::from_config(&config).is_err());
    }
}
