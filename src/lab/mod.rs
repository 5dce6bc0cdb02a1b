//! The lab subsystem: ML task settings, training, ensembling, deployment
//! and trained model details.

mod details;
mod json;
mod selection;
mod settings;
mod split;
mod task;
mod wait;

pub use details::{
    ClusteringModelDetails, ClustersFacts, ModelOrigin, PredictionModelDetails, TrainedModel,
    TrainedModelDetails,
};
pub use selection::BuildSettings;
pub use settings::{
    CLUSTERING_ALGORITHM_REMAP, MetricSettings, MlTaskSettings, PREDICTION_ALGORITHM_REMAP,
    TaskType,
};
pub use split::{DEFAULT_FOLDS, DEFAULT_TRAIN_RATIO, ExplicitSplit, SplitParamsHandler};
pub use task::{
    DeployToFlow, EnsembleMethod, FlowDeployment, FlowRedeployment, MlTask, MlTaskRef,
    RedeployToFlow,
};
pub use wait::{CancellationToken, GUESS_POLL_INTERVAL, TRAIN_POLL_INTERVAL, WaitOptions};
