//! Train/test split configuration written into `splitParams`.

use serde_json::{Map, Value, json};

use super::json;
use super::selection::BuildSettings;
use crate::error::{LabError, LabResult};

/// Default train ratio for [`SplitParamsHandler::set_split_random`].
pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;
/// Default fold count for [`SplitParamsHandler::set_split_kfold`].
pub const DEFAULT_FOLDS: u32 = 5;

/// Arguments of an explicit split. `dataset_name` is mandatory.
#[derive(Default)]
pub struct ExplicitSplit<'a> {
    /// Dataset both extracts come from (or the train one, with `test_dataset_name`).
    pub dataset_name: Option<&'a str>,
    /// Second dataset for the test extract. Same as `dataset_name` when unset.
    pub test_dataset_name: Option<&'a str>,
    pub train_selection: Option<&'a dyn BuildSettings>,
    pub test_selection: Option<&'a dyn BuildSettings>,
    pub train_filter: Option<&'a dyn BuildSettings>,
    pub test_filter: Option<&'a dyn BuildSettings>,
}

/// Edits the train/test split of a task's settings in place.
///
/// Obtained from [`super::MlTaskSettings::split_params`]; nothing is sent to
/// the server until the settings are saved.
pub struct SplitParamsHandler<'a> {
    settings: &'a mut Value,
}

impl<'a> SplitParamsHandler<'a> {
    pub(crate) fn new(settings: &'a mut Value) -> Self {
        Self { settings }
    }

    /// Random split of an extract of a single dataset.
    ///
    /// `selection` and `dataset_name` are left unchanged when `None`; without a
    /// dataset name the task's main dataset is split.
    pub fn set_split_random(
        &mut self,
        train_ratio: f64,
        selection: Option<&dyn BuildSettings>,
        dataset_name: Option<&str>,
    ) -> LabResult<()> {
        let sp = self.split_params()?;
        sp.insert("ttPolicy".into(), json!("SPLIT_SINGLE_DATASET"));
        if let Some(selection) = selection {
            sp.insert("ssdSelection".into(), selection.build());
        }
        sp.insert("ssdTrainingRatio".into(), json!(train_ratio));
        sp.insert("kfold".into(), json!(false));
        if let Some(name) = dataset_name {
            sp.insert("ssdDatasetSmartName".into(), json!(name));
        }
        Ok(())
    }

    /// K-fold cross-test over an extract of a single dataset.
    pub fn set_split_kfold(
        &mut self,
        n_folds: u32,
        selection: Option<&dyn BuildSettings>,
        dataset_name: Option<&str>,
    ) -> LabResult<()> {
        let sp = self.split_params()?;
        sp.insert("ttPolicy".into(), json!("SPLIT_SINGLE_DATASET"));
        if let Some(selection) = selection {
            sp.insert("ssdSelection".into(), selection.build());
        }
        sp.insert("kfold".into(), json!(true));
        sp.insert("nFolds".into(), json!(n_folds));
        if let Some(name) = dataset_name {
            sp.insert("ssdDatasetSmartName".into(), json!(name));
        }
        Ok(())
    }

    /// Explicit train and test extracts from one or two datasets.
    pub fn set_split_explicit(&mut self, split: ExplicitSplit<'_>) -> LabResult<()> {
        let Some(dataset_name) = split.dataset_name else {
            return Err(LabError::Validation(
                "For explicit splitting a dataset_name is mandatory".to_string(),
            ));
        };
        let sp = self.split_params()?;
        let single = split
            .test_dataset_name
            .is_none_or(|test_name| test_name == dataset_name);

        let mut train = Map::new();
        let mut test = Map::new();
        if !single {
            train.insert("datasetSmartName".into(), json!(dataset_name));
            test.insert("datasetSmartName".into(), json!(split.test_dataset_name));
        }
        fill_extract(&mut train, split.train_selection, split.train_filter);
        fill_extract(&mut test, split.test_selection, split.test_filter);

        if single {
            sp.insert("ttPolicy".into(), json!("EXPLICIT_FILTERING_SINGLE_DATASET"));
            sp.insert("efsdDatasetSmartName".into(), json!(dataset_name));
            sp.insert("efsdTrain".into(), Value::Object(train));
            sp.insert("efsdTest".into(), Value::Object(test));
        } else {
            sp.insert("ttPolicy".into(), json!("EXPLICIT_FILTERING_TWO_DATASETS"));
            sp.insert("eftdTrain".into(), Value::Object(train));
            sp.insert("eftdTest".into(), Value::Object(test));
        }
        Ok(())
    }

    fn split_params(&mut self) -> LabResult<&mut Map<String, Value>> {
        json::object_mut(self.settings, &["splitParams"])
    }
}

fn fill_extract(
    extract: &mut Map<String, Value>,
    selection: Option<&dyn BuildSettings>,
    filter: Option<&dyn BuildSettings>,
) {
    if let Some(selection) = selection {
        extract.insert("selection".into(), selection.build());
    }
    if let Some(filter) = filter {
        extract.insert("filter".into(), filter.build());
    }
}
