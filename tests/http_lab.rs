mod support {
    pub mod lab_server;
}

use std::time::Duration;

use mllab::lab::{DeployToFlow, WaitOptions};
use mllab::{ClientConfig, LabClient, LabError};
use serde_json::{Value, json};
use support::lab_server::LabServer;

fn client_for(server: &LabServer, api_key: Option<&str>) -> LabClient {
    LabClient::from_config(&ClientConfig {
        base_url: server.base_url.clone(),
        api_key: api_key.map(str::to_string),
        ..ClientConfig::default()
    })
    .unwrap()
}

#[test]
fn status_hits_public_api_with_basic_auth() {
    let server = LabServer::ok(&[r#"{"guessing": false, "training": false, "fullModelIds": []}"#]);
    let task = client_for(&server, Some("secret")).mltask("PROJ", "a1", "m1");

    let status = task.status().unwrap();
    assert_eq!(status["guessing"], json!(false));

    let seen = server.finish();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].path, "/public/api/projects/PROJ/models/lab/a1/m1/status");
    assert_eq!(seen[0].header("authorization"), Some("Basic c2VjcmV0Og=="));
}

#[test]
fn requests_without_api_key_carry_no_authorization() {
    let server = LabServer::ok(&["{}"]);
    client_for(&server, None)
        .mltask("P", "a", "m")
        .status()
        .unwrap();
    let seen = server.finish();
    assert_eq!(seen[0].header("authorization"), None);
}

#[test]
fn server_errors_carry_status_and_message() {
    let server = LabServer::start(vec![(
        404,
        r#"{"errorType": "UnknownTask", "message": "No ML task m9"}"#.to_string(),
    )]);
    let err = client_for(&server, None)
        .mltask("P", "a", "m9")
        .status()
        .unwrap_err();
    server.finish();
    match err {
        LabError::Http { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "UnknownTask: No ML task m9");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn train_wait_polls_until_training_stops() {
    let server = LabServer::ok(&[
        r#"{"training": true}"#,
        r#"{"training": true}"#,
        r#"{"training": false, "fullModelIds": [{"id": "A-1", "fullModelId": {"sessionId": "s1"}}]}"#,
    ]);
    let task = client_for(&server, None).mltask("P", "a", "m");

    let status = task
        .wait_train_complete(&WaitOptions::every(Duration::ZERO))
        .unwrap();
    assert_eq!(status["fullModelIds"][0]["id"], json!("A-1"));

    let seen = server.finish();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|request| request.path.ends_with("/status")));
}

#[test]
fn edited_settings_are_posted_back_whole() {
    let settings = json!({
        "taskType": "PREDICTION",
        "predictionType": "BINARY_CLASSIFICATION",
        "preprocessing": {
            "per_feature": {
                "age": {"role": "INPUT", "type": "NUMERIC"},
                "label": {"role": "TARGET", "type": "CATEGORY"}
            }
        },
        "modeling": {"random_forest_classification": {"enabled": true}}
    });
    let settings_body = settings.to_string();
    let server = LabServer::ok(&[settings_body.as_str(), ""]);
    let task = client_for(&server, None).mltask("P", "a", "m");

    let mut handle = task.settings().unwrap();
    handle.reject_feature("age").unwrap();
    handle.set_algorithm_enabled("RANDOM_FOREST_CLASSIFICATION", false).unwrap();
    handle.save().unwrap();

    let seen = server.finish();
    assert_eq!(seen[1].method, "POST");
    assert_eq!(seen[1].path, "/public/api/projects/P/models/lab/a/m/settings");
    let posted: Value = serde_json::from_str(&seen[1].body).unwrap();
    assert_eq!(posted["preprocessing"]["per_feature"]["age"]["role"], json!("REJECT"));
    assert_eq!(posted["preprocessing"]["per_feature"]["label"]["role"], json!("TARGET"));
    assert_eq!(posted["modeling"]["random_forest_classification"]["enabled"], json!(false));
}

#[test]
fn deploy_sends_camel_case_request_and_reads_outcome() {
    let server = LabServer::ok(&[r#"{"savedModelId": "sm1", "trainRecipeName": "train_churn"}"#]);
    let task = client_for(&server, None).mltask("P", "a", "m");

    let deployment = task
        .deploy_to_flow(&DeployToFlow::new("A-1", "churn model", "customers"))
        .unwrap();
    assert_eq!(deployment.saved_model_id, "sm1");
    assert_eq!(deployment.train_recipe_name, "train_churn");

    let seen = server.finish();
    assert_eq!(
        seen[0].path,
        "/public/api/projects/P/models/lab/a/m/models/A-1/actions/deployToFlow"
    );
    let body: Value = serde_json::from_str(&seen[0].body).unwrap();
    assert_eq!(body["modelName"], json!("churn model"));
    assert_eq!(body["trainDatasetRef"], json!("customers"));
    assert_eq!(body["redoOptimization"], json!(true));
    assert!(body.get("modelId").is_none());
}

#[test]
fn saved_model_versions_are_listed() {
    let server = LabServer::ok(&[r#"[{"id": "initial", "active": true}]"#]);
    let versions = client_for(&server, None)
        .saved_model("P", "sm1")
        .list_versions()
        .unwrap();
    assert_eq!(versions.len(), 1);
    let seen = server.finish();
    assert_eq!(seen[0].path, "/public/api/projects/P/savedmodels/sm1/versions");
}
