//! Command line driver for ML tasks of the lab.

use mllab::lab::{DeployToFlow, MlTask, WaitOptions};
use mllab::{ClientConfig, LabClient, config, logging};
use serde_json::{Value, json};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, PartialEq)]
struct TaskArgs {
    project: String,
    analysis: String,
    mltask: String,
}

#[derive(Debug, PartialEq)]
enum Command {
    Status,
    WaitGuess,
    Train { session: Option<String> },
    Models { session: Option<String>, algorithm: Option<String> },
    Details { model: String },
    Deploy { model: String, name: String, train: String, test: Option<String> },
}

fn run() -> Result<(), String> {
    let (task_args, command) = parse_args(std::env::args().skip(1).collect())?;
    let config = config::load_or_default().map_err(|err| err.to_string())?;
    if let Err(err) = logging::init(&config.logging) {
        eprintln!("Logging disabled: {err}");
    }
    let client = LabClient::from_config(&config).map_err(|err| err.to_string())?;
    let task = client.mltask(task_args.project, task_args.analysis, task_args.mltask);
    let output = execute(&task, &config, command).map_err(|err| err.to_string())?;
    let text = serde_json::to_string_pretty(&output).map_err(|err| err.to_string())?;
    println!("{text}");
    Ok(())
}

fn execute(task: &MlTask, config: &ClientConfig, command: Command) -> mllab::LabResult<Value> {
    let (guess_wait, train_wait) = WaitOptions::from_settings(&config.polling);
    match command {
        Command::Status => task.status(),
        Command::WaitGuess => task.wait_guess_complete(&guess_wait),
        Command::Train { session } => {
            task.start_train(session.as_deref(), None)?;
            task.wait_train_complete(&train_wait)?;
            let ids = task.trained_models_ids(None, None)?;
            Ok(json!({ "trainedModelIds": ids }))
        }
        Command::Models { session, algorithm } => {
            let ids = task.trained_models_ids(session.as_deref(), algorithm.as_deref())?;
            Ok(json!(ids))
        }
        Command::Details { model } => {
            let details = task.trained_model_details(&model)?;
            Ok(json!({
                "kind": if details.as_clustering().is_some() { "clustering" } else { "prediction" },
                "trainInfo": details.common().train_info().ok(),
                "performance": details.performance_metrics(),
            }))
        }
        Command::Deploy { model, name, train, test } => {
            let request = DeployToFlow {
                test_dataset: test,
                ..DeployToFlow::new(model, name, train)
            };
            let deployment = task.deploy_to_flow(&request)?;
            Ok(json!({
                "savedModelId": deployment.saved_model_id,
                "trainRecipeName": deployment.train_recipe_name,
            }))
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<(TaskArgs, Command), String> {
    let Some(command) = args.first().map(String::as_str) else {
        return Err(help_text());
    };
    let mut project = None;
    let mut analysis = None;
    let mut mltask = None;
    let mut session = None;
    let mut algorithm = None;
    let mut model = None;
    let mut name = None;
    let mut train = None;
    let mut test = None;

    let mut idx = 1usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        let slot = match flag {
            "--project" => &mut project,
            "--analysis" => &mut analysis,
            "--mltask" => &mut mltask,
            "--session" => &mut session,
            "--algorithm" => &mut algorithm,
            "--model" => &mut model,
            "--name" => &mut name,
            "--train" => &mut train,
            "--test" => &mut test,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        };
        idx += 1;
        let value = args
            .get(idx)
            .ok_or_else(|| format!("{flag} requires a value"))?;
        *slot = Some(value.clone());
        idx += 1;
    }

    let task_args = TaskArgs {
        project: project.ok_or_else(|| "--project is required".to_string())?,
        analysis: analysis.ok_or_else(|| "--analysis is required".to_string())?,
        mltask: mltask.ok_or_else(|| "--mltask is required".to_string())?,
    };
    let command = match command {
        "status" => Command::Status,
        "wait-guess" => Command::WaitGuess,
        "train" => Command::Train { session },
        "models" => Command::Models { session, algorithm },
        "details" => Command::Details {
            model: model.ok_or_else(|| "--model is required".to_string())?,
        },
        "deploy" => Command::Deploy {
            model: model.ok_or_else(|| "--model is required".to_string())?,
            name: name.ok_or_else(|| "--name is required".to_string())?,
            train: train.ok_or_else(|| "--train is required".to_string())?,
            test,
        },
        _ => return Err(help_text()),
    };
    Ok((task_args, command))
}

fn help_text() -> String {
    [
        "Usage: mllab <command> --project KEY --analysis ID --mltask ID [options]",
        "",
        "Commands:",
        "  status                               Print the task status",
        "  wait-guess                           Wait for the initial settings guess",
        "  train [--session NAME]               Train and wait, then list model ids",
        "  models [--session ID] [--algorithm ALG]",
        "                                       List trained model ids",
        "  details --model ID                   Print a model's metrics",
        "  deploy --model ID --name NAME --train DATASET [--test DATASET]",
        "                                       Deploy a model to the Flow",
        "",
        "Connection settings come from .mllab/config.toml, MLLAB_URL and MLLAB_API_KEY.",
    ]
    .join("\n")
}
