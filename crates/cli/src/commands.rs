use std::{path::Path, sync::Arc};

use aispec_engine::{Advance, Assistant, Entity, ModelService, RunnerEvent, ScriptedModelService, Step};
use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};
use tracing::info;

use crate::backend::OpenAiBackend;
use crate::config::CliConfig;

/// Prints the assistant's skills, workflows, and steps.
pub fn inspect(document: &Path, as_json: bool) -> Result<()> {
    let assistant = Assistant::load(document)?;
    let summary = summarize(&assistant);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", assistant.name().unwrap_or("(unnamed assistant)"));
    if let Some(description) = assistant.description() {
        println!("  {description}");
    }
    for workflow in assistant.workflows() {
        let owner = assistant
            .find_workflow(workflow.id())
            .ok()
            .and_then(|found| found.skill)
            .and_then(|skill| skill.name().or(skill.id()))
            .unwrap_or("assistant");
        println!("- {} [{}] ({} steps)", workflow.id(), owner, workflow.steps().len());
        for step in workflow.steps() {
            match step.loop_directive() {
                Some(directive) => println!("    {} (loop over {} as {})", step.id(), directive.source, directive.binding),
                None => println!("    {}", step.id()),
            }
        }
    }
    Ok(())
}

fn summarize(assistant: &Assistant) -> Value {
    let step_summary = |step: &Step| {
        json!({
            "id": step.id(),
            "variables": step.prompt().variables(),
            "loop": step.loop_directive().map(|directive| json!({"source": directive.source, "as": directive.binding})),
            "output": step.output().and_then(|output| output.name()),
        })
    };
    let workflows: Vec<Value> = assistant
        .workflows()
        .map(|workflow| {
            let owner = assistant.find_workflow(workflow.id()).ok().and_then(|found| found.skill).and_then(|skill| skill.id());
            json!({
                "id": workflow.id(),
                "name": workflow.name(),
                "skill": owner,
                "steps": workflow.steps().iter().map(step_summary).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({
        "id": assistant.id(),
        "name": assistant.name(),
        "description": assistant.description(),
        "skills": assistant.skills().iter().map(|skill| json!({"id": skill.id(), "name": skill.name()})).collect::<Vec<_>>(),
        "workflows": workflows,
    })
}

/// Prints the scoped system prompt a workflow would run with.
pub fn prompt(document: &Path, workflow_id: &str) -> Result<()> {
    let assistant = Assistant::load(document)?;
    println!("{}", assistant.scoped_to(workflow_id)?.to_document_string()?);
    Ok(())
}

pub struct RunOptions<'a> {
    pub document: &'a Path,
    pub workflow_id: &'a str,
    pub inputs: &'a [String],
    pub input_json: Option<&'a str>,
    pub responses: Option<&'a Path>,
    pub show_history: bool,
}

/// Runs a workflow to completion and prints the final context.
pub async fn run(config: &CliConfig, options: RunOptions<'_>) -> Result<()> {
    let assistant = Assistant::load(options.document)?;
    let model_service: Arc<dyn ModelService> = match options.responses {
        Some(path) => Arc::new(ScriptedModelService::from_json_file(path)?),
        None => Arc::new(OpenAiBackend::from_config(config)?),
    };
    let initial = initial_context(options.inputs, options.input_json)?;

    let mut runner = assistant.load_workflow(options.workflow_id, model_service)?;
    let mut events = runner.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                RunnerEvent::StepFinished { step_id, results, .. } => {
                    eprintln!("step {step_id} finished ({} result(s))", results.len());
                }
                RunnerEvent::WorkflowFinished { workflow_id, at } => eprintln!("workflow {workflow_id} finished at {at}"),
            }
        }
    });

    let mut advance = runner.start(initial).await?;
    while let Advance::Step(report) = &advance {
        info!(step_id = %report.step_id, index = report.index, "advancing");
        advance = runner.submit_step().await?;
    }

    println!("{}", serde_json::to_string_pretty(runner.context().values())?);
    if options.show_history {
        println!("{}", serde_json::to_string_pretty(runner.history())?);
    }

    drop(runner);
    printer.await.context("event printer task failed")?;
    Ok(())
}

/// Builds the initial context from `--input-json` and `--input KEY=VALUE` pairs.
///
/// Values that parse as JSON (numbers, booleans, arrays) keep their type; anything else is a string.
pub fn initial_context(inputs: &[String], input_json: Option<&str>) -> Result<Map<String, Value>> {
    let mut context = match input_json {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("--input-json is not valid JSON")? {
            Value::Object(map) => map,
            _ => bail!("--input-json must be a JSON object"),
        },
        None => Map::new(),
    };
    for input in inputs {
        let Some((key, raw)) = input.split_once('=') else {
            bail!("input '{input}' must be KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("input '{input}' has an empty key");
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        context.insert(key.to_string(), value);
    }
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_keep_json_types() {
        let inputs = vec!["name=John".to_string(), "surnamesLength=2".to_string(), "tags=[\"a\",\"b\"]".to_string()];
        let context = initial_context(&inputs, Some(r#"{"name": "Jane", "extra": true}"#)).unwrap();
        assert_eq!(context["name"], "John");
        assert_eq!(context["surnamesLength"], 2);
        assert_eq!(context["tags"], json!(["a", "b"]));
        assert_eq!(context["extra"], true);
    }

    #[test]
    fn rejects_malformed_inputs() {
        assert!(initial_context(&["novalue".to_string()], None).is_err());
        assert!(initial_context(&["=x".to_string()], None).is_err());
        assert!(initial_context(&[], Some("[1, 2]")).is_err());
    }
}
