//! `quarry workflow` — drive a predefined tool sequence.

use serde_json::Value;

use quarry_domain::tool::{summarize_result, ToolArgs};

use crate::state::AppState;

pub async fn run(state: &AppState, name: &str, target: &str, dry_run: bool) -> anyhow::Result<()> {
    let workflow = state.workflows.get(name)?;
    let steps = workflow.resolve(target);

    println!("Workflow: {} — {}", workflow.name, workflow.description);
    println!("Target: {target}\n");

    if dry_run {
        for (i, step) in steps.iter().enumerate() {
            println!("  {}. {}({})", i + 1, step.tool, step.query);
            if !step.description.is_empty() {
                println!("     {}", step.description);
            }
        }
        return Ok(());
    }

    for (i, step) in steps.iter().enumerate() {
        let mut args = ToolArgs::new();
        args.insert("query".into(), Value::String(step.query.clone()));

        match state.executor.execute(&step.tool, &args).await {
            Ok(result) => {
                println!("  {}. {} — {}", i + 1, step.tool, summarize_result(&result));
            }
            Err(e) => {
                // A failed step is reported and the workflow continues.
                println!("  {}. {} — failed: {e}", i + 1, step.tool);
            }
        }
    }
    Ok(())
}
