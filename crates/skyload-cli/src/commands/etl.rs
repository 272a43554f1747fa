use super::{json_pretty, with_spinner, CommandResult, Context, EXIT_SUCCESS};
use skyload_warehouse::StageSelection;

fn dry_run(ctx: &Context, selection: StageSelection, json: bool) -> CommandResult {
    let plan = ctx.orchestrator().pipeline_plan(selection)?;
    if json {
        let payload: Vec<_> = plan
            .iter()
            .map(|(stage, statements)| {
                serde_json::json!({ "stage": stage, "statements": statements })
            })
            .collect();
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }
    for (stage, statements) in &plan {
        println!("-- stage: {stage}");
        for statement in statements {
            println!("{};\n", statement.sql.trim());
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn run(ctx: &Context, selection: StageSelection, dry: bool, json: bool) -> CommandResult {
    if dry {
        return dry_run(ctx, selection, json);
    }

    let orch = ctx.orchestrator();
    let report = with_spinner(json, "running pipeline", "pipeline finished", |pb| {
        if let Some(pb) = pb {
            let stages: Vec<_> = selection.stages().iter().map(ToString::to_string).collect();
            pb.set_message(format!("running stages {}", stages.join(", ")));
        }
        orch.run_pipeline(selection)
    })?;

    if json {
        println!("{}", json_pretty(&report)?);
        return Ok(EXIT_SUCCESS);
    }
    for stage in &report.stages {
        println!("{}:", stage.stage);
        for statement in &stage.statements {
            println!("  {:<16} {} rows", statement.table, statement.rows);
        }
    }
    println!("{} statements executed", report.statement_count());
    Ok(EXIT_SUCCESS)
}
